use chrono::Datelike;
use data_loader::{DataIndex, DatasetFormat, RatingScale};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

/// Usage: dataset_summary [DATA_DIR] [dat|csv]
fn main() {
    let mut args = std::env::args().skip(1);
    let data_dir = PathBuf::from(args.next().unwrap_or_else(|| "data/ml-latest-small".to_string()));
    let format = match args.next().as_deref() {
        Some("dat") => DatasetFormat::Dat,
        _ => DatasetFormat::Csv,
    };

    println!("Loading {:?} dataset from {}...\n", format, data_dir.display());

    let start = Instant::now();
    let index = DataIndex::load_from_files(&data_dir, format, RatingScale::MOVIELENS)
        .expect("Failed to load dataset");
    let elapsed = start.elapsed();

    let (users, movies, ratings) = index.counts();
    println!("=== Load Complete ===");
    println!("Time taken: {:?} ({:.0} ratings/second)", elapsed, ratings as f64 / elapsed.as_secs_f64());
    println!("Users: {users}, movies: {movies}, ratings: {ratings}");

    let mut per_year: BTreeMap<i32, usize> = BTreeMap::new();
    for rating in index.ratings() {
        *per_year.entry(rating.rated_at().year()).or_default() += 1;
    }
    println!("\n=== Ratings per year ===");
    for (year, count) in &per_year {
        println!("{year}: {count}");
    }

    println!("\n=== Most active users ===");
    for (user_id, stats) in index.active_users(5) {
        println!(
            "user {:>6}: {:>5} ratings, avg {:.2}",
            user_id, stats.rating_count, stats.avg_rating
        );
    }
}
