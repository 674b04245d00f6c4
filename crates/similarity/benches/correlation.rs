//! Benchmarks for correlation matrix computation
//!
//! Run with: cargo bench --package similarity
//!
//! Uses the MovieLens 1M dataset when it is present under `data/ml-1m`,
//! otherwise a synthetic ratings table of similar shape on a smaller scale.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use data_loader::{DataIndex, DatasetFormat, Rating, RatingScale};
use similarity::{CorrelationCache, TemporalSimilarity, TimeConstraint, compute_user_correlations, shared_cache};
use std::path::Path;
use std::sync::Arc;

fn synthetic_index() -> DataIndex {
    let year = 365 * 24 * 3600;
    let ratings = (0..300u32)
        .flat_map(|user| {
            (0..40u32).map(move |i| {
                let movie = (user * 7 + i * 13) % 500;
                Rating {
                    user_id: user + 1,
                    movie_id: movie + 1,
                    rating: 0.5 + ((user + movie) % 10) as f32 * 0.5,
                    timestamp: 946_684_800 + ((user + i) % 20) as i64 * year,
                }
            })
        })
        .collect();
    DataIndex::from_ratings(RatingScale::MOVIELENS, vec![], ratings)
}

fn load_test_data() -> Arc<DataIndex> {
    let data_dir = Path::new("../../data/ml-1m");
    let index = DataIndex::load_from_files(data_dir, DatasetFormat::Dat, RatingScale::NETFLIX)
        .unwrap_or_else(|_| synthetic_index());
    Arc::new(index)
}

fn bench_unconstrained_matrix(c: &mut Criterion) {
    let data_index = load_test_data();

    c.bench_function("compute_user_correlations", |b| {
        b.iter(|| {
            let matrix = compute_user_correlations(black_box(&data_index), None, black_box(5));
            black_box(matrix)
        })
    });
}

fn bench_max_limit_matrix(c: &mut Criterion) {
    let data_index = load_test_data();
    let constraint = TimeConstraint::max_limit_year(2010).expect("valid year");

    c.bench_function("compute_user_correlations_max_limit", |b| {
        b.iter(|| {
            let matrix =
                compute_user_correlations(black_box(&data_index), Some(&constraint), black_box(5));
            black_box(matrix)
        })
    });
}

fn bench_cached_neighbours(c: &mut Criterion) {
    let data_index = load_test_data();
    let similarity = TemporalSimilarity::new(data_index, shared_cache(CorrelationCache::new()));
    // Warm the cache
    similarity.correlation_matrix(None, 5, None);

    c.bench_function("cached_neighbours", |b| {
        b.iter(|| {
            let neighbours = similarity.neighbours(black_box(1), None, 5, 20, None);
            black_box(neighbours)
        })
    });
}

criterion_group!(
    benches,
    bench_unconstrained_matrix,
    bench_max_limit_matrix,
    bench_cached_neighbours
);
criterion_main!(benches);
