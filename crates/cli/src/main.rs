use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use data_loader::{DataIndex, DatasetFormat, MovieId, Rating, RatingScale, UserId};
use prediction::filters::{MinCorrelationFilter, RatedItemFilter, SignificanceWeighting};
use prediction::{
    AccuracyReport, DEFAULT_THRESHOLD, Evaluator, MoviePrediction, NeighbourPipeline,
    PredictionEngine, prediction_pairs,
};
use serde::Serialize;
use similarity::cache::DEFAULT_CAPACITY;
use similarity::{
    CorrelationCache, DEFAULT_MIN_COMMON, MutualInformation, NeighbourSet, TemporalSimilarity,
    TimeConstraint, shared_cache,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// TempoRecs - time-aware collaborative filtering
#[derive(Parser)]
#[command(name = "tempo-recs")]
#[command(about = "User-based rating prediction restricted to time windows", long_about = None)]
struct Cli {
    /// Path to the dataset directory
    #[arg(short, long, default_value = "data/ml-1m")]
    data_dir: PathBuf,

    /// File layout of the dataset
    #[arg(long, value_enum, default_value_t = FormatArg::Dat)]
    format: FormatArg,

    /// Rating scale the dataset uses
    #[arg(long, value_enum, default_value_t = ScaleArg::Movielens)]
    scale: ScaleArg,

    /// Number of neighbours per prediction
    #[arg(short, long, default_value_t = 20)]
    k: usize,

    /// Minimum co-rated movies for a correlation to count
    #[arg(long, default_value_t = DEFAULT_MIN_COMMON)]
    min_common: usize,

    /// Correlation matrices kept in the LRU cache
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    cache_capacity: usize,

    /// Significance weighting applied to neighbour correlations
    #[arg(long, value_enum, default_value_t = Weighting::Off)]
    weighting: Weighting,

    /// Drop neighbours whose (weighted) correlation is not above this value
    #[arg(long)]
    min_correlation: Option<f64>,

    /// Print reports as JSON instead of coloured text
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    /// MovieLens 1M `::` separated files
    Dat,
    /// MovieLens latest comma separated files
    Csv,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ScaleArg {
    /// 0.5 to 5.0 in half steps
    Movielens,
    /// 1 to 5 in whole steps
    Netflix,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Weighting {
    Off,
    NCommon,
    Static,
    Dynamic,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Measure {
    Pearson,
    MutualInformation,
}

/// Time window selection shared by several commands
#[derive(Args, Clone, Copy, Debug)]
struct WindowArgs {
    /// Only use ratings made before Jan 1 of this year
    #[arg(long, conflicts_with_all = ["from_year", "to_year"])]
    before_year: Option<i32>,

    /// First year of a time bin (inclusive)
    #[arg(long, requires = "to_year")]
    from_year: Option<i32>,

    /// Last year of a time bin (exclusive)
    #[arg(long, requires = "from_year")]
    to_year: Option<i32>,
}

impl WindowArgs {
    fn constraint(&self) -> Result<Option<TimeConstraint>> {
        let constraint = match (self.before_year, self.from_year, self.to_year) {
            (Some(year), _, _) => Some(TimeConstraint::max_limit_year(year)?),
            (None, Some(from), Some(to)) => Some(TimeConstraint::time_bin_years(from, to)?),
            _ => None,
        };
        Ok(constraint)
    }

    fn bin_size(&self) -> Option<u32> {
        match (self.from_year, self.to_year) {
            (Some(from), Some(to)) if to > from => u32::try_from(to - from).ok(),
            _ => None,
        }
    }
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Predict one user's rating of one movie
    Predict {
        #[arg(long)]
        user_id: UserId,

        #[arg(long)]
        movie_id: MovieId,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// List a user's nearest neighbours inside a window
    Neighbours {
        #[arg(long)]
        user_id: UserId,

        /// Similarity measure used to rank neighbours
        #[arg(long, value_enum, default_value_t = Measure::Pearson)]
        measure: Measure,

        /// Movie the neighbours must have rated (mutual information only)
        #[arg(long)]
        movie_id: Option<MovieId>,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// Show a user's rating history
    User {
        #[arg(long)]
        user_id: UserId,

        /// Number of most recent ratings to list
        #[arg(long, default_value_t = 10)]
        recent: usize,

        /// Also summarise the history before Jan 1 of this year
        #[arg(long)]
        before_year: Option<i32>,
    },

    /// Predict a user's first watched movies and report accuracy
    Accuracy {
        #[arg(long)]
        user_id: UserId,

        /// Number of watched movies to predict
        #[arg(long, default_value_t = 10)]
        movies: usize,

        /// Ratings at or above this count as liked
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,

        #[command(flatten)]
        window: WindowArgs,
    },

    /// RMSE per year when neighbourhoods only see earlier ratings
    EvaluateMaxLimit {
        /// Number of users to sample
        #[arg(long, default_value_t = 100)]
        users: usize,

        /// Last year (exclusive) of the sweep; defaults to the year after the last rating
        #[arg(long)]
        max_year: Option<i32>,

        #[arg(long, default_value_t = Evaluator::DEFAULT_MOVIES_PER_USER)]
        movies_per_user: usize,

        /// Seed for user sampling
        #[arg(long)]
        seed: Option<u64>,
    },

    /// RMSE per time bin length and alignment
    EvaluateTimeBins {
        #[arg(long, default_value_t = 100)]
        users: usize,

        /// Shortest bin length in years
        #[arg(long, default_value_t = 1)]
        min_bin: u32,

        /// Longest bin length in years (exclusive)
        #[arg(long, default_value_t = 5)]
        max_bin: u32,

        #[arg(long)]
        seed: Option<u64>,
    },

    /// Unconstrained against constrained RMSE per user
    CompareBaseline {
        #[arg(long, default_value_t = 20)]
        users: usize,

        #[arg(long, default_value_t = Evaluator::DEFAULT_MOVIES_PER_USER)]
        movies_per_user: usize,

        #[arg(long)]
        seed: Option<u64>,

        #[command(flatten)]
        window: WindowArgs,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so `--json` output stays parseable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    eprintln!("Loading dataset from {}...", cli.data_dir.display());
    let start = Instant::now();
    let format = match cli.format {
        FormatArg::Dat => DatasetFormat::Dat,
        FormatArg::Csv => DatasetFormat::Csv,
    };
    let scale = match cli.scale {
        ScaleArg::Movielens => RatingScale::MOVIELENS,
        ScaleArg::Netflix => RatingScale::NETFLIX,
    };
    let data_index = Arc::new(
        DataIndex::load_from_files(&cli.data_dir, format, scale)
            .context("Failed to load ratings dataset")?,
    );
    eprintln!("{} Loaded dataset in {:?}", "✓".green(), start.elapsed());

    let engine = Arc::new(build_engine(&cli, Arc::clone(&data_index)));
    info!(k = cli.k, min_common = cli.min_common, "Prediction engine ready");

    match cli.command {
        Commands::Predict {
            user_id,
            movie_id,
            window,
        } => handle_predict(&cli, &engine, user_id, movie_id, window)?,
        Commands::Neighbours {
            user_id,
            measure,
            movie_id,
            window,
        } => handle_neighbours(&cli, &engine, user_id, measure, movie_id, window)?,
        Commands::User {
            user_id,
            recent,
            before_year,
        } => handle_user(&cli, &data_index, user_id, recent, before_year)?,
        Commands::Accuracy {
            user_id,
            movies,
            threshold,
            window,
        } => handle_accuracy(&cli, &engine, user_id, movies, threshold, window)?,
        Commands::EvaluateMaxLimit {
            users,
            max_year,
            movies_per_user,
            seed,
        } => {
            let evaluator = build_evaluator(&cli, &engine, movies_per_user, seed);
            handle_evaluate_max_limit(&cli, &evaluator, users, max_year)?
        }
        Commands::EvaluateTimeBins {
            users,
            min_bin,
            max_bin,
            seed,
        } => {
            let evaluator = build_evaluator(&cli, &engine, 1, seed);
            handle_evaluate_time_bins(&cli, &evaluator, users, min_bin, max_bin)?
        }
        Commands::CompareBaseline {
            users,
            movies_per_user,
            seed,
            window,
        } => {
            let evaluator = build_evaluator(&cli, &engine, movies_per_user, seed);
            handle_compare_baseline(&cli, &evaluator, users, window)?
        }
    }

    Ok(())
}

fn build_engine(cli: &Cli, data_index: Arc<DataIndex>) -> PredictionEngine {
    let cache = shared_cache(CorrelationCache::with_capacity(cli.cache_capacity));
    let similarity = TemporalSimilarity::new(data_index, cache).with_min_common(cli.min_common);

    let mut pipeline = NeighbourPipeline::new();
    if cli.weighting != Weighting::Off {
        // weights are computed over the raters of the target movie
        pipeline = pipeline.add_filter(RatedItemFilter);
    }
    pipeline = match cli.weighting {
        Weighting::Off => pipeline,
        Weighting::NCommon => pipeline.add_filter(SignificanceWeighting::CommonCount),
        Weighting::Static => pipeline.add_filter(SignificanceWeighting::static_default()),
        Weighting::Dynamic => pipeline.add_filter(SignificanceWeighting::dynamic_default()),
    };
    if let Some(minimum) = cli.min_correlation {
        pipeline = pipeline.add_filter(MinCorrelationFilter::new(minimum));
    }

    PredictionEngine::new(similarity).with_pipeline(pipeline)
}

fn build_evaluator(
    cli: &Cli,
    engine: &Arc<PredictionEngine>,
    movies_per_user: usize,
    seed: Option<u64>,
) -> Evaluator {
    let evaluator = Evaluator::new(Arc::clone(engine))
        .with_k(cli.k)
        .with_movies_per_user(movies_per_user);
    match seed {
        Some(seed) => evaluator.with_seed(seed),
        None => evaluator,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn describe_window(constraint: Option<&TimeConstraint>) -> String {
    constraint.map_or_else(|| "all ratings".to_string(), |c| c.to_string())
}

fn format_rmse(rmse: Option<f64>) -> String {
    rmse.map_or_else(|| "-".dimmed().to_string(), |value| format!("{value:.4}"))
}

#[derive(Serialize)]
struct PredictOutput {
    user_id: UserId,
    movie_id: MovieId,
    title: Option<String>,
    window: Option<TimeConstraint>,
    prediction: Option<f64>,
    actual: Option<f32>,
}

/// Handle the 'predict' command
fn handle_predict(
    cli: &Cli,
    engine: &PredictionEngine,
    user_id: UserId,
    movie_id: MovieId,
    window: WindowArgs,
) -> Result<()> {
    let data_index = engine.data_index();
    let constraint = window.constraint()?;
    let prediction = engine
        .predict_movie(user_id, movie_id, cli.k, constraint.as_ref(), window.bin_size())
        .with_context(|| format!("Failed to predict movie {movie_id} for user {user_id}"))?;

    let output = PredictOutput {
        user_id,
        movie_id,
        title: data_index.get_movie(movie_id).map(|m| m.title.clone()),
        window: constraint,
        prediction,
        actual: data_index.rating(user_id, movie_id),
    };
    if cli.json {
        return print_json(&output);
    }

    let scale = data_index.scale();
    println!("{}", format!("Prediction for user {user_id}").bold().blue());
    println!(
        "{}Movie: {}",
        "• ".green(),
        output.title.as_deref().unwrap_or("(not in catalog)")
    );
    println!("{}Window: {}", "• ".green(), describe_window(constraint.as_ref()));
    match prediction {
        Some(p) => println!(
            "{}Predicted: {:.3} (snapped {:.1})",
            "• ".cyan(),
            p,
            scale.snap(p)
        ),
        None => println!(
            "{}Predicted: {}",
            "• ".cyan(),
            "no neighbour gives a prediction".yellow()
        ),
    }
    if let Some(actual) = output.actual {
        println!("{}Actual: {:.1}", "• ".cyan(), actual);
    }
    Ok(())
}

#[derive(Serialize)]
struct NeighboursOutput {
    user_id: UserId,
    measure: &'static str,
    window: Option<TimeConstraint>,
    neighbours: NeighbourSet,
}

/// Handle the 'neighbours' command
fn handle_neighbours(
    cli: &Cli,
    engine: &PredictionEngine,
    user_id: UserId,
    measure: Measure,
    movie_id: Option<MovieId>,
    window: WindowArgs,
) -> Result<()> {
    let constraint = window.constraint()?;
    let similarity = engine.similarity();

    let (name, neighbours) = match measure {
        Measure::Pearson => {
            let set = similarity
                .neighbours(
                    user_id,
                    constraint.as_ref(),
                    cli.min_common,
                    cli.k,
                    window.bin_size(),
                )
                .with_context(|| format!("No neighbourhood for user {user_id}"))?;
            ("pearson", set)
        }
        Measure::MutualInformation => {
            let movie_id = movie_id
                .ok_or_else(|| anyhow!("--movie-id is required for mutual information"))?;
            let mi = MutualInformation::new(Arc::clone(similarity.data_index()));
            let set = mi.neighbours_for_movie(user_id, movie_id, constraint.as_ref(), cli.k);
            ("mutual-information", set)
        }
    };

    let output = NeighboursOutput {
        user_id,
        measure: name,
        window: constraint,
        neighbours,
    };
    if cli.json {
        return print_json(&output);
    }

    println!(
        "{}",
        format!("Neighbours of user {user_id} ({name}, {})", describe_window(constraint.as_ref()))
            .bold()
            .blue()
    );
    if output.neighbours.is_empty() {
        println!("  {}", "none".yellow());
    }
    for (rank, neighbour) in output.neighbours.iter().enumerate() {
        let common = match measure {
            Measure::Pearson => similarity.common_count(
                user_id,
                neighbour.user_id,
                constraint.as_ref(),
                cli.min_common,
                window.bin_size(),
            ),
            Measure::MutualInformation => None,
        };
        let common = common.map(|c| format!(" ({c} common)")).unwrap_or_default();
        println!(
            "{}. user {} - {:.4}{}",
            (rank + 1).to_string().green(),
            neighbour.user_id,
            neighbour.correlation,
            common
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct UserOutput {
    user_id: UserId,
    rating_count: usize,
    avg_rating: f64,
    first_rating: Option<DateTime<Utc>>,
    last_rating: Option<DateTime<Utc>>,
    recent: Vec<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<HistoryBefore>,
}

/// The user's history up to a cutoff, next to the whole table's
#[derive(Serialize)]
struct HistoryBefore {
    cutoff: DateTime<Utc>,
    rating_count: usize,
    avg_rating: f64,
    dataset_ratings: usize,
}

fn history_before(data_index: &DataIndex, user_id: UserId, year: i32) -> Result<HistoryBefore> {
    let cutoff = TimeConstraint::max_limit_year(year)?.end();
    let at = cutoff.timestamp();
    Ok(HistoryBefore {
        cutoff,
        rating_count: data_index.user_ratings_before(user_id, at).len(),
        avg_rating: data_index.user_avg_before(user_id, at),
        dataset_ratings: data_index.ratings_in_range(None, at).len(),
    })
}

/// Handle the 'user' command
fn handle_user(
    cli: &Cli,
    data_index: &DataIndex,
    user_id: UserId,
    recent: usize,
    before_year: Option<i32>,
) -> Result<()> {
    let ratings = data_index.get_user_ratings(user_id);
    if ratings.is_empty() {
        return Err(anyhow!("User {} has no ratings", user_id));
    }

    let mut by_time: Vec<Rating> = ratings.to_vec();
    by_time.sort_by_key(|r| r.timestamp);

    let output = UserOutput {
        user_id,
        rating_count: ratings.len(),
        avg_rating: data_index.user_avg(user_id),
        first_rating: by_time.first().map(Rating::rated_at),
        last_rating: by_time.last().map(Rating::rated_at),
        recent: by_time.iter().rev().take(recent).copied().collect(),
        before: before_year
            .map(|year| history_before(data_index, user_id, year))
            .transpose()?,
    };
    if cli.json {
        return print_json(&output);
    }

    println!("{}", format!("User ID: {user_id}").bold().blue());
    println!("{}Number of ratings: {}", "• ".cyan(), output.rating_count);
    println!("{}Average rating: {:.2}", "• ".cyan(), output.avg_rating);
    if let (Some(first), Some(last)) = (output.first_rating, output.last_rating) {
        println!(
            "{}Active: {} to {}",
            "• ".cyan(),
            first.format("%Y-%m-%d"),
            last.format("%Y-%m-%d")
        );
    }
    if let Some(before) = &output.before {
        println!(
            "{}Before {}: {} ratings, average {:.2} ({} ratings in the whole table)",
            "• ".cyan(),
            before.cutoff.format("%Y-%m-%d"),
            before.rating_count,
            before.avg_rating,
            before.dataset_ratings
        );
    }
    println!("Most recent ratings:");
    for rating in &output.recent {
        let title = data_index
            .get_movie(rating.movie_id)
            .map_or_else(|| format!("Movie {}", rating.movie_id), |m| m.title.clone());
        println!(
            "  - {} {} (Rating: {})",
            rating.rated_at().format("%Y-%m-%d").to_string().dimmed(),
            title,
            rating.rating
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct AccuracyOutput {
    user_id: UserId,
    window: Option<TimeConstraint>,
    predictions: Vec<MoviePrediction>,
    report: AccuracyReport,
}

/// Handle the 'accuracy' command
fn handle_accuracy(
    cli: &Cli,
    engine: &PredictionEngine,
    user_id: UserId,
    movies: usize,
    threshold: f64,
    window: WindowArgs,
) -> Result<()> {
    let constraint = window.constraint()?;
    let predictions = engine
        .predict_movies_watched(user_id, movies, cli.k, constraint.as_ref())
        .with_context(|| format!("Failed to predict watched movies of user {user_id}"))?;
    let scale = engine.data_index().scale();
    let report = AccuracyReport::new(&prediction_pairs(&predictions), &scale, threshold);

    let output = AccuracyOutput {
        user_id,
        window: constraint,
        predictions,
        report,
    };
    if cli.json {
        return print_json(&output);
    }

    println!(
        "{}",
        format!("Accuracy for user {user_id} ({})", describe_window(constraint.as_ref()))
            .bold()
            .blue()
    );
    for p in &output.predictions {
        let predicted = p
            .prediction
            .map_or_else(|| "-".dimmed().to_string(), |v| format!("{v:.3}"));
        println!("  movie {:>6}: predicted {} actual {:.1}", p.movie_id, predicted, p.actual);
    }
    let report = &output.report;
    let metrics = &report.threshold_metrics;
    println!("{}Predictions: {}", "• ".cyan(), report.predictions);
    println!("{}RMSE: {}", "• ".cyan(), format_rmse(report.rmse));
    println!(
        "{}At {:.1}: accuracy {:.3}, precision {:.3}, recall {:.3}, F1 {:.3}, MCC {:.3}",
        "• ".cyan(),
        report.threshold,
        metrics.accuracy,
        metrics.precision,
        metrics.recall,
        metrics.f1,
        metrics.mcc
    );
    println!("{}Exact level accuracy: {:.3}", "• ".cyan(), report.class_accuracy);
    Ok(())
}

/// Handle the 'evaluate-max-limit' command
fn handle_evaluate_max_limit(
    cli: &Cli,
    evaluator: &Evaluator,
    users: usize,
    max_year: Option<i32>,
) -> Result<()> {
    let start = Instant::now();
    let report = evaluator
        .evaluate_max_limit(users, max_year)
        .context("Max limit evaluation failed")?;
    if cli.json {
        return print_json(&report);
    }

    println!(
        "{}",
        format!(
            "Max limit sweep {}..{} (k = {}, {} users)",
            report.min_year,
            report.max_year,
            report.k,
            report.baseline.len()
        )
        .bold()
        .blue()
    );
    println!("{}Unconstrained mean RMSE: {}", "• ".cyan(), format_rmse(report.baseline_mean_rmse));
    let best = report.best_year().map(|(year, _)| year);
    for year in &report.years {
        let line = format!(
            "  before {}: {:>5} users, mean RMSE {}",
            year.year,
            year.users.len(),
            format_rmse(year.mean_rmse)
        );
        if Some(year.year) == best {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }
    println!("Finished in {:?}", start.elapsed());
    Ok(())
}

/// Handle the 'evaluate-time-bins' command
fn handle_evaluate_time_bins(
    cli: &Cli,
    evaluator: &Evaluator,
    users: usize,
    min_bin: u32,
    max_bin: u32,
) -> Result<()> {
    let start = Instant::now();
    let report = evaluator
        .evaluate_time_bins(users, min_bin, max_bin)
        .context("Time bin evaluation failed")?;
    if cli.json {
        return print_json(&report);
    }

    println!(
        "{}",
        format!(
            "Time bin sweep {}..{} (k = {}, {} users)",
            report.min_year, report.max_year, report.k, report.n_users
        )
        .bold()
        .blue()
    );
    let best = report.best_bin().map(|b| (b.bin_size, b.start_year));
    for bin in &report.bins {
        let line = format!(
            "  {} year(s) from {}: {:>5} predictions, RMSE {} ({:.1} ms)",
            bin.bin_size,
            bin.start_year,
            bin.predictions,
            format_rmse(bin.rmse),
            bin.runtime_ms
        );
        if Some((bin.bin_size, bin.start_year)) == best {
            println!("{}", line.green());
        } else {
            println!("{line}");
        }
    }
    println!("Finished in {:?}", start.elapsed());
    Ok(())
}

/// Handle the 'compare-baseline' command
fn handle_compare_baseline(
    cli: &Cli,
    evaluator: &Evaluator,
    users: usize,
    window: WindowArgs,
) -> Result<()> {
    let constraint = window
        .constraint()?
        .ok_or_else(|| anyhow!("compare-baseline needs --before-year or --from-year/--to-year"))?;
    let rows = evaluator
        .compare_baseline(users, &constraint)
        .context("Baseline comparison failed")?;
    if cli.json {
        return print_json(&rows);
    }

    println!("{}", format!("Baseline against {constraint}").bold().blue());
    for row in &rows {
        println!(
            "  user {:>6}: {} ({:.1} ms) vs {} ({:.1} ms)",
            row.user_id,
            format_rmse(row.rmse),
            row.runtime_ms,
            format_rmse(row.constrained_rmse),
            row.constrained_runtime_ms
        );
    }
    Ok(())
}
