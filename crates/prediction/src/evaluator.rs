//! Offline evaluation sweeps.
//!
//! - **Max limit sweep**: for every year, restrict neighbourhoods to ratings
//!   made before Jan 1 of that year and measure per-user RMSE
//! - **Time bin sweep**: for every bin length and alignment, predict one
//!   random watched movie per user from each bin and measure RMSE
//! - **Baseline comparison**: unconstrained against constrained RMSE per user,
//!   with runtimes
//!
//! Users with no rating inside a window are skipped for that window.

use crate::accuracy::rmse;
use crate::engine::{PredictionEngine, prediction_pairs};
use crate::error::{PredictionError, Result};
use chrono::{DateTime, Datelike, Utc};
use data_loader::{MovieId, UserId};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::{IndexedRandom, SliceRandom};
use rayon::prelude::*;
use serde::Serialize;
use similarity::{SimilarityError, TimeConstraint};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UserRmse {
    pub user_id: UserId,
    pub rmse: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearResult {
    pub year: i32,
    pub users: Vec<UserRmse>,
    pub mean_rmse: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaxLimitReport {
    pub min_year: i32,
    pub max_year: i32,
    pub k: usize,
    pub baseline: Vec<UserRmse>,
    pub baseline_mean_rmse: Option<f64>,
    pub years: Vec<YearResult>,
}

impl MaxLimitReport {
    /// Year whose mean RMSE is lowest
    pub fn best_year(&self) -> Option<(i32, f64)> {
        self.years
            .iter()
            .filter_map(|y| y.mean_rmse.map(|r| (y.year, r)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BinResult {
    pub bin_size: u32,
    pub start_year: i32,
    pub predictions: usize,
    pub rmse: Option<f64>,
    pub runtime_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeBinReport {
    pub n_users: usize,
    pub k: usize,
    pub min_year: i32,
    pub max_year: i32,
    pub bins: Vec<BinResult>,
}

impl TimeBinReport {
    pub fn best_bin(&self) -> Option<&BinResult> {
        self.bins
            .iter()
            .filter(|b| b.rmse.is_some())
            .min_by(|a, b| a.rmse.unwrap_or(f64::INFINITY).total_cmp(&b.rmse.unwrap_or(f64::INFINITY)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BaselineComparison {
    pub user_id: UserId,
    pub rmse: Option<f64>,
    pub runtime_ms: f64,
    pub constrained_rmse: Option<f64>,
    pub constrained_runtime_ms: f64,
}

/// Runs evaluation sweeps against a prediction engine.
///
/// ## Usage
/// ```ignore
/// let evaluator = Evaluator::new(Arc::new(engine))
///     .with_k(20)
///     .with_movies_per_user(10)
///     .with_seed(7);
/// let report = evaluator.evaluate_max_limit(100, None)?;
/// ```
pub struct Evaluator {
    engine: Arc<PredictionEngine>,
    k: usize,
    movies_per_user: usize,
    seed: u64,
}

impl Evaluator {
    pub const DEFAULT_K: usize = 10;
    pub const DEFAULT_MOVIES_PER_USER: usize = 10;

    pub fn new(engine: Arc<PredictionEngine>) -> Self {
        Self {
            engine,
            k: Self::DEFAULT_K,
            movies_per_user: Self::DEFAULT_MOVIES_PER_USER,
            seed: rand::random(),
        }
    }

    pub fn with_k(mut self, k: usize) -> Self {
        self.k = k;
        self
    }

    pub fn with_movies_per_user(mut self, n: usize) -> Self {
        self.movies_per_user = n;
        self
    }

    /// Fix the seed used to sample users and movies
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    fn rng(&self) -> StdRng {
        StdRng::seed_from_u64(self.seed)
    }

    /// `n` distinct users, or all of them when `n` covers the table; ascending
    pub fn sample_users(&self, n: usize) -> Vec<UserId> {
        let mut users = self.engine.data_index().all_user_ids();
        if n < users.len() {
            users.shuffle(&mut self.rng());
            users.truncate(n);
            users.sort_unstable();
        }
        users
    }

    /// Calendar years spanned by the ratings: `(first year, last year + 1)`
    pub fn year_range(&self) -> Result<(i32, i32)> {
        let index = self.engine.data_index();
        let (first, last) = index
            .first_timestamp()
            .zip(index.last_timestamp())
            .ok_or(PredictionError::EmptyDataset)?;
        let year = |ts: i64| DateTime::<Utc>::from_timestamp(ts, 0).map(|d| d.year()).unwrap_or(1970);
        Ok((year(first), year(last) + 1))
    }

    /// RMSE of `user_id`'s first watched movies.
    ///
    /// `Ok(None)` when nothing could be predicted or the user has no rating inside the window.
    fn user_rmse(&self, user_id: UserId, constraint: Option<&TimeConstraint>) -> Result<Option<f64>> {
        let scale = self.engine.data_index().scale();
        match self
            .engine
            .predict_movies_watched(user_id, self.movies_per_user, self.k, constraint)
        {
            Ok(predictions) => Ok(rmse(&prediction_pairs(&predictions), &scale)),
            Err(PredictionError::Similarity(SimilarityError::UserNotFound { .. })) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Make sure the window's matrix is cached before workers fan out over users
    fn warm(&self, constraint: Option<&TimeConstraint>, bin_size: Option<u32>) {
        let similarity = self.engine.similarity();
        similarity.correlation_matrix(constraint, similarity.min_common(), bin_size);
    }

    fn users_rmse(&self, users: &[UserId], constraint: Option<&TimeConstraint>) -> Result<Vec<UserRmse>> {
        self.warm(constraint, None);
        let results: Vec<Option<UserRmse>> = users
            .par_iter()
            .map(|&user_id| {
                Ok(self
                    .user_rmse(user_id, constraint)?
                    .map(|rmse| UserRmse { user_id, rmse }))
            })
            .collect::<Result<_>>()?;
        Ok(results.into_iter().flatten().collect())
    }

    /// RMSE per user for every max-limit year in `[min_year, max_year)`.
    ///
    /// The bulk cache is filled for the whole sweep first. `max_year` defaults to
    /// the year after the last rating.
    #[instrument(skip(self))]
    pub fn evaluate_max_limit(&self, n_users: usize, max_year: Option<i32>) -> Result<MaxLimitReport> {
        let (min_year, last_year) = self.year_range()?;
        let max_year = max_year.unwrap_or(last_year);
        let users = self.sample_users(n_users);
        info!(users = users.len(), min_year, max_year, "Evaluating max limit constraints");

        let baseline = self.users_rmse(&users, None)?;

        let similarity = self.engine.similarity();
        let seed = TimeConstraint::max_limit_year(min_year)?;
        similarity.populate_bulk_for_max_limit(&seed, min_year, max_year, similarity.min_common())?;

        let mut years = Vec::new();
        for year in min_year..max_year {
            let constraint = TimeConstraint::max_limit_year(year)?;
            let rows = self.users_rmse(&users, Some(&constraint))?;
            let result = YearResult {
                year,
                mean_rmse: mean(rows.iter().map(|u| u.rmse)),
                users: rows,
            };
            debug!(year, evaluated = result.users.len(), "Evaluated year");
            years.push(result);
        }

        Ok(MaxLimitReport {
            min_year,
            max_year,
            k: self.k,
            baseline_mean_rmse: mean(baseline.iter().map(|u| u.rmse)),
            baseline,
            years,
        })
    }

    /// One random watched movie per user
    fn movie_per_user(&self, users: &[UserId]) -> Vec<(UserId, MovieId)> {
        let index = self.engine.data_index();
        let mut rng = self.rng();
        users
            .iter()
            .filter_map(|&user_id| {
                index
                    .get_user_ratings(user_id)
                    .choose(&mut rng)
                    .map(|r| (user_id, r.movie_id))
            })
            .collect()
    }

    /// RMSE for every bin size in `[min_bin, max_bin)` and every alignment of it.
    #[instrument(skip(self))]
    pub fn evaluate_time_bins(&self, n_users: usize, min_bin: u32, max_bin: u32) -> Result<TimeBinReport> {
        if min_bin == 0 || min_bin >= max_bin {
            return Err(PredictionError::InvalidParameter {
                name: "bin_size",
                reason: format!("need 0 < min_bin < max_bin, got [{min_bin}, {max_bin})"),
            });
        }
        let (min_year, max_year) = self.year_range()?;
        let users = self.sample_users(n_users);
        let user_movies = self.movie_per_user(&users);
        info!(users = users.len(), min_year, max_year, "Evaluating time bins");

        let similarity = self.engine.similarity();
        let seed = TimeConstraint::time_bin_years(min_year, max_year)?;
        similarity.populate_bulk_for_time_bins(
            &seed,
            min_year,
            max_year,
            min_bin,
            max_bin,
            similarity.min_common(),
        )?;

        let mut bins = Vec::new();
        for bin_size in min_bin..max_bin {
            let span = bin_size as i32;
            for shift in 0..span {
                let started = Instant::now();
                let mut pairs = Vec::new();
                let mut start = min_year + shift;
                while start + span < max_year {
                    let constraint = TimeConstraint::time_bin_years(start, start + span)?;
                    pairs.extend(self.bin_predictions(&user_movies, &constraint, bin_size)?);
                    start += span;
                }
                let result = BinResult {
                    bin_size,
                    start_year: min_year + shift,
                    predictions: pairs.len(),
                    rmse: rmse(&pairs, &self.engine.data_index().scale()),
                    runtime_ms: started.elapsed().as_secs_f64() * 1000.0,
                };
                debug!(
                    bin_size,
                    start_year = result.start_year,
                    predictions = result.predictions,
                    "Evaluated bin alignment"
                );
                bins.push(result);
            }
        }

        Ok(TimeBinReport {
            n_users: users.len(),
            k: self.k,
            min_year,
            max_year,
            bins,
        })
    }

    fn bin_predictions(
        &self,
        user_movies: &[(UserId, MovieId)],
        constraint: &TimeConstraint,
        bin_size: u32,
    ) -> Result<Vec<(f64, f64)>> {
        self.warm(Some(constraint), Some(bin_size));
        let index = self.engine.data_index();
        let pairs: Vec<Option<(f64, f64)>> = user_movies
            .par_iter()
            .map(|&(user_id, movie_id)| {
                let predicted =
                    match self
                        .engine
                        .predict_movie(user_id, movie_id, self.k, Some(constraint), Some(bin_size))
                    {
                        Ok(p) => p,
                        Err(PredictionError::Similarity(SimilarityError::UserNotFound { .. })) => None,
                        Err(e) => return Err(e),
                    };
                Ok(predicted.zip(index.rating(user_id, movie_id).map(f64::from)))
            })
            .collect::<Result<_>>()?;
        Ok(pairs.into_iter().flatten().collect())
    }

    /// Unconstrained against constrained RMSE for `n_users` random users
    #[instrument(skip(self, constraint), fields(window = %constraint))]
    pub fn compare_baseline(&self, n_users: usize, constraint: &TimeConstraint) -> Result<Vec<BaselineComparison>> {
        let users = self.sample_users(n_users);
        users
            .iter()
            .map(|&user_id| {
                let started = Instant::now();
                let rmse = self.user_rmse(user_id, None)?;
                let runtime_ms = started.elapsed().as_secs_f64() * 1000.0;

                let started = Instant::now();
                let constrained_rmse = self.user_rmse(user_id, Some(constraint))?;
                let constrained_runtime_ms = started.elapsed().as_secs_f64() * 1000.0;

                Ok(BaselineComparison {
                    user_id,
                    rmse,
                    runtime_ms,
                    constrained_rmse,
                    constrained_runtime_ms,
                })
            })
            .collect()
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{DataIndex, Rating, RatingScale};
    use similarity::{CorrelationCache, TemporalSimilarity, shared_cache};

    fn ts(year: i32) -> i64 {
        use chrono::TimeZone;
        Utc.with_ymd_and_hms(year, 3, 1, 0, 0, 0).unwrap().timestamp()
    }

    /// Eight users rating six movies; users 1-4 rate in 2001, users 5-8 in 2004
    fn create_engine() -> Arc<PredictionEngine> {
        let mut ratings = Vec::new();
        for user in 1..=8u32 {
            let year = if user <= 4 { 2001 } else { 2004 };
            for movie in 1..=6u32 {
                let score = 1.0 + ((user + movie * movie) % 5) as f32;
                ratings.push(Rating {
                    user_id: user,
                    movie_id: movie,
                    rating: score,
                    timestamp: ts(year),
                });
            }
        }
        let index = Arc::new(DataIndex::from_ratings(RatingScale::NETFLIX, vec![], ratings));
        let similarity =
            TemporalSimilarity::new(index, shared_cache(CorrelationCache::new())).with_min_common(2);
        Arc::new(PredictionEngine::new(similarity))
    }

    #[test]
    fn test_sample_users() {
        let evaluator = Evaluator::new(create_engine()).with_seed(3);
        assert_eq!(evaluator.sample_users(100), (1..=8).collect::<Vec<_>>());

        let sample = evaluator.sample_users(3);
        assert_eq!(sample.len(), 3);
        assert_eq!(sample, evaluator.sample_users(3));
    }

    #[test]
    fn test_year_range() {
        let evaluator = Evaluator::new(create_engine());
        assert_eq!(evaluator.year_range().unwrap(), (2001, 2005));
    }

    #[test]
    fn test_max_limit_sweep() {
        let engine = create_engine();
        let evaluator = Evaluator::new(Arc::clone(&engine)).with_k(3).with_seed(1);
        let report = evaluator.evaluate_max_limit(8, None).unwrap();

        assert_eq!(report.years.iter().map(|y| y.year).collect::<Vec<_>>(), vec![2001, 2002, 2003, 2004]);
        assert_eq!(report.baseline.len(), 8);
        // Before 2001 nobody has rated anything
        assert!(report.years[0].users.is_empty());
        // Before 2002..2004 only the 2001 raters have neighbours
        assert!(report.years[1].users.iter().all(|u| u.user_id <= 4));
        // Every year after the first was served from the bulk table
        assert_eq!(engine.similarity().computations(), 1 + 4);
    }

    #[test]
    fn test_time_bin_sweep() {
        let evaluator = Evaluator::new(create_engine()).with_k(3).with_seed(5);
        let report = evaluator.evaluate_time_bins(8, 1, 3).unwrap();

        // size 1: one alignment ; size 2: two alignments
        assert_eq!(report.bins.len(), 3);
        assert_eq!(report.bins[0].bin_size, 1);
        assert_eq!(report.bins[1].start_year, 2001);
        assert_eq!(report.bins[2].start_year, 2002);
        assert!(report.bins.iter().any(|b| b.predictions > 0));
    }

    #[test]
    fn test_time_bin_rejects_bad_range() {
        let evaluator = Evaluator::new(create_engine());
        assert!(matches!(
            evaluator.evaluate_time_bins(8, 3, 3),
            Err(PredictionError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_compare_baseline() {
        let evaluator = Evaluator::new(create_engine()).with_k(3).with_seed(2);
        let constraint = TimeConstraint::max_limit_year(2003).unwrap();
        let rows = evaluator.compare_baseline(8, &constraint).unwrap();

        assert_eq!(rows.len(), 8);
        for row in rows {
            assert!(row.rmse.is_some());
            assert_eq!(row.constrained_rmse.is_some(), row.user_id <= 4);
        }
    }

    #[test]
    fn test_empty_dataset() {
        let index = Arc::new(DataIndex::new());
        let similarity = TemporalSimilarity::new(index, shared_cache(CorrelationCache::new()));
        let evaluator = Evaluator::new(Arc::new(PredictionEngine::new(similarity)));
        assert_eq!(evaluator.year_range(), Err(PredictionError::EmptyDataset));
    }
}
