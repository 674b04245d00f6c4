//! DataIndex building, validation and query helpers.
//!
//! - Load a dataset directory in either supported format
//! - Compute per-user statistics (rating averages are hit on every prediction)
//! - Validate ratings against the dataset's rating scale
//! - Time-window queries over the ratings table

use crate::error::{DataLoadError, Result};
use crate::parser::{self, DatasetFormat};
use crate::types::*;
use rayon::prelude::*;
use std::path::Path;
use tracing::{debug, info};

impl DataIndex {
    /// Load a MovieLens-style dataset from a directory
    ///
    /// Steps:
    /// 1. Parse ratings and movies in parallel
    /// 2. Build primary indices
    /// 3. Compute user statistics
    /// 4. Validate against `scale`
    ///
    /// A missing movies file is tolerated: the catalog then falls back to rated movies.
    pub fn load_from_files(data_dir: &Path, format: DatasetFormat, scale: RatingScale) -> Result<Self> {
        info!("Loading {:?} dataset from {:?}", format, data_dir);

        let ratings_path = data_dir.join(format.ratings_file());
        let movies_path = data_dir.join(format.movies_file());

        let (ratings, movies) = rayon::join(
            || parser::parse_ratings(&ratings_path, format),
            || {
                if movies_path.exists() {
                    parser::parse_movies(&movies_path, format)
                } else {
                    Ok(Vec::new())
                }
            },
        );
        let ratings = ratings?;
        let movies = movies?;

        info!("Parsed {} movies, {} ratings", movies.len(), ratings.len());

        let index = DataIndex::from_ratings(scale, movies, ratings);
        index.validate()?;

        let (users, movies, ratings) = index.counts();
        info!(users = users, movies = movies, ratings = ratings, "DataIndex built and validated");
        Ok(index)
    }

    /// Compute average rating and rating count for every user
    pub fn compute_user_stats(&mut self) {
        let user_stats = self
            .user_ratings
            .par_iter()
            .map(|(&user_id, ratings)| {
                let rating_count = ratings.len() as u32;
                let avg_rating = if rating_count > 0 {
                    let total: f64 = ratings.iter().map(|r| r.rating as f64).sum();
                    total / rating_count as f64
                } else {
                    0.0
                };
                (
                    user_id,
                    UserStats {
                        avg_rating,
                        rating_count,
                    },
                )
            })
            .collect();
        self.user_stats = user_stats;
        debug!("Computed stats for {} users", self.user_stats.len());
    }

    /// Validate data integrity
    ///
    /// Check that:
    /// - Every rating lies within the rating scale
    /// - When a movie catalog was loaded, every rated movie is in it
    pub fn validate(&self) -> Result<()> {
        let has_catalog = !self.movies.is_empty();
        for rating in self.ratings() {
            if has_catalog && !self.movies.contains_key(&rating.movie_id) {
                return Err(DataLoadError::MissingReference {
                    entity: "Movie".to_string(),
                    id: rating.movie_id,
                });
            }
            if !self.scale.contains(rating.rating) {
                return Err(DataLoadError::InvalidValue {
                    field: "rating".to_string(),
                    value: rating.rating.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Arithmetic mean of every rating by `user_id`, `0.0` when the user has none
    pub fn user_avg(&self, user_id: UserId) -> f64 {
        if let Some(stats) = self.user_stats.get(&user_id) {
            return stats.avg_rating;
        }
        mean(self.get_user_ratings(user_id).iter())
    }

    /// Ratings by `user_id` strictly before the Unix timestamp `at`
    pub fn user_ratings_before(&self, user_id: UserId, at: i64) -> Vec<&Rating> {
        self.get_user_ratings(user_id)
            .iter()
            .filter(|r| r.timestamp < at)
            .collect()
    }

    /// Mean of the user's ratings strictly before `at`, `0.0` when there are none
    pub fn user_avg_before(&self, user_id: UserId, at: i64) -> f64 {
        mean(self.user_ratings_before(user_id, at).into_iter())
    }

    /// All ratings with `start <= timestamp < end` (no lower bound when `start` is `None`)
    pub fn ratings_in_range(&self, start: Option<i64>, end: i64) -> Vec<&Rating> {
        self.ratings()
            .filter(|r| r.timestamp < end && start.is_none_or(|s| r.timestamp >= s))
            .collect()
    }

    /// Earliest rating timestamp in the table
    pub fn first_timestamp(&self) -> Option<i64> {
        self.ratings().map(|r| r.timestamp).min()
    }

    /// Latest rating timestamp in the table
    pub fn last_timestamp(&self) -> Option<i64> {
        self.ratings().map(|r| r.timestamp).max()
    }

    /// Every user with at least one rating, ascending
    pub fn all_user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.user_ratings.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The `n` users with the most ratings, most active first (ties by ascending id)
    pub fn active_users(&self, n: usize) -> Vec<(UserId, UserStats)> {
        let mut users: Vec<(UserId, UserStats)> = self
            .user_ratings
            .iter()
            .map(|(&id, ratings)| {
                let stats = self.user_stats.get(&id).copied().unwrap_or(UserStats {
                    avg_rating: mean(ratings.iter()),
                    rating_count: ratings.len() as u32,
                });
                (id, stats)
            })
            .collect();
        users.sort_by(|a, b| b.1.rating_count.cmp(&a.1.rating_count).then(a.0.cmp(&b.0)));
        users.truncate(n);
        users
    }

    /// Number of distinct movies both users rated, over their whole history
    pub fn common_movie_count(&self, a: UserId, b: UserId) -> usize {
        let mut movies: Vec<MovieId> = self.get_user_ratings(a).iter().map(|r| r.movie_id).collect();
        movies.sort_unstable();
        movies.dedup();
        movies
            .into_iter()
            .filter(|&m| self.rating_lookup.contains_key(&(b, m)))
            .count()
    }
}

fn mean<'a>(ratings: impl Iterator<Item = &'a Rating>) -> f64 {
    let (sum, count) = ratings.fold((0.0_f64, 0_u32), |(s, c), r| (s + r.rating as f64, c + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rating(user_id: UserId, movie_id: MovieId, rating: f32, timestamp: i64) -> Rating {
        Rating {
            user_id,
            movie_id,
            rating,
            timestamp,
        }
    }

    fn create_test_index() -> DataIndex {
        DataIndex::from_ratings(
            RatingScale::MOVIELENS,
            vec![],
            vec![
                rating(1, 10, 4.0, 100),
                rating(1, 20, 2.0, 200),
                rating(1, 30, 3.0, 300),
                rating(2, 10, 5.0, 150),
                rating(3, 30, 1.5, 50),
            ],
        )
    }

    #[test]
    fn test_user_avg() {
        let index = create_test_index();
        assert!((index.user_avg(1) - 3.0).abs() < 1e-12);
        assert_eq!(index.user_avg(2), 5.0);
        assert_eq!(index.user_avg(99), 0.0);
    }

    #[test]
    fn test_user_avg_before() {
        let index = create_test_index();
        assert_eq!(index.user_ratings_before(1, 200).len(), 1);
        assert_eq!(index.user_avg_before(1, 250), 3.0);
        assert_eq!(index.user_avg_before(1, 0), 0.0);
    }

    #[test]
    fn test_ratings_in_range() {
        let index = create_test_index();
        assert_eq!(index.ratings_in_range(None, 150).len(), 2);
        assert_eq!(index.ratings_in_range(Some(100), 200).len(), 2);
        assert_eq!(index.ratings_in_range(None, 1_000).len(), 5);
    }

    #[test]
    fn test_timestamps_and_users() {
        let index = create_test_index();
        assert_eq!(index.first_timestamp(), Some(50));
        assert_eq!(index.last_timestamp(), Some(300));
        assert_eq!(index.all_user_ids(), vec![1, 2, 3]);

        let active = index.active_users(2);
        assert_eq!(active[0].0, 1);
        assert_eq!(active[0].1.rating_count, 3);
        assert_eq!(active[1].0, 2);
    }

    #[test]
    fn test_common_movie_count() {
        let index = create_test_index();
        assert_eq!(index.common_movie_count(1, 2), 1);
        assert_eq!(index.common_movie_count(2, 1), 1);
        assert_eq!(index.common_movie_count(2, 3), 0);
        assert_eq!(index.common_movie_count(1, 1), 3);
    }

    #[test]
    fn test_validate_scale() {
        let index = DataIndex::from_ratings(RatingScale::NETFLIX, vec![], vec![rating(1, 1, 0.5, 0)]);
        assert!(matches!(
            index.validate(),
            Err(DataLoadError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_missing_movie() {
        let movie = Movie {
            id: 1,
            title: "Known (2000)".to_string(),
            year: Some(2000),
            genres: vec![],
        };
        let index = DataIndex::from_ratings(
            RatingScale::MOVIELENS,
            vec![movie],
            vec![rating(1, 1, 4.0, 0), rating(1, 2, 4.0, 0)],
        );
        assert!(matches!(
            index.validate(),
            Err(DataLoadError::MissingReference { id: 2, .. })
        ));
    }

    #[test]
    fn test_load_dataset() {
        // Requires the MovieLens small dataset under data/ml-latest-small
        let data_dir = Path::new("../../data/ml-latest-small");

        if data_dir.exists() {
            let index =
                DataIndex::load_from_files(data_dir, DatasetFormat::Csv, RatingScale::MOVIELENS)
                    .unwrap();
            let (users, _movies, ratings) = index.counts();
            assert_eq!(users, 610);
            assert_eq!(ratings, 100836);
        }
    }
}
