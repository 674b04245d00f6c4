//! Core domain types for rating datasets.
//!
//! Key Rust concepts demonstrated here:
//! - Type aliases for domain clarity (UserId, MovieId)
//! - Small `Copy` structs for ratings and scales
//! - HashMap indices owned by a single `DataIndex`

use crate::error::{DataLoadError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Type Aliases
// =============================================================================

/// Unique identifier for a user
pub type UserId = u32;

/// Unique identifier for a movie (an "item" in collaborative filtering terms)
pub type MovieId = u32;

// =============================================================================
// Movie Type
// =============================================================================

/// Represents a movie in the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Movie {
    pub id: MovieId,
    pub title: String,
    /// Year extracted from title (e.g., "Toy Story (1995)")
    pub year: Option<u16>,
    /// Genre labels exactly as the dataset spells them ("Sci-Fi", "IMAX", ...)
    pub genres: Vec<String>,
}

// =============================================================================
// Rating Type
// =============================================================================

/// A single rating from a user for a movie
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub user_id: UserId,
    pub movie_id: MovieId,
    /// Rating value on the dataset's `RatingScale`
    pub rating: f32,
    /// Unix timestamp (seconds) when rating was made
    pub timestamp: i64,
}

impl Rating {
    /// The rating's timestamp as a UTC datetime
    ///
    /// Timestamps outside chrono's range fall back to the Unix epoch.
    pub fn rated_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp, 0).unwrap_or_default()
    }
}

// =============================================================================
// Rating Scale
// =============================================================================

/// The discrete, ascending scale a dataset's ratings live on.
///
/// MovieLens uses 0.5 to 5.0 in half steps, Netflix uses whole stars 1 to 5.
/// Nothing downstream hard-codes either; the scale travels with the `DataIndex`.
/// Fields are only reachable through [`RatingScale::new`], so the increment is
/// always finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ScaleBounds")]
pub struct RatingScale {
    lowest: f32,
    highest: f32,
    increment: f32,
}

#[derive(Deserialize)]
struct ScaleBounds {
    lowest: f32,
    highest: f32,
    increment: f32,
}

impl TryFrom<ScaleBounds> for RatingScale {
    type Error = DataLoadError;

    fn try_from(bounds: ScaleBounds) -> Result<Self> {
        Self::new(bounds.lowest, bounds.highest, bounds.increment)
    }
}

impl RatingScale {
    /// MovieLens "latest" scale: 0.5, 1.0, ..., 5.0
    pub const MOVIELENS: RatingScale = RatingScale {
        lowest: 0.5,
        highest: 5.0,
        increment: 0.5,
    };

    /// Netflix prize scale: 1, 2, 3, 4, 5
    pub const NETFLIX: RatingScale = RatingScale {
        lowest: 1.0,
        highest: 5.0,
        increment: 1.0,
    };

    /// Create a custom scale, rejecting empty ranges and non-positive steps
    pub fn new(lowest: f32, highest: f32, increment: f32) -> Result<Self> {
        let valid = lowest.is_finite()
            && highest.is_finite()
            && increment.is_finite()
            && increment > 0.0
            && lowest <= highest;
        if !valid {
            return Err(DataLoadError::InvalidScale {
                lowest,
                highest,
                increment,
            });
        }
        Ok(Self {
            lowest,
            highest,
            increment,
        })
    }

    pub fn lowest(&self) -> f32 {
        self.lowest
    }

    pub fn highest(&self) -> f32 {
        self.highest
    }

    pub fn increment(&self) -> f32 {
        self.increment
    }

    /// Number of distinct levels on the scale
    pub fn len(&self) -> usize {
        (((self.highest - self.lowest) / self.increment).round() as usize).saturating_add(1)
    }

    /// A scale always has at least one level
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All levels in ascending order
    pub fn levels(&self) -> Vec<f32> {
        (0..self.len())
            .map(|i| self.lowest + i as f32 * self.increment)
            .collect()
    }

    /// Whether `value` lies within the scale's bounds
    pub fn contains(&self, value: f32) -> bool {
        let eps = self.increment * 1e-3;
        value >= self.lowest - eps && value <= self.highest + eps
    }

    /// Index of the level closest to `value`, clamped to the scale.
    ///
    /// A value exactly half way between two levels goes to the lower one.
    pub fn level_index(&self, value: f64) -> usize {
        let steps = (value - self.lowest as f64) / self.increment as f64;
        let idx = (steps - 0.5).ceil();
        if idx <= 0.0 {
            0
        } else {
            (idx as usize).min(self.len() - 1)
        }
    }

    /// Snap `value` to the closest level on the scale
    pub fn snap(&self, value: f64) -> f64 {
        self.lowest as f64 + self.level_index(value) as f64 * self.increment as f64
    }
}

impl Default for RatingScale {
    fn default() -> Self {
        Self::MOVIELENS
    }
}

// =============================================================================
// Statistics Types
// =============================================================================

/// Precomputed statistics for a user, computed once after loading
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct UserStats {
    pub avg_rating: f64,
    pub rating_count: u32,
}

// =============================================================================
// DataIndex - The Core In-Memory Ratings Table
// =============================================================================

/// Main data structure that holds all ratings and their indices.
///
/// Provides O(1) lookups for a user's ratings, a movie's ratings and a single
/// `(user, movie)` rating. Methods hand out references; the index owns the data.
#[derive(Debug)]
pub struct DataIndex {
    // Primary data stores
    pub(crate) movies: HashMap<MovieId, Movie>,

    // Rating indices for fast lookups
    /// All ratings made by each user
    pub(crate) user_ratings: HashMap<UserId, Vec<Rating>>,
    /// All ratings received by each movie
    pub(crate) movie_ratings: HashMap<MovieId, Vec<Rating>>,
    /// Mean rating value and rating count per (user, movie)
    pub(crate) rating_lookup: HashMap<(UserId, MovieId), (f32, u32)>,

    // Precomputed statistics
    pub(crate) user_stats: HashMap<UserId, UserStats>,

    pub(crate) scale: RatingScale,
}

impl DataIndex {
    /// Creates a new, empty DataIndex on the MovieLens scale
    pub fn new() -> Self {
        Self::with_scale(RatingScale::default())
    }

    /// Creates a new, empty DataIndex on the given scale
    pub fn with_scale(scale: RatingScale) -> Self {
        Self {
            movies: HashMap::new(),
            user_ratings: HashMap::new(),
            movie_ratings: HashMap::new(),
            rating_lookup: HashMap::new(),
            user_stats: HashMap::new(),
            scale,
        }
    }

    /// Build an index straight from ratings (movies optional), computing user stats.
    pub fn from_ratings(scale: RatingScale, movies: Vec<Movie>, ratings: Vec<Rating>) -> Self {
        let mut index = Self::with_scale(scale);
        for movie in movies {
            index.insert_movie(movie);
        }
        for rating in ratings {
            index.insert_rating(rating);
        }
        index.compute_user_stats();
        index
    }

    /// The rating scale this dataset uses
    pub fn scale(&self) -> RatingScale {
        self.scale
    }

    /// Get a movie by ID
    pub fn get_movie(&self, id: MovieId) -> Option<&Movie> {
        self.movies.get(&id)
    }

    /// Whether the movie is known to the catalog.
    ///
    /// When no movie file was loaded, any movie that received a rating counts as known.
    pub fn movie_exists(&self, id: MovieId) -> bool {
        self.movies.contains_key(&id) || self.movie_ratings.contains_key(&id)
    }

    /// Get all ratings made by a user
    ///
    /// Returns an empty slice if user has no ratings
    pub fn get_user_ratings(&self, user_id: UserId) -> &[Rating] {
        self.user_ratings
            .get(&user_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Get all ratings for a movie
    pub fn get_movie_ratings(&self, movie_id: MovieId) -> &[Rating] {
        self.movie_ratings
            .get(&movie_id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// The rating `user_id` gave `movie_id`, if any.
    ///
    /// A movie rated more than once by the same user yields the mean.
    pub fn rating(&self, user_id: UserId, movie_id: MovieId) -> Option<f32> {
        self.rating_lookup.get(&(user_id, movie_id)).map(|&(mean, _)| mean)
    }

    /// Get precomputed statistics for a user
    pub fn get_user_stats(&self, user_id: UserId) -> Option<&UserStats> {
        self.user_stats.get(&user_id)
    }

    /// Iterate over every rating in the table (grouped by user, unordered)
    pub fn ratings(&self) -> impl Iterator<Item = &Rating> {
        self.user_ratings.values().flatten()
    }

    /// Insert a movie into the catalog
    pub fn insert_movie(&mut self, movie: Movie) {
        self.movies.insert(movie.id, movie);
    }

    /// Insert a rating and update indices
    ///
    /// User statistics are not refreshed; call `compute_user_stats` after bulk inserts.
    pub fn insert_rating(&mut self, rating: Rating) {
        self.user_ratings
            .entry(rating.user_id)
            .or_default()
            .push(rating);

        self.movie_ratings
            .entry(rating.movie_id)
            .or_default()
            .push(rating);

        let (mean, count) = self
            .rating_lookup
            .entry((rating.user_id, rating.movie_id))
            .or_insert((0.0, 0));
        *count += 1;
        *mean += (rating.rating - *mean) / *count as f32;
    }

    /// Get counts for debugging/validation: (users, movies, ratings)
    pub fn counts(&self) -> (usize, usize, usize) {
        let total_ratings = self.user_ratings.values().map(|v| v.len()).sum();
        let movies = self.movies.len().max(self.movie_ratings.len());
        (self.user_ratings.len(), movies, total_ratings)
    }
}

impl Default for DataIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_levels() {
        assert_eq!(RatingScale::MOVIELENS.len(), 10);
        assert_eq!(RatingScale::NETFLIX.levels(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_scale_snap() {
        let scale = RatingScale::MOVIELENS;
        assert_eq!(scale.snap(2.1), 2.0);
        assert_eq!(scale.snap(2.25), 2.0);
        assert_eq!(scale.snap(2.3), 2.5);
        assert_eq!(scale.snap(2.8), 3.0);
        assert_eq!(scale.snap(-1.0), 0.5);
        assert_eq!(scale.snap(7.0), 5.0);

        let netflix = RatingScale::NETFLIX;
        assert_eq!(netflix.snap(3.4), 3.0);
        assert_eq!(netflix.snap(3.6), 4.0);
        assert_eq!(netflix.level_index(5.0), 4);
    }

    #[test]
    fn test_invalid_scale() {
        assert!(RatingScale::new(5.0, 1.0, 1.0).is_err());
        assert!(RatingScale::new(1.0, 5.0, 0.0).is_err());
        assert!(RatingScale::new(1.0, 10.0, 1.0).is_ok());
    }

    #[test]
    fn test_zero_increment_cannot_be_deserialized() {
        let zero = r#"{"lowest": 1.0, "highest": 5.0, "increment": 0.0}"#;
        assert!(serde_json::from_str::<RatingScale>(zero).is_err());

        let scale: RatingScale =
            serde_json::from_str(r#"{"lowest": 1.0, "highest": 5.0, "increment": 1.0}"#).unwrap();
        assert_eq!(scale, RatingScale::NETFLIX);
        assert_eq!(scale.len(), 5);
    }

    #[test]
    fn test_tiny_increment_len_saturates() {
        let scale = RatingScale::new(0.0, f32::MAX, f32::MIN_POSITIVE).unwrap();
        assert_eq!(scale.len(), usize::MAX);
        assert_eq!(scale.lowest(), 0.0);
        assert_eq!(scale.increment(), f32::MIN_POSITIVE);
    }

    #[test]
    fn test_rated_at() {
        let rating = Rating {
            user_id: 1,
            movie_id: 1,
            rating: 4.0,
            timestamp: 946_684_800,
        };
        assert_eq!(rating.rated_at().to_rfc3339(), "2000-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_repeated_rating_lookup_is_mean() {
        let mut index = DataIndex::new();
        for (rating, timestamp) in [(5.0, 1), (3.0, 2), (4.0, 3)] {
            index.insert_rating(Rating {
                user_id: 1,
                movie_id: 9,
                rating,
                timestamp,
            });
        }
        assert!((index.rating(1, 9).unwrap() - 4.0).abs() < 1e-6);
        assert_eq!(index.rating(1, 10), None);
        assert_eq!(index.get_user_ratings(1).len(), 3);
    }
}
