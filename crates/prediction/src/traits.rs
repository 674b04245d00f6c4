//! Core traits for neighbour filtering and rating prediction.

use crate::error::Result;
use data_loader::{DataIndex, MovieId, UserId};
use similarity::NeighbourSet;

/// What a filter knows about the prediction being made
#[derive(Debug, Clone, Copy)]
pub struct PredictionContext<'a> {
    pub user_id: UserId,
    pub movie_id: MovieId,
    pub data_index: &'a DataIndex,
}

impl<'a> PredictionContext<'a> {
    pub fn new(data_index: &'a DataIndex, user_id: UserId, movie_id: MovieId) -> Self {
        Self {
            user_id,
            movie_id,
            data_index,
        }
    }
}

/// Reshapes a neighbour set before it reaches a predictor.
///
/// Filters take ownership of the set and hand back the (possibly reweighted)
/// survivors. `Send + Sync` lets a pipeline be shared across evaluation threads.
pub trait NeighbourFilter: Send + Sync {
    /// Returns the name of this filter (for logging/debugging)
    fn name(&self) -> &str;

    fn apply(&self, neighbours: NeighbourSet, context: &PredictionContext<'_>) -> Result<NeighbourSet>;
}

/// Turns a neighbour set into a rating estimate
pub trait Predictor: Send + Sync {
    fn name(&self) -> &str;

    /// Estimated rating of `movie_id` by `user_id`, or `None` when the
    /// neighbours give nothing to go on
    fn predict(&self, user_id: UserId, movie_id: MovieId, neighbours: &NeighbourSet) -> Option<f64>;

    /// Legacy form where `0.0` stands for "no prediction"
    fn predict_or_zero(&self, user_id: UserId, movie_id: MovieId, neighbours: &NeighbourSet) -> f64 {
        self.predict(user_id, movie_id, neighbours).unwrap_or(0.0)
    }
}
