//! Mean-centered weighted-average prediction.
//!
//! ```text
//! p(u, i) = avg(u) + Σ corr(u, v) * (r(v, i) - avg(v)) / Σ corr(u, v)
//! ```
//!
//! Sums run over the neighbours `v` that rated `i`.

use crate::traits::Predictor;
use data_loader::{DataIndex, MovieId, UserId};
use similarity::NeighbourSet;
use std::sync::Arc;

/// Predicts a user's rating from how neighbours deviated from their own averages
pub struct MeanCenteredPredictor {
    data_index: Arc<DataIndex>,
}

impl MeanCenteredPredictor {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self { data_index }
    }

    /// Mean of every rating by `user_id`, `0.0` for a user with none
    pub fn user_avg(&self, user_id: UserId) -> f64 {
        self.data_index.user_avg(user_id)
    }
}

impl Predictor for MeanCenteredPredictor {
    fn name(&self) -> &str {
        "MeanCenteredPredictor"
    }

    fn predict(&self, user_id: UserId, movie_id: MovieId, neighbours: &NeighbourSet) -> Option<f64> {
        if neighbours.is_empty() || !self.data_index.movie_exists(movie_id) {
            return None;
        }

        let mut numerator = 0.0;
        let mut weight_sum = 0.0;
        let mut raters = 0usize;
        for neighbour in neighbours {
            let Some(rating) = self.data_index.rating(neighbour.user_id, movie_id) else {
                continue;
            };
            let deviation = rating as f64 - self.user_avg(neighbour.user_id);
            numerator += neighbour.correlation * deviation;
            weight_sum += neighbour.correlation;
            raters += 1;
        }

        if raters == 0 || weight_sum == 0.0 {
            return None;
        }
        Some(self.user_avg(user_id) + numerator / weight_sum)
    }
}
