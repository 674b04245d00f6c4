//! End-to-end prediction: neighbours, filters, predictor.

use crate::error::Result;
use crate::filter_pipeline::NeighbourPipeline;
use crate::mean_centered::MeanCenteredPredictor;
use crate::traits::{PredictionContext, Predictor};
use data_loader::{DataIndex, MovieId, UserId};
use serde::Serialize;
use similarity::{NeighbourSet, TemporalSimilarity, TimeConstraint};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::instrument;

/// One predicted rating next to the rating the user actually gave
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MoviePrediction {
    pub movie_id: MovieId,
    pub prediction: Option<f64>,
    pub actual: f64,
}

/// Predicts ratings from time-constrained neighbourhoods.
///
/// ## Flow
/// 1. Ask `TemporalSimilarity` for the user's top `k` neighbours in the window
/// 2. Run the neighbour pipeline (empty by default)
/// 3. Hand the survivors to the predictor
pub struct PredictionEngine {
    similarity: TemporalSimilarity,
    predictor: Box<dyn Predictor>,
    pipeline: NeighbourPipeline,
}

impl PredictionEngine {
    /// Engine with a mean-centered predictor and no neighbour filters
    pub fn new(similarity: TemporalSimilarity) -> Self {
        let predictor = MeanCenteredPredictor::new(Arc::clone(similarity.data_index()));
        Self {
            similarity,
            predictor: Box::new(predictor),
            pipeline: NeighbourPipeline::new(),
        }
    }

    pub fn with_predictor(mut self, predictor: impl Predictor + 'static) -> Self {
        self.predictor = Box::new(predictor);
        self
    }

    pub fn with_pipeline(mut self, pipeline: NeighbourPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn similarity(&self) -> &TemporalSimilarity {
        &self.similarity
    }

    pub fn data_index(&self) -> &DataIndex {
        self.similarity.data_index()
    }

    fn predict_from(&self, user_id: UserId, movie_id: MovieId, neighbours: NeighbourSet) -> Result<Option<f64>> {
        let context = PredictionContext::new(self.data_index(), user_id, movie_id);
        let neighbours = self.pipeline.apply(neighbours, &context)?;
        Ok(self.predictor.predict(user_id, movie_id, &neighbours))
    }

    /// Predict `user_id`'s rating of `movie_id` from `k` neighbours inside `constraint`.
    ///
    /// `Ok(None)` means the neighbourhood gave nothing to go on; a user with no
    /// rating inside the window is an error (`UserNotFound`).
    pub fn predict_movie(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        k: usize,
        constraint: Option<&TimeConstraint>,
        bin_size: Option<u32>,
    ) -> Result<Option<f64>> {
        let neighbours = self.similarity.neighbours(
            user_id,
            constraint,
            self.similarity.min_common(),
            k,
            bin_size,
        )?;
        self.predict_from(user_id, movie_id, neighbours)
    }

    /// Predict the first `n` distinct movies `user_id` rated, in rating order.
    ///
    /// Movies are taken from the user's whole history; `constraint` only
    /// restricts which ratings shape the neighbourhood.
    #[instrument(skip(self, constraint))]
    pub fn predict_movies_watched(
        &self,
        user_id: UserId,
        n: usize,
        k: usize,
        constraint: Option<&TimeConstraint>,
    ) -> Result<Vec<MoviePrediction>> {
        let index = self.data_index();
        let history = index.get_user_ratings(user_id);
        if history.is_empty() || n == 0 {
            return Ok(Vec::new());
        }

        let neighbours = self.similarity.neighbours(
            user_id,
            constraint,
            self.similarity.min_common(),
            k,
            None,
        )?;

        let mut seen = HashSet::new();
        let mut predictions = Vec::with_capacity(n.min(history.len()));
        for rating in history {
            if predictions.len() == n {
                break;
            }
            if !seen.insert(rating.movie_id) {
                continue;
            }
            let actual = index.rating(user_id, rating.movie_id).unwrap_or(rating.rating);
            predictions.push(MoviePrediction {
                movie_id: rating.movie_id,
                prediction: self.predict_from(user_id, rating.movie_id, neighbours.clone())?,
                actual: actual as f64,
            });
        }
        Ok(predictions)
    }
}

/// Keep only the pairs that produced a prediction, as `(prediction, actual)`
pub fn prediction_pairs(predictions: &[MoviePrediction]) -> Vec<(f64, f64)> {
    predictions
        .iter()
        .filter_map(|p| p.prediction.map(|value| (value, p.actual)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PredictionError;
    use crate::filters::MinCorrelationFilter;
    use data_loader::{Rating, RatingScale};
    use similarity::{CorrelationCache, SimilarityError, shared_cache};

    fn rating(user_id: UserId, movie_id: MovieId, rating: f32) -> Rating {
        Rating {
            user_id,
            movie_id,
            rating,
            timestamp: 0,
        }
    }

    fn create_engine() -> PredictionEngine {
        let index = Arc::new(DataIndex::from_ratings(
            RatingScale::MOVIELENS,
            vec![],
            vec![
                rating(1, 1, 4.0),
                rating(1, 2, 2.0),
                rating(2, 1, 5.0),
                rating(2, 2, 1.0),
                rating(3, 1, 3.0),
                rating(3, 2, 3.0),
            ],
        ));
        let similarity = TemporalSimilarity::new(index, shared_cache(CorrelationCache::new()))
            .with_min_common(1);
        PredictionEngine::new(similarity)
    }

    #[test]
    fn test_predict_movie_scenario() {
        let engine = create_engine();
        let p = engine.predict_movie(1, 2, 2, None, None).unwrap().unwrap();
        assert!((p - 1.0).abs() < 1e-9);
        assert!(p < engine.data_index().user_avg(1));
    }

    #[test]
    fn test_pipeline_can_empty_neighbourhood() {
        // Nobody correlates strictly above 1.0
        let pipeline = NeighbourPipeline::new().add_filter(MinCorrelationFilter::new(1.0));
        let engine = create_engine().with_pipeline(pipeline);
        assert_eq!(engine.predict_movie(1, 2, 2, None, None).unwrap(), None);
    }

    #[test]
    fn test_unknown_user_is_error() {
        let engine = create_engine();
        let err = engine.predict_movie(9, 1, 2, None, None).unwrap_err();
        assert_eq!(err, PredictionError::Similarity(SimilarityError::UserNotFound { user_id: 9 }));
    }

    #[test]
    fn test_predict_movies_watched() {
        let engine = create_engine();
        let predictions = engine.predict_movies_watched(1, 10, 2, None).unwrap();
        assert_eq!(predictions.len(), 2);
        assert_eq!(predictions[0].movie_id, 1);
        assert_eq!(predictions[0].actual, 4.0);

        let limited = engine.predict_movies_watched(1, 1, 2, None).unwrap();
        assert_eq!(limited.len(), 1);

        assert!(engine.predict_movies_watched(42, 10, 2, None).unwrap().is_empty());
        assert_eq!(prediction_pairs(&predictions).len(), 2);
    }
}
