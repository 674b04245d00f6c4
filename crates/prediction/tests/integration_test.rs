//! Integration tests for prediction.
//!
//! These tests run neighbourhood selection, filtering, prediction and
//! accuracy together over small in-memory datasets.

use chrono::{TimeZone, Utc};
use data_loader::{DataIndex, MovieId, Rating, RatingScale, UserId};
use prediction::filters::*;
use prediction::{
    AccuracyReport, DEFAULT_THRESHOLD, Evaluator, NeighbourPipeline, PredictionEngine,
    prediction_pairs,
};
use similarity::{CorrelationCache, SimilarityError, TemporalSimilarity, TimeConstraint, shared_cache};
use std::sync::Arc;

fn rating(user_id: UserId, movie_id: MovieId, rating: f32, timestamp: i64) -> Rating {
    Rating {
        user_id,
        movie_id,
        rating,
        timestamp,
    }
}

fn march(year: i32) -> i64 {
    Utc.with_ymd_and_hms(year, 3, 1, 0, 0, 0).unwrap().timestamp()
}

/// u1 = (4, 2), u2 = (5, 1), u3 = (3, 3) over movies 1 and 2
fn scenario_engine() -> PredictionEngine {
    let index = Arc::new(DataIndex::from_ratings(
        RatingScale::MOVIELENS,
        vec![],
        vec![
            rating(1, 1, 4.0, march(2000)),
            rating(1, 2, 2.0, march(2000)),
            rating(2, 1, 5.0, march(2000)),
            rating(2, 2, 1.0, march(2000)),
            rating(3, 1, 3.0, march(2000)),
            rating(3, 2, 3.0, march(2000)),
        ],
    ));
    let similarity =
        TemporalSimilarity::new(index, shared_cache(CorrelationCache::new())).with_min_common(2);
    PredictionEngine::new(similarity)
}

/// Users 1-4 rate six movies in 2001, users 5-8 the same movies in 2004
fn two_era_index() -> Arc<DataIndex> {
    let mut ratings = Vec::new();
    for user in 1..=8u32 {
        let ts = if user <= 4 { march(2001) } else { march(2004) };
        for movie in 1..=6u32 {
            let score = 1.0 + ((user + movie * movie) % 5) as f32;
            ratings.push(rating(user, movie, score, ts));
        }
    }
    Arc::new(DataIndex::from_ratings(RatingScale::NETFLIX, vec![], ratings))
}

#[test]
fn test_scenario_end_to_end() {
    let engine = scenario_engine();

    let neighbours = engine.similarity().default_neighbours(1, None, 2).unwrap();
    assert_eq!(neighbours.user_ids(), vec![2, 3]);
    assert_eq!(neighbours.correlation_of(2), Some(1.0));
    assert_eq!(neighbours.correlation_of(3), Some(0.0));

    let p = engine.predict_movie(1, 2, 2, None, None).unwrap().unwrap();
    assert!((p - 1.0).abs() < 1e-9);
}

#[test]
fn test_pipeline_with_significance_weighting() {
    let pipeline = NeighbourPipeline::new()
        .add_filter(SignificanceWeighting::static_default())
        .add_filter(MinCorrelationFilter::default())
        .add_filter(RatedItemFilter);
    assert_eq!(pipeline.len(), 3);

    let engine = scenario_engine().with_pipeline(pipeline);

    // Both neighbours share two movies with u1, so weights scale by 2/50 and
    // the weighted average is unchanged once u3 (zero correlation) is dropped
    let p = engine.predict_movie(1, 2, 2, None, None).unwrap().unwrap();
    assert!((p - 1.0).abs() < 1e-9);
}

#[test]
fn test_invalid_significance_weighting_fails_prediction() {
    let pipeline = NeighbourPipeline::new().add_filter(SignificanceWeighting::Static { alpha: 0.0 });
    let engine = scenario_engine().with_pipeline(pipeline);
    assert!(engine.predict_movie(1, 2, 2, None, None).is_err());
}

#[test]
fn test_max_limit_windows_from_bulk_cache() {
    let index = two_era_index();
    let cache = shared_cache(CorrelationCache::new());
    let similarity = TemporalSimilarity::new(index, Arc::clone(&cache)).with_min_common(2);

    let seed = TimeConstraint::max_limit_year(2001).unwrap();
    let stored = similarity
        .populate_bulk_for_max_limit(&seed, 2001, 2005, 2)
        .unwrap();
    assert_eq!(stored, 4);
    assert_eq!(similarity.computations(), 4);

    let engine = PredictionEngine::new(similarity);
    let before_2003 = TimeConstraint::max_limit_year(2003).unwrap();

    // Only the 2001 raters are visible before 2003
    let neighbours = engine
        .similarity()
        .neighbours(1, Some(&before_2003), 2, 10, None)
        .unwrap();
    assert_eq!(neighbours.len(), 3);
    assert!(neighbours.iter().all(|n| n.user_id <= 4));

    let err = engine
        .predict_movie(5, 1, 10, Some(&before_2003), None)
        .unwrap_err();
    assert_eq!(
        err,
        prediction::PredictionError::Similarity(SimilarityError::UserNotFound { user_id: 5 })
    );

    assert!(engine.predict_movie(1, 1, 10, Some(&before_2003), None).unwrap().is_some());

    // Every lookup above was served by the bulk table
    assert_eq!(engine.similarity().computations(), 4);
    assert!(cache.lock().stats().bulk_hits >= 3);
}

#[test]
fn test_accuracy_report_over_watched_movies() {
    let index = two_era_index();
    let scale = index.scale();
    let similarity =
        TemporalSimilarity::new(index, shared_cache(CorrelationCache::new())).with_min_common(2);
    let engine = PredictionEngine::new(similarity);

    let predictions = engine.predict_movies_watched(1, 6, 3, None).unwrap();
    assert_eq!(predictions.len(), 6);

    let pairs = prediction_pairs(&predictions);
    assert!(!pairs.is_empty());

    let report = AccuracyReport::new(&pairs, &scale, DEFAULT_THRESHOLD);
    assert_eq!(report.predictions, pairs.len());
    let rmse = report.rmse.unwrap();
    assert!(rmse >= 0.0 && rmse <= 4.0);
    assert!((0.0..=1.0).contains(&report.class_accuracy));
}

#[test]
fn test_evaluator_sampling_is_seeded() {
    let index = two_era_index();
    let similarity = TemporalSimilarity::new(index, shared_cache(CorrelationCache::new()));
    let engine = Arc::new(PredictionEngine::new(similarity));

    let a = Evaluator::new(Arc::clone(&engine)).with_seed(11).sample_users(3);
    let b = Evaluator::new(Arc::clone(&engine)).with_seed(11).sample_users(3);
    assert_eq!(a, b);
    assert_eq!(a.len(), 3);
    assert!(a.windows(2).all(|w| w[0] < w[1]));

    let all = Evaluator::new(engine).sample_users(100);
    assert_eq!(all, (1..=8).collect::<Vec<_>>());
}
