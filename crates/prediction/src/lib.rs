//! Rating prediction and offline evaluation on top of time-aware similarity.
//!
//! This crate provides:
//! - NeighbourFilter trait and implementations for reshaping neighbourhoods
//! - NeighbourPipeline for composing filters
//! - MeanCenteredPredictor, the weighted-deviation rating estimate
//! - Accuracy metrics (RMSE, threshold and per-class confusion)
//! - Evaluator sweeps over max-limit years and time bins
//!
//! ## Architecture
//! A prediction runs in stages:
//! 1. `TemporalSimilarity` picks the top `k` neighbours inside a time window
//! 2. Filters drop or reweight neighbours (low correlation, significance)
//! 3. The predictor turns the survivors into a rating
//!
//! ## Example Usage
//! ```ignore
//! use prediction::{NeighbourPipeline, PredictionEngine};
//! use prediction::filters::*;
//!
//! let pipeline = NeighbourPipeline::new()
//!     .add_filter(SignificanceWeighting::static_default())
//!     .add_filter(MinCorrelationFilter::default());
//!
//! let engine = PredictionEngine::new(similarity).with_pipeline(pipeline);
//! let rating = engine.predict_movie(1, 1193, 20, Some(&before_2003), None)?;
//! ```

pub mod accuracy;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod filter_pipeline;
pub mod filters;
pub mod mean_centered;
pub mod traits;

// Re-export main types
pub use accuracy::{
    AccuracyReport, BinaryConfusion, BinaryMetrics, ConfusionMatrix, DEFAULT_THRESHOLD, rmse,
    threshold_round,
};
pub use engine::{MoviePrediction, PredictionEngine, prediction_pairs};
pub use error::{PredictionError, Result};
pub use evaluator::{
    BaselineComparison, BinResult, Evaluator, MaxLimitReport, TimeBinReport, UserRmse, YearResult,
};
pub use filter_pipeline::NeighbourPipeline;
pub use mean_centered::MeanCenteredPredictor;
pub use traits::{NeighbourFilter, PredictionContext, Predictor};
