//! Error types for the prediction crate.

use similarity::SimilarityError;
use thiserror::Error;

/// Errors raised while filtering neighbours or running evaluations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    /// Neighbour lookup, constraint building or bulk caching failed
    #[error(transparent)]
    Similarity(#[from] SimilarityError),

    /// The ratings table has nothing to evaluate
    #[error("Ratings table is empty")]
    EmptyDataset,

    /// A sweep or filter was configured with an unusable value
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, PredictionError>;
