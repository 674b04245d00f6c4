//! Error types for the similarity crate.

use chrono::{DateTime, Utc};
use data_loader::UserId;
use thiserror::Error;

/// Errors raised while building constraints, caching or selecting neighbours
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimilarityError {
    /// Start/end pairing is neither a max limit nor a time bin
    #[error("Invalid time constraint: start {start:?}, end {end:?}")]
    InvalidTimeConstraint {
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    },

    /// Year can't be turned into a UTC datetime
    #[error("Year {0} is out of range")]
    InvalidYear(i32),

    /// User has no row in the correlation matrix (no ratings inside the window)
    #[error("User {user_id} not found in correlation matrix")]
    UserNotFound { user_id: UserId },

    /// Bulk population requested with the wrong constraint shape, or while disabled
    #[error("Bulk cache misuse: {0}")]
    BulkCacheMisuse(String),
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, SimilarityError>;
