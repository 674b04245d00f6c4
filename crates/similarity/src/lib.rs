//! # Similarity Crate
//!
//! Time-aware user-user similarity for collaborative filtering.
//!
//! ## Main Components
//!
//! - **constraint**: `TimeConstraint`, the window of ratings a computation may see
//! - **matrix**: Pearson correlation matrix over co-rated movies
//! - **cache**: Keyed LRU and bulk tables of computed matrices
//! - **temporal**: `TemporalSimilarity`, cache-aware matrix and neighbour lookups
//! - **neighbours**: Ordered neighbour sets
//! - **mutual_information**: Bias-corrected mutual information between users
//!
//! ## Example Usage
//!
//! ```ignore
//! use similarity::{CorrelationCache, TemporalSimilarity, TimeConstraint, shared_cache};
//! use std::sync::Arc;
//!
//! let cache = shared_cache(CorrelationCache::with_capacity(4));
//! let similarity = TemporalSimilarity::new(Arc::clone(&index), cache);
//!
//! let before_2010 = TimeConstraint::max_limit_year(2010)?;
//! let neighbours = similarity.neighbours(1, Some(&before_2010), 5, 20, None)?;
//! ```

pub mod cache;
pub mod constraint;
pub mod error;
pub mod matrix;
pub mod mutual_information;
pub mod neighbours;
pub mod temporal;

pub use cache::{BulkKey, CacheKey, CacheStats, CorrelationCache};
pub use constraint::{ConstraintKind, TimeConstraint};
pub use error::{Result, SimilarityError};
pub use matrix::{CorrelationMatrix, PairCorrelation, compute_user_correlations, pearson};
pub use mutual_information::MutualInformation;
pub use neighbours::{Neighbour, NeighbourSet};
pub use temporal::{DEFAULT_MIN_COMMON, SharedCorrelationCache, TemporalSimilarity, shared_cache};
