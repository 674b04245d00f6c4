//! # Data Loader Crate
//!
//! Loads and indexes a ratings dataset (MovieLens 1M `.dat` or MovieLens
//! latest `.csv`) into an in-memory ratings table.
//!
//! ## Main Components
//!
//! - **types**: Core domain types (Rating, Movie, RatingScale, DataIndex)
//! - **parser**: Parse `.dat` and `.csv` files into Rust structs
//! - **index**: Loading, user statistics, validation and time-window queries
//! - **error**: Error types for data loading
//!
//! ## Example Usage
//!
//! ```ignore
//! use data_loader::{DataIndex, DatasetFormat, RatingScale};
//! use std::path::Path;
//!
//! let index = DataIndex::load_from_files(
//!     Path::new("data/ml-latest-small"),
//!     DatasetFormat::Csv,
//!     RatingScale::MOVIELENS,
//! )?;
//!
//! let avg = index.user_avg(1);
//! let rated = index.rating(1, 31);
//! ```

pub mod error;
pub mod types;
pub mod parser;
pub mod index;

pub use error::{DataLoadError, Result};
pub use parser::DatasetFormat;
pub use types::{
    // Type aliases
    MovieId,
    UserId,
    // Core types
    DataIndex,
    Movie,
    Rating,
    RatingScale,
    UserStats,
};
