//! Neighbour filter implementations.
//!
//! Each filter can be used on its own or composed into a `NeighbourPipeline`.

pub mod min_correlation;
pub mod rated_item;
pub mod significance_weighting;

pub use min_correlation::MinCorrelationFilter;
pub use rated_item::RatedItemFilter;
pub use significance_weighting::SignificanceWeighting;
