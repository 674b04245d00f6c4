//! Filter to drop weakly or negatively correlated neighbours.

use crate::error::Result;
use crate::traits::{NeighbourFilter, PredictionContext};
use similarity::NeighbourSet;

/// Keeps neighbours whose correlation is strictly above `minimum`
#[derive(Debug, Clone, Copy)]
pub struct MinCorrelationFilter {
    minimum: f64,
}

impl MinCorrelationFilter {
    pub fn new(minimum: f64) -> Self {
        Self { minimum }
    }
}

impl Default for MinCorrelationFilter {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl NeighbourFilter for MinCorrelationFilter {
    fn name(&self) -> &str {
        "MinCorrelationFilter"
    }

    fn apply(&self, mut neighbours: NeighbourSet, _context: &PredictionContext<'_>) -> Result<NeighbourSet> {
        neighbours.retain(|n| n.correlation > self.minimum);
        Ok(neighbours)
    }
}
