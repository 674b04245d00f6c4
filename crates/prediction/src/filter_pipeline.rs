//! The NeighbourPipeline chains neighbour filters.

use crate::error::Result;
use crate::traits::{NeighbourFilter, PredictionContext};
use similarity::NeighbourSet;

/// Chains multiple neighbour filters together.
///
/// ## Usage
/// ```ignore
/// let pipeline = NeighbourPipeline::new()
///     .add_filter(RatedItemFilter)
///     .add_filter(MinCorrelationFilter::new(0.0))
///     .add_filter(SignificanceWeighting::Static { alpha: 50.0 });
///
/// let neighbours = pipeline.apply(neighbours, &context)?;
/// ```
pub struct NeighbourPipeline {
    filters: Vec<Box<dyn NeighbourFilter>>,
}

impl NeighbourPipeline {
    pub fn new() -> Self {
        Self {
            filters: Vec::new(),
        }
    }

    /// Add a filter to the end of the pipeline (builder pattern)
    pub fn add_filter(mut self, filter: impl NeighbourFilter + 'static) -> Self {
        self.filters.push(Box::new(filter));
        self
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Filter names in application order
    pub fn names(&self) -> Vec<&str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    /// Apply all filters in sequence
    pub fn apply(
        &self,
        neighbours: NeighbourSet,
        context: &PredictionContext<'_>,
    ) -> Result<NeighbourSet> {
        let mut current = neighbours;
        for filter in &self.filters {
            tracing::debug!(
                "Applying filter: {} (input count: {})",
                filter.name(),
                current.len()
            );
            current = filter.apply(current, context)?;
            tracing::debug!(
                "Filter applied: {} (output count: {})",
                filter.name(),
                current.len()
            );
        }
        Ok(current)
    }
}

impl Default for NeighbourPipeline {
    fn default() -> Self {
        Self::new()
    }
}
