//! Filter to keep only neighbours who rated the target movie.

use crate::error::Result;
use crate::traits::{NeighbourFilter, PredictionContext};
use similarity::NeighbourSet;

/// Removes neighbours with no rating for `context.movie_id`
#[derive(Debug, Clone, Copy, Default)]
pub struct RatedItemFilter;

impl NeighbourFilter for RatedItemFilter {
    fn name(&self) -> &str {
        "RatedItemFilter"
    }

    fn apply(&self, mut neighbours: NeighbourSet, context: &PredictionContext<'_>) -> Result<NeighbourSet> {
        neighbours.retain(|n| context.data_index.rating(n.user_id, context.movie_id).is_some());
        Ok(neighbours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{DataIndex, Rating};
    use similarity::Neighbour;

    #[test]
    fn test_keeps_raters_only() {
        let mut index = DataIndex::new();
        index.insert_rating(Rating {
            user_id: 3,
            movie_id: 7,
            rating: 4.0,
            timestamp: 0,
        });
        let context = PredictionContext::new(&index, 1, 7);
        let neighbours = NeighbourSet::new(vec![Neighbour::new(2, 0.9), Neighbour::new(3, 0.4)]);

        let kept = RatedItemFilter.apply(neighbours, &context).unwrap();
        assert_eq!(kept.user_ids(), vec![3]);
    }
}
