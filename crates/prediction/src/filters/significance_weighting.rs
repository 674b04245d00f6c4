//! Significance weighting of neighbour correlations.
//!
//! A correlation built from a handful of co-rated movies is less trustworthy
//! than one built from hundreds. Each neighbour's correlation is scaled by a
//! factor derived from `n`, the number of movies it shares with the query user:
//!
//! - **CommonCount**: `n`
//! - **Static**: `min(n, alpha) / alpha`
//! - **Dynamic**: as Static with `alpha = 2 * beta * mean(n)`, the mean taken
//!   over the neighbours who rated `context.movie_id`
//!
//! The set is re-sorted after reweighting.

use crate::error::{PredictionError, Result};
use crate::traits::{NeighbourFilter, PredictionContext};
use similarity::{Neighbour, NeighbourSet};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SignificanceWeighting {
    CommonCount,
    Static { alpha: f64 },
    Dynamic { beta: f64 },
}

impl SignificanceWeighting {
    pub const DEFAULT_ALPHA: f64 = 50.0;
    pub const DEFAULT_BETA: f64 = 0.75;

    pub fn static_default() -> Self {
        Self::Static {
            alpha: Self::DEFAULT_ALPHA,
        }
    }

    pub fn dynamic_default() -> Self {
        Self::Dynamic {
            beta: Self::DEFAULT_BETA,
        }
    }
}

fn damped(n: f64, alpha: f64) -> f64 {
    if n < alpha { n / alpha } else { 1.0 }
}

impl NeighbourFilter for SignificanceWeighting {
    fn name(&self) -> &str {
        match self {
            Self::CommonCount => "SignificanceWeighting(n_common)",
            Self::Static { .. } => "SignificanceWeighting(static)",
            Self::Dynamic { .. } => "SignificanceWeighting(dynamic)",
        }
    }

    fn apply(&self, neighbours: NeighbourSet, context: &PredictionContext<'_>) -> Result<NeighbourSet> {
        if neighbours.is_empty() {
            return Ok(neighbours);
        }

        let counted: Vec<(Neighbour, f64)> = neighbours
            .into_iter()
            .map(|n| {
                let common = context.data_index.common_movie_count(context.user_id, n.user_id);
                (n, common as f64)
            })
            .collect();

        let alpha = match *self {
            Self::CommonCount => None,
            Self::Static { alpha } => Some(alpha),
            Self::Dynamic { beta } => {
                let raters: Vec<f64> = counted
                    .iter()
                    .filter(|(n, _)| context.data_index.rating(n.user_id, context.movie_id).is_some())
                    .map(|(_, c)| *c)
                    .collect();
                if raters.is_empty() {
                    // nobody can contribute to the prediction
                    return Ok(counted.into_iter().map(|(n, _)| n).collect());
                }
                let mean = raters.iter().sum::<f64>() / raters.len() as f64;
                Some(2.0 * beta * mean)
            }
        };
        if let Some(alpha) = alpha {
            if !(alpha > 0.0) {
                return Err(PredictionError::InvalidParameter {
                    name: "alpha",
                    reason: format!("must be positive, got {alpha}"),
                });
            }
        }

        Ok(counted
            .into_iter()
            .map(|(n, common)| {
                let factor = alpha.map_or(common, |a| damped(common, a));
                Neighbour::new(n.user_id, n.correlation * factor)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_loader::{DataIndex, Rating, RatingScale};

    /// User 1 shares 4 movies with user 2 and 1 movie with user 3
    fn create_test_index() -> DataIndex {
        let mut ratings = Vec::new();
        for movie in 1..=4 {
            ratings.push((1, movie));
            ratings.push((2, movie));
        }
        ratings.push((3, 1));
        DataIndex::from_ratings(
            RatingScale::MOVIELENS,
            vec![],
            ratings
                .into_iter()
                .map(|(user_id, movie_id)| Rating {
                    user_id,
                    movie_id,
                    rating: 3.0,
                    timestamp: 0,
                })
                .collect(),
        )
    }

    fn neighbours() -> NeighbourSet {
        NeighbourSet::new(vec![Neighbour::new(2, 0.5), Neighbour::new(3, 0.8)])
    }

    #[test]
    fn test_common_count() {
        let index = create_test_index();
        let context = PredictionContext::new(&index, 1, 1);
        let weighted = SignificanceWeighting::CommonCount.apply(neighbours(), &context).unwrap();

        // 0.5 * 4 = 2.0 now outranks 0.8 * 1
        assert_eq!(weighted.user_ids(), vec![2, 3]);
        assert!((weighted.correlation_of(2).unwrap() - 2.0).abs() < 1e-12);
        assert!((weighted.correlation_of(3).unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_static() {
        let index = create_test_index();
        let context = PredictionContext::new(&index, 1, 1);
        let weighted = SignificanceWeighting::Static { alpha: 2.0 }
            .apply(neighbours(), &context)
            .unwrap();

        // n = 4 >= alpha keeps 0.5; n = 1 halves 0.8
        assert!((weighted.correlation_of(2).unwrap() - 0.5).abs() < 1e-12);
        assert!((weighted.correlation_of(3).unwrap() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_dynamic() {
        let index = create_test_index();
        let context = PredictionContext::new(&index, 1, 1);
        // mean n = 2.5, alpha = 2 * 0.8 * 2.5 = 4
        let weighted = SignificanceWeighting::Dynamic { beta: 0.8 }
            .apply(neighbours(), &context)
            .unwrap();

        assert!((weighted.correlation_of(2).unwrap() - 0.5).abs() < 1e-12);
        assert!((weighted.correlation_of(3).unwrap() - 0.2).abs() < 1e-12);
    }

    /// User 1 shares 4, 1 and 20 movies with users 2, 3 and 4; only users 2
    /// and 3 rated movie 100
    fn create_mixed_index() -> DataIndex {
        let mut pairs: Vec<(u32, u32)> = (1..=20).flat_map(|m| [(1, m), (4, m)]).collect();
        pairs.extend((1..=4).map(|m| (2, m)));
        pairs.extend([(3, 1), (2, 100), (3, 100)]);
        DataIndex::from_ratings(
            RatingScale::MOVIELENS,
            vec![],
            pairs
                .into_iter()
                .map(|(user_id, movie_id)| Rating {
                    user_id,
                    movie_id,
                    rating: 3.0,
                    timestamp: 0,
                })
                .collect(),
        )
    }

    #[test]
    fn test_dynamic_alpha_ignores_non_raters() {
        let index = create_mixed_index();
        let context = PredictionContext::new(&index, 1, 100);
        let set = NeighbourSet::new(vec![
            Neighbour::new(2, 0.5),
            Neighbour::new(3, 0.8),
            Neighbour::new(4, 0.3),
        ]);
        // mean n over raters = (4 + 1) / 2, alpha = 2 * 0.75 * 2.5 = 3.75;
        // counting user 4 would push alpha to 12.5
        let weighted = SignificanceWeighting::dynamic_default().apply(set, &context).unwrap();

        assert!((weighted.correlation_of(2).unwrap() - 0.5).abs() < 1e-12);
        assert!((weighted.correlation_of(3).unwrap() - 0.8 / 3.75).abs() < 1e-12);
        assert!((weighted.correlation_of(4).unwrap() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_dynamic_without_raters_leaves_set_unchanged() {
        let index = create_mixed_index();
        let context = PredictionContext::new(&index, 1, 999);
        let weighted = SignificanceWeighting::dynamic_default()
            .apply(neighbours(), &context)
            .unwrap();
        assert_eq!(weighted.correlation_of(2), Some(0.5));
        assert_eq!(weighted.correlation_of(3), Some(0.8));
    }

    #[test]
    fn test_rejects_non_positive_alpha() {
        let index = create_test_index();
        let context = PredictionContext::new(&index, 1, 1);
        let result = SignificanceWeighting::Static { alpha: 0.0 }.apply(neighbours(), &context);
        assert!(matches!(result, Err(PredictionError::InvalidParameter { .. })));
    }
}
