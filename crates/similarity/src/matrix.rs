//! User-user Pearson correlation matrix.
//!
//! ## Algorithm
//! 1. Keep only ratings admitted by the time constraint
//! 2. Pivot into one sorted (movie, rating) column per user; a user who rated
//!    the same movie twice inside the window contributes the mean of those ratings
//! 3. For every user pair, merge-join the columns on movie id and compute Pearson
//!    over the co-rated movies
//! 4. Pairs with fewer than `min_common` co-rated movies stay undefined
//!
//! Pairs are computed in parallel with Rayon; the result does not depend on
//! scheduling.

use crate::constraint::{TimeConstraint, admits};
use data_loader::{DataIndex, MovieId, UserId};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// A defined cell of the matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairCorrelation {
    /// Pearson coefficient in `[-1, 1]`
    pub coefficient: f64,
    /// Number of co-rated movies it was computed from
    pub common: usize,
}

/// Symmetric user × user correlation matrix.
///
/// Every user with at least one rating inside the window has a row, even if
/// none of its cells are defined. Undefined cells are simply absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CorrelationMatrix {
    rows: HashMap<UserId, HashMap<UserId, PairCorrelation>>,
}

impl CorrelationMatrix {
    /// Number of users with a row
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains_user(&self, user_id: UserId) -> bool {
        self.rows.contains_key(&user_id)
    }

    /// Users with a row, ascending
    pub fn user_ids(&self) -> Vec<UserId> {
        let mut ids: Vec<UserId> = self.rows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Defined cells of a user's row (self excluded), or `None` if the user has no row
    pub fn row(&self, user_id: UserId) -> Option<&HashMap<UserId, PairCorrelation>> {
        self.rows.get(&user_id)
    }

    /// Correlation between two users; `1.0` on the diagonal, `None` when undefined
    pub fn correlation(&self, a: UserId, b: UserId) -> Option<f64> {
        let row = self.rows.get(&a)?;
        if a == b {
            return Some(1.0);
        }
        row.get(&b).map(|p| p.coefficient)
    }

    /// Number of co-rated movies behind a defined cell
    pub fn common_count(&self, a: UserId, b: UserId) -> Option<usize> {
        self.rows.get(&a)?.get(&b).map(|p| p.common)
    }

    /// Number of defined off-diagonal pairs (each pair counted once)
    pub fn defined_pairs(&self) -> usize {
        self.rows.values().map(|r| r.len()).sum::<usize>() / 2
    }
}

/// Pearson correlation over paired observations.
///
/// Returns `None` with fewer than `max(min_common, 1)` pairs. A constant side
/// has no linear relationship with anything and yields `0.0`.
pub fn pearson(pairs: &[(f64, f64)], min_common: usize) -> Option<f64> {
    let n = pairs.len();
    if n == 0 || n < min_common {
        return None;
    }
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n as f64;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n as f64;

    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for &(x, y) in pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }

    if sxx == 0.0 || syy == 0.0 {
        return Some(0.0);
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// One user's ratings inside the window, sorted by movie id
type Column = Vec<(MovieId, f64)>;

/// Pivot the admitted ratings into per-user columns
fn pivot(data_index: &DataIndex, constraint: Option<&TimeConstraint>) -> Vec<(UserId, Column)> {
    let mut sums: HashMap<UserId, HashMap<MovieId, (f64, u32)>> = HashMap::new();
    for rating in data_index.ratings() {
        if !admits(constraint, rating.timestamp) {
            continue;
        }
        let cell = sums
            .entry(rating.user_id)
            .or_default()
            .entry(rating.movie_id)
            .or_insert((0.0, 0));
        cell.0 += rating.rating as f64;
        cell.1 += 1;
    }

    let mut columns: Vec<(UserId, Column)> = sums
        .into_iter()
        .map(|(user_id, movies)| {
            let mut column: Column = movies
                .into_iter()
                .map(|(movie_id, (sum, count))| (movie_id, sum / count as f64))
                .collect();
            column.sort_unstable_by_key(|c| c.0);
            (user_id, column)
        })
        .collect();
    columns.sort_unstable_by_key(|c| c.0);
    columns
}

/// Co-rated (rating_a, rating_b) pairs of two sorted columns
fn co_rated(a: &Column, b: &Column) -> Vec<(f64, f64)> {
    let mut pairs = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                pairs.push((a[i].1, b[j].1));
                i += 1;
                j += 1;
            }
        }
    }
    pairs
}

/// Compute the user-user Pearson matrix restricted to `constraint`.
#[instrument(skip(data_index))]
pub fn compute_user_correlations(
    data_index: &DataIndex,
    constraint: Option<&TimeConstraint>,
    min_common: usize,
) -> CorrelationMatrix {
    let columns = pivot(data_index, constraint);
    let n = columns.len();

    let columns_ref = &columns;
    let pairs: Vec<(UserId, UserId, PairCorrelation)> = (0..n)
        .into_par_iter()
        .flat_map_iter(move |i| {
            ((i + 1)..n).filter_map(move |j| {
                let (user_a, col_a) = &columns_ref[i];
                let (user_b, col_b) = &columns_ref[j];
                let common = co_rated(col_a, col_b);
                pearson(&common, min_common).map(|coefficient| {
                    (
                        *user_a,
                        *user_b,
                        PairCorrelation {
                            coefficient,
                            common: common.len(),
                        },
                    )
                })
            })
        })
        .collect();

    let mut rows: HashMap<UserId, HashMap<UserId, PairCorrelation>> = columns
        .iter()
        .map(|(user_id, _)| (*user_id, HashMap::new()))
        .collect();
    for (a, b, cell) in pairs {
        rows.entry(a).or_default().insert(b, cell);
        rows.entry(b).or_default().insert(a, cell);
    }

    let matrix = CorrelationMatrix { rows };
    debug!(
        users = matrix.len(),
        defined_pairs = matrix.defined_pairs(),
        "Computed correlation matrix"
    );
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use data_loader::{Rating, RatingScale};

    fn rating(user_id: UserId, movie_id: MovieId, rating: f32, timestamp: i64) -> Rating {
        Rating {
            user_id,
            movie_id,
            rating,
            timestamp,
        }
    }

    /// u1 = (4, 2), u2 = (5, 1), u3 = (3, 3) over movies 1 and 2
    fn create_test_index() -> DataIndex {
        DataIndex::from_ratings(
            RatingScale::MOVIELENS,
            vec![],
            vec![
                rating(1, 1, 4.0, 0),
                rating(1, 2, 2.0, 0),
                rating(2, 1, 5.0, 0),
                rating(2, 2, 1.0, 0),
                rating(3, 1, 3.0, 0),
                rating(3, 2, 3.0, 0),
            ],
        )
    }

    #[test]
    fn test_pearson_known_values() {
        let perfect = [(1.0, 2.0), (2.0, 4.0), (3.0, 6.0)];
        assert!((pearson(&perfect, 1).unwrap() - 1.0).abs() < 1e-12);

        let inverse = [(1.0, 3.0), (2.0, 2.0), (3.0, 1.0)];
        assert!((pearson(&inverse, 1).unwrap() + 1.0).abs() < 1e-12);

        // x = 1,2,3 ; y = 1,3,2 -> sxy = 1, sxx = syy = 2 -> r = 0.5
        let partial = [(1.0, 1.0), (2.0, 3.0), (3.0, 2.0)];
        assert!((pearson(&partial, 1).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_pearson_thresholds() {
        let pairs = [(1.0, 2.0), (2.0, 4.0)];
        assert_eq!(pearson(&pairs, 3), None);
        assert_eq!(pearson(&[], 0), None);
        assert_eq!(pearson(&[(3.0, 1.0), (3.0, 5.0)], 1), Some(0.0));
    }

    #[test]
    fn test_scenario_matrix() {
        let index = create_test_index();
        let matrix = compute_user_correlations(&index, None, 1);

        assert_eq!(matrix.len(), 3);
        assert!((matrix.correlation(1, 2).unwrap() - 1.0).abs() < 1e-9);
        assert_eq!(matrix.correlation(1, 3), Some(0.0));
        assert_eq!(matrix.correlation(2, 1), matrix.correlation(1, 2));
        assert_eq!(matrix.correlation(1, 1), Some(1.0));
        assert_eq!(matrix.common_count(1, 2), Some(2));
        assert_eq!(matrix.defined_pairs(), 3);
    }

    #[test]
    fn test_min_common_leaves_cells_undefined() {
        let index = create_test_index();
        let matrix = compute_user_correlations(&index, None, 3);

        // Every user keeps a row, but no pair has 3 co-rated movies
        assert_eq!(matrix.user_ids(), vec![1, 2, 3]);
        assert_eq!(matrix.correlation(1, 2), None);
        assert!(matrix.row(1).unwrap().is_empty());
        assert_eq!(matrix.defined_pairs(), 0);
    }

    #[test]
    fn test_constraint_filters_users() {
        let cutoff = Utc.with_ymd_and_hms(2010, 1, 1, 0, 0, 0).unwrap().timestamp();
        let index = DataIndex::from_ratings(
            RatingScale::MOVIELENS,
            vec![],
            vec![
                rating(1, 1, 4.0, cutoff - 10),
                rating(1, 2, 2.0, cutoff - 10),
                rating(2, 1, 5.0, cutoff - 10),
                rating(2, 2, 1.0, cutoff - 10),
                rating(3, 1, 3.0, cutoff),
                rating(3, 2, 1.0, cutoff + 10),
            ],
        );
        let constraint = TimeConstraint::max_limit_year(2010).unwrap();
        let matrix = compute_user_correlations(&index, Some(&constraint), 1);

        assert!(!matrix.contains_user(3));
        assert!(matrix.correlation(1, 2).is_some());
    }

    #[test]
    fn test_duplicate_ratings_are_averaged() {
        let index = DataIndex::from_ratings(
            RatingScale::MOVIELENS,
            vec![],
            vec![
                rating(1, 1, 5.0, 0),
                rating(1, 1, 3.0, 1),
                rating(1, 2, 1.0, 0),
                rating(2, 1, 4.0, 0),
                rating(2, 2, 2.0, 0),
            ],
        );
        let columns = pivot(&index, None);
        assert_eq!(columns[0].1, vec![(1, 4.0), (2, 1.0)]);
    }
}
