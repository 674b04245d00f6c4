//! Ordered neighbour sets extracted from a correlation matrix.

use crate::error::{Result, SimilarityError};
use crate::matrix::CorrelationMatrix;
use data_loader::UserId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A similar user and how strongly they correlate with the query user
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbour {
    pub user_id: UserId,
    pub correlation: f64,
}

impl Neighbour {
    pub fn new(user_id: UserId, correlation: f64) -> Self {
        Self {
            user_id,
            correlation,
        }
    }
}

/// Neighbours sorted by correlation descending, ties by ascending user id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighbourSet {
    neighbours: Vec<Neighbour>,
}

fn by_correlation_desc(a: &Neighbour, b: &Neighbour) -> Ordering {
    b.correlation
        .total_cmp(&a.correlation)
        .then(a.user_id.cmp(&b.user_id))
}

impl NeighbourSet {
    /// Build a set from arbitrary neighbours, restoring the ordering invariant
    pub fn new(mut neighbours: Vec<Neighbour>) -> Self {
        neighbours.sort_by(by_correlation_desc);
        Self { neighbours }
    }

    /// Top `k` neighbours of `user_id` in `matrix`.
    ///
    /// Undefined cells are skipped and the user itself is never included.
    /// Fails with `UserNotFound` when the user has no row.
    pub fn from_matrix(matrix: &CorrelationMatrix, user_id: UserId, k: usize) -> Result<Self> {
        let row = matrix
            .row(user_id)
            .ok_or(SimilarityError::UserNotFound { user_id })?;

        let neighbours: Vec<Neighbour> = row
            .iter()
            .filter(|(other, _)| **other != user_id)
            .map(|(&other, cell)| Neighbour::new(other, cell.coefficient))
            .collect();

        let mut set = Self::new(neighbours);
        set.truncate(k);
        Ok(set)
    }

    /// Keep only the first `k` neighbours
    pub fn truncate(&mut self, k: usize) {
        self.neighbours.truncate(k);
    }

    /// Keep neighbours matching `predicate`, preserving order
    pub fn retain(&mut self, predicate: impl FnMut(&Neighbour) -> bool) {
        self.neighbours.retain(predicate);
    }

    pub fn len(&self) -> usize {
        self.neighbours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbours.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Neighbour> {
        self.neighbours.iter()
    }

    pub fn as_slice(&self) -> &[Neighbour] {
        &self.neighbours
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.neighbours.iter().any(|n| n.user_id == user_id)
    }

    /// Correlation of a neighbour in this set
    pub fn correlation_of(&self, user_id: UserId) -> Option<f64> {
        self.neighbours
            .iter()
            .find(|n| n.user_id == user_id)
            .map(|n| n.correlation)
    }

    pub fn user_ids(&self) -> Vec<UserId> {
        self.neighbours.iter().map(|n| n.user_id).collect()
    }
}

impl<'a> IntoIterator for &'a NeighbourSet {
    type Item = &'a Neighbour;
    type IntoIter = std::slice::Iter<'a, Neighbour>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbours.iter()
    }
}

impl IntoIterator for NeighbourSet {
    type Item = Neighbour;
    type IntoIter = std::vec::IntoIter<Neighbour>;

    fn into_iter(self) -> Self::IntoIter {
        self.neighbours.into_iter()
    }
}

impl FromIterator<Neighbour> for NeighbourSet {
    fn from_iter<T: IntoIterator<Item = Neighbour>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
