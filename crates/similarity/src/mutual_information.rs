//! Mutual information between two users' ratings.
//!
//! Ratings are bucketed by the level they occupy on the dataset's rating
//! scale. Each entropy term (natural log) gets the Miller-Madow correction
//! `(bins - 1) / (2 * n)`, where `bins` is the number of occupied buckets and
//! `n` the number of co-rated movies:
//!
//! ```text
//! I(a; b) = H*(a) + H*(b) - H*(a, b)
//! ```

use crate::constraint::{TimeConstraint, admits};
use crate::neighbours::{Neighbour, NeighbourSet};
use data_loader::{DataIndex, MovieId, RatingScale, UserId};
use rayon::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Mutual-information similarity over a shared ratings table
pub struct MutualInformation {
    data_index: Arc<DataIndex>,
}

impl MutualInformation {
    pub fn new(data_index: Arc<DataIndex>) -> Self {
        Self { data_index }
    }

    /// Mean rating per movie for one user inside the window
    fn column(&self, user_id: UserId, constraint: Option<&TimeConstraint>) -> HashMap<MovieId, f64> {
        let mut sums: HashMap<MovieId, (f64, u32)> = HashMap::new();
        for r in self.data_index.get_user_ratings(user_id) {
            if admits(constraint, r.timestamp) {
                let cell = sums.entry(r.movie_id).or_insert((0.0, 0));
                cell.0 += r.rating as f64;
                cell.1 += 1;
            }
        }
        sums.into_iter()
            .map(|(movie, (sum, count))| (movie, sum / count as f64))
            .collect()
    }

    /// Bias-corrected mutual information between two users.
    ///
    /// `None` when they share no rated movie inside the window.
    pub fn between(&self, a: UserId, b: UserId, constraint: Option<&TimeConstraint>) -> Option<f64> {
        let col_a = self.column(a, constraint);
        let col_b = self.column(b, constraint);
        let pairs: Vec<(f64, f64)> = col_a
            .iter()
            .filter_map(|(movie, &ra)| col_b.get(movie).map(|&rb| (ra, rb)))
            .collect();
        mutual_information(&pairs, &self.data_index.scale())
    }

    /// Users who rated `movie_id`, ranked by mutual information with `user_id`.
    ///
    /// Users sharing nothing with `user_id`, or carrying no information about
    /// them, are left out.
    #[instrument(skip(self, constraint))]
    pub fn neighbours_for_movie(
        &self,
        user_id: UserId,
        movie_id: MovieId,
        constraint: Option<&TimeConstraint>,
        k: usize,
    ) -> NeighbourSet {
        let mut raters: Vec<UserId> = self
            .data_index
            .get_movie_ratings(movie_id)
            .iter()
            .map(|r| r.user_id)
            .filter(|&other| other != user_id)
            .collect();
        raters.sort_unstable();
        raters.dedup();

        let neighbours: Vec<Neighbour> = raters
            .par_iter()
            .filter_map(|&other| {
                self.between(user_id, other, constraint)
                    .filter(|mi| *mi != 0.0)
                    .map(|mi| Neighbour::new(other, mi))
            })
            .collect();

        let mut set = NeighbourSet::new(neighbours);
        set.truncate(k);
        debug!(candidates = raters.len(), kept = set.len(), "Mutual information neighbours");
        set
    }
}

/// Entropy (nats) of a histogram and the number of non-empty bins
fn entropy(counts: impl Iterator<Item = usize>, n: usize) -> (f64, usize) {
    let mut h = 0.0;
    let mut bins = 0;
    for c in counts.filter(|&c| c > 0) {
        let p = c as f64 / n as f64;
        h -= p * p.ln();
        bins += 1;
    }
    (h, bins)
}

/// Bias-corrected mutual information of paired ratings on `scale`
pub fn mutual_information(pairs: &[(f64, f64)], scale: &RatingScale) -> Option<f64> {
    let n = pairs.len();
    if n == 0 {
        return None;
    }

    let levels = scale.len();
    let mut first = vec![0usize; levels];
    let mut second = vec![0usize; levels];
    let mut joint = vec![0usize; levels * levels];
    for &(x, y) in pairs {
        let i = scale.level_index(x);
        let j = scale.level_index(y);
        first[i] += 1;
        second[j] += 1;
        joint[i * levels + j] += 1;
    }

    let correction = |bins: usize| (bins as f64 - 1.0) / (2.0 * n as f64);
    let (h1, b1) = entropy(first.into_iter(), n);
    let (h2, b2) = entropy(second.into_iter(), n);
    let (h12, b12) = entropy(joint.into_iter(), n);

    Some(h1 + correction(b1) + h2 + correction(b2) - (h12 + correction(b12)))
}
