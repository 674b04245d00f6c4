//! Time-aware user similarity with a shared correlation cache.

use crate::cache::CorrelationCache;
use crate::constraint::TimeConstraint;
use crate::error::Result;
use crate::matrix::{CorrelationMatrix, compute_user_correlations};
use crate::neighbours::NeighbourSet;
use data_loader::{DataIndex, UserId};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, instrument};

/// Cache handle shared between similarity instances
pub type SharedCorrelationCache = Arc<Mutex<CorrelationCache>>;

/// Default minimum number of co-rated movies for a correlation to be defined
pub const DEFAULT_MIN_COMMON: usize = 5;

/// Wrap a cache so it can be handed to several [`TemporalSimilarity`] instances
pub fn shared_cache(cache: CorrelationCache) -> SharedCorrelationCache {
    Arc::new(Mutex::new(cache))
}

/// Pearson user similarity restricted to a time window.
///
/// ## Lookup order
/// 1. Keyed cache, exact `(min_common, constraint)` match
/// 2. Bulk table, filled by one of the `populate_bulk_*` sweeps
/// 3. Compute from the `DataIndex` and store into the keyed cache
///
/// The cache lock is never held while a matrix is being computed.
pub struct TemporalSimilarity {
    data_index: Arc<DataIndex>,
    cache: SharedCorrelationCache,
    min_common: usize,
    computations: AtomicUsize,
}

impl TemporalSimilarity {
    pub fn new(data_index: Arc<DataIndex>, cache: SharedCorrelationCache) -> Self {
        Self {
            data_index,
            cache,
            min_common: DEFAULT_MIN_COMMON,
            computations: AtomicUsize::new(0),
        }
    }

    /// Set the default `min_common` used by [`Self::default_neighbours`]
    pub fn with_min_common(mut self, min_common: usize) -> Self {
        self.min_common = min_common;
        self
    }

    pub fn min_common(&self) -> usize {
        self.min_common
    }

    pub fn data_index(&self) -> &Arc<DataIndex> {
        &self.data_index
    }

    pub fn cache(&self) -> &SharedCorrelationCache {
        &self.cache
    }

    /// Number of matrices this instance has computed (cache hits excluded)
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::Relaxed)
    }

    fn compute(&self, constraint: Option<&TimeConstraint>, min_common: usize) -> CorrelationMatrix {
        self.computations.fetch_add(1, Ordering::Relaxed);
        compute_user_correlations(&self.data_index, constraint, min_common)
    }

    /// Correlation matrix for a window, from cache when possible
    pub fn correlation_matrix(
        &self,
        constraint: Option<&TimeConstraint>,
        min_common: usize,
        bin_size: Option<u32>,
    ) -> Arc<CorrelationMatrix> {
        if let Some(matrix) = self.cache.lock().get(min_common, constraint, bin_size) {
            return matrix;
        }

        let matrix = Arc::new(self.compute(constraint, min_common));
        self.cache
            .lock()
            .store(min_common, constraint, Arc::clone(&matrix));
        matrix
    }

    /// Top `k` neighbours of `user_id` under `constraint`.
    ///
    /// Fails with `UserNotFound` when the user has no rating inside the window.
    #[instrument(skip(self, constraint), fields(window = ?constraint.map(|c| c.to_string())))]
    pub fn neighbours(
        &self,
        user_id: UserId,
        constraint: Option<&TimeConstraint>,
        min_common: usize,
        k: usize,
        bin_size: Option<u32>,
    ) -> Result<NeighbourSet> {
        let matrix = self.correlation_matrix(constraint, min_common, bin_size);
        let set = NeighbourSet::from_matrix(&matrix, user_id, k)?;
        debug!(found = set.len(), "Selected neighbours");
        Ok(set)
    }

    /// [`Self::neighbours`] with the configured `min_common` and no bin size
    pub fn default_neighbours(
        &self,
        user_id: UserId,
        constraint: Option<&TimeConstraint>,
        k: usize,
    ) -> Result<NeighbourSet> {
        self.neighbours(user_id, constraint, self.min_common, k, None)
    }

    /// Number of movies both users rated inside the window
    pub fn common_count(
        &self,
        a: UserId,
        b: UserId,
        constraint: Option<&TimeConstraint>,
        min_common: usize,
        bin_size: Option<u32>,
    ) -> Option<usize> {
        self.correlation_matrix(constraint, min_common, bin_size)
            .common_count(a, b)
    }

    /// Pre-compute one MaxLimit matrix per year in `[min_year, max_year)`
    #[instrument(skip(self, constraint))]
    pub fn populate_bulk_for_max_limit(
        &self,
        constraint: &TimeConstraint,
        min_year: i32,
        max_year: i32,
        min_common: usize,
    ) -> Result<usize> {
        // The lock is held for the whole sweep so no other instance observes a half-built table
        let mut cache = self.cache.lock();
        cache.populate_bulk_for_max_limit(constraint, min_year, max_year, min_common, |window| {
            self.compute(Some(window), min_common)
        })
    }

    /// Pre-compute one matrix per time bin, see [`CorrelationCache::populate_bulk_for_time_bins`]
    #[instrument(skip(self, constraint))]
    pub fn populate_bulk_for_time_bins(
        &self,
        constraint: &TimeConstraint,
        min_year: i32,
        max_year: i32,
        min_bin: u32,
        max_bin: u32,
        min_common: usize,
    ) -> Result<usize> {
        let mut cache = self.cache.lock();
        cache.populate_bulk_for_time_bins(
            constraint,
            min_year,
            max_year,
            min_bin,
            max_bin,
            min_common,
            |window| self.compute(Some(window), min_common),
        )
    }
}
