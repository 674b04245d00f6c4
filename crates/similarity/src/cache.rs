//! Cache of user-user correlation matrices.
//!
//! Two tables live side by side:
//!
//! - a keyed LRU map from `(min_common, constraint)` to a matrix, filled lazily
//!   on miss by [`crate::TemporalSimilarity`]
//! - a bulk table filled up front by a year sweep (keyed by end year) or a
//!   time-bin sweep (keyed by bin size and start year)
//!
//! Both only ever answer on an exact match: a matrix computed for one window is
//! never reused for an overlapping one.

use crate::constraint::{TimeConstraint, jan_first};
use crate::error::{Result, SimilarityError};
use crate::matrix::CorrelationMatrix;
use lru::LruCache;
use serde::Serialize;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of keyed matrices kept before the least recently used is evicted
pub const DEFAULT_CAPACITY: usize = 8;

/// Key of the keyed table. An absent constraint is a valid key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub min_common: usize,
    pub constraint: Option<TimeConstraint>,
}

impl CacheKey {
    pub fn new(min_common: usize, constraint: Option<&TimeConstraint>) -> Self {
        Self {
            min_common,
            constraint: constraint.copied(),
        }
    }
}

/// Key of the bulk table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BulkKey {
    /// MaxLimit sweep, keyed by the year of the upper bound
    Year(i32),
    /// TimeBin sweep, keyed by bin length in years and the year the bin starts
    Bin { size: u32, start_year: i32 },
}

#[derive(Debug, Clone)]
struct BulkEntry {
    constraint: TimeConstraint,
    matrix: Arc<CorrelationMatrix>,
}

#[derive(Debug, Clone)]
struct BulkTable {
    min_common: usize,
    entries: HashMap<BulkKey, BulkEntry>,
}

/// Hit/miss counters.
///
/// `misses` counts [`CorrelationCache::get`] calls that neither table could serve.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub bulk_hits: u64,
    pub misses: u64,
}

/// Correlation matrix cache.
///
/// Not thread-safe on its own; share it as a [`crate::SharedCorrelationCache`].
#[derive(Debug)]
pub struct CorrelationCache {
    keyed: LruCache<CacheKey, Arc<CorrelationMatrix>>,
    bulk: Option<BulkTable>,
    bulk_enabled: bool,
    stats: CacheStats,
}

impl CorrelationCache {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Cache holding up to `capacity` keyed matrices (at least one).
    ///
    /// A capacity of 1 behaves like a single slot: the last stored query wins.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            keyed: LruCache::new(capacity),
            bulk: None,
            bulk_enabled: true,
            stats: CacheStats::default(),
        }
    }

    /// Allow or forbid bulk population
    pub fn with_bulk_enabled(mut self, enabled: bool) -> Self {
        self.bulk_enabled = enabled;
        self
    }

    pub fn bulk_enabled(&self) -> bool {
        self.bulk_enabled
    }

    pub fn capacity(&self) -> usize {
        self.keyed.cap().get()
    }

    /// Exact-key lookup in the keyed table
    pub fn lookup(
        &mut self,
        min_common: usize,
        constraint: Option<&TimeConstraint>,
    ) -> Option<Arc<CorrelationMatrix>> {
        let key = CacheKey::new(min_common, constraint);
        let matrix = self.keyed.get(&key).map(Arc::clone)?;
        self.stats.hits += 1;
        Some(matrix)
    }

    /// Keyed lookup falling back to the bulk table
    pub fn get(
        &mut self,
        min_common: usize,
        constraint: Option<&TimeConstraint>,
        bin_size: Option<u32>,
    ) -> Option<Arc<CorrelationMatrix>> {
        if let Some(matrix) = self.lookup(min_common, constraint) {
            return Some(matrix);
        }
        if let Some(matrix) = self.lookup_bulk(min_common, constraint, bin_size) {
            debug!("Correlation matrix served from bulk cache");
            return Some(matrix);
        }
        self.stats.misses += 1;
        None
    }

    /// Lookup in the bulk table.
    ///
    /// Misses when there is no bulk table, `min_common` differs from the one the
    /// table was built with, the constraint is absent, or a time bin is looked
    /// up without its `bin_size`. A hit also requires the stored constraint to
    /// equal the requested one exactly.
    pub fn lookup_bulk(
        &mut self,
        min_common: usize,
        constraint: Option<&TimeConstraint>,
        bin_size: Option<u32>,
    ) -> Option<Arc<CorrelationMatrix>> {
        let table = self.bulk.as_ref()?;
        let constraint = constraint?;
        if table.min_common != min_common {
            return None;
        }

        let key = if constraint.is_max_limit() {
            BulkKey::Year(constraint.end_year())
        } else {
            BulkKey::Bin {
                size: bin_size?,
                start_year: constraint.start_year()?,
            }
        };

        let entry = table.entries.get(&key)?;
        if entry.constraint != *constraint {
            return None;
        }
        self.stats.bulk_hits += 1;
        Some(Arc::clone(&entry.matrix))
    }

    /// Insert into the keyed table, overwriting the same key
    pub fn store(
        &mut self,
        min_common: usize,
        constraint: Option<&TimeConstraint>,
        matrix: Arc<CorrelationMatrix>,
    ) {
        let key = CacheKey::new(min_common, constraint);
        if let Some((evicted, _)) = self.keyed.push(key, matrix) {
            if evicted != key {
                debug!(?evicted, "Evicted correlation matrix");
            }
        }
    }

    /// Fill the bulk table with one MaxLimit matrix per year in `[min_year, max_year)`.
    ///
    /// `constraint` only selects the sweep shape and must be a MaxLimit. Each
    /// year gets a freshly built constraint ending on Jan 1 of that year.
    /// Returns the number of matrices stored.
    pub fn populate_bulk_for_max_limit<F>(
        &mut self,
        constraint: &TimeConstraint,
        min_year: i32,
        max_year: i32,
        min_common: usize,
        mut compute: F,
    ) -> Result<usize>
    where
        F: FnMut(&TimeConstraint) -> CorrelationMatrix,
    {
        self.ensure_bulk_allowed()?;
        if !constraint.is_max_limit() {
            return Err(SimilarityError::BulkCacheMisuse(format!(
                "max limit sweep requested with a time bin constraint {constraint}"
            )));
        }
        self.bulk = None;

        let mut entries = HashMap::new();
        for year in min_year..max_year {
            let window = TimeConstraint::max_limit(jan_first(year)?);
            let matrix = Arc::new(compute(&window));
            entries.insert(
                BulkKey::Year(year),
                BulkEntry {
                    constraint: window,
                    matrix,
                },
            );
        }

        let stored = entries.len();
        self.bulk = Some(BulkTable {
            min_common,
            entries,
        });
        info!(min_year, max_year, stored, "Populated max limit bulk cache");
        Ok(stored)
    }

    /// Fill the bulk table with one matrix per time bin.
    ///
    /// For every `bin_size` in `[min_bin, max_bin)` and every `shift` in
    /// `[0, bin_size)`, bins start at `min_year + shift` and advance by
    /// `bin_size` while `start + bin_size < max_year`. `constraint` must be a
    /// time bin. Returns the number of matrices stored.
    #[allow(clippy::too_many_arguments)]
    pub fn populate_bulk_for_time_bins<F>(
        &mut self,
        constraint: &TimeConstraint,
        min_year: i32,
        max_year: i32,
        min_bin: u32,
        max_bin: u32,
        min_common: usize,
        mut compute: F,
    ) -> Result<usize>
    where
        F: FnMut(&TimeConstraint) -> CorrelationMatrix,
    {
        self.ensure_bulk_allowed()?;
        if !constraint.is_time_bin() {
            return Err(SimilarityError::BulkCacheMisuse(format!(
                "time bin sweep requested with a max limit constraint {constraint}"
            )));
        }
        self.bulk = None;

        let mut entries = HashMap::new();
        for size in min_bin..max_bin {
            let span = size as i32;
            for shift in 0..span {
                let mut start = min_year + shift;
                while start + span < max_year {
                    let window = TimeConstraint::time_bin_years(start, start + span)?;
                    let matrix = Arc::new(compute(&window));
                    entries.insert(
                        BulkKey::Bin {
                            size,
                            start_year: start,
                        },
                        BulkEntry {
                            constraint: window,
                            matrix,
                        },
                    );
                    start += span;
                }
            }
        }

        let stored = entries.len();
        self.bulk = Some(BulkTable {
            min_common,
            entries,
        });
        info!(min_year, max_year, min_bin, max_bin, stored, "Populated time bin bulk cache");
        Ok(stored)
    }

    fn ensure_bulk_allowed(&self) -> Result<()> {
        if self.bulk_enabled {
            Ok(())
        } else {
            Err(SimilarityError::BulkCacheMisuse(
                "bulk caching is disabled".to_string(),
            ))
        }
    }

    /// Drop both tables and reset counters
    pub fn clear(&mut self) {
        self.keyed.clear();
        self.bulk = None;
        self.stats = CacheStats::default();
    }

    /// Number of keyed matrices
    pub fn len(&self) -> usize {
        self.keyed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keyed.is_empty()
    }

    /// Number of bulk matrices
    pub fn bulk_len(&self) -> usize {
        self.bulk.as_ref().map_or(0, |t| t.entries.len())
    }

    /// Bulk keys, sorted
    pub fn bulk_keys(&self) -> Vec<BulkKey> {
        let mut keys: Vec<BulkKey> = self
            .bulk
            .as_ref()
            .map(|t| t.entries.keys().copied().collect())
            .unwrap_or_default();
        keys.sort_unstable();
        keys
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}

impl Default for CorrelationCache {
    fn default() -> Self {
        Self::new()
    }
}
