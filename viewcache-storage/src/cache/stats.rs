//! Cache usage statistics.

use std::cell::Cell;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that returned a record (direct, alias, or superset fallback).
    pub hits: u64,
    /// Reads that returned nothing.
    pub misses: u64,
    /// Hits served by cloning the most recent superset entry.
    pub fallback_hits: u64,
    /// Aliases turned into real records by a read.
    pub materializations: u64,
    /// Listener invocations that returned an error.
    pub listener_failures: u64,
    /// Number of field-set entries currently held.
    pub entry_count: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fold another cache's numbers into these.
    pub fn merge(&mut self, other: &CacheStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.fallback_hits += other.fallback_hits;
        self.materializations += other.materializations;
        self.listener_failures += other.listener_failures;
        self.entry_count += other.entry_count;
    }
}

/// Live counters owned by one record cache.
///
/// Shared with in-flight notification batches so listener failures can be
/// counted after the cache borrow is released.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    enabled: bool,
    pub(crate) hits: Cell<u64>,
    pub(crate) misses: Cell<u64>,
    pub(crate) fallback_hits: Cell<u64>,
    pub(crate) materializations: Cell<u64>,
    pub(crate) listener_failures: Cell<u64>,
}

impl Counters {
    pub(crate) fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub(crate) fn bump(&self, counter: &Cell<u64>) {
        if self.enabled {
            counter.set(counter.get() + 1);
        }
    }

    pub(crate) fn snapshot(&self, entry_count: usize) -> CacheStats {
        CacheStats {
            hits: self.hits.get(),
            misses: self.misses.get(),
            fallback_hits: self.fallback_hits.get(),
            materializations: self.materializations.get(),
            listener_failures: self.listener_failures.get(),
            entry_count: entry_count as u64,
        }
    }
}
