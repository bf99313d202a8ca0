//! Per-model cache: one [`RecordCache`] per primary key.
//!
//! Every method takes `&self`. Writes borrow the map only long enough to
//! stage the change, then deliver notifications, so a listener may call back
//! into the same cache.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::debug;
use viewcache_core::{
    CacheConfig, CoreError, FieldSet, ListenerResult, PkCacheKey, PrimaryKey, Record,
};

use super::listeners::Subscription;
use super::record_cache::RecordCache;
use super::stats::CacheStats;
use crate::CacheResult;

/// Identity-stable cache of partially loaded records of one model.
pub struct ViewModelCache<R> {
    caches: RefCell<HashMap<PkCacheKey, RecordCache<R>>>,
    config: CacheConfig,
}

impl<R: Record + 'static> ViewModelCache<R> {
    /// Create a cache with the default configuration.
    pub fn new() -> Self {
        Self::build(CacheConfig::default())
    }

    /// Create a cache with a validated configuration.
    pub fn with_config(config: CacheConfig) -> CacheResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: CacheConfig) -> Self {
        Self {
            caches: RefCell::new(HashMap::with_capacity(config.initial_capacity)),
            config,
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Cache `record` under its primary key.
    ///
    /// Fails with `InvalidRecord` when no field or no primary key is
    /// assigned and with `MissingPrimaryKey` when a compound key is only
    /// partly assigned. Listener
    /// failures surface only under `ListenerFailurePolicy::FailFast`, after
    /// the record is stored.
    pub fn add(&self, record: impl Into<Rc<R>>) -> CacheResult<()> {
        let record = record.into();
        if record.assigned_fields().is_empty() {
            return Err(CoreError::InvalidRecord {
                reason: "record has no assigned fields; cannot be cached".to_string(),
            }
            .into());
        }
        let key = record.primary_key()?.cache_key()?;

        let dispatch = {
            let mut caches = self.caches.borrow_mut();
            self.record_cache(&mut caches, key).stage_add(record)?
        };
        dispatch.run()
    }

    /// Record with exactly `fields` for `pk`, or `None` when the cache
    /// cannot produce one.
    pub fn get(&self, pk: &PrimaryKey, fields: &FieldSet) -> CacheResult<Option<Rc<R>>> {
        let key = pk.cache_key()?;
        let mut caches = self.caches.borrow_mut();
        Ok(caches.get_mut(&key).and_then(|cache| cache.get(fields)))
    }

    /// [`get`](Self::get) for each key, in order.
    pub fn get_list(
        &self,
        pks: &[PrimaryKey],
        fields: &FieldSet,
    ) -> CacheResult<Vec<Option<Rc<R>>>> {
        pks.iter().map(|pk| self.get(pk, fields)).collect()
    }

    /// Delete one field set of `pk`, or everything cached for `pk` when
    /// `fields` is `None`. Returns whether an entry was removed.
    pub fn delete(&self, pk: &PrimaryKey, fields: Option<&FieldSet>) -> CacheResult<bool> {
        let key = pk.cache_key()?;

        let (removed, dispatch) = {
            let mut caches = self.caches.borrow_mut();
            let Some(cache) = caches.get_mut(&key) else {
                return Ok(false);
            };
            // The record cache itself stays; only its entries go.
            cache.stage_delete(fields)
        };
        dispatch.run()?;
        Ok(removed)
    }

    /// Register `listener` for changes to exactly `fields` of `pk`.
    pub fn add_listener<F>(
        &self,
        pk: &PrimaryKey,
        fields: &FieldSet,
        listener: F,
    ) -> CacheResult<Subscription>
    where
        F: Fn(Option<&Rc<R>>, Option<&Rc<R>>) -> ListenerResult + 'static,
    {
        let key = pk.cache_key()?;
        let mut caches = self.caches.borrow_mut();
        Ok(self.record_cache(&mut caches, key).add_listener(fields, listener))
    }

    /// Whether any field set of `pk` is cached.
    pub fn contains(&self, pk: &PrimaryKey) -> CacheResult<bool> {
        let key = pk.cache_key()?;
        Ok(self
            .caches
            .borrow()
            .get(&key)
            .is_some_and(|cache| !cache.is_empty()))
    }

    /// Number of primary keys with at least one cached entry.
    pub fn len(&self) -> usize {
        self.caches
            .borrow()
            .values()
            .filter(|cache| !cache.is_empty())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Statistics summed over every record cache.
    pub fn stats(&self) -> CacheStats {
        self.caches
            .borrow()
            .values()
            .fold(CacheStats::default(), |mut total, cache| {
                total.merge(&cache.stats());
                total
            })
    }

    fn record_cache<'a>(
        &self,
        caches: &'a mut HashMap<PkCacheKey, RecordCache<R>>,
        key: PkCacheKey,
    ) -> &'a mut RecordCache<R> {
        caches.entry(key).or_insert_with_key(|key| {
            debug!(pk = %key, "created record cache");
            RecordCache::with_config(&self.config)
        })
    }
}

impl<R: Record + 'static> Default for ViewModelCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for ViewModelCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let caches = self.caches.borrow();
        f.debug_struct("ViewModelCache")
            .field("record_caches", &caches.len())
            .field("config", &self.config)
            .finish()
    }
}
