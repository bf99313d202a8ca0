//! Cache for every field-subset variant of a single entity.
//!
//! Each field set seen for the entity gets a [`Slot`]: either a real record or
//! an alias naming the key of a superset entry. Writes work in phases:
//!
//! 1. Collect the affected keys and, for keys with listeners, the previous
//!    value (aliases are materialized for this, but not stored).
//! 2. Rewrite the slots: every tracked subset key becomes an alias of the new
//!    record and the record itself is stored under its own key.
//! 3. Keys with listeners get a real clone stored, so the value a listener
//!    receives is the same `Rc` a later read returns.
//! 4. The staged [`Dispatch`] runs once no cache state is borrowed.
//!
//! An alias always names a key that currently holds a real record: when the
//! target is itself aliased, every alias pointing at it is a subset of the new
//! superset too and gets re-pointed, and a scoped delete materializes the
//! aliases of the entry it removes.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};
use viewcache_core::{
    CacheConfig, CoreError, FieldSet, FieldSetKey, ListenerFailurePolicy, ListenerResult, Record,
};

use super::listeners::{Dispatch, Listener, ListenerRegistry, Subscription};
use super::stats::{CacheStats, Counters};
use crate::CacheResult;

enum Slot<R> {
    Real(Rc<R>),
    Alias(FieldSetKey),
}

struct Entry<R> {
    fields: FieldSet,
    slot: Slot<R>,
}

/// All cached field-set variants of one entity instance.
pub struct RecordCache<R> {
    entries: BTreeMap<FieldSetKey, Entry<R>>,
    /// Counter value of the last `add` for each field-set key.
    latest: HashMap<FieldSetKey, u64>,
    counter: u64,
    listeners: Rc<RefCell<ListenerRegistry<R>>>,
    counters: Rc<Counters>,
    policy: ListenerFailurePolicy,
}

impl<R: Record + 'static> RecordCache<R> {
    pub fn new() -> Self {
        Self::with_config(&CacheConfig::default())
    }

    pub fn with_config(config: &CacheConfig) -> Self {
        Self {
            entries: BTreeMap::new(),
            latest: HashMap::new(),
            counter: 0,
            listeners: Rc::new(RefCell::new(ListenerRegistry::new())),
            counters: Rc::new(Counters::new(config.track_stats)),
            policy: config.listener_failure,
        }
    }

    /// Cache `record` under its assigned fields and alias every tracked
    /// subset key to it.
    ///
    /// Supersets of the record's fields are not touched: adding `{a, b}`
    /// leaves a cached `{a, b, c}` as it was.
    pub fn add(&mut self, record: impl Into<Rc<R>>) -> CacheResult<()> {
        self.stage_add(record.into())?.run()
    }

    /// Record for exactly `fields`, if the cache can produce one.
    ///
    /// Repeated reads return the same `Rc` until a write replaces the entry.
    pub fn get(&mut self, fields: &FieldSet) -> Option<Rc<R>> {
        let key = fields.key();

        let alias_target = match self.entries.get(&key).map(|entry| &entry.slot) {
            Some(Slot::Real(record)) => {
                trace!(fields = %key, "record cache hit");
                self.counters.bump(&self.counters.hits);
                return Some(Rc::clone(record));
            }
            Some(Slot::Alias(target)) => Some(target.clone()),
            None => None,
        };

        if let Some(target) = alias_target {
            if let Some(source) = self.real(&target) {
                let record = Rc::new(source.clone_fields(fields));
                self.set_real(&key, Rc::clone(&record));
                trace!(fields = %key, target = %target, "materialized aliased record");
                self.counters.bump(&self.counters.materializations);
                self.counters.bump(&self.counters.hits);
                return Some(record);
            }
            // Unreachable while the alias invariant holds; fall back to a scan.
            self.entries.remove(&key);
        }

        self.get_from_superset(fields, key)
    }

    /// Remove the entry for `fields`, or every entry when `fields` is `None`.
    ///
    /// Returns whether anything was removed. A scoped delete leaves other
    /// subset and superset entries in place.
    pub fn delete(&mut self, fields: Option<&FieldSet>) -> CacheResult<bool> {
        let (removed, dispatch) = self.stage_delete(fields);
        dispatch.run()?;
        Ok(removed)
    }

    /// Call `listener` with `(previous, next)` whenever an add or delete
    /// touches exactly `fields`.
    ///
    /// Registering does not create an entry; the listener starts firing on the
    /// next write that reaches the key.
    pub fn add_listener<F>(&self, fields: &FieldSet, listener: F) -> Subscription
    where
        F: Fn(Option<&Rc<R>>, Option<&Rc<R>>) -> ListenerResult + 'static,
    {
        let listener: Listener<R> = Rc::new(listener);
        let (key, id) = self.listeners.borrow_mut().register(fields, listener);
        Subscription::new(&self.listeners, key, id)
    }

    /// Number of field-set entries, real or aliased.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field sets that currently have an entry, in key order.
    pub fn tracked_keys(&self) -> Vec<FieldSet> {
        self.entries.values().map(|entry| entry.fields.clone()).collect()
    }

    /// Number of listeners registered on this entity.
    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.entries.len())
    }

    pub(crate) fn stage_add(&mut self, record: Rc<R>) -> CacheResult<Dispatch<R>> {
        let fields = record.assigned_fields().clone();
        if fields.is_empty() {
            return Err(CoreError::InvalidRecord {
                reason: "record has no assigned fields; cannot be cached".to_string(),
            }
            .into());
        }
        let key = fields.key();
        self.counter += 1;
        self.latest.insert(key.clone(), self.counter);

        let mut dispatch = Dispatch::new(self.policy, Rc::clone(&self.counters));
        let registry = Rc::clone(&self.listeners);
        let registry = registry.borrow();

        // Phase 1: subset keys tracked by an entry or a listener.
        let mut subsets: BTreeMap<FieldSetKey, FieldSet> = BTreeMap::new();
        for (candidate, entry) in &self.entries {
            if *candidate != key && entry.fields.is_subset(&fields) {
                subsets.insert(candidate.clone(), entry.fields.clone());
            }
        }
        for (candidate, candidate_fields) in registry.keys() {
            if *candidate != key && candidate_fields.is_subset(&fields) {
                subsets.insert(candidate.clone(), candidate_fields.clone());
            }
        }

        let mut listened = Vec::new();
        for (subset_key, subset_fields) in &subsets {
            if registry.has_listeners(subset_key) {
                let previous = self.resolve(subset_key, subset_fields);
                listened.push((subset_key.clone(), registry.snapshot(subset_key), previous));
            }
        }
        let own_previous = if registry.has_listeners(&key) {
            Some((registry.snapshot(&key), self.resolve(&key, &fields)))
        } else {
            None
        };
        drop(registry);

        // Phase 2: rewrite slots.
        for (subset_key, subset_fields) in &subsets {
            self.entries.insert(
                subset_key.clone(),
                Entry {
                    fields: subset_fields.clone(),
                    slot: Slot::Alias(key.clone()),
                },
            );
        }
        self.entries.insert(
            key.clone(),
            Entry {
                fields: fields.clone(),
                slot: Slot::Real(Rc::clone(&record)),
            },
        );

        // Phase 3: listened subset keys hold real clones.
        for (subset_key, listeners, previous) in listened {
            let Some(subset_fields) = subsets.get(&subset_key) else {
                continue;
            };
            let next = Rc::new(record.clone_fields(subset_fields));
            self.set_real(&subset_key, Rc::clone(&next));
            dispatch.push(subset_key, listeners, previous, Some(next));
        }
        if let Some((listeners, previous)) = own_previous {
            dispatch.push(key.clone(), listeners, previous, Some(Rc::clone(&record)));
        }

        debug!(
            fields = %key,
            counter = self.counter,
            aliased = subsets.len(),
            notifications = dispatch.len(),
            "added record"
        );
        Ok(dispatch)
    }

    pub(crate) fn stage_delete(&mut self, fields: Option<&FieldSet>) -> (bool, Dispatch<R>) {
        let mut dispatch = Dispatch::new(self.policy, Rc::clone(&self.counters));
        let registry = Rc::clone(&self.listeners);

        let Some(fields) = fields else {
            let removed = !self.entries.is_empty();
            {
                let registry = registry.borrow();
                for (key, entry) in &self.entries {
                    if registry.has_listeners(key) {
                        let previous = self.resolve(key, &entry.fields);
                        dispatch.push(key.clone(), registry.snapshot(key), previous, None);
                    }
                }
            }
            let cleared = self.entries.len();
            self.entries.clear();
            self.latest.clear();
            debug!(cleared, notifications = dispatch.len(), "cleared record cache");
            return (removed, dispatch);
        };

        let key = fields.key();
        if !self.entries.contains_key(&key) {
            return (false, dispatch);
        }

        {
            let registry = registry.borrow();
            if registry.has_listeners(&key) {
                let previous = self.resolve(&key, fields);
                dispatch.push(key.clone(), registry.snapshot(&key), previous, None);
            }
        }

        self.detach_aliases(&key);
        self.entries.remove(&key);
        self.latest.remove(&key);
        debug!(fields = %key, notifications = dispatch.len(), "deleted field set");
        (true, dispatch)
    }

    /// Serve a miss from the most recently added superset entry.
    fn get_from_superset(&mut self, fields: &FieldSet, key: FieldSetKey) -> Option<Rc<R>> {
        let mut candidates: Vec<(&FieldSetKey, u64)> =
            self.latest.iter().map(|(k, counter)| (k, *counter)).collect();
        // Counters are unique per add; the key order only makes the sort total.
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        let source = candidates.into_iter().find_map(|(candidate, _)| {
            let record = self.source_of(candidate)?;
            fields
                .is_subset(record.assigned_fields())
                .then(|| Rc::clone(record))
        });

        let Some(source) = source else {
            trace!(fields = %key, "record cache miss");
            self.counters.bump(&self.counters.misses);
            return None;
        };

        let record = Rc::new(source.clone_fields(fields));
        self.entries.insert(
            key.clone(),
            Entry {
                fields: fields.clone(),
                slot: Slot::Real(Rc::clone(&record)),
            },
        );
        trace!(fields = %key, "served from superset");
        self.counters.bump(&self.counters.fallback_hits);
        self.counters.bump(&self.counters.hits);
        Some(record)
    }

    /// Real record held at `key`.
    fn real(&self, key: &FieldSetKey) -> Option<&Rc<R>> {
        match self.entries.get(key).map(|entry| &entry.slot) {
            Some(Slot::Real(record)) => Some(record),
            _ => None,
        }
    }

    /// Record whose data backs `key`: the entry itself or its alias target.
    fn source_of(&self, key: &FieldSetKey) -> Option<&Rc<R>> {
        match self.entries.get(key).map(|entry| &entry.slot) {
            Some(Slot::Real(record)) => Some(record),
            Some(Slot::Alias(target)) => self.real(target),
            None => None,
        }
    }

    /// Current value at `key` as a real record, without caching it.
    fn resolve(&self, key: &FieldSetKey, fields: &FieldSet) -> Option<Rc<R>> {
        match self.entries.get(key).map(|entry| &entry.slot) {
            Some(Slot::Real(record)) => Some(Rc::clone(record)),
            Some(Slot::Alias(target)) => self
                .real(target)
                .map(|source| Rc::new(source.clone_fields(fields))),
            None => None,
        }
    }

    fn set_real(&mut self, key: &FieldSetKey, record: Rc<R>) {
        if let Some(entry) = self.entries.get_mut(key) {
            entry.slot = Slot::Real(record);
        }
    }

    /// Give every alias of `target` its own copy of the data.
    fn detach_aliases(&mut self, target: &FieldSetKey) {
        let Some(source) = self.real(target).map(Rc::clone) else {
            return;
        };
        for entry in self.entries.values_mut() {
            if matches!(&entry.slot, Slot::Alias(t) if t == target) {
                entry.slot = Slot::Real(Rc::new(source.clone_fields(&entry.fields)));
            }
        }
    }
}

impl<R: Record + 'static> Default for RecordCache<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for RecordCache<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let aliases = self
            .entries
            .values()
            .filter(|entry| matches!(entry.slot, Slot::Alias(_)))
            .count();
        f.debug_struct("RecordCache")
            .field("entries", &self.entries.len())
            .field("aliases", &aliases)
            .field("counter", &self.counter)
            .finish()
    }
}
