//! Change listeners keyed by field set.
//!
//! Listeners are kept per field-set key in registration order. Writes never
//! call listeners directly: they stage a [`Dispatch`] holding a snapshot of
//! the listeners and the materialized values, and the dispatch runs only after
//! every borrow of cache state has been released. A listener is therefore free
//! to read, write, subscribe or unsubscribe on the same cache.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::warn;
use viewcache_core::{FieldSet, FieldSetKey, ListenerFailurePolicy, ListenerResult};

use super::stats::Counters;
use crate::{CacheError, CacheResult};

/// Callback receiving `(previous, next)` for one field set of one entity.
///
/// `None` as previous means the entry did not exist; `None` as next means it
/// was deleted.
pub type Listener<R> = Rc<dyn Fn(Option<&Rc<R>>, Option<&Rc<R>>) -> ListenerResult>;

/// Stable identity of a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct ListenerSet<R> {
    fields: FieldSet,
    listeners: Vec<(ListenerId, Listener<R>)>,
}

/// Listeners of one record cache.
pub(crate) struct ListenerRegistry<R> {
    next_id: u64,
    by_key: BTreeMap<FieldSetKey, ListenerSet<R>>,
}

impl<R> ListenerRegistry<R> {
    pub(crate) fn new() -> Self {
        Self {
            next_id: 0,
            by_key: BTreeMap::new(),
        }
    }

    pub(crate) fn register(
        &mut self,
        fields: &FieldSet,
        listener: Listener<R>,
    ) -> (FieldSetKey, ListenerId) {
        let key = fields.key();
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.by_key
            .entry(key.clone())
            .or_insert_with(|| ListenerSet {
                fields: fields.clone(),
                listeners: Vec::new(),
            })
            .listeners
            .push((id, listener));
        (key, id)
    }

    /// Remove one listener; empty keys stop being tracked.
    pub(crate) fn remove(&mut self, key: &FieldSetKey, id: ListenerId) -> bool {
        let Some(set) = self.by_key.get_mut(key) else {
            return false;
        };
        let before = set.listeners.len();
        set.listeners.retain(|(candidate, _)| *candidate != id);
        let removed = set.listeners.len() != before;
        if set.listeners.is_empty() {
            self.by_key.remove(key);
        }
        removed
    }

    pub(crate) fn has_listeners(&self, key: &FieldSetKey) -> bool {
        self.by_key
            .get(key)
            .is_some_and(|set| !set.listeners.is_empty())
    }

    /// Copy of the listeners for `key`, in registration order.
    pub(crate) fn snapshot(&self, key: &FieldSetKey) -> Vec<Listener<R>> {
        self.by_key
            .get(key)
            .map(|set| set.listeners.iter().map(|(_, l)| Rc::clone(l)).collect())
            .unwrap_or_default()
    }

    /// Every key with at least one listener.
    pub(crate) fn keys(&self) -> impl Iterator<Item = (&FieldSetKey, &FieldSet)> {
        self.by_key.iter().map(|(key, set)| (key, &set.fields))
    }

    /// Total number of registered listeners.
    pub(crate) fn len(&self) -> usize {
        self.by_key.values().map(|set| set.listeners.len()).sum()
    }
}

/// Handle returned by `add_listener`.
///
/// Dropping the handle leaves the listener registered; call
/// [`Subscription::unsubscribe`] to remove it.
pub struct Subscription {
    id: ListenerId,
    active: Cell<bool>,
    remove: Box<dyn Fn() -> bool>,
}

impl Subscription {
    pub(crate) fn new<R: 'static>(
        registry: &Rc<RefCell<ListenerRegistry<R>>>,
        key: FieldSetKey,
        id: ListenerId,
    ) -> Self {
        let registry: Weak<RefCell<ListenerRegistry<R>>> = Rc::downgrade(registry);
        Self {
            id,
            active: Cell::new(true),
            remove: Box::new(move || match registry.upgrade() {
                Some(registry) => {
                    let removed = registry.borrow_mut().remove(&key, id);
                    removed
                }
                None => false,
            }),
        }
    }

    /// Remove the listener. Calling this more than once is a no-op.
    pub fn unsubscribe(&self) {
        if self.active.replace(false) {
            (self.remove)();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.get()
    }

    pub fn id(&self) -> ListenerId {
        self.id
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("active", &self.active.get())
            .finish()
    }
}

struct Notification<R> {
    key: FieldSetKey,
    listeners: Vec<Listener<R>>,
    previous: Option<Rc<R>>,
    next: Option<Rc<R>>,
}

/// Notifications staged by one write, delivered after the write completes.
#[must_use = "staged notifications are lost unless the dispatch is run"]
pub(crate) struct Dispatch<R> {
    notifications: Vec<Notification<R>>,
    policy: ListenerFailurePolicy,
    counters: Rc<Counters>,
}

impl<R> Dispatch<R> {
    pub(crate) fn new(policy: ListenerFailurePolicy, counters: Rc<Counters>) -> Self {
        Self {
            notifications: Vec::new(),
            policy,
            counters,
        }
    }

    pub(crate) fn push(
        &mut self,
        key: FieldSetKey,
        listeners: Vec<Listener<R>>,
        previous: Option<Rc<R>>,
        next: Option<Rc<R>>,
    ) {
        if listeners.is_empty() {
            return;
        }
        self.notifications.push(Notification {
            key,
            listeners,
            previous,
            next,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.notifications.len()
    }

    /// Invoke every staged listener in order.
    pub(crate) fn run(self) -> CacheResult<()> {
        for notification in self.notifications {
            for listener in &notification.listeners {
                let result = listener(notification.previous.as_ref(), notification.next.as_ref());
                let Err(source) = result else {
                    continue;
                };
                self.counters.bump(&self.counters.listener_failures);
                match self.policy {
                    ListenerFailurePolicy::Isolate => {
                        warn!(
                            fields = %notification.key,
                            error = %source,
                            "cache listener failed; continuing batch"
                        );
                    }
                    ListenerFailurePolicy::FailFast => {
                        return Err(CacheError::Listener {
                            fields: notification.key.to_string(),
                            source,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
