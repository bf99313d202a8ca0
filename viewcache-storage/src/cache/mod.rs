//! Partial-field record caching.
//!
//! A [`ViewModelCache`] holds one [`RecordCache`] per primary key. A record
//! cache stores the same entity once per field set it has been loaded with,
//! keeps narrower field sets in sync with wider writes, and hands out the same
//! `Rc` for repeated reads of an unchanged entry so consumers can compare by
//! identity.
//!
//! # Example
//!
//! ```ignore
//! let cache: ViewModelCache<ViewRecord> = ViewModelCache::new();
//! cache.add(ViewRecord::from_json(user_model, json!({"id": 1, "name": "Sam", "email": "s@x"}))?)?;
//!
//! // Served from the wider entry, then cached under its own key.
//! let name_only = cache.get(&PrimaryKey::from(1), &FieldSet::from(["id", "name"]))?;
//!
//! let subscription = cache.add_listener(&PrimaryKey::from(1), &FieldSet::from(["name"]), |prev, next| {
//!     println!("{:?} -> {:?}", prev, next);
//!     Ok(())
//! })?;
//! subscription.unsubscribe();
//! ```

pub mod listeners;
pub mod model_cache;
pub mod record_cache;
pub mod stats;

pub use listeners::{Listener, ListenerId, Subscription};
pub use model_cache::ViewModelCache;
pub use record_cache::RecordCache;
pub use stats::CacheStats;
