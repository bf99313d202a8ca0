//! viewcache Storage - Identity-Stable Record Cache
//!
//! In-memory cache for records loaded with different subsets of their
//! fields. Record types and keys live in `viewcache-core`.

pub mod cache;
pub mod error;

pub use cache::{CacheStats, Listener, ListenerId, RecordCache, Subscription, ViewModelCache};
pub use error::{CacheError, CacheResult};

pub use viewcache_core::{
    CacheConfig, CoreError, FieldSet, ListenerError, ListenerFailurePolicy, ListenerResult, Model,
    PrimaryKey, Record, ViewRecord,
};
