//! viewcache Core - Record Types
//!
//! Data types shared by the cache engine: field sets and their canonical
//! keys, primary keys, the `Record` contract, a generic JSON-backed record
//! implementation, configuration, and errors. No caching logic lives here.

pub mod config;
pub mod error;
pub mod field_set;
pub mod model;
pub mod primary_key;
pub mod record;

pub use config::{CacheConfig, ListenerFailurePolicy};
pub use error::{ConfigError, CoreError, CoreResult, ListenerError, ListenerResult};
pub use field_set::{validate_field_name, FieldSet, FieldSetKey, FIELD_SEPARATOR};
pub use model::{Model, ViewRecord};
pub use primary_key::{KeyValue, PkCacheKey, PrimaryKey};
pub use record::Record;
