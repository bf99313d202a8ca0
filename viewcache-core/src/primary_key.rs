//! Primary keys and their cache-key encoding.
//!
//! A [`PkCacheKey`] can only be produced by [`PrimaryKey::cache_key`], so every
//! key in a model cache went through the same canonical encoding: JSON of the
//! scalar, or JSON of the component map for compound keys. Compound components
//! live in a `BTreeMap`, which serializes them sorted by field name, so the
//! order components were supplied in never affects the key.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// A single primary-key component.
///
/// A `Uuid` and a `Str` holding the same hyphenated text encode identically,
/// so a UUID read back from JSON still hits the entry cached under the typed
/// value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Uuid(Uuid),
    Str(String),
}

impl KeyValue {
    /// Convert a JSON field value into a key component.
    ///
    /// Only integers and strings are valid key values.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{}", v),
            Self::Uuid(v) => write!(f, "{}", v),
            Self::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for KeyValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for KeyValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<Uuid> for KeyValue {
    fn from(v: Uuid) -> Self {
        Self::Uuid(v)
    }
}

impl From<&str> for KeyValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

/// Primary key of an entity: one scalar, or named components.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PrimaryKey {
    Single(KeyValue),
    Compound(BTreeMap<String, KeyValue>),
}

impl PrimaryKey {
    /// Build a compound key from `(field, value)` pairs in any order.
    pub fn compound<I, K, V>(parts: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<KeyValue>,
    {
        Self::Compound(
            parts
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Compound(_))
    }

    /// Get a named component of a compound key.
    pub fn component(&self, name: &str) -> Option<&KeyValue> {
        match self {
            Self::Single(_) => None,
            Self::Compound(parts) => parts.get(name),
        }
    }

    /// Check that a compound key carries every component in `names`.
    ///
    /// Single keys always pass.
    pub fn require_components(&self, model: &str, names: &[String]) -> CoreResult<()> {
        let Self::Compound(parts) = self else {
            return Ok(());
        };
        let missing: Vec<String> = names
            .iter()
            .filter(|name| !parts.contains_key(name.as_str()))
            .cloned()
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::MissingPrimaryKey {
                model: model.to_string(),
                missing,
            })
        }
    }

    /// Encode this key into the string the model cache is indexed by.
    pub fn cache_key(&self) -> CoreResult<PkCacheKey> {
        if let Self::Compound(parts) = self {
            if parts.is_empty() {
                return Err(CoreError::KeyEncoding {
                    reason: "compound key has no components".to_string(),
                });
            }
        }
        serde_json::to_string(self)
            .map(PkCacheKey)
            .map_err(|e| CoreError::KeyEncoding {
                reason: e.to_string(),
            })
    }
}

macro_rules! single_key_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for PrimaryKey {
                fn from(v: $ty) -> Self {
                    Self::Single(v.into())
                }
            }
        )*
    };
}

single_key_from!(KeyValue, i64, i32, u32, Uuid, &str, String);

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Single(v) => write!(f, "{}", v),
            Self::Compound(parts) => {
                let rendered: Vec<String> =
                    parts.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "({})", rendered.join(", "))
            }
        }
    }
}

/// Canonical string key for a [`PrimaryKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PkCacheKey(String);

impl PkCacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PkCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
