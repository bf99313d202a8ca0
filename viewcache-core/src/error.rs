//! Error types for viewcache operations

use thiserror::Error;

/// Record and key errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid record: {reason}")]
    InvalidRecord { reason: String },

    #[error("Missing primary key for {model}: {missing:?}")]
    MissingPrimaryKey { model: String, missing: Vec<String> },

    #[error("Unknown field {field} on {model}")]
    UnknownField { model: String, field: String },

    #[error("Can't clone {model} with fields {requested:?}; only {assigned:?} are set (missing {missing:?})")]
    CloneMissingFields {
        model: String,
        requested: Vec<String>,
        assigned: Vec<String>,
        missing: Vec<String>,
    },

    #[error("Invalid field name {name:?}: {reason}")]
    InvalidFieldName { name: String, reason: String },

    #[error("Field {field} has unexpected type: {reason}")]
    FieldType { field: String, reason: String },

    #[error("Primary key encoding failed: {reason}")]
    KeyEncoding { reason: String },

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Error returned by a change listener.
///
/// Listeners are collaborator code; the cache only decides whether a failure
/// stops the rest of a notification batch (see `ListenerFailurePolicy`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ListenerError {
    message: String,
}

impl ListenerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result returned by change listeners.
pub type ListenerResult = Result<(), ListenerError>;

// =============================================================================
// TESTS
// =============================================================================
