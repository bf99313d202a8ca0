//! Cache configuration.
//!
//! Loaded from environment variables or built in code, with defaults that
//! suit an interactive client.

use crate::{ConfigError, CoreResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Upper bound for the pre-sized primary-key map.
const MAX_INITIAL_CAPACITY: usize = 1 << 24;

/// What a notification batch does when one listener fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListenerFailurePolicy {
    /// Log the failure, count it, and keep notifying the rest of the batch.
    #[default]
    Isolate,
    /// Stop the batch and return the failure to the caller.
    FailFast,
}

impl FromStr for ListenerFailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "isolate" => Ok(Self::Isolate),
            "fail_fast" | "fail-fast" | "failfast" => Ok(Self::FailFast),
            other => Err(ConfigError::InvalidValue {
                field: "listener_failure".to_string(),
                value: other.to_string(),
                reason: "expected \"isolate\" or \"fail_fast\"".to_string(),
            }),
        }
    }
}

/// Configuration shared by every record cache of a model cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Policy applied when a change listener returns an error.
    pub listener_failure: ListenerFailurePolicy,

    /// Whether hit/miss counters are maintained.
    pub track_stats: bool,

    /// Number of primary keys the model cache is pre-sized for.
    pub initial_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            listener_failure: ListenerFailurePolicy::Isolate,
            track_stats: true,
            initial_capacity: 64,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `VIEWCACHE_LISTENER_FAILURE`: "isolate" or "fail_fast" (default: isolate)
    /// - `VIEWCACHE_TRACK_STATS`: "true" or "false" (default: true)
    /// - `VIEWCACHE_INITIAL_CAPACITY`: pre-sized primary-key slots (default: 64)
    ///
    /// Unset variables fall back to defaults; malformed ones are errors.
    pub fn from_env() -> CoreResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from `VIEWCACHE_*` values supplied by `lookup`.
    ///
    /// Same rules as [`CacheConfig::from_env`]; `lookup` returns `None` for
    /// an unset variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> CoreResult<Self> {
        let mut config = Self::default();

        if let Some(raw) = lookup("VIEWCACHE_LISTENER_FAILURE") {
            config.listener_failure = raw.parse()?;
        }

        if let Some(raw) = lookup("VIEWCACHE_TRACK_STATS") {
            config.track_stats = match raw.trim().to_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "track_stats".to_string(),
                        value: other.to_string(),
                        reason: "expected true or false".to_string(),
                    }
                    .into())
                }
            };
        }

        if let Some(raw) = lookup("VIEWCACHE_INITIAL_CAPACITY") {
            config.initial_capacity =
                raw.trim()
                    .parse()
                    .map_err(|e: std::num::ParseIntError| ConfigError::InvalidValue {
                        field: "initial_capacity".to_string(),
                        value: raw.clone(),
                        reason: e.to_string(),
                    })?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_listener_failure(mut self, policy: ListenerFailurePolicy) -> Self {
        self.listener_failure = policy;
        self
    }

    pub fn with_stats(mut self, enabled: bool) -> Self {
        self.track_stats = enabled;
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> CoreResult<()> {
        if self.initial_capacity > MAX_INITIAL_CAPACITY {
            return Err(ConfigError::InvalidValue {
                field: "initial_capacity".to_string(),
                value: self.initial_capacity.to_string(),
                reason: format!("must be at most {}", MAX_INITIAL_CAPACITY),
            }
            .into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.listener_failure, ListenerFailurePolicy::Isolate);
        assert!(config.track_stats);
        assert_eq!(config.initial_capacity, 64);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = CacheConfig::new()
            .with_listener_failure(ListenerFailurePolicy::FailFast)
            .with_stats(false)
            .with_initial_capacity(8);
        assert_eq!(config.listener_failure, ListenerFailurePolicy::FailFast);
        assert!(!config.track_stats);
        assert_eq!(config.initial_capacity, 8);
    }

    #[test]
    fn test_validate_rejects_huge_capacity() {
        let config = CacheConfig::new().with_initial_capacity(MAX_INITIAL_CAPACITY + 1);
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!("isolate".parse::<ListenerFailurePolicy>(), Ok(ListenerFailurePolicy::Isolate));
        assert_eq!("FAIL_FAST".parse::<ListenerFailurePolicy>(), Ok(ListenerFailurePolicy::FailFast));
        assert_eq!("fail-fast".parse::<ListenerFailurePolicy>(), Ok(ListenerFailurePolicy::FailFast));
        assert!("explode".parse::<ListenerFailurePolicy>().is_err());
    }

    fn lookup<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        move |name: &str| {
            vars.iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| value.to_string())
        }
    }

    fn invalid_field(result: CoreResult<CacheConfig>) -> String {
        match result {
            Err(CoreError::Config(ConfigError::InvalidValue { field, .. })) => field,
            other => panic!("expected invalid config value, got {other:?}"),
        }
    }

    #[test]
    fn test_from_lookup_unset_uses_defaults() {
        let config = CacheConfig::from_lookup(|_| None).expect("defaults");
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_from_lookup_reads_all_variables() {
        let config = CacheConfig::from_lookup(lookup(&[
            ("VIEWCACHE_LISTENER_FAILURE", "fail_fast"),
            ("VIEWCACHE_TRACK_STATS", "0"),
            ("VIEWCACHE_INITIAL_CAPACITY", " 128 "),
        ]))
        .expect("valid values");
        assert_eq!(config.listener_failure, ListenerFailurePolicy::FailFast);
        assert!(!config.track_stats);
        assert_eq!(config.initial_capacity, 128);
    }

    #[test]
    fn test_from_lookup_partial_keeps_other_defaults() {
        let config = CacheConfig::from_lookup(lookup(&[("VIEWCACHE_TRACK_STATS", "FALSE")]))
            .expect("valid value");
        assert!(!config.track_stats);
        assert_eq!(config.listener_failure, ListenerFailurePolicy::Isolate);
        assert_eq!(config.initial_capacity, 64);
    }

    #[test]
    fn test_from_lookup_rejects_malformed_values() {
        let policy =
            CacheConfig::from_lookup(lookup(&[("VIEWCACHE_LISTENER_FAILURE", "explode")]));
        assert_eq!(invalid_field(policy), "listener_failure");

        let stats = CacheConfig::from_lookup(lookup(&[("VIEWCACHE_TRACK_STATS", "maybe")]));
        assert_eq!(invalid_field(stats), "track_stats");

        let capacity =
            CacheConfig::from_lookup(lookup(&[("VIEWCACHE_INITIAL_CAPACITY", "lots")]));
        assert_eq!(invalid_field(capacity), "initial_capacity");

        let huge = (MAX_INITIAL_CAPACITY + 1).to_string();
        let oversized =
            CacheConfig::from_lookup(lookup(&[("VIEWCACHE_INITIAL_CAPACITY", huge.as_str())]));
        assert_eq!(invalid_field(oversized), "initial_capacity");
    }

    #[test]
    fn test_serde_partial_document_uses_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"listener_failure":"fail_fast"}"#).expect("deserialize");
        assert_eq!(config.listener_failure, ListenerFailurePolicy::FailFast);
        assert!(config.track_stats);
        assert_eq!(config.initial_capacity, 64);
    }
}
