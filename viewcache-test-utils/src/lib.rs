//! viewcache Test Utilities
//!
//! Shared test infrastructure for the viewcache workspace:
//! - Fixture models and record builders
//! - Proptest generators for field sets, keys, and records
//! - A recording change listener
//! - Assertions for identity and field-set checks

pub use viewcache_core::{
    CacheConfig, CoreError, FieldSet, KeyValue, ListenerError, ListenerFailurePolicy,
    ListenerResult, Model, PrimaryKey, Record, ViewRecord,
};

pub use fixtures::{fields, membership, membership_model, user, user_model};
pub use recording::RecordingListener;

use std::sync::Arc;

/// Install a `tracing` subscriber for tests.
///
/// Honors `RUST_LOG`, defaults to `warn`, and is safe to call from every test.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built models and record builders.

    use super::*;
    use serde_json::Value;

    /// `User { id, name, email, age }` keyed by `id`.
    pub fn user_model() -> Arc<Model> {
        Arc::new(Model::new("User", ["id", "name", "email", "age"], "id").expect("valid model"))
    }

    /// `Membership { user_id, group_id, role }` keyed by `(user_id, group_id)`.
    pub fn membership_model() -> Arc<Model> {
        Arc::new(
            Model::with_compound_key(
                "Membership",
                ["user_id", "group_id", "role"],
                ["user_id", "group_id"],
            )
            .expect("valid model"),
        )
    }

    /// Build a `User` record from a JSON object.
    pub fn user(value: Value) -> ViewRecord {
        ViewRecord::from_json(user_model(), value).expect("user fixture must be a JSON object")
    }

    /// Build a `Membership` record from a JSON object.
    pub fn membership(value: Value) -> ViewRecord {
        ViewRecord::from_json(membership_model(), value)
            .expect("membership fixture must be a JSON object")
    }

    /// Field set from names, in any order.
    pub fn fields(names: &[&str]) -> FieldSet {
        FieldSet::from(names)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for viewcache types.

    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    /// Fields of the `User` fixture besides its key.
    pub const USER_FIELDS: [&str; 3] = ["name", "email", "age"];

    /// Generate a valid field name.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z0-9_]{0,7}"
    }

    /// Generate a non-empty field set of up to `max` names.
    pub fn arb_field_set(max: usize) -> impl Strategy<Value = FieldSet> {
        prop::collection::btree_set(arb_field_name(), 1..=max.max(1)).prop_map(FieldSet::new)
    }

    /// Generate a `User` field set that always includes `id`.
    pub fn arb_user_field_set() -> impl Strategy<Value = FieldSet> {
        prop::sample::subsequence(USER_FIELDS.to_vec(), 0..=USER_FIELDS.len()).prop_map(
            |mut names| {
                names.push("id");
                FieldSet::new(names)
            },
        )
    }

    /// Generate a `User` record with the given key and a random field subset.
    pub fn arb_user_record(id: i64) -> impl Strategy<Value = ViewRecord> {
        (
            arb_user_field_set(),
            "[A-Z][a-z]{0,9}",
            "[a-z]{1,8}",
            0u8..120,
        )
            .prop_map(move |(wanted, name, mailbox, age)| {
                let full = json!({
                    "id": id,
                    "name": name,
                    "email": format!("{}@example.com", mailbox),
                    "age": age,
                });
                user(full).clone_fields(&wanted)
            })
    }

    /// Generate a single-key component.
    pub fn arb_key_value() -> impl Strategy<Value = KeyValue> {
        prop_oneof![
            any::<i64>().prop_map(KeyValue::Int),
            "[a-z][a-z0-9]{0,11}".prop_map(KeyValue::Str),
        ]
    }

    /// Generate a compound key with one to four components.
    pub fn arb_compound_key() -> impl Strategy<Value = PrimaryKey> {
        prop::collection::btree_map(arb_field_name(), arb_key_value(), 1..=4)
            .prop_map(PrimaryKey::Compound)
    }

    /// Generate any primary key.
    pub fn arb_primary_key() -> impl Strategy<Value = PrimaryKey> {
        prop_oneof![arb_key_value().prop_map(PrimaryKey::Single), arb_compound_key()]
    }
}

// ============================================================================
// RECORDING LISTENER
// ============================================================================

pub mod recording {
    //! Listener that remembers every notification it receives.

    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    /// One `(previous, next)` notification.
    pub type Event<R> = (Option<Rc<R>>, Option<Rc<R>>);

    /// Captures `(previous, next)` pairs in delivery order.
    pub struct RecordingListener<R> {
        events: Rc<RefCell<Vec<Event<R>>>>,
    }

    impl<R: 'static> RecordingListener<R> {
        pub fn new() -> Self {
            Self {
                events: Rc::new(RefCell::new(Vec::new())),
            }
        }

        /// Callback to register with a cache; every clone records here.
        pub fn callback(&self) -> impl Fn(Option<&Rc<R>>, Option<&Rc<R>>) -> ListenerResult + 'static {
            let events = Rc::clone(&self.events);
            move |previous, next| {
                events
                    .borrow_mut()
                    .push((previous.cloned(), next.cloned()));
                Ok(())
            }
        }

        pub fn events(&self) -> Vec<Event<R>> {
            self.events.borrow().clone()
        }

        pub fn len(&self) -> usize {
            self.events.borrow().len()
        }

        pub fn is_empty(&self) -> bool {
            self.events.borrow().is_empty()
        }

        pub fn clear(&self) {
            self.events.borrow_mut().clear();
        }
    }

    impl<R: 'static> Default for RecordingListener<R> {
        fn default() -> Self {
            Self::new()
        }
    }

    /// Callback that always fails with `message`.
    pub fn failing<R>(
        message: &'static str,
    ) -> impl Fn(Option<&Rc<R>>, Option<&Rc<R>>) -> ListenerResult + 'static {
        move |_, _| Err(ListenerError::new(message))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for cache-specific checks.

    use std::rc::Rc;

    use super::*;

    /// Assert both reads returned the very same record.
    #[track_caller]
    pub fn assert_same_record<R>(a: &Option<Rc<R>>, b: &Option<Rc<R>>) {
        match (a, b) {
            (Some(a), Some(b)) => assert!(Rc::ptr_eq(a, b), "expected the same Rc for both reads"),
            _ => panic!("expected two records, got {} and {}", a.is_some(), b.is_some()),
        }
    }

    /// Assert a record carries exactly `expected` fields.
    #[track_caller]
    pub fn assert_assigned<R: Record>(record: &R, expected: &[&str]) {
        assert_eq!(
            record.assigned_fields(),
            &FieldSet::from(expected),
            "unexpected assigned fields"
        );
    }

    /// Assert a string-valued field.
    #[track_caller]
    pub fn assert_str_field(record: &ViewRecord, field: &str, expected: &str) {
        let value: Option<String> = record.get(field).expect("declared field");
        assert_eq!(value.as_deref(), Some(expected), "unexpected value for {}", field);
    }
}

#[cfg(test)]
mod tests {
    use super::assertions::*;
    use super::generators::*;
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_fixture_models() {
        assert!(!user_model().has_compound_key());
        assert!(membership_model().has_compound_key());
    }

    #[test]
    fn test_user_builder() {
        let record = user(json!({"id": 1, "name": "Sam"}));
        assert_assigned(&record, &["name", "id"]);
        assert_str_field(&record, "name", "Sam");
    }

    #[test]
    fn test_recording_listener_captures_pairs() {
        let recorder: RecordingListener<u32> = RecordingListener::new();
        let callback = recorder.callback();
        let value = std::rc::Rc::new(1);
        callback(None, Some(&value)).expect("records");
        callback(Some(&value), None).expect("records");

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].0.is_none());
        assert!(events[1].1.is_none());
        recorder.clear();
        assert!(recorder.is_empty());
    }

    #[test]
    fn test_failing_listener() {
        let callback = recording::failing::<u32>("nope");
        let err = callback(None, None).expect_err("always fails");
        assert_eq!(err.message(), "nope");
    }

    proptest! {
        #[test]
        fn prop_user_record_is_keyed(record in arb_user_record(9)) {
            prop_assert!(record.assigned_fields().contains("id"));
            prop_assert!(record.primary_key().is_ok());
        }

        #[test]
        fn prop_field_set_never_empty(set in arb_field_set(5)) {
            prop_assert!(!set.is_empty());
            prop_assert!(set.len() <= 5);
        }

        #[test]
        fn prop_primary_key_encodes(pk in arb_primary_key()) {
            prop_assert!(pk.cache_key().is_ok());
        }
    }
}
