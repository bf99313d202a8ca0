//! Entity models and the generic record type.
//!
//! A [`Model`] declares an entity's fields and primary-key field(s). A
//! [`ViewRecord`] is one partially-populated instance of a model: an ordered
//! mapping from field name to JSON value plus the set of fields that were
//! actually supplied.

use crate::{CoreError, CoreResult, FieldSet, KeyValue, PrimaryKey, Record};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Declared shape of an entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    name: String,
    fields: FieldSet,
    /// One entry for a single key, several for a compound key.
    pk_fields: Vec<String>,
}

impl Model {
    /// Model with a single primary-key field.
    pub fn new<I, S>(name: impl Into<String>, fields: I, pk_field: &str) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::build(name.into(), fields, vec![pk_field.to_string()])
    }

    /// Model whose primary key is made of several fields.
    pub fn with_compound_key<I, S, P, T>(
        name: impl Into<String>,
        fields: I,
        pk_fields: P,
    ) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        P: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self::build(
            name.into(),
            fields,
            pk_fields.into_iter().map(Into::into).collect(),
        )
    }

    fn build<I, S>(name: String, fields: I, pk_fields: Vec<String>) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields = FieldSet::try_new(fields)?;
        let missing: Vec<String> = if pk_fields.is_empty() {
            vec!["<none declared>".to_string()]
        } else {
            pk_fields
                .iter()
                .filter(|pk| !fields.contains(pk))
                .cloned()
                .collect()
        };
        if !missing.is_empty() {
            return Err(CoreError::MissingPrimaryKey {
                model: name,
                missing,
            });
        }
        Ok(Self {
            name,
            fields,
            pk_fields,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &FieldSet {
        &self.fields
    }

    pub fn pk_fields(&self) -> &[String] {
        &self.pk_fields
    }

    pub fn has_compound_key(&self) -> bool {
        self.pk_fields.len() > 1
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains(name)
    }

    /// Build a primary key for this model from loose values.
    ///
    /// Compound models require every key component to be present.
    pub fn primary_key(&self, key: impl Into<PrimaryKey>) -> CoreResult<PrimaryKey> {
        let key = key.into();
        if self.has_compound_key() {
            if !key.is_compound() {
                return Err(CoreError::MissingPrimaryKey {
                    model: self.name.clone(),
                    missing: self.pk_fields.clone(),
                });
            }
            key.require_components(&self.name, &self.pk_fields)?;
        }
        Ok(key)
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// A record of some [`Model`] holding a subset of its fields.
#[derive(Debug, Clone)]
pub struct ViewRecord {
    model: Arc<Model>,
    assigned: FieldSet,
    data: BTreeMap<String, Value>,
}

impl ViewRecord {
    /// Build a record from `(field, value)` pairs.
    ///
    /// Keys that are not declared on the model are dropped with a warning.
    pub fn new<I, K>(model: Arc<Model>, data: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut values = BTreeMap::new();
        for (key, value) in data {
            let key = key.into();
            if model.has_field(&key) {
                values.insert(key, value);
            } else {
                warn!(model = %model.name(), field = %key, "ignoring value for undeclared field");
            }
        }
        let assigned = FieldSet::new(values.keys().cloned());
        Self {
            model,
            assigned,
            data: values,
        }
    }

    /// Build a record from a JSON object.
    pub fn from_json(model: Arc<Model>, value: Value) -> CoreResult<Self> {
        match value {
            Value::Object(map) => Ok(Self::new(model, map)),
            other => Err(CoreError::InvalidRecord {
                reason: format!("expected a JSON object for {}, got {}", model.name(), other),
            }),
        }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Raw value of an assigned field.
    pub fn value(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    /// Typed value of a field.
    ///
    /// Returns `Ok(None)` for a declared field that is not assigned on this
    /// record, and an error for an undeclared field or a type mismatch.
    pub fn get<T: DeserializeOwned>(&self, field: &str) -> CoreResult<Option<T>> {
        if !self.model.has_field(field) {
            return Err(CoreError::UnknownField {
                model: self.model.name().to_string(),
                field: field.to_string(),
            });
        }
        let Some(value) = self.data.get(field) else {
            return Ok(None);
        };
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| CoreError::FieldType {
                field: field.to_string(),
                reason: e.to_string(),
            })
    }

    /// Field values keyed by field name, in field-name order.
    pub fn data(&self) -> &BTreeMap<String, Value> {
        &self.data
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.data
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect::<Map<String, Value>>(),
        )
    }

    /// Copy of this record with only `fields` assigned.
    ///
    /// Every requested field must already be assigned here.
    pub fn try_clone_fields(&self, fields: &FieldSet) -> CoreResult<Self> {
        let missing = fields.difference(&self.assigned);
        if !missing.is_empty() {
            return Err(CoreError::CloneMissingFields {
                model: self.model.name().to_string(),
                requested: fields.as_slice().to_vec(),
                assigned: self.assigned.as_slice().to_vec(),
                missing,
            });
        }
        Ok(self.project(fields))
    }

    fn project(&self, fields: &FieldSet) -> Self {
        let data: BTreeMap<String, Value> = self
            .data
            .iter()
            .filter(|(name, _)| fields.contains(name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            model: Arc::clone(&self.model),
            assigned: FieldSet::new(data.keys().cloned()),
            data,
        }
    }

    /// Records are equal when they share a model, were built from the same
    /// field set, and hold equal values for every field.
    pub fn is_equal(&self, other: &ViewRecord) -> bool {
        (Arc::ptr_eq(&self.model, &other.model) || *self.model == *other.model)
            && self.assigned == other.assigned
            && self.data == other.data
    }
}

impl PartialEq for ViewRecord {
    fn eq(&self, other: &Self) -> bool {
        self.is_equal(other)
    }
}

impl Record for ViewRecord {
    fn assigned_fields(&self) -> &FieldSet {
        &self.assigned
    }

    fn primary_key(&self) -> CoreResult<PrimaryKey> {
        let pk_fields = self.model.pk_fields();
        let missing: Vec<String> = pk_fields
            .iter()
            .filter(|name| !self.data.contains_key(name.as_str()))
            .cloned()
            .collect();
        if missing.len() == pk_fields.len() {
            return Err(CoreError::InvalidRecord {
                reason: format!(
                    "{} record has no primary key ({} not assigned)",
                    self.model.name(),
                    missing.join(", ")
                ),
            });
        }
        if !missing.is_empty() {
            return Err(CoreError::MissingPrimaryKey {
                model: self.model.name().to_string(),
                missing,
            });
        }

        let component = |name: &String| -> CoreResult<KeyValue> {
            let value = self.data.get(name).unwrap_or(&Value::Null);
            KeyValue::from_json(value).ok_or_else(|| CoreError::KeyEncoding {
                reason: format!(
                    "{}.{} must be a string or integer, got {}",
                    self.model.name(),
                    name,
                    value
                ),
            })
        };

        if let [single] = pk_fields {
            return Ok(PrimaryKey::Single(component(single)?));
        }
        let parts = pk_fields
            .iter()
            .map(|name| Ok((name.clone(), component(name)?)))
            .collect::<CoreResult<BTreeMap<_, _>>>()?;
        Ok(PrimaryKey::Compound(parts))
    }

    fn clone_fields(&self, fields: &FieldSet) -> Self {
        self.project(fields)
    }
}

impl fmt::Display for ViewRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.model.name(), self.to_json())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_model() -> Arc<Model> {
        Arc::new(Model::new("User", ["id", "name", "email", "age"], "id").expect("valid model"))
    }

    fn membership_model() -> Arc<Model> {
        Arc::new(
            Model::with_compound_key(
                "Membership",
                ["user_id", "group_id", "role"],
                ["user_id", "group_id"],
            )
            .expect("valid model"),
        )
    }

    fn user(data: Value) -> ViewRecord {
        ViewRecord::from_json(user_model(), data).expect("object")
    }

    #[test]
    fn test_model_rejects_undeclared_pk() {
        let err = Model::new("User", ["name"], "id").expect_err("id not declared");
        assert!(matches!(err, CoreError::MissingPrimaryKey { .. }));
    }

    #[test]
    fn test_model_rejects_bad_field_name() {
        let err = Model::new("User", ["id", ""], "id").expect_err("empty name");
        assert!(matches!(err, CoreError::InvalidFieldName { .. }));
    }

    #[test]
    fn test_assigned_fields_sorted_and_filtered() {
        let record = user(json!({"name": "Sam", "id": 1, "nickname": "S"}));
        assert_eq!(record.assigned_fields().as_slice(), &["id", "name"]);
        assert!(record.value("nickname").is_none());
    }

    #[test]
    fn test_typed_get() {
        let record = user(json!({"id": 1, "name": "Sam"}));
        assert_eq!(record.get::<String>("name").expect("declared"), Some("Sam".to_string()));
        assert_eq!(record.get::<String>("email").expect("declared"), None);
        assert!(matches!(
            record.get::<String>("nickname"),
            Err(CoreError::UnknownField { .. })
        ));
        assert!(matches!(
            record.get::<i64>("name"),
            Err(CoreError::FieldType { .. })
        ));
    }

    #[test]
    fn test_single_primary_key() {
        let record = user(json!({"id": 7, "name": "Sam"}));
        assert_eq!(record.primary_key().expect("pk"), PrimaryKey::from(7));
    }

    #[test]
    fn test_record_without_primary_key_is_invalid() {
        let record = user(json!({"name": "Sam"}));
        assert!(matches!(
            record.primary_key(),
            Err(CoreError::InvalidRecord { .. })
        ));

        let keyless = ViewRecord::from_json(membership_model(), json!({"role": "admin"}))
            .expect("object");
        assert!(matches!(
            keyless.primary_key(),
            Err(CoreError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_non_scalar_primary_key() {
        let record = user(json!({"id": [1, 2]}));
        assert!(matches!(record.primary_key(), Err(CoreError::KeyEncoding { .. })));
    }

    #[test]
    fn test_compound_primary_key() {
        let a = ViewRecord::from_json(membership_model(), json!({"user_id": 1, "group_id": 2}))
            .expect("object");
        let b = ViewRecord::from_json(membership_model(), json!({"group_id": 2, "user_id": 1}))
            .expect("object");
        assert_eq!(a.primary_key().expect("pk"), b.primary_key().expect("pk"));
        assert_eq!(
            a.primary_key().expect("pk"),
            PrimaryKey::compound([("user_id", 1), ("group_id", 2)])
        );

        let partial = ViewRecord::from_json(membership_model(), json!({"user_id": 1}))
            .expect("object");
        let err = partial.primary_key().expect_err("group_id missing");
        assert_eq!(
            err,
            CoreError::MissingPrimaryKey {
                model: "Membership".to_string(),
                missing: vec!["group_id".to_string()],
            }
        );
    }

    #[test]
    fn test_model_primary_key_requires_components() {
        let model = membership_model();
        assert!(model.primary_key(1).is_err());
        assert!(model
            .primary_key(PrimaryKey::compound([("user_id", 1)]))
            .is_err());
        assert!(model
            .primary_key(PrimaryKey::compound([("group_id", 2), ("user_id", 1)]))
            .is_ok());
    }

    #[test]
    fn test_try_clone_fields() {
        let record = user(json!({"id": 1, "name": "Sam", "email": "sam@example.com"}));
        let clone = record
            .try_clone_fields(&FieldSet::from(["id", "name"]))
            .expect("subset");
        assert_eq!(clone.assigned_fields().as_slice(), &["id", "name"]);
        assert_eq!(clone.value("name"), Some(&json!("Sam")));
        assert!(clone.value("email").is_none());

        let err = clone
            .try_clone_fields(&FieldSet::from(["id", "email"]))
            .expect_err("email not assigned");
        match err {
            CoreError::CloneMissingFields { missing, .. } => assert_eq!(missing, vec!["email"]),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_is_equal() {
        let a = user(json!({"id": 1, "name": "Sam"}));
        let b = user(json!({"name": "Sam", "id": 1}));
        let c = user(json!({"id": 1, "name": "Sam", "email": null}));
        let d = user(json!({"id": 1, "name": "Alex"}));

        assert!(a.is_equal(&b));
        assert_eq!(a, b);
        assert_ne!(a, c, "different assigned fields");
        assert_ne!(a, d, "different values");

        let other_model = Arc::new(Model::new("Admin", ["id", "name"], "id").expect("model"));
        let e = ViewRecord::from_json(other_model, json!({"id": 1, "name": "Sam"})).expect("object");
        assert_ne!(a, e, "different model");
    }

    #[test]
    fn test_from_json_rejects_non_object() {
        assert!(matches!(
            ViewRecord::from_json(user_model(), json!([1, 2])),
            Err(CoreError::InvalidRecord { .. })
        ));
    }

    #[test]
    fn test_to_json_and_display() {
        let record = user(json!({"id": 1, "name": "Sam"}));
        assert_eq!(record.to_json(), json!({"id": 1, "name": "Sam"}));
        assert_eq!(record.to_string(), r#"User({"id":1,"name":"Sam"})"#);
    }
}
