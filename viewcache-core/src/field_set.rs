//! Field sets and their canonical cache keys.
//!
//! A [`FieldSet`] is the sorted, deduplicated set of field names assigned on a
//! record. Its [`FieldSetKey`] is the string the record cache indexes variants
//! by: the sorted names joined with [`FIELD_SEPARATOR`], which legal field
//! names never contain. Two sets with the same members always produce the
//! same key and distinct sets never collide.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Separator between field names in a [`FieldSetKey`] (ASCII unit separator).
pub const FIELD_SEPARATOR: char = '\u{1f}';

/// Check that `name` can be used as a field name.
///
/// Field names must be non-empty and must not contain [`FIELD_SEPARATOR`].
pub fn validate_field_name(name: &str) -> CoreResult<()> {
    if name.is_empty() {
        return Err(CoreError::InvalidFieldName {
            name: name.to_string(),
            reason: "field names must not be empty".to_string(),
        });
    }
    if name.contains(FIELD_SEPARATOR) {
        return Err(CoreError::InvalidFieldName {
            name: name.to_string(),
            reason: "field names must not contain the unit separator".to_string(),
        });
    }
    Ok(())
}

/// Sorted, deduplicated set of field names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "Vec<String>")]
pub struct FieldSet(Vec<String>);

impl FieldSet {
    /// Build a field set from names in any order; duplicates are dropped.
    ///
    /// Every name must pass [`validate_field_name`]. An empty name or one
    /// containing [`FIELD_SEPARATOR`] would give a key that collides with a
    /// different set. Use [`FieldSet::try_new`] for untrusted names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = Self::normalized(names);
        debug_assert!(
            set.0.iter().all(|name| validate_field_name(name).is_ok()),
            "illegal field name in {:?}",
            set.0
        );
        set
    }

    /// Like [`FieldSet::new`] but rejects illegal field names.
    pub fn try_new<I, S>(names: I) -> CoreResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let set = Self::normalized(names);
        for name in &set.0 {
            validate_field_name(name)?;
        }
        Ok(set)
    }

    fn normalized<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = names.into_iter().map(Into::into).collect();
        names.sort();
        names.dedup();
        Self(names)
    }

    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0
            .binary_search_by(|candidate| candidate.as_str().cmp(name))
            .is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Is every field of `self` present in `other`?
    ///
    /// Both sides are sorted, so this is a single merge walk.
    pub fn is_subset(&self, other: &FieldSet) -> bool {
        if self.0.len() > other.0.len() {
            return false;
        }
        let mut theirs = other.0.iter();
        'outer: for name in &self.0 {
            for candidate in theirs.by_ref() {
                match candidate.cmp(name) {
                    Ordering::Less => continue,
                    Ordering::Equal => continue 'outer,
                    Ordering::Greater => return false,
                }
            }
            return false;
        }
        true
    }

    pub fn is_superset(&self, other: &FieldSet) -> bool {
        other.is_subset(self)
    }

    /// Names in `self` that are absent from `other`, in sorted order.
    pub fn difference(&self, other: &FieldSet) -> Vec<String> {
        self.0
            .iter()
            .filter(|name| !other.contains(name))
            .cloned()
            .collect()
    }

    /// Canonical cache key for this set.
    pub fn key(&self) -> FieldSetKey {
        let mut buf = String::with_capacity(self.0.iter().map(|n| n.len() + 1).sum());
        for (i, name) in self.0.iter().enumerate() {
            if i > 0 {
                buf.push(FIELD_SEPARATOR);
            }
            buf.push_str(name);
        }
        FieldSetKey(buf)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

impl From<Vec<String>> for FieldSet {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<FieldSet> for Vec<String> {
    fn from(set: FieldSet) -> Self {
        set.0
    }
}

impl<const N: usize> From<[&str; N]> for FieldSet {
    fn from(names: [&str; N]) -> Self {
        Self::new(names)
    }
}

impl From<&[&str]> for FieldSet {
    fn from(names: &[&str]) -> Self {
        Self::new(names.iter().copied())
    }
}

impl<S: Into<String>> FromIterator<S> for FieldSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl<'a> IntoIterator for &'a FieldSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<'de> Deserialize<'de> for FieldSet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let names = Vec::<String>::deserialize(deserializer)?;
        Self::try_new(names).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for FieldSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.0.join(", "))
    }
}

/// Canonical string form of a [`FieldSet`].
///
/// Only constructed through [`FieldSet::key`], so every key is known to be
/// sorted and deduplicated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldSetKey(String);

impl FieldSetKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reverse the key back into its field set.
    pub fn fields(&self) -> FieldSet {
        if self.0.is_empty() {
            return FieldSet::empty();
        }
        // Already sorted and unique; skip the normalizing constructor.
        FieldSet(self.0.split(FIELD_SEPARATOR).map(str::to_string).collect())
    }
}

impl fmt::Display for FieldSetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace(FIELD_SEPARATOR, ","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sorts_and_dedups() {
        let set = FieldSet::new(["name", "id", "email", "id"]);
        assert_eq!(set.as_slice(), &["email", "id", "name"]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_key_is_order_independent() {
        let a = FieldSet::from(["id", "name", "email"]);
        let b = FieldSet::from(["email", "name", "id"]);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_roundtrip() {
        let set = FieldSet::from(["id", "name"]);
        assert_eq!(set.key().fields(), set);
        assert_eq!(FieldSet::empty().key().fields(), FieldSet::empty());
    }

    #[test]
    fn test_key_separates_adjacent_names() {
        // "ab" + "c" must not collide with "a" + "bc".
        let a = FieldSet::from(["ab", "c"]);
        let b = FieldSet::from(["a", "bc"]);
        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_subset() {
        let small = FieldSet::from(["id", "name"]);
        let large = FieldSet::from(["email", "id", "name"]);
        let other = FieldSet::from(["id", "age"]);

        assert!(small.is_subset(&large));
        assert!(small.is_subset(&small));
        assert!(!large.is_subset(&small));
        assert!(!other.is_subset(&large));
        assert!(FieldSet::empty().is_subset(&small));
        assert!(large.is_superset(&small));
    }

    #[test]
    fn test_difference() {
        let requested = FieldSet::from(["email", "id", "name"]);
        let assigned = FieldSet::from(["id"]);
        assert_eq!(requested.difference(&assigned), vec!["email", "name"]);
    }

    #[test]
    fn test_contains() {
        let set = FieldSet::from(["id", "name"]);
        assert!(set.contains("id"));
        assert!(!set.contains("email"));
    }

    #[test]
    fn test_try_new_rejects_bad_names() {
        assert!(FieldSet::try_new(["id", ""]).is_err());
        assert!(FieldSet::try_new(["a\u{1f}b"]).is_err());
        assert!(FieldSet::try_new(["id", "name"]).is_ok());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal field name")]
    fn test_new_rejects_separator_in_debug() {
        let _ = FieldSet::from(["a\u{1f}b"]);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "illegal field name")]
    fn test_new_rejects_empty_name_in_debug() {
        let _ = FieldSet::new([""]);
    }

    #[test]
    fn test_serde_rejects_illegal_names() {
        assert!(serde_json::from_str::<FieldSet>(r#"["a\u001fb"]"#).is_err());
        assert!(serde_json::from_str::<FieldSet>(r#"["id",""]"#).is_err());
    }

    #[test]
    fn test_serde_normalizes() {
        let set: FieldSet = serde_json::from_str(r#"["name","id","name"]"#).expect("deserialize");
        assert_eq!(set, FieldSet::from(["id", "name"]));
        assert_eq!(serde_json::to_string(&set).expect("serialize"), r#"["id","name"]"#);
    }

    #[test]
    fn test_display() {
        assert_eq!(FieldSet::from(["name", "id"]).to_string(), "{id, name}");
        assert_eq!(FieldSet::from(["name", "id"]).key().to_string(), "id,name");
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::collection::{btree_set, vec};
    use proptest::prelude::*;

    fn field_name_strategy() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,6}"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(500))]

        /// Property: the key only depends on set membership, not order or repeats.
        #[test]
        fn prop_key_ignores_order(names in vec(field_name_strategy(), 0..8)) {
            let mut reversed = names.clone();
            reversed.reverse();
            reversed.extend(names.iter().cloned());
            prop_assert_eq!(FieldSet::new(names).key(), FieldSet::new(reversed).key());
        }

        /// Property: distinct sets always produce distinct keys.
        #[test]
        fn prop_key_is_injective(
            a in btree_set(field_name_strategy(), 0..6),
            b in btree_set(field_name_strategy(), 0..6),
        ) {
            let set_a = FieldSet::new(a.iter().cloned());
            let set_b = FieldSet::new(b.iter().cloned());
            if a == b {
                prop_assert_eq!(set_a.key(), set_b.key());
            } else {
                prop_assert_ne!(set_a.key(), set_b.key());
            }
        }

        /// Property: the merge-walk subset check agrees with BTreeSet.
        #[test]
        fn prop_subset_matches_btree_set(
            a in btree_set(field_name_strategy(), 0..6),
            b in btree_set(field_name_strategy(), 0..6),
        ) {
            let set_a = FieldSet::new(a.iter().cloned());
            let set_b = FieldSet::new(b.iter().cloned());
            prop_assert_eq!(set_a.is_subset(&set_b), a.is_subset(&b));
        }

        /// Property: reversing a key yields the original set.
        #[test]
        fn prop_key_reverses(names in btree_set(field_name_strategy(), 0..6)) {
            let set = FieldSet::new(names);
            prop_assert_eq!(set.key().fields(), set);
        }
    }
}
