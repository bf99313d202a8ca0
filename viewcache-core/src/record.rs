//! The record contract consumed by the cache.

use crate::{CoreResult, FieldSet, PrimaryKey};

/// An immutable entity record carrying some subset of its model's fields.
///
/// The cache never inspects field values; it only needs the assigned field
/// set, the primary key, and a way to project a record down to fewer fields.
pub trait Record {
    /// Fields actually populated on this instance.
    fn assigned_fields(&self) -> &FieldSet;

    /// Primary key of the entity this record describes.
    ///
    /// Fails with `InvalidRecord` when no key field is assigned at all and
    /// with `MissingPrimaryKey` when only part of a compound key is.
    fn primary_key(&self) -> CoreResult<PrimaryKey>;

    /// New record restricted to `fields`.
    ///
    /// The cache only calls this with a subset of [`Record::assigned_fields`].
    fn clone_fields(&self, fields: &FieldSet) -> Self
    where
        Self: Sized;
}
