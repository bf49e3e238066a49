//! Record model and the record store interface

use crate::blob::Reference;
use crate::error::StoreError;
use async_trait::async_trait;
use blobshift_codec::{detect, Detection};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};

/// Opaque record identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Create from any string-like identifier
    #[inline]
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow as str
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// The two attachment fields a record carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FieldName {
    #[serde(rename = "beforeRef")]
    BeforeRef,
    #[serde(rename = "afterRef")]
    AfterRef,
}

impl FieldName {
    /// Every field, in record order
    pub const ALL: [FieldName; 2] = [FieldName::BeforeRef, FieldName::AfterRef];

    /// Column name in the record store
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::BeforeRef => "beforeRef",
            FieldName::AfterRef => "afterRef",
        }
    }
}

impl Display for FieldName {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one attachment field
///
/// Classified once when the record is read; nothing downstream
/// re-inspects string prefixes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Null or missing column; never examined
    Absent,
    /// Present but blank
    Empty,
    /// Inline data-URI, possibly malformed
    Legacy(String),
    /// Anything else, treated as an issued reference
    Canonical(String),
}

impl FieldValue {
    /// Classify a raw column value
    #[must_use]
    pub fn classify(raw: Option<String>) -> Self {
        match raw {
            None => Self::Absent,
            Some(value) if value.trim().is_empty() => Self::Empty,
            Some(value) => match detect(&value) {
                Detection::Legacy(_) => Self::Legacy(value),
                Detection::NotLegacy => Self::Canonical(value),
            },
        }
    }

    /// Whether the column held a value at all
    #[inline]
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Absent or blank
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Absent | Self::Empty)
    }

    #[inline]
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

impl From<Reference> for FieldValue {
    fn from(reference: Reference) -> Self {
        Self::Canonical(reference.into_string())
    }
}

/// A record carrying up to two attachment fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    pub before_ref: FieldValue,
    pub after_ref: FieldValue,
}

impl Record {
    /// Build a record from raw column values
    #[must_use]
    pub fn from_raw(
        id: impl Into<RecordId>,
        before_ref: Option<String>,
        after_ref: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            before_ref: FieldValue::classify(before_ref),
            after_ref: FieldValue::classify(after_ref),
        }
    }

    /// Value of one field
    #[inline]
    #[must_use]
    pub fn field(&self, name: FieldName) -> &FieldValue {
        match name {
            FieldName::BeforeRef => &self.before_ref,
            FieldName::AfterRef => &self.after_ref,
        }
    }

    /// Mutable value of one field
    #[inline]
    pub fn field_mut(&mut self, name: FieldName) -> &mut FieldValue {
        match name {
            FieldName::BeforeRef => &mut self.before_ref,
            FieldName::AfterRef => &mut self.after_ref,
        }
    }

    /// Whether the scanner's selection predicate holds
    #[inline]
    #[must_use]
    pub fn has_candidate(&self) -> bool {
        !self.before_ref.is_empty() || !self.after_ref.is_empty()
    }

    /// Apply a patch in place
    pub fn apply(&mut self, patch: &RecordPatch) {
        for (field, reference) in patch.iter() {
            *self.field_mut(field) = FieldValue::from(reference.clone());
        }
    }
}

/// Partial update: only fields that received a canonical reference
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RecordPatch(BTreeMap<FieldName, Reference>);

impl RecordPatch {
    /// Create empty patch
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field
    #[inline]
    pub fn set(&mut self, field: FieldName, reference: Reference) {
        self.0.insert(field, reference);
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Patched fields
    pub fn fields(&self) -> impl Iterator<Item = FieldName> + '_ {
        self.0.keys().copied()
    }

    /// Patched fields with their references
    pub fn iter(&self) -> impl Iterator<Item = (FieldName, &Reference)> + '_ {
        self.0.iter().map(|(field, reference)| (*field, reference))
    }
}

/// Record store backend
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// One pass over every record with at least one non-empty field.
    ///
    /// The filter is deliberately wider than "has a legacy field";
    /// classification happens on the client.
    fn scan(&self) -> BoxStream<'_, Result<Record, StoreError>>;

    /// Atomic partial update of a single record
    async fn update(&self, id: &RecordId, patch: &RecordPatch) -> Result<(), StoreError>;

    /// Cheap authenticated request used before any record is touched
    async fn check_access(&self) -> Result<(), StoreError>;
}
