//! Records retrieved from the archive and their declarative field tables
//!
//! Every record kind declares, once, which tag each field maps to, how its
//! text is parsed, and which single field carries the record's identity.
//! Predicate compilation, clause expansion, identifier parsing, and cache
//! keys all read the same table.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use dicom_core::Tag;
use dicom_object::InMemDicomObject;
use dimse::QueryLevel;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub mod entities;
pub mod value;

pub use entities::{Image, Patient, Series, Study};
pub use value::{FieldValue, ValueKind};

/// Sentinel for "no tag"; never valid in a constraint
pub const UNDEFINED_TAG: Tag = Tag(0xFFFF, 0xFFFF);

/// The closed set of record kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKind {
    Patient,
    Study,
    Series,
    Image,
}

impl RecordKind {
    pub const ALL: [RecordKind; 4] = [
        RecordKind::Patient,
        RecordKind::Study,
        RecordKind::Series,
        RecordKind::Image,
    ];

    pub fn query_level(&self) -> QueryLevel {
        match self {
            RecordKind::Patient => QueryLevel::Patient,
            RecordKind::Study => QueryLevel::Study,
            RecordKind::Series => QueryLevel::Series,
            RecordKind::Image => QueryLevel::Image,
        }
    }

    /// Name of the cache table holding this kind
    pub fn table_name(&self) -> &'static str {
        match self {
            RecordKind::Patient => "patient",
            RecordKind::Study => "study",
            RecordKind::Series => "series",
            RecordKind::Image => "image",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// One row of a record kind's field table
pub struct Field<R> {
    pub tag: Tag,
    pub name: &'static str,
    pub kind: ValueKind,
    /// Marks the field that identifies the record
    pub identity: bool,
    pub get: fn(&R) -> Option<FieldValue>,
    pub set: fn(&mut R, FieldValue),
}

impl<R> Field<R> {
    pub fn new(
        tag: Tag,
        name: &'static str,
        kind: ValueKind,
        get: fn(&R) -> Option<FieldValue>,
        set: fn(&mut R, FieldValue),
    ) -> Self {
        Self {
            tag,
            name,
            kind,
            identity: false,
            get,
            set,
        }
    }

    pub fn identity(mut self) -> Self {
        self.identity = true;
        self
    }
}

impl<R> fmt::Debug for Field<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("tag", &self.tag)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("identity", &self.identity)
            .finish()
    }
}

/// An entity retrievable from the archive
pub trait Record:
    Clone + fmt::Debug + Default + Hash + Send + Sync + Serialize + DeserializeOwned + 'static
{
    const KIND: RecordKind;

    /// The kind's field table
    fn fields() -> &'static [Field<Self>];

    /// Table row for a tag
    fn field(tag: Tag) -> Option<&'static Field<Self>> {
        Self::fields().iter().find(|f| f.tag == tag)
    }

    /// Hash of the identity field value, when the kind declares one and it is set
    ///
    /// Records without it are deduplicated on their natural hash instead.
    fn identity_hash(&self) -> Option<u64> {
        let field = Self::fields().iter().find(|f| f.identity)?;
        let value = (field.get)(self)?;
        let mut hasher = DefaultHasher::new();
        Self::KIND.hash(&mut hasher);
        value.hash(&mut hasher);
        Some(hasher.finish())
    }

    /// Build a record from a returned identifier; unparsable values stay unset
    fn from_dataset(object: &InMemDicomObject) -> Self {
        let mut record = Self::default();
        for field in Self::fields() {
            let Some(raw) = dimse::types::read_string(object, field.tag) else {
                continue;
            };
            match FieldValue::parse(field.kind, &raw) {
                Some(value) => (field.set)(&mut record, value),
                None => debug!("Ignoring unparsable {} value {:?}", field.name, raw),
            }
        }
        record
    }
}

/// Natural hash of a whole record
pub fn natural_hash<T: Hash>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}
