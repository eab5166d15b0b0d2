use std::collections::HashMap;

use dicom_core::Tag;

use crate::error::{Result, RetrieveError};
use crate::models::{Field, Image, Patient, Record, RecordKind, Series, Study};

/// Identity field of every record kind, resolved once at start-up
#[derive(Debug, Clone)]
pub struct IndexRegistry {
    identities: HashMap<RecordKind, Tag>,
}

impl IndexRegistry {
    /// Resolve all built-in kinds; fails if any declares zero or several identities
    pub fn new() -> Result<Self> {
        let mut registry = Self {
            identities: HashMap::new(),
        };
        registry.register::<Patient>()?;
        registry.register::<Study>()?;
        registry.register::<Series>()?;
        registry.register::<Image>()?;
        Ok(registry)
    }

    pub fn register<R: Record>(&mut self) -> Result<()> {
        let field = identity_field::<R>()?;
        self.identities.insert(R::KIND, field.tag);
        Ok(())
    }

    /// Identity tag of a kind
    pub fn identity_tag(&self, kind: RecordKind) -> Result<Tag> {
        self.identities
            .get(&kind)
            .copied()
            .ok_or_else(|| RetrieveError::invalid_state(format!("{} has no registered identity", kind)))
    }

    /// Cache key of a record: its identity value
    pub fn key<R: Record>(&self, record: &R) -> Result<String> {
        let tag = self.identity_tag(R::KIND)?;
        let field = R::field(tag)
            .ok_or_else(|| RetrieveError::invalid_state(format!("{} does not map {}", R::KIND, tag)))?;

        (field.get)(record)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_string())
            .ok_or_else(|| {
                RetrieveError::invalid_argument(format!("{} record has no {}", R::KIND, field.name))
            })
    }
}

/// The single identity field a kind declares
pub fn identity_field<R: Record>() -> Result<&'static Field<R>> {
    let mut identities = R::fields().iter().filter(|f| f.identity);
    match (identities.next(), identities.next()) {
        (Some(field), None) => Ok(field),
        (None, _) => Err(RetrieveError::invalid_state(format!(
            "{} declares no identity field",
            R::KIND
        ))),
        (Some(_), Some(_)) => Err(RetrieveError::invalid_state(format!(
            "{} declares more than one identity field",
            R::KIND
        ))),
    }
}
