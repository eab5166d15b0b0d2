//! Common types for DIMSE operations

use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::InMemDicomObject;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Query parameters for C-FIND operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindQuery {
    /// Query level (PATIENT, STUDY, SERIES, IMAGE)
    pub query_level: QueryLevel,

    /// Identifier keys in insertion order; an empty value is a return key
    pub keys: Vec<(Tag, String)>,

    /// Maximum number of results to return (0 = unlimited)
    pub max_results: u32,
}

/// Query parameters for C-MOVE operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveQuery {
    /// Query level (PATIENT, STUDY, SERIES, IMAGE)
    pub query_level: QueryLevel,

    /// Identifier keys selecting what to move
    pub keys: Vec<(Tag, String)>,

    /// Destination AE Title for the move operation
    pub destination_aet: String,
}

/// DICOM query/retrieve levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QueryLevel {
    /// Patient level
    Patient,
    /// Study level
    Study,
    /// Series level
    Series,
    /// Image level
    Image,
}

/// A file pushed to the local store listener by a remote node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedFile {
    /// Where the file was written
    pub path: PathBuf,
    pub sop_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub study_instance_uid: Option<String>,
}

impl FindQuery {
    /// Create an empty query at the given level
    pub fn new(query_level: QueryLevel) -> Self {
        Self {
            query_level,
            keys: Vec::new(),
            max_results: 0,
        }
    }

    /// Add a matching key, replacing any earlier value for the same tag
    pub fn with_key(mut self, tag: Tag, value: impl Into<String>) -> Self {
        set_key(&mut self.keys, tag, value.into());
        self
    }

    /// Add a return key unless the tag is already present
    pub fn with_return_key(mut self, tag: Tag) -> Self {
        if !self.keys.iter().any(|(t, _)| *t == tag) {
            self.keys.push((tag, String::new()));
        }
        self
    }

    /// Set maximum number of results
    pub fn with_max_results(mut self, max: u32) -> Self {
        self.max_results = max;
        self
    }

    /// Look up the value queued for a tag
    pub fn key(&self, tag: Tag) -> Option<&str> {
        self.keys
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }
}

impl MoveQuery {
    /// Create a new move query
    pub fn new(query_level: QueryLevel, destination_aet: impl Into<String>) -> Self {
        Self {
            query_level,
            keys: Vec::new(),
            destination_aet: destination_aet.into(),
        }
    }

    /// Add a query parameter
    pub fn with_key(mut self, tag: Tag, value: impl Into<String>) -> Self {
        set_key(&mut self.keys, tag, value.into());
        self
    }

    /// Look up the value queued for a tag
    pub fn key(&self, tag: Tag) -> Option<&str> {
        self.keys
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }
}

impl ReceivedFile {
    /// Read the identifying UIDs of a stored file
    pub fn from_path(path: &Path) -> crate::error::Result<Self> {
        let file = dicom_object::open_file(path)
            .map_err(|e| crate::error::DimseError::DicomObject(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            sop_instance_uid: read_string(&file, tags::SOP_INSTANCE_UID),
            series_instance_uid: read_string(&file, tags::SERIES_INSTANCE_UID),
            study_instance_uid: read_string(&file, tags::STUDY_INSTANCE_UID),
        })
    }
}

/// Read an element as trimmed text; empty or missing values are `None`
pub fn read_string(object: &InMemDicomObject, tag: Tag) -> Option<String> {
    let element = object.element(tag).ok()?;
    let value = element.to_str().ok()?;
    let value = value.trim_end_matches('\0').trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Format a key the way DCMTK's `-k` option expects it
pub fn format_key(tag: Tag, value: &str) -> String {
    format!("{:04X},{:04X}={}", tag.0, tag.1, value)
}

fn set_key(keys: &mut Vec<(Tag, String)>, tag: Tag, value: String) {
    match keys.iter_mut().find(|(t, _)| *t == tag) {
        Some(slot) => slot.1 = value,
        None => keys.push((tag, value)),
    }
}

impl std::fmt::Display for QueryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryLevel::Patient => write!(f, "PATIENT"),
            QueryLevel::Study => write!(f, "STUDY"),
            QueryLevel::Series => write!(f, "SERIES"),
            QueryLevel::Image => write!(f, "IMAGE"),
        }
    }
}

impl std::str::FromStr for QueryLevel {
    type Err = crate::error::DimseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PATIENT" => Ok(QueryLevel::Patient),
            "STUDY" => Ok(QueryLevel::Study),
            "SERIES" => Ok(QueryLevel::Series),
            "IMAGE" => Ok(QueryLevel::Image),
            _ => Err(crate::error::DimseError::config(format!(
                "Invalid query level: {}",
                s
            ))),
        }
    }
}
