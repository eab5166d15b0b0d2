use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use dicom_core::Tag;

use crate::error::{Result, RetrieveError};
use crate::models::{FieldValue, Record, UNDEFINED_TAG};

/// How a constraint compares its value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Equals,
    Like,
}

impl FromStr for Operator {
    type Err = RetrieveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "equals" | "=" => Ok(Operator::Equals),
            "like" | "~" => Ok(Operator::Like),
            other => Err(RetrieveError::NotSupported(format!("operator '{}'", other))),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operator::Equals => f.write_str("="),
            Operator::Like => f.write_str("~"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    pub tag: Tag,
    pub operator: Operator,
    pub value: FieldValue,
}

/// Filter conditions for one record kind
///
/// Constraints on the same tag are alternatives (OR); constraints on
/// different tags must all hold (AND).
#[derive(Debug, Clone)]
pub struct ConstraintSet<R> {
    constraints: Vec<Constraint>,
    _kind: PhantomData<fn() -> R>,
}

impl<R: Record> ConstraintSet<R> {
    pub fn new() -> Self {
        Self {
            constraints: Vec::new(),
            _kind: PhantomData,
        }
    }

    /// Add a constraint; returns `false` when the same triple is already present
    pub fn add(&mut self, tag: Tag, value: impl Into<FieldValue>, operator: Operator) -> Result<bool> {
        check_tag(tag)?;
        let value = value.into();
        if value.is_empty() {
            return Err(RetrieveError::invalid_argument(format!(
                "constraint on {} has no value",
                tag
            )));
        }

        let constraint = Constraint { tag, operator, value };
        if self.constraints.contains(&constraint) {
            return Ok(false);
        }
        self.constraints.push(constraint);
        Ok(true)
    }

    /// Builder form of `add` with `Equals`
    pub fn equals(mut self, tag: Tag, value: impl Into<FieldValue>) -> Result<Self> {
        self.add(tag, value, Operator::Equals)?;
        Ok(self)
    }

    /// Builder form of `add` with `Like`
    pub fn like(mut self, tag: Tag, value: impl Into<FieldValue>) -> Result<Self> {
        self.add(tag, value, Operator::Like)?;
        Ok(self)
    }

    /// All constraints on a tag, in insertion order
    pub fn by_tag(&self, tag: Tag) -> Result<Vec<&Constraint>> {
        check_tag(tag)?;
        Ok(self.constraints.iter().filter(|c| c.tag == tag).collect())
    }

    pub fn contains(&self, tag: Tag) -> Result<bool> {
        check_tag(tag)?;
        Ok(self.constraints.iter().any(|c| c.tag == tag))
    }

    /// Distinct tags in first-seen order
    pub fn tags(&self) -> Vec<Tag> {
        let mut tags: Vec<Tag> = Vec::new();
        for c in &self.constraints {
            if !tags.contains(&c.tag) {
                tags.push(c.tag);
            }
        }
        tags
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Canonical text of the content, independent of insertion order
    pub fn fingerprint(&self) -> String {
        let mut parts: Vec<String> = self
            .constraints
            .iter()
            .map(|c| format!("{:04X}{:04X}{}{:?}", c.tag.0, c.tag.1, c.operator, c.value))
            .collect();
        parts.sort();
        format!("{}|{}", R::KIND, parts.join(";"))
    }
}

impl<R: Record> Default for ConstraintSet<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_tag(tag: Tag) -> Result<()> {
    if tag == UNDEFINED_TAG {
        return Err(RetrieveError::invalid_argument("undefined tag"));
    }
    Ok(())
}
