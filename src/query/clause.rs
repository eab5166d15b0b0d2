use dicom_core::Tag;
use dimse::FindQuery;

use crate::error::Result;
use crate::models::Record;

use super::constraint::{ConstraintSet, Operator};

/// Wildcard marker wrapped around `Like` values
pub const WILDCARD: char = '*';

/// One AND-only query unit: at most one value per tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClauseSet {
    entries: Vec<(Tag, String)>,
}

impl ClauseSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the value for a tag, replacing an earlier one
    pub fn insert(&mut self, tag: Tag, value: impl Into<String>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((tag, value)),
        }
    }

    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (Tag, &str)> {
        self.entries.iter().map(|(t, v)| (*t, v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// C-FIND identifier at the record's level
    ///
    /// Every mapped field without a clause value goes out as a return key.
    pub fn to_find_query<R: Record>(&self) -> FindQuery {
        let mut query = FindQuery::new(R::KIND.query_level());
        for (tag, value) in self.iter() {
            query = query.with_key(tag, value);
        }
        for field in R::fields() {
            query = query.with_return_key(field.tag);
        }
        query
    }
}

/// Expand constraints into every clause set needed to emulate OR on the wire
///
/// The result is the cartesian product of each tag's alternatives. Tags
/// vary in first-seen order (earliest slowest), alternatives in insertion
/// order. No constraints yields one empty "match all" clause set.
pub fn expand<R: Record>(constraints: &ConstraintSet<R>) -> Result<Vec<ClauseSet>> {
    let mut product = vec![ClauseSet::new()];

    for tag in constraints.tags() {
        let alternatives: Vec<String> = constraints
            .by_tag(tag)?
            .into_iter()
            .map(|c| match c.operator {
                Operator::Equals => c.value.to_string(),
                Operator::Like => format!("{}{}{}", WILDCARD, c.value, WILDCARD),
            })
            .collect();

        let mut next = Vec::with_capacity(product.len() * alternatives.len());
        for clause in &product {
            for value in &alternatives {
                let mut extended = clause.clone();
                extended.insert(tag, value.clone());
                next.push(extended);
            }
        }
        product = next;
    }

    Ok(product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Patient, Study};
    use chrono::NaiveDate;
    use dicom_dictionary_std::tags;
    use dimse::QueryLevel;

    #[test]
    fn test_empty_set_yields_match_all() {
        let clauses = expand(&ConstraintSet::<Patient>::new()).unwrap();
        assert_eq!(clauses, vec![ClauseSet::new()]);
    }

    #[test]
    fn test_or_on_one_tag_fans_out() {
        let set = ConstraintSet::<Patient>::new()
            .equals(tags::PATIENT_NAME, "Doe^John")
            .unwrap()
            .equals(tags::PATIENT_ID, "1510180012")
            .unwrap()
            .equals(tags::PATIENT_ID, "151018/0012")
            .unwrap();

        let clauses = expand(&set).unwrap();
        assert_eq!(clauses.len(), 2);
        for clause in &clauses {
            assert_eq!(clause.get(tags::PATIENT_NAME), Some("Doe^John"));
            assert_eq!(clause.len(), 2);
        }
        assert_eq!(clauses[0].get(tags::PATIENT_ID), Some("1510180012"));
        assert_eq!(clauses[1].get(tags::PATIENT_ID), Some("151018/0012"));
    }

    #[test]
    fn test_product_size_and_order() {
        let set = ConstraintSet::<Study>::new()
            .equals(tags::MODALITIES_IN_STUDY, "CT")
            .unwrap()
            .equals(tags::MODALITIES_IN_STUDY, "MR")
            .unwrap()
            .equals(tags::PATIENT_ID, "1")
            .unwrap()
            .equals(tags::PATIENT_ID, "2")
            .unwrap()
            .equals(tags::PATIENT_ID, "3")
            .unwrap();

        let clauses = expand(&set).unwrap();
        assert_eq!(clauses.len(), 6);

        let pairs: Vec<(&str, &str)> = clauses
            .iter()
            .map(|c| {
                (
                    c.get(tags::MODALITIES_IN_STUDY).unwrap(),
                    c.get(tags::PATIENT_ID).unwrap(),
                )
            })
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("CT", "1"),
                ("CT", "2"),
                ("CT", "3"),
                ("MR", "1"),
                ("MR", "2"),
                ("MR", "3"),
            ]
        );
    }

    #[test]
    fn test_value_formatting() {
        let set = ConstraintSet::<Study>::new()
            .like(tags::STUDY_DESCRIPTION, "HEAD")
            .unwrap()
            .equals(tags::STUDY_DATE, NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
            .unwrap();

        let clauses = expand(&set).unwrap();
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].get(tags::STUDY_DESCRIPTION), Some("*HEAD*"));
        assert_eq!(clauses[0].get(tags::STUDY_DATE), Some("20240229"));
    }

    #[test]
    fn test_find_query_adds_return_keys() {
        let mut clause = ClauseSet::new();
        clause.insert(tags::PATIENT_NAME, "*Doe*");

        let query = clause.to_find_query::<Patient>();
        assert_eq!(query.query_level, QueryLevel::Patient);
        assert_eq!(query.keys[0], (tags::PATIENT_NAME, "*Doe*".to_string()));
        assert_eq!(query.key(tags::PATIENT_ID), Some(""));
        assert_eq!(query.keys.len(), Patient::fields().len());
    }

    #[test]
    fn test_insert_keeps_one_value_per_tag() {
        let mut clause = ClauseSet::new();
        clause.insert(tags::PATIENT_ID, "1");
        clause.insert(tags::PATIENT_ID, "2");
        assert_eq!(clause.len(), 1);
        assert_eq!(clause.get(tags::PATIENT_ID), Some("2"));
    }
}
