use crate::error::{Result, RetrieveError};
use crate::models::{FieldValue, Record};

use super::constraint::{ConstraintSet, Operator};

/// In-memory test over cached records of one kind
pub type Predicate<R> = Box<dyn Fn(&R) -> bool + Send + Sync>;

struct TagTest<R> {
    get: fn(&R) -> Option<FieldValue>,
    alternatives: Vec<(Operator, FieldValue)>,
}

impl<R> TagTest<R> {
    fn matches(&self, record: &R) -> bool {
        let actual = (self.get)(record);
        self.alternatives.iter().any(|(op, expected)| match &actual {
            // an absent field only satisfies an absent value
            None => expected.is_empty(),
            Some(actual) => match op {
                Operator::Equals => actual == expected,
                Operator::Like => actual.contains(expected),
            },
        })
    }
}

/// Compile constraints into a predicate: OR within a tag, AND across tags
///
/// An empty set accepts every record. Tags the record kind does not map
/// fail with `InvalidArgument`.
pub fn compile<R: Record>(constraints: &ConstraintSet<R>) -> Result<Predicate<R>> {
    let mut tests: Vec<TagTest<R>> = Vec::new();

    for tag in constraints.tags() {
        let field = R::field(tag).ok_or_else(|| {
            RetrieveError::invalid_argument(format!("{} is not a {} field", tag, R::KIND))
        })?;
        let mut alternatives = Vec::new();
        for c in constraints.by_tag(tag)? {
            let value = match c.operator {
                // compare in the field's own type, the way the wire does
                Operator::Equals => FieldValue::parse(field.kind, &c.value.to_string())
                    .ok_or_else(|| {
                        RetrieveError::invalid_argument(format!(
                            "{:?} is not a valid {} value",
                            c.value.to_string(),
                            field.name
                        ))
                    })?,
                Operator::Like => c.value.clone(),
            };
            alternatives.push((c.operator, value));
        }
        tests.push(TagTest {
            get: field.get,
            alternatives,
        });
    }

    Ok(Box::new(move |record: &R| tests.iter().all(|t| t.matches(record))))
}
