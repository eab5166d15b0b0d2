//! Constraint collections and the two things compiled from them: an
//! in-memory predicate for cached records and the wire-level clause sets
//! for live queries.

pub mod clause;
pub mod constraint;
pub mod predicate;

pub use clause::{expand, ClauseSet};
pub use constraint::{Constraint, ConstraintSet, Operator};
pub use predicate::{compile, Predicate};
