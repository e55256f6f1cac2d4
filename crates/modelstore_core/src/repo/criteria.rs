//! Criteria and change sets, and their resolution against a field registry.
//!
//! # Responsibility
//! - Hold caller-supplied equality filters and field replacements.
//! - Validate them against `Entity::FIELDS` and canonicalize their values
//!   so in-memory matching and SQL binding compare the same plain values.
//!
//! # Invariants
//! - Resolved terms never hold `null`.
//! - Resolved changes never target the identifier.

use crate::model::{Entity, Field, Value, ID_KEY};
use crate::repo::{RepoError, RepoResult};

/// Equality filter: every pair must match (logical AND).
///
/// An empty filter matches every record. The key `id` filters by identifier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    terms: Vec<(String, Value)>,
}

impl Criteria {
    /// Filter matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter with a single `field == value` term.
    pub fn by(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(field, value)
    }

    /// Adds a term; a repeated field replaces the earlier value.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        upsert(&mut self.terms, field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.terms.iter().map(|(field, value)| (field.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Criteria {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |criteria, (field, value)| criteria.and(field, value))
    }
}

/// Field replacements applied to every matching record.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    assignments: Vec<(String, Value)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment; a repeated field replaces the earlier value.
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        upsert(&mut self.assignments, field.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.assignments
            .iter()
            .map(|(field, value)| (field.as_str(), value))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Changes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |changes, (field, value)| changes.set(field, value))
    }
}

fn upsert(pairs: &mut Vec<(String, Value)>, field: String, value: Value) {
    match pairs.iter_mut().find(|(existing, _)| *existing == field) {
        Some(pair) => pair.1 = value,
        None => pairs.push((field, value)),
    }
}

/// Column addressed by a criteria term.
pub(crate) enum Column<E: 'static> {
    Id,
    Field(&'static Field<E>),
}

impl<E: Entity> Column<E> {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Id => ID_KEY,
            Self::Field(field) => field.name,
        }
    }

    fn read(&self, entity: &E) -> Value {
        match self {
            Self::Id => Value::from(entity.id()),
            Self::Field(field) => field.read(entity),
        }
    }
}

/// One validated `column == value` test with a canonical value.
pub(crate) struct Term<E: 'static> {
    pub(crate) column: Column<E>,
    pub(crate) value: Value,
}

/// One validated field replacement with a canonical value.
pub(crate) struct Assignment<E: 'static> {
    pub(crate) field: &'static Field<E>,
    pub(crate) value: Value,
}

impl<E> std::fmt::Debug for Assignment<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assignment")
            .field("field", &self.field)
            .field("value", &self.value)
            .finish()
    }
}

pub(crate) fn resolve_criteria<E: Entity>(criteria: &Criteria) -> RepoResult<Vec<Term<E>>> {
    criteria
        .iter()
        .map(|(name, value)| {
            if value.is_null() {
                return Err(invalid(name, "null is not a comparable value"));
            }

            if name == ID_KEY {
                return match value {
                    Value::String(_) => Ok(Term {
                        column: Column::Id,
                        value: value.clone(),
                    }),
                    other => Err(invalid(name, format!("identifier must be a string, found `{other}`"))),
                };
            }

            let field = lookup::<E>(name)?;
            let value = field
                .canonicalize(value.clone())
                .map_err(|err| invalid(name, err.to_string()))?;
            Ok(Term {
                column: Column::Field(field),
                value,
            })
        })
        .collect()
}

pub(crate) fn resolve_changes<E: Entity>(changes: &Changes) -> RepoResult<Vec<Assignment<E>>> {
    changes
        .iter()
        .map(|(name, value)| {
            if name == ID_KEY {
                return Err(invalid(name, "the identifier is immutable"));
            }

            let field = lookup::<E>(name)?;
            let value = field
                .canonicalize(value.clone())
                .map_err(|err| invalid(name, err.to_string()))?;
            Ok(Assignment { field, value })
        })
        .collect()
}

pub(crate) fn matches<E: Entity>(entity: &E, terms: &[Term<E>]) -> bool {
    terms.iter().all(|term| term.column.read(entity) == term.value)
}

pub(crate) fn apply_changes<E: Entity>(
    entity: &mut E,
    assignments: &[Assignment<E>],
) -> RepoResult<()> {
    for assignment in assignments {
        assignment
            .field
            .write(entity, assignment.value.clone())?;
    }
    Ok(())
}

fn lookup<E: Entity>(name: &str) -> RepoResult<&'static Field<E>> {
    E::field(name).ok_or_else(|| invalid(name, format!("{} has no such field", E::TYPE_NAME)))
}

fn invalid(field: &str, reason: impl Into<String>) -> RepoError {
    RepoError::InvalidCriteria {
        field: field.to_string(),
        reason: reason.into(),
    }
}
