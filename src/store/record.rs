use crate::core::{FieldError, Result, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A stored entity: stable id, business fields and bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record<T> {
    pub id: String,
    pub fields: T,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<T> Record<T> {
    pub fn new(fields: T, now: DateTime<Utc>) -> Self {
        Self {
            id: new_record_id(),
            fields,
            created_at: now,
            updated_at: now,
        }
    }
}

pub fn new_record_id() -> String {
    Uuid::new_v4().to_string()
}

/// Business fields of a record kind.
pub trait RecordFields: Clone + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// Human-facing name; unique per collection, compared case-insensitively.
    fn name(&self) -> &str;
}

/// Outcome of validating raw mutation input.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation<T> {
    Valid(T),
    Invalid(Vec<FieldError>),
}

impl<T> Validation<T> {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn into_result(self) -> Result<T> {
        match self {
            Self::Valid(value) => Ok(value),
            Self::Invalid(fields) => Err(StoreError::Validation(fields)),
        }
    }
}

/// Turns raw input into normalized fields, or reports every offending field.
pub trait Validator: Send + Sync + 'static {
    type Input;
    type Output: RecordFields;

    fn validate(&self, input: Self::Input) -> Validation<Self::Output>;
}

/// Converts between the in-memory collection and the adapter's persisted shape.
///
/// `from_persisted(to_persisted(items))` must reproduce every field of every record.
pub trait Mapper: Send + Sync + 'static {
    type Fields: RecordFields;
    type Persisted: Clone + Send + Sync + 'static;

    fn to_persisted(&self, items: &[Record<Self::Fields>]) -> Self::Persisted;
    fn from_persisted(&self, persisted: Self::Persisted) -> Vec<Record<Self::Fields>>;
}

pub(crate) fn names_collide(left: &str, right: &str) -> bool {
    left.trim().to_lowercase() == right.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_collide_ignores_case_and_padding() {
        assert!(names_collide("Manager", "  manager "));
        assert!(!names_collide("Manager", "Lead Manager"));
    }

    #[test]
    fn invalid_validation_converts_to_validation_error() {
        let outcome: Validation<()> =
            Validation::Invalid(vec![FieldError::new("name", "is required")]);
        assert!(!outcome.is_valid());
        assert!(matches!(
            outcome.into_result(),
            Err(StoreError::Validation(fields)) if fields.len() == 1
        ));
    }
}
