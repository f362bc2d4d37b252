//! Core identifier and score types with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated contributor identifier.
    ///
    /// Contributor ordering is used to break ties wherever results must be
    /// deterministic (classification buckets, recommendation lists).
    ContributorId, "contributor ID"
);

define_string_id!(
    /// A validated project identifier.
    ProjectId, "project ID"
);

define_string_id!(
    /// A validated project task identifier.
    TaskId, "task ID"
);

define_string_id!(
    /// A validated profile (skill) identifier, e.g. `backend` or `designer`.
    ProfileId, "profile ID"
);

/// A confidence score in the range \[0.0, 1.0\].
///
/// Produced by the assignment advisor to rate a proposed task-to-contributor
/// match.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Creates a confidence value, clamping to \[0.0, 1.0\].
    ///
    /// NaN values become 0.0.
    #[must_use]
    pub const fn clamped(value: f64) -> Self {
        if value.is_nan() || value < 0.0 {
            Self(0.0)
        } else if value > 1.0 {
            Self(1.0)
        } else {
            Self(value)
        }
    }

    #[must_use]
    pub const fn value(self) -> f64 {
        self.0
    }
}

/// Rounds a value to two decimal places.
///
/// All persisted rates and hour totals go through this so that equal inputs
/// always produce byte-identical snapshots.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contributor_id_rejects_empty() {
        assert!(ContributorId::new("").is_err());
        assert!(ContributorId::new("   ").is_err());
        assert!(ContributorId::new("alice").is_ok());
    }

    #[test]
    fn ids_order_lexicographically() {
        let a = ContributorId::new("alice").unwrap();
        let b = ContributorId::new("bob").unwrap();
        assert!(a < b);
    }

    #[test]
    fn profile_id_serializes_as_plain_string() {
        let id = ProfileId::new("backend").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"backend\"");
        let parsed: ProfileId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }

    #[test]
    fn task_id_deserialize_rejects_empty() {
        let result: Result<TaskId, _> = serde_json::from_str("\"\"");
        assert!(result.is_err());
    }

    #[test]
    fn confidence_clamped_saturates() {
        assert!((Confidence::clamped(1.7).value() - 1.0).abs() < f64::EPSILON);
        assert!(Confidence::clamped(-3.0).value().abs() < f64::EPSILON);
        assert!(Confidence::clamped(f64::NAN).value().abs() < f64::EPSILON);
    }

    #[test]
    fn confidence_serializes_as_number() {
        let json = serde_json::to_string(&Confidence::clamped(0.825)).unwrap();
        assert_eq!(json, "0.825");
    }

    #[test]
    fn round2_rounds_half_away_from_zero() {
        assert!((round2(28.571_428) - 28.57).abs() < 1e-9);
        assert!((round2(83.3325) - 83.33).abs() < 1e-9);
        assert!((round2(120.0) - 120.0).abs() < 1e-9);
    }
}
