//! Validation errors shared by every layer

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Machine-readable category of a validation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    /// A required field was empty or absent
    Required,
    /// A value did not parse into the expected enum or format
    InvalidValue,
    /// A numeric or size limit was exceeded
    OutOfRange,
    /// A status change not permitted by the state machine
    InvalidTransition,
    /// An identifier or binding that must be unique was repeated
    Duplicate,
    /// A referenced record does not exist
    NotFound,
}

impl ValidationCode {
    /// Wire name of the code
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::Required => "required",
            ValidationCode::InvalidValue => "invalid_value",
            ValidationCode::OutOfRange => "out_of_range",
            ValidationCode::InvalidTransition => "invalid_transition",
            ValidationCode::Duplicate => "duplicate",
            ValidationCode::NotFound => "not_found",
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recoverable input failure
///
/// Every validation failure names the offending field, a code, and the
/// expected and actual values so upper layers can render a precise response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message} [{code}] (field: {field}, expected: {expected}, actual: {actual})")]
pub struct ValidationError {
    /// Field the failure applies to
    pub field: String,
    /// Failure category
    pub code: ValidationCode,
    /// Human-readable summary
    pub message: String,
    /// What would have been accepted
    pub expected: String,
    /// What was supplied
    pub actual: String,
}

impl ValidationError {
    /// Create a validation error
    pub fn new(
        field: impl Into<String>,
        code: ValidationCode,
        message: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            code,
            message: message.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// A required field was empty
    pub fn required(field: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            field.clone(),
            ValidationCode::Required,
            format!("{} is required", field),
            "non-empty value",
            "empty",
        )
    }

    /// A value outside the accepted set
    pub fn invalid_value(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        let field = field.into();
        Self::new(
            field.clone(),
            ValidationCode::InvalidValue,
            format!("Invalid value for {}", field),
            expected,
            actual,
        )
    }

    /// A repeated identifier or binding
    pub fn duplicate(field: impl Into<String>, actual: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            field.clone(),
            ValidationCode::Duplicate,
            format!("Duplicate {}", field),
            "unique value",
            actual,
        )
    }

    /// A limit was exceeded
    pub fn out_of_range(
        field: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        let field = field.into();
        Self::new(
            field.clone(),
            ValidationCode::OutOfRange,
            format!("{} is out of range", field),
            expected,
            actual,
        )
    }

    /// A referenced record is missing
    pub fn not_found(field: impl Into<String>, actual: impl Into<String>) -> Self {
        let field = field.into();
        Self::new(
            field.clone(),
            ValidationCode::NotFound,
            format!("{} not found", field),
            "existing record",
            actual,
        )
    }
}
