//! Field validation for engine configuration.

use thiserror::Error;

/// A configuration field with an unusable value.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    /// Name of the offending field.
    pub field: String,
    /// What is wrong with it.
    pub reason: String,
}

impl ValidationError {
    /// Creates an error for `field`.
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Wraps a core error raised while checking `field`.
    pub fn from_core(field: impl Into<String>, error: &recall_core::Error) -> Self {
        Self::new(field, error.to_string())
    }
}

/// Result of validating a value.
pub type ValidationResult = Result<(), ValidationError>;

/// Checks that `value` is finite and positive.
pub fn positive(field: &str, value: f64) -> ValidationResult {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            format!("{value} is not a finite positive number"),
        ))
    }
}

/// Checks that `value` is finite and not negative.
pub fn non_negative(field: &str, value: f64) -> ValidationResult {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::new(
            field,
            format!("{value} is not a finite non-negative number"),
        ))
    }
}
