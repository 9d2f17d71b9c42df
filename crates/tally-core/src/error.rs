//! # Error Types
//!
//! Domain-specific error types for tally-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  tally-core errors (this file)                                         │
//! │  ├── CoreError         - General domain errors                         │
//! │  ├── ValidationError   - One field that failed a rule                  │
//! │  └── ValidationErrors  - Every failure found in one validate() pass    │
//! │                                                                         │
//! │  tally-db errors (separate crate)                                      │
//! │  └── DbError           - Database / cache failures                     │
//! │                                                                         │
//! │  Flow: ValidationErrors → DbError::Validation → web layer              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, record, computed value)
//! 3. Validation never stops at the first failure

use std::fmt;

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown document kind name (see [`crate::DocumentKind`]).
    #[error("Unknown document kind: {0}")]
    UnknownDocumentKind(String),

    /// Unknown document direction name (see [`crate::Direction`]).
    #[error("Unknown document direction: {0}")]
    UnknownDirection(String),

    /// Validation error (wraps ValidationErrors).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationErrors),
}

// =============================================================================
// Validation Error
// =============================================================================

/// A single field that failed validation.
///
/// Every variant carries the field name so the web layer can highlight it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters (got {actual})")]
    TooLong {
        field: String,
        max: usize,
        actual: usize,
    },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Amount is NaN or infinite.
    #[error("{field} must be a finite number")]
    NotFinite { field: String },

    /// A stored computed amount does not match the recomputed one.
    ///
    /// ## When This Occurs
    /// ```text
    /// unit_price=10, quantity=3, discount=10%
    ///      │
    ///      ▼
    /// expected total = 27.00, stored total = 25.00
    ///      │
    ///      ▼
    /// TotalMismatch { field: "total", expected: 27.0, actual: 25.0, .. }
    /// ```
    #[error("Wrong value of {field} in {context}: expected {expected}, found {actual}")]
    TotalMismatch {
        field: String,
        expected: f64,
        actual: f64,
        context: String,
    },
}

impl ValidationError {
    /// Returns the name of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::TooLong { field, .. }
            | ValidationError::MustBePositive { field }
            | ValidationError::NotFinite { field }
            | ValidationError::TotalMismatch { field, .. } => field,
        }
    }
}

// =============================================================================
// Validation Errors (collection)
// =============================================================================

/// All the failures found while validating one record.
///
/// Never empty when returned as an error: [`ValidationErrors::into_result`]
/// turns an empty collection into `Ok(())`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationErrors(Vec<ValidationError>);

impl ValidationErrors {
    /// Creates an empty collection.
    pub fn new() -> Self {
        ValidationErrors(Vec::new())
    }

    /// Adds a failure.
    pub fn push(&mut self, error: ValidationError) {
        self.0.push(error);
    }

    /// Returns true when nothing failed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of failures.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates over the failures in the order they were found.
    pub fn iter(&self) -> std::slice::Iter<'_, ValidationError> {
        self.0.iter()
    }

    /// Returns true if some failure concerns `field`.
    pub fn has_field(&self, field: &str) -> bool {
        self.0.iter().any(|e| e.field() == field)
    }

    /// Human-readable messages, one per failure.
    pub fn messages(&self) -> Vec<String> {
        self.0.iter().map(ToString::to_string).collect()
    }

    /// `Ok(())` if empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl From<ValidationError> for ValidationErrors {
    fn from(error: ValidationError) -> Self {
        ValidationErrors(vec![error])
    }
}

impl IntoIterator for ValidationErrors {
    type Item = ValidationError;
    type IntoIter = std::vec::IntoIter<ValidationError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let messages = self.messages();
        write!(f, "{}", messages.join("; "))
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
