//! Shared Error Types
//!
//! This module defines the error type shared by the domain model and the
//! service layer.
//!
//! # Error Categories
//!
//! - `ValidationError` - Local precondition failures (never reach the network)
//!
//! # Usage
//!
//! ```rust
//! use wardrobe_core::shared::error::SharedError;
//!
//! let error = SharedError::validation("colors", "Select at least one color");
//! assert_eq!(
//!     error.to_string(),
//!     "Validation error in field 'colors': Select at least one color"
//! );
//! ```
//!
//! # Thread Safety
//!
//! All error types are `Send + Sync` and can be safely shared across thread boundaries.
use thiserror::Error;

/// Shared error types that can occur anywhere in the crate
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}
