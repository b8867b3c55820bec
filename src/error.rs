//! Error types for asynciter
//!
//! Failures surface through the `error` event rather than return values;
//! this module provides the error value those events carry.

use std::fmt;

/// Main error type carried by `error` events and `to_vec` rejections
#[derive(Debug, Clone, PartialEq)]
pub enum IterError {
    /// Error forwarded from an upstream source
    Source(String),
    /// The iterator was destroyed before completion
    Cancelled,
    /// Custom error with message
    Custom(String),
}

impl IterError {
    /// Shorthand for a custom error message
    pub fn custom(msg: impl Into<String>) -> Self {
        IterError::Custom(msg.into())
    }
}

impl fmt::Display for IterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterError::Source(msg) => write!(f, "source error: {}", msg),
            IterError::Cancelled => write!(f, "iterator destroyed"),
            IterError::Custom(msg) => write!(f, "iterator error: {}", msg),
        }
    }
}

impl std::error::Error for IterError {}
