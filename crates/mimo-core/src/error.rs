//! Unified error types for the MIMO modeling crates
//!
//! This module provides a common error type [`MimoError`] shared by the
//! core data model, the constraint builders, and the record loaders.
//! Configuration errors carry the offending node and field so that a
//! failing assembly names exactly what to fix in the input data.

use thiserror::Error;

/// Unified error type for all MIMO operations.
#[derive(Error, Debug)]
pub enum MimoError {
    /// Invariant violation in a node or emission specification.
    ///
    /// Always raised during model assembly, never at solve time. The
    /// node/field pair identifies the offending declarative record.
    #[error("configuration error in '{node}' ({field}): {message}")]
    Config {
        node: String,
        field: String,
        message: String,
    },

    /// I/O errors (file access etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("parse error: {0}")]
    Parse(String),

    /// Opaque solver outcome, surfaced unchanged (includes infeasibility)
    #[error("solver error: {0}")]
    Solver(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl MimoError {
    /// Build a configuration error naming the node and field at fault.
    pub fn config(
        node: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MimoError::Config {
            node: node.into(),
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Convenience type alias for Results using MimoError.
pub type MimoResult<T> = Result<T, MimoError>;

impl From<anyhow::Error> for MimoError {
    fn from(err: anyhow::Error) -> Self {
        MimoError::Other(err.to_string())
    }
}
