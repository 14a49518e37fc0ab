//! Error types for the Pilum library.
//!
//! All fallible operations return [`PilumError`]. The variants follow the
//! failure classes of a query build: bad configuration, failed index reads,
//! malformed rewritten-query input and failures during second-pass rescoring.
//!
//! # Examples
//!
//! ```
//! use pilum::error::{PilumError, Result};
//!
//! fn pick_model(name: &str) -> Result<()> {
//!     Err(PilumError::configuration(format!("unknown field boost model: {name}")))
//! }
//!
//! assert!(pick_model("bogus").is_err());
//! ```

use std::io;

use thiserror::Error;

/// Boxed source error carried by [`PilumError::IndexAccess`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for Pilum operations.
#[derive(Error, Debug)]
pub enum PilumError {
    /// Invalid or unknown settings. The build is aborted and no partial tree
    /// is returned.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Failure while reading statistics or postings from the index.
    #[error("Index access error: {message}")]
    IndexAccess {
        /// What was being read.
        message: String,
        /// The underlying cause, if any.
        #[source]
        source: Option<BoxError>,
    },

    /// Malformed rewritten-query input (upstream contract violation).
    #[error("Structural error: {0}")]
    Structural(String),

    /// Failure during second-pass rescoring.
    #[error("Rerank error: {0}")]
    Rerank(#[source] Box<PilumError>),

    /// API misuse detected at runtime.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for operations that may fail with PilumError.
pub type Result<T> = std::result::Result<T, PilumError>;

impl PilumError {
    /// Create a new configuration error.
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        PilumError::Configuration(msg.into())
    }

    /// Create a new index access error without a source.
    pub fn index_access<S: Into<String>>(msg: S) -> Self {
        PilumError::IndexAccess {
            message: msg.into(),
            source: None,
        }
    }

    /// Wrap an underlying error raised while accessing the index.
    pub fn index_access_caused_by<S, E>(msg: S, source: E) -> Self
    where
        S: Into<String>,
        E: Into<BoxError>,
    {
        PilumError::IndexAccess {
            message: msg.into(),
            source: Some(source.into()),
        }
    }

    /// Create a new structural error.
    pub fn structural<S: Into<String>>(msg: S) -> Self {
        PilumError::Structural(msg.into())
    }

    /// Wrap an error raised during rescoring.
    pub fn rerank(cause: PilumError) -> Self {
        PilumError::Rerank(Box::new(cause))
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        PilumError::InvalidOperation(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_error_construction() {
        let error = PilumError::configuration("unknown field boost model: foo");
        assert_eq!(
            error.to_string(),
            "Configuration error: unknown field boost model: foo"
        );

        let error = PilumError::structural("empty group");
        assert_eq!(error.to_string(), "Structural error: empty group");

        let error = PilumError::index_access("segment 3 unreadable");
        assert_eq!(error.to_string(), "Index access error: segment 3 unreadable");
    }

    #[test]
    fn test_index_access_keeps_source() {
        let io_error = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated terms");
        let error = PilumError::index_access_caused_by("reading title:laptop", io_error);

        let source = error.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("truncated terms"));
    }

    #[test]
    fn test_rerank_wraps_cause() {
        let error = PilumError::rerank(PilumError::index_access("boom"));
        assert_eq!(error.to_string(), "Rerank error: Index access error: boom");
        assert!(matches!(
            error,
            PilumError::Rerank(inner) if matches!(*inner, PilumError::IndexAccess { .. })
        ));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let pilum_error = PilumError::from(io_error);

        match pilum_error {
            PilumError::Io(_) => {} // Expected
            _ => panic!("Expected IO error variant"),
        }
    }
}
