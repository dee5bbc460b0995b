//! Error types for the ltr-feature-logger library.
//!
//! All errors are represented by the [`LtrError`] enum. Errors raised by a
//! search backend are wrapped, untouched, in [`LtrError::Backend`] so callers
//! can match on the backend's own failure kind.
//!
//! # Examples
//!
//! ```
//! use ltr_feature_logger::error::{LtrError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(LtrError::invalid_argument("doc_ids must not be empty"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for feature logging operations.
#[derive(Error, Debug)]
pub enum LtrError {
    /// I/O errors (reading configuration or document files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Query construction errors (malformed query DSL)
    #[error("Query error: {0}")]
    Query(String),

    /// Template rendering errors (bad placeholder, missing parameter)
    #[error("Template error: {0}")]
    Template(String),

    /// Model configuration errors
    #[error("Config error: {0}")]
    Config(String),

    /// Invalid argument passed by the caller
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Errors reported by the search backend, propagated unchanged
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic anyhow error
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
}

/// Failures raised by a [`SearchBackend`](crate::backend::SearchBackend).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    /// The target document collection does not exist.
    #[error("no such index [{0}]")]
    IndexNotFound(String),

    /// The backend rejected the query.
    #[error("malformed query: {0}")]
    MalformedQuery(String),

    /// A script failed to compile or execute.
    #[error("script error: {0}")]
    Script(String),

    /// The backend could not be reached.
    #[error("backend unreachable: {0}")]
    Unreachable(String),

    /// Any other non-successful response.
    #[error("unexpected response (status {status}): {body}")]
    Response { status: u16, body: String },

    /// The response body could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Result type alias for operations that may fail with LtrError.
pub type Result<T> = std::result::Result<T, LtrError>;

impl LtrError {
    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        LtrError::Query(msg.into())
    }

    /// Create a new template error.
    pub fn template<S: Into<String>>(msg: S) -> Self {
        LtrError::Template(msg.into())
    }

    /// Create a new config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        LtrError::Config(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        LtrError::InvalidArgument(msg.into())
    }

    /// Returns the backend error if this error came from the search backend.
    pub fn as_backend(&self) -> Option<&BackendError> {
        match self {
            LtrError::Backend(e) => Some(e),
            _ => None,
        }
    }
}
