//! # Error Taxonomy
//!
//! Every public operation of the client returns either a fully populated
//! value or one of the [`ClientError`] variants below. Lower-layer errors are
//! propagated unchanged; the only error the client ever absorbs is a single
//! session-expiry failure, which is retried inside the session manager.

use std::time::Duration;

use thiserror::Error;

use crate::fits::FitsError;

/// Result alias used across the library.
pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Error, Debug)]
pub enum ClientError {
    /// Malformed caller input (empty ids, unusable paths, duplicate keys).
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Local file access failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection-level failure talking to the service.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Response body was not valid JSON of the expected shape.
    #[error("Could not decode response: {0}")]
    Decode(String),

    /// The service answered with `{"status": "error"}`. The message is kept verbatim.
    #[error("error response from astrometry: {message}")]
    Service { message: String },

    /// A session could not be established or re-established.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// The caller asked about a key the tracker has never seen.
    #[error("Submission not tracked: {0}")]
    NotFound(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The image collaborator rejected the file.
    #[error("Image format error: {0}")]
    Format(#[from] FitsError),
}

impl From<serde_json::Error> for ClientError {
    fn from(e: serde_json::Error) -> Self {
        ClientError::Decode(e.to_string())
    }
}
