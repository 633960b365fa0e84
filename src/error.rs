//! Error types for the docbridge library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`GatewayError`]: a request could not be served. Every operation on
//!   [`crate::gateway::Gateway`] returns `Err(GatewayError)` on failure and the
//!   response formatter turns it into a single human-readable message.
//!   Nothing here is process-fatal: one bad request never stops the service.
//!
//! * [`BackendError`]: a conversion backend could not produce text from a
//!   staged file. The orchestrator folds it into
//!   [`GatewayError::ConversionFailed`] after the staged input is released.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All request-level errors returned by the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    // ── Validation errors ─────────────────────────────────────────────────
    /// Extension missing or not in the accepted set.
    #[error("Unsupported file type for '{filename}'. Allowed: {allowed}")]
    UnsupportedType { filename: String, allowed: String },

    /// Payload exceeds the configured size limit.
    #[error("File too large ({size} bytes). Maximum size: {}MB ({limit} bytes)", .limit / (1024 * 1024))]
    TooLarge { size: u64, limit: u64 },

    // ── Decoding errors ───────────────────────────────────────────────────
    /// Inline payload could not be decoded.
    #[error("Invalid base64 content: {reason}")]
    InvalidEncoding { reason: String },

    // ── Access errors ─────────────────────────────────────────────────────
    /// Server-resident path is outside the allow-listed roots.
    #[error("Access denied: file must be inside one of {roots}")]
    AccessDenied { path: PathBuf, roots: String },

    /// Path is inside the allowed roots but missing or unreadable.
    #[error("File not accessible: {}", .path.display())]
    NotAccessible { path: PathBuf },

    // ── Conversion errors ─────────────────────────────────────────────────
    /// The backend failed to produce text.
    #[error("Conversion failed: {detail}")]
    ConversionFailed { filename: String, detail: String },

    /// The backend did not return within the configured bound.
    #[error("Conversion timed out after {secs}s for '{filename}'")]
    Timeout { filename: String, secs: u64 },

    // ── Resource errors ───────────────────────────────────────────────────
    /// Could not write the staged input file.
    #[error("Failed to stage upload: {source}")]
    StagingFailed {
        #[source]
        source: std::io::Error,
    },

    /// Could not write the output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The output area could not be scanned.
    #[error("Cleanup failed: {source}")]
    SweepFailed {
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse classification used by the response contract and the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Decoding,
    Access,
    Conversion,
    Timeout,
    Resource,
    Internal,
}

impl GatewayError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::UnsupportedType { .. } | GatewayError::TooLarge { .. } => {
                ErrorKind::Validation
            }
            GatewayError::InvalidEncoding { .. } => ErrorKind::Decoding,
            GatewayError::AccessDenied { .. } | GatewayError::NotAccessible { .. } => {
                ErrorKind::Access
            }
            GatewayError::ConversionFailed { .. } => ErrorKind::Conversion,
            GatewayError::Timeout { .. } => ErrorKind::Timeout,
            GatewayError::StagingFailed { .. }
            | GatewayError::OutputWriteFailed { .. }
            | GatewayError::SweepFailed { .. } => ErrorKind::Resource,
            GatewayError::InvalidConfig(_) | GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Message safe to hand back to a caller.
    ///
    /// Resource errors carry host paths and OS detail in their `Display`
    /// form; callers only get the category.
    pub fn user_message(&self) -> String {
        match self {
            GatewayError::StagingFailed { .. } => "Failed to stage upload".to_string(),
            GatewayError::OutputWriteFailed { .. } => "Failed to write output file".to_string(),
            GatewayError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

/// A failure inside a conversion backend.
///
/// Never escapes the gateway as-is: the orchestrator wraps it into
/// [`GatewayError::ConversionFailed`] with the display text as detail.
#[derive(Debug, Clone, Error, Serialize, Deserialize)]
pub enum BackendError {
    /// The backend has no reader for this format.
    #[error("unsupported format: {0}")]
    Unsupported(String),

    /// The file exists but its internal structure is broken.
    #[error("corrupt document: {0}")]
    Corrupt(String),

    /// The PDF is encrypted.
    #[error("document is encrypted and requires a password")]
    PasswordRequired,

    /// Reading the staged file failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// XML/HTML content inside the container could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// The conversion engine itself failed (pdfium binding, worker panic).
    #[error("engine error: {0}")]
    Engine(String),
}

impl From<std::io::Error> for BackendError {
    fn from(e: std::io::Error) -> Self {
        BackendError::Io(e.to_string())
    }
}
