//! Error types for the docgen-client library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`UploadError`] is **fatal**: the operation cannot proceed at all
//!   (wrong file type, nothing selected, bad endpoint, retries exhausted).
//!   Returned as `Err(UploadError)` from the library helpers and from
//!   [`crate::state::UploadState::into_result`].
//!
//! * [`AttemptError`] is **non-fatal**: a single submission attempt failed
//!   (connection refused, HTTP 500, malformed body). The controller records
//!   it, notifies the observer and tries again until the retry bound is hit.
//!
//! The controller itself never returns either type to its caller: it folds
//! them into the error slot of [`crate::state::UploadState`].

use std::path::PathBuf;
use thiserror::Error;

/// User-facing message for a file with the wrong media type.
pub const WRONG_TYPE_MESSAGE: &str = "Please upload a valid .docx file.";

/// User-facing message for a submit without a selected file.
pub const NO_FILE_MESSAGE: &str = "No file selected.";

/// User-facing message once every attempt has failed.
pub const EXHAUSTED_MESSAGE: &str =
    "Failed to generate PDF after multiple attempts. Please try again later.";

/// User-facing message when an in-flight upload is abandoned.
pub const INTERRUPTED_MESSAGE: &str = "Upload interrupted before completion.";

/// All fatal errors returned by the docgen-client library.
///
/// Per-attempt failures use [`AttemptError`] and are retried rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum UploadError {
    // ── Validation errors ────────────────────────────────────────────────
    /// The selected file does not declare the accepted media type.
    #[error("Please upload a valid .docx file. ('{file_name}' is {media_type})")]
    WrongMediaType {
        file_name: String,
        media_type: String,
    },

    /// Submit was requested before a valid file was selected.
    #[error("No file selected.")]
    NoFileSelected,

    // ── Input errors ─────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// Reading the file failed for another reason.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Service errors ───────────────────────────────────────────────────
    /// Every attempt failed.
    #[error("Failed to generate PDF after {attempts} attempts. Please try again later.\nLast error: {last_error}")]
    AttemptsExhausted { attempts: u32, last_error: String },

    /// The upload was abandoned before an outcome was recorded.
    #[error("Upload interrupted before completion.")]
    Interrupted,

    /// The state was not terminal when a result was requested.
    #[error("Upload has not finished (state: {state})")]
    NotFinished { state: String },

    /// The service health check failed.
    #[error("Conversion service at '{url}' is unreachable: {reason}")]
    ServiceUnavailable { url: String, reason: String },

    // ── Output errors ────────────────────────────────────────────────────
    /// Fetching the generated document failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'")]
    DownloadTimeout { url: String, secs: u64 },

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The generated document could not be previewed.
    #[error("Preview failed: {0}")]
    PreviewFailed(String),

    // ── Config errors ────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The endpoint is not an absolute HTTP/HTTPS URL.
    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    // ── Catch-all ────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single submission attempt.
///
/// Every variant is retried: the service is a black box, so a 400 is
/// treated no differently from a dropped connection.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AttemptError {
    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service answered with a non-success status.
    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The body could not be decoded.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),

    /// The JSON body lacked the result field.
    #[error("response has no '{field}' field")]
    MissingResultField { field: String },
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        AttemptError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_media_type_display() {
        let e = UploadError::WrongMediaType {
            file_name: "notes.txt".into(),
            media_type: "text/plain".into(),
        };
        let msg = e.to_string();
        assert!(msg.starts_with(WRONG_TYPE_MESSAGE), "got: {msg}");
        assert!(msg.contains("text/plain"));
    }

    #[test]
    fn exhausted_display() {
        let e = UploadError::AttemptsExhausted {
            attempts: 3,
            last_error: "HTTP 502".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("3 attempts"), "got: {msg}");
        assert!(msg.contains("HTTP 502"));
    }

    #[test]
    fn status_display() {
        let e = AttemptError::Status {
            status: 500,
            body: "boom".into(),
        };
        assert_eq!(e.to_string(), "service returned HTTP 500: boom");
    }

    #[test]
    fn missing_field_display() {
        let e = AttemptError::MissingResultField {
            field: "pdf_url".into(),
        };
        assert!(e.to_string().contains("pdf_url"));
    }
}
