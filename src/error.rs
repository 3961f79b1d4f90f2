//! Centralized error types for mailjot.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailjot library.
///
/// Per-part problems inside a message (bad charset, nameless attachment,
/// rejected upload) are logged and recovered by the transcoder; only the
/// variants below ever reach a caller.
#[derive(Error, Debug)]
pub enum MailjotError {
    /// I/O error with the associated file path.
    #[error("I/O error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// The message bytes could not be walked as a MIME tree at all.
    #[error("Unparsable message: {0}")]
    UnparsableMessage(String),

    /// The resource store rejected an upload or could not be reached.
    #[error("Failed to upload resource '{filename}': {reason}")]
    ResourceUpload { filename: String, reason: String },

    /// The note store rejected a request.
    #[error("Note store error: {0}")]
    NoteStore(String),

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A JSON payload could not be encoded or decoded.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The character encoding is not supported.
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    /// The configuration is missing a required value or is inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// No notebook matched the configured folder id or title.
    #[error("Folder not found: {0}")]
    FolderNotFound(String),
}

/// Convenience alias for `Result<T, MailjotError>`.
pub type Result<T> = std::result::Result<T, MailjotError>;

impl MailjotError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a `ResourceUpload` variant.
    pub fn upload(filename: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ResourceUpload {
            filename: filename.into(),
            reason: reason.into(),
        }
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare; prefer `MailjotError::io`).
impl From<std::io::Error> for MailjotError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
