//! Centralized error types for mboxmd.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mboxmd library.
#[derive(Error, Debug)]
pub enum MboxError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The specified file does not exist.
    #[error("MBOX file not found: {0}")]
    FileNotFound(PathBuf),

    /// The file does not appear to be a valid MBOX.
    #[error("File does not appear to be a valid MBOX: {0}")]
    InvalidMbox(PathBuf),

    /// A raw record could not be parsed into a message.
    #[error("Malformed message: {0}")]
    Malformed(String),

    /// The `Date:` header is missing or does not match the accepted format.
    #[error("Could not parse date header '{value}'")]
    DateParse { value: String },

    /// A per-message failure, tagged with the 1-based archive position.
    #[error("Message {index}: {source}")]
    Message {
        index: usize,
        #[source]
        source: Box<MboxError>,
    },
}

/// Convenience alias for `Result<T, MboxError>`.
pub type Result<T> = std::result::Result<T, MboxError>;

impl MboxError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Attach the archive position of the message being converted.
    pub fn at(index: usize, source: MboxError) -> Self {
        Self::Message {
            index,
            source: Box::new(source),
        }
    }

    /// `true` for errors that stop the whole run regardless of the error policy.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Malformed(_) => false,
            Self::Message { source, .. } => source.is_fatal(),
            _ => true,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `MboxError`
/// when no path context is available (rare, prefer `MboxError::io`).
impl From<std::io::Error> for MboxError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
