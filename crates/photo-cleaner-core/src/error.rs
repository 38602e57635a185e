use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::scan::{SessionId, SessionStatus};

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the photo-cleaner library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The blob is not an image format (or archive) the decoder understands
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// The blob claims a known format but could not be decoded
    #[error("Corrupt image data: {0}")]
    CorruptData(String),

    /// Decoding and hashing a single file took longer than allowed
    #[error("Decoding {name} timed out after {timeout:?}")]
    DecodeTimeout { name: String, timeout: Duration },

    /// A zip entry is nested deeper than the configured limit
    #[error("Archive {name} is nested deeper than {limit} levels")]
    ArchiveTooDeep { name: String, limit: usize },

    /// Expanding an archive would exceed its entry or byte budget
    #[error("Archive {name} exceeds its expansion budget: {reason}")]
    ArchiveTooLarge { name: String, reason: String },

    /// The similarity index is inconsistent; results can no longer be trusted
    #[error("Similarity index fault: {0}")]
    IndexFault(String),

    #[error("Scan session not found: {0}")]
    SessionNotFound(SessionId),

    /// Operation not allowed in the session's current status
    #[error("Cannot {action} session {session} while it is {status}")]
    InvalidState {
        session: SessionId,
        status: SessionStatus,
        action: &'static str,
    },

    #[error("Results for session {0} are not ready (status: {1})")]
    ResultsNotReady(SessionId, SessionStatus),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => Error::UnsupportedFormat(e.to_string()),
            other => Error::CorruptData(other.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for Error {
    fn from(err: zip::result::ZipError) -> Self {
        Error::CorruptData(format!("invalid zip archive: {}", err))
    }
}

/// Why a single file could not be fingerprinted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    UnsupportedFormat,
    CorruptData,
    DecodeTimeout,
    ArchiveTooDeep,
    ArchiveTooLarge,
    Io,
}

impl Error {
    /// Classify a per-file error. Session-level errors return `None`.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Error::UnsupportedFormat(_) => Some(FailureKind::UnsupportedFormat),
            Error::CorruptData(_) => Some(FailureKind::CorruptData),
            Error::DecodeTimeout { .. } => Some(FailureKind::DecodeTimeout),
            Error::ArchiveTooDeep { .. } => Some(FailureKind::ArchiveTooDeep),
            Error::ArchiveTooLarge { .. } => Some(FailureKind::ArchiveTooLarge),
            Error::Io(_) => Some(FailureKind::Io),
            _ => None,
        }
    }
}
