//! Error types for the gallery library.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for gallery operations.
///
/// Every variant is terminal for the gallery instance that produced it:
/// a backend that returned an error mid-read never hands out a partial record.
#[derive(Error, Debug)]
pub enum Error {
    /// Source opened for reading does not exist
    #[error("File {0} does not exist")]
    MissingSource(PathBuf),

    /// Fixed header validation failed
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// Stream ended inside a record or frame
    #[error("Unexpected end of stream: needed {needed} bytes, got {got}")]
    Truncated { needed: u64, got: u64 },

    /// Stream ended at the given byte position
    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    /// Frame format code outside the known families
    #[error("Unsupported image format: {0}")]
    UnsupportedFormat(i32),

    /// No backend is registered under the given name
    #[error("Unknown gallery format: {0}")]
    UnknownGallery(String),

    /// Backend does not implement the requested direction
    #[error("Not supported: {0}")]
    NotSupported(&'static str),

    /// Gallery was used for reading and writing
    #[error("Gallery {0} cannot be read and written by the same instance")]
    ModeConflict(String),

    /// Record cannot be represented in the target format
    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    /// Required metadata key is absent
    #[error("Missing metadata field: {0}")]
    MissingField(String),

    /// Descriptor text could not be parsed
    #[error("Invalid gallery descriptor: {0}")]
    InvalidDescriptor(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Filename filter did not compile
    #[error("Invalid filter: {0}")]
    Regex(#[from] regex::Error),

    /// Image collaborator failure
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Hex decoding error
    #[error("Invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    /// UTF-8 conversion error
    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl Error {
    /// Create a malformed header error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    /// Create an invalid record error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }

    /// Map a "not found" I/O error on `path` to [`Error::MissingSource`].
    pub fn from_open(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::NotFound {
            Self::MissingSource(path.into())
        } else {
            Self::Io(err)
        }
    }
}

/// Result type alias for gallery operations.
pub type Result<T> = std::result::Result<T, Error>;
