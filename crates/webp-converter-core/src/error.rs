use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

/// Custom error types for the webp-converter library
#[derive(Error, Debug)]
pub enum Error {
    /// Path resolves outside every configured allowed root
    #[error("access denied, path outside allowed root(s): {}", .0.display())]
    AccessDenied(PathBuf),

    /// Source file missing
    #[error("input file does not exist: {}", .0.display())]
    NotFound(PathBuf),

    /// Extension outside the supported input set (leading dot included)
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    /// Underlying encoder rejected the image
    #[error("image codec error: {0}")]
    Codec(String),

    /// I/O operation error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Inline payload could not be decoded
    #[error("invalid base64 payload: {0}")]
    InvalidPayload(String),

    /// Invalid configuration error
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Tool dispatch or argument error
    #[error("tool error: {0}")]
    Tool(String),
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Codec(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::InvalidPayload(err.to_string())
    }
}
