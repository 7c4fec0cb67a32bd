//! Error types for MovieKit.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for MovieKit operations.
#[derive(Error, Debug)]
pub enum MovieError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Session is already open")]
    AlreadyOpen,

    #[error("Session is not open")]
    NotOpen,

    #[error("A {role} session is already open for file: {path}")]
    SessionExists { role: &'static str, path: PathBuf },

    #[error("Encoder error: {0}")]
    Encoder(String),

    #[error("Decoder error: {0}")]
    Decoder(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result type alias for MovieKit operations.
pub type Result<T> = std::result::Result<T, MovieError>;
