//! Error types for MedCat

use thiserror::Error;

/// Result type alias for MedCat operations
pub type Result<T> = std::result::Result<T, MdcError>;

/// Main error type shared by MedCat crates
#[derive(Error, Debug)]
pub enum MdcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Unknown snapshot status: {0}")]
    InvalidStatus(String),
}
