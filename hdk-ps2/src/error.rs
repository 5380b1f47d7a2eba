//! Error types for PS2 Classics operations

use thiserror::Error;

/// Main error type for PS2 Classics operations
#[derive(Debug, Error)]
pub enum Ps2Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid ISO image: {0}")]
    InvalidIso(String),
    #[error("Invalid key: {0}")]
    InvalidKey(String),
    #[error("Corrupted file: {0}")]
    CorruptedFile(String),
    #[error("Insufficient disk space: needed {required}, available {available}")]
    InsufficientSpace { required: u64, available: u64 },
    #[error("Invalid PS2 header: {0}")]
    InvalidHeader(String),
    #[error("Invalid PS2 header magic: {0:02X?}")]
    InvalidHeaderMagic([u8; 4]),
    #[error("Disc number must be 1-9, got {0}")]
    InvalidDiscNumber(u8),
    #[error("content ID \"{0}\" exceeds 48 bytes")]
    ContentIdTooLong(String),
    #[error("{field} must be ASCII: {value:?}")]
    NonAsciiField { field: &'static str, value: String },
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
    #[error("Cryptographic operation failed: {0}")]
    CryptoError(#[from] CryptoError),
    #[error("Buffer too small: needed {needed}, got {available}")]
    BufferTooSmall { needed: usize, available: usize },
}

/// Cryptographic operation errors
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Input length {0} is not a multiple of 16 bytes")]
    InvalidLength(usize),
    #[error("Output buffer too small: needed {needed}, got {available}")]
    OutputTooSmall { needed: usize, available: usize },
}
