//! Error types for bbatool-common.

use thiserror::Error;

/// Common error type for bbatool operations.
#[derive(Debug, Error)]
pub enum Error {
    /// End of buffer reached while reading.
    #[error("unexpected end of buffer: needed {needed} bytes but only {available} available")]
    UnexpectedEof { needed: usize, available: usize },

    /// A byte buffer could not be viewed as 32-bit words.
    #[error("buffer of {0} bytes is not a whole number of 32-bit words")]
    UnalignedWords(usize),
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;
