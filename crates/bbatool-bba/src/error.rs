//! Error types for the BBA crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur when working with BBA archives.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Common library error.
    #[error("{0}")]
    Common(#[from] bbatool_common::Error),

    /// A declared size or offset does not fit the data it refers to.
    ///
    /// During variant detection this is the signal that the wrong cipher
    /// parameters were tried.
    #[error("{field} out of bounds: {value} exceeds limit {limit}")]
    OutOfBounds {
        field: &'static str,
        value: u64,
        limit: u64,
    },

    /// The archive did not decode under any known cipher variant.
    #[error("archive does not decode as a product or demo BBA archive")]
    UnknownVariant,

    /// A word buffer was too short or misaligned for the block cipher.
    #[error("invalid cipher buffer: {0} bytes (need a multiple of 4, at least 8)")]
    InvalidWordBuffer(usize),

    /// Decompression error.
    #[error("decompression error: {0}")]
    Decompression(String),

    /// Compression error.
    #[error("compression error: {0}")]
    Compression(String),

    /// Input folder for packing does not exist.
    #[error("input folder not found: {0}")]
    InputNotFound(PathBuf),

    /// A value does not fit the 32-bit fields of the format.
    #[error("{what} too large for a BBA archive: {value}")]
    TooLarge { what: &'static str, value: u64 },

    /// The rebuilt archive could not replace the original file.
    #[error("failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every hash slot is owned by another entry.
    #[error("hash table full, no slot left for {0}")]
    HashTableFull(String),

    /// Entry not found.
    #[error("entry not found: {0}")]
    EntryNotFound(String),
}

impl Error {
    /// Check whether this error means the data did not fit the tried layout.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::OutOfBounds { .. }
                | Self::InvalidWordBuffer(_)
                | Self::Common(bbatool_common::Error::UnexpectedEof { .. })
                | Self::Common(bbatool_common::Error::UnalignedWords(_))
        )
    }
}

/// Result type for BBA operations.
pub type Result<T> = std::result::Result<T, Error>;
