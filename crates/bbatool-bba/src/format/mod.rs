//! BBA format structures.
//!
//! This module contains the fixed-layout records of a BBA archive and the
//! variable-length entry codec:
//!
//! ```text
//! [Header:16][DirectoryHeader:64, encrypted][payloads...][blob, encrypted]
//!
//! blob = [Directory:276][DataEntry...][slot count][(hash, offset)...]
//! ```

mod directory;
mod entry;
mod header;

pub use directory::Directory;
pub use entry::{name_words, DataEntry, EntryInfo, EntryRecord, EntryWalker, PayloadSummary};
pub(crate) use entry::extension_of;
pub use header::{DirectoryHeader, Header};

/// Magic tag at the start of the header and inside the directory.
pub const MAGIC: [u8; 3] = *b"BAF";

/// Format version written by the game tools.
pub const VERSION: u8 = 6;

/// Chain pointer value terminating the entry list.
pub const CHAIN_END: u32 = u32::MAX;

/// Absolute offset of the first payload byte in a freshly written archive.
pub const PAYLOAD_START: u64 = (Header::SIZE + DirectoryHeader::SIZE) as u64;

/// Payload kind of an entry, stored in its `file_type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum FileKind {
    /// Stored verbatim.
    Raw,
    /// Block-ciphered with the file-region keys.
    Tea,
    /// Gzip-compressed and scrambled.
    Compressed,
    /// Directory placeholder without payload.
    Directory,
    /// Any other tag; treated as raw on extraction.
    Other(u32),
}

impl FileKind {
    /// Decode the on-disk tag.
    pub const fn from_raw(value: u32) -> Self {
        match value {
            0 => Self::Raw,
            2 => Self::Tea,
            17 => Self::Compressed,
            256 => Self::Directory,
            other => Self::Other(other),
        }
    }

    /// The on-disk tag.
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Raw => 0,
            Self::Tea => 2,
            Self::Compressed => 17,
            Self::Directory => 256,
            Self::Other(other) => other,
        }
    }

    /// Short lowercase label.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Tea => "tea",
            Self::Compressed => "gzip",
            Self::Directory => "dir",
            Self::Other(_) => "other",
        }
    }
}

impl From<u32> for FileKind {
    fn from(value: u32) -> Self {
        Self::from_raw(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_kind_tags() {
        for kind in [
            FileKind::Raw,
            FileKind::Tea,
            FileKind::Compressed,
            FileKind::Directory,
            FileKind::Other(5),
        ] {
            assert_eq!(FileKind::from_raw(kind.as_raw()), kind);
        }
        assert_eq!(FileKind::from(17), FileKind::Compressed);
    }

    #[test]
    fn test_payload_start() {
        assert_eq!(PAYLOAD_START, 80);
    }
}
