//! Directory record, the first record of the encrypted blob.

use bbatool_common::BinaryReader;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::{DirectoryHeader, Header, MAGIC, VERSION};
use crate::Result;

/// Directory record (69 words).
///
/// Declares where the entry list and the hash table live inside the blob
/// and repeats the header identification.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Directory {
    /// Directory Header size (64)
    pub header_size: u32,
    /// Declared entry offset (272 in every known archive)
    pub offset_file_entries: u32,
    /// Byte offset of the hash table within the blob
    pub offset_file_hashtable: u32,
    pub reserved: [u8; 52],
    /// Magic tag, "BAF"
    pub magic: [u8; 3],
    /// Format version
    pub version: u8,
    /// Constant 7
    pub value: u32,
    /// Directory Header size, repeated
    pub header_size2: u32,
    /// Header encryption identifier, repeated
    pub header_encryption_identifier: u32,
    pub reserved2: [u8; 16],
    /// Directory encryption identifier
    pub directory_encryption_identifier: u64,
    pub reserved3: [u8; 44],
    /// File encryption identifier
    pub file_encryption_identifier: u64,
    pub reserved4: [u8; 116],
    /// Number of entries
    pub number_of_files: u32,
}

impl Directory {
    /// Size of the record in bytes.
    pub const SIZE: usize = 276;

    /// Size of the record in words; entries start at this word index.
    pub const WORDS: usize = Self::SIZE / 4;

    /// Declared entry offset written on creation.
    pub const OFFSET_FILE_ENTRIES: u32 = 272;

    /// File encryption identifier written on creation.
    pub const FILE_ENCRYPTION_IDENTIFIER: u64 = 0x7D7F_7696_B57D_7B42;

    /// A fresh directory for `number_of_files` entries and a hash table at
    /// `offset_file_hashtable`.
    pub fn new(number_of_files: u32, offset_file_hashtable: u32) -> Self {
        let mut directory = Self::new_zeroed();
        directory.header_size = DirectoryHeader::SIZE as u32;
        directory.offset_file_entries = Self::OFFSET_FILE_ENTRIES;
        directory.offset_file_hashtable = offset_file_hashtable;
        directory.magic = MAGIC;
        directory.version = VERSION;
        directory.value = Header::RESERVED;
        directory.header_size2 = DirectoryHeader::SIZE as u32;
        directory.header_encryption_identifier = Header::ENCRYPTION_IDENTIFIER;
        directory.directory_encryption_identifier = DirectoryHeader::DEFAULT_ENCRYPTION_IDENTIFIER;
        directory.file_encryption_identifier = Self::FILE_ENCRYPTION_IDENTIFIER;
        directory.number_of_files = number_of_files;
        directory
    }

    /// Parse the directory from the start of a decrypted blob.
    pub fn parse(blob: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(blob);
        Ok(reader.read_struct()?)
    }

    /// Word index of the hash table within the blob.
    #[inline]
    pub fn hashtable_word(&self) -> usize {
        self.offset_file_hashtable as usize / 4
    }
}
