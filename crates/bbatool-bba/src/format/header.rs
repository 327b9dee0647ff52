//! Header and Directory Header structures.

use bbatool_common::BinaryReader;
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::{MAGIC, VERSION};
use crate::{Error, Result};

/// Plaintext archive header.
///
/// Always the first 16 bytes of the file. `header_size` gives the length of
/// the encrypted [`DirectoryHeader`] block that follows it.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct Header {
    /// Magic tag, "BAF"
    pub magic: [u8; 3],
    /// Format version
    pub version: u8,
    /// Constant 7
    pub reserved: u32,
    /// Size of the encrypted Directory Header block
    pub header_size: u32,
    /// Header encryption identifier
    pub header_encryption_identifier: u32,
}

impl Header {
    /// Size of the header in bytes.
    pub const SIZE: usize = 16;

    /// Value of the reserved field.
    pub const RESERVED: u32 = 7;

    /// Header encryption identifier written on creation.
    pub const ENCRYPTION_IDENTIFIER: u32 = 0x6D1A_8389;

    /// A fresh header as written on every pack.
    pub fn new() -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            reserved: Self::RESERVED,
            header_size: DirectoryHeader::SIZE as u32,
            header_encryption_identifier: Self::ENCRYPTION_IDENTIFIER,
        }
    }

    /// Parse the header from the first 16 bytes of an archive.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        Ok(reader.read_struct()?)
    }

    /// Check whether the magic tag matches.
    pub fn has_magic(&self) -> bool {
        self.magic == MAGIC
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new()
    }
}

/// Directory Header, stored encrypted with the header-region parameters.
///
/// Locates and checksums the encrypted directory blob.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct DirectoryHeader {
    /// Low 32 bits of the blob's absolute offset
    pub offset_low: u32,
    /// High 32 bits of the blob's absolute offset
    pub offset_high: u32,
    /// Blob length in bytes
    pub length: u32,
    /// CRC-32 of the encrypted blob
    pub crc32: u32,
    /// Directory encryption identifier
    pub encryption_identifier: u64,
    /// Unused
    pub reserved: [u8; 40],
}

impl DirectoryHeader {
    /// Size of the record in bytes.
    pub const SIZE: usize = 64;

    /// Number of words the record must at least provide when decoded.
    const MIN_WORDS: usize = 6;

    /// Identifier substituted when the stored one is absent.
    pub const DEFAULT_ENCRYPTION_IDENTIFIER: u64 = 0xE225_D297_7D7F_7696;

    /// Length substituted when the stored one is zero.
    const DEFAULT_LENGTH: u32 = 16;

    /// Build a Directory Header for a blob at `offset`.
    pub fn new(offset: u64, length: u32, crc32: u32) -> Self {
        let mut header = Self::new_zeroed();
        header.offset_low = offset as u32;
        header.offset_high = (offset >> 32) as u32;
        header.length = length;
        header.crc32 = crc32;
        header.encryption_identifier = Self::DEFAULT_ENCRYPTION_IDENTIFIER;
        header
    }

    /// Decode a decrypted Directory Header block.
    ///
    /// A zero length reads as 16 and an identifier with either half zero
    /// reads as the default identifier.
    pub fn from_decrypted(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_WORDS * 4 {
            return Err(Error::OutOfBounds {
                field: "directory header size",
                value: (Self::MIN_WORDS * 4) as u64,
                limit: data.len() as u64,
            });
        }

        let mut reader = BinaryReader::new(data);
        let offset_low = reader.read_u32()?;
        let offset_high = reader.read_u32()?;
        let length = reader.read_u32()?;
        let crc32 = reader.read_u32()?;
        let id_low = reader.read_u32()?;
        let id_high = reader.read_u32()?;

        let mut header = Self::new_zeroed();
        header.offset_low = offset_low;
        header.offset_high = offset_high;
        header.length = if length == 0 {
            Self::DEFAULT_LENGTH
        } else {
            length
        };
        header.crc32 = crc32;
        header.encryption_identifier = if id_low == 0 || id_high == 0 {
            Self::DEFAULT_ENCRYPTION_IDENTIFIER
        } else {
            u64::from(id_low) | (u64::from(id_high) << 32)
        };
        Ok(header)
    }

    /// Absolute offset of the encrypted blob.
    #[inline]
    pub fn blob_offset(&self) -> u64 {
        u64::from(self.offset_low) | (u64::from(self.offset_high) << 32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let header = Header::new();
        let bytes = header.as_bytes();
        assert_eq!(bytes.len(), Header::SIZE);
        assert_eq!(&bytes[..4], b"BAF\x06");
        assert_eq!(&bytes[4..8], &7u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &64u32.to_le_bytes());
        assert_eq!(&bytes[12..16], &0x6D1A_8389u32.to_le_bytes());

        let parsed = Header::parse(bytes).unwrap();
        assert!(parsed.has_magic());
        assert_eq!({ parsed.header_size }, 64);
    }

    #[test]
    fn test_directory_header_layout() {
        let header = DirectoryHeader::new(0x1_0000_0050, 300, 0xDEAD_BEEF);
        let bytes = header.as_bytes();
        assert_eq!(bytes.len(), DirectoryHeader::SIZE);
        assert_eq!(&bytes[0..4], &0x50u32.to_le_bytes());
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());

        let parsed = DirectoryHeader::from_decrypted(bytes).unwrap();
        assert_eq!(parsed.blob_offset(), 0x1_0000_0050);
        assert_eq!({ parsed.length }, 300);
        assert_eq!({ parsed.crc32 }, 0xDEAD_BEEF);
        assert_eq!(
            { parsed.encryption_identifier },
            DirectoryHeader::DEFAULT_ENCRYPTION_IDENTIFIER
        );
    }

    #[test]
    fn test_directory_header_defaults() {
        let parsed = DirectoryHeader::from_decrypted(&[0u8; 64]).unwrap();
        assert_eq!({ parsed.length }, 16);
        assert_eq!(
            { parsed.encryption_identifier },
            DirectoryHeader::DEFAULT_ENCRYPTION_IDENTIFIER
        );
    }

    #[test]
    fn test_directory_header_too_short() {
        assert!(matches!(
            DirectoryHeader::from_decrypted(&[0u8; 16]),
            Err(Error::OutOfBounds { .. })
        ));
    }
}
