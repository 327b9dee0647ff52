//! CRC-32 hashing utilities.
//!
//! BBA archives use the ISO-3309 / Ethernet CRC-32 both as a checksum for
//! payloads and the encrypted directory blob, and as the hash-table key for
//! entry names.

pub use crc32fast::Hasher;

/// Compute the CRC-32 of a byte slice.
#[inline]
pub fn hash_bytes(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Compute the CRC-32 of a string.
///
/// The string is encoded as UTF-8 before hashing.
#[inline]
pub fn hash_str(s: &str) -> u32 {
    hash_bytes(s.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_hash() {
        assert_eq!(hash_bytes(&[]), 0);
    }

    #[test]
    fn test_known_hash() {
        // Standard check value for CRC-32/ISO-HDLC
        assert_eq!(hash_bytes(b"123456789"), 0xCBF4_3926);
    }

    #[test]
    fn test_string_hash() {
        assert_eq!(hash_str("test"), hash_bytes(b"test"));
    }

    #[test]
    fn test_streaming_matches_one_shot() {
        let mut hasher = Hasher::new();
        hasher.update(b"1234");
        hasher.update(b"56789");
        assert_eq!(hasher.finalize(), hash_bytes(b"123456789"));
    }
}
