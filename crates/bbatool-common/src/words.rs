//! Little-endian 32-bit word buffers.
//!
//! Every structural region of a BBA archive is a sequence of little-endian
//! `u32` words, and the block cipher operates on words rather than bytes.

use byteorder::{ByteOrder, LittleEndian};

use crate::{Error, Result};

/// Decode a byte buffer into little-endian words.
///
/// The buffer length must be a multiple of four.
pub fn from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(Error::UnalignedWords(bytes.len()));
    }

    let mut words = vec![0u32; bytes.len() / 4];
    LittleEndian::read_u32_into(bytes, &mut words);
    Ok(words)
}

/// Encode words back into a little-endian byte buffer.
pub fn to_bytes(words: &[u32]) -> Vec<u8> {
    let mut bytes = vec![0u8; words.len() * 4];
    LittleEndian::write_u32_into(words, &mut bytes);
    bytes
}

/// Overwrite `bytes` with the little-endian encoding of `words`.
///
/// `bytes` must be exactly `words.len() * 4` long.
pub fn write_into(words: &[u32], bytes: &mut [u8]) {
    LittleEndian::write_u32_into(words, bytes);
}

/// Round a byte count up to the next multiple of four.
#[inline]
pub const fn align4(len: usize) -> usize {
    (len + 3) & !3
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_bytes() {
        let words = from_bytes(&[0x01, 0x02, 0x03, 0x04, 0xFF, 0, 0, 0]).unwrap();
        assert_eq!(words, vec![0x04030201, 0xFF]);
    }

    #[test]
    fn test_unaligned_rejected() {
        assert!(matches!(from_bytes(&[1, 2, 3]), Err(Error::UnalignedWords(3))));
    }

    #[test]
    fn test_to_bytes() {
        assert_eq!(to_bytes(&[0x04030201]), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_align4() {
        assert_eq!(align4(0), 0);
        assert_eq!(align4(1), 4);
        assert_eq!(align4(4), 4);
        assert_eq!(align4(13), 16);
    }
}
