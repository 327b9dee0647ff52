//! Bounds-checked cursor over a decrypted record buffer.

use zerocopy::FromBytes;

use crate::{Error, Result};

/// Sequential little-endian reader over a byte slice.
///
/// Every read checks the remaining length first and fails with
/// [`Error::UnexpectedEof`] instead of panicking, so truncated or
/// mis-decrypted records surface as format errors.
///
/// # Example
///
/// ```
/// use bbatool_common::BinaryReader;
///
/// let blob = [0x40, 0x00, 0x00, 0x00, b'a', b'.', b'x', 0x00];
/// let mut reader = BinaryReader::new(&blob);
///
/// let length = reader.read_u32().unwrap();
/// assert_eq!(length, 64);
/// assert_eq!(reader.read_padded_name(4).unwrap(), "a.x");
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryReader<'a> {
    #[inline]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    /// Bytes left after the cursor.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.cursor)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        let available = self.remaining();
        if available < count {
            return Err(Error::UnexpectedEof {
                needed: count,
                available,
            });
        }
        let bytes = &self.data[self.cursor..self.cursor + count];
        self.cursor += count;
        Ok(bytes)
    }

    /// Read one little-endian word.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(word))
    }

    /// Read an entry name of `length` bytes, dropping trailing NUL padding.
    ///
    /// Names are decoded as lossy UTF-8.
    pub fn read_padded_name(&mut self, length: usize) -> Result<String> {
        let bytes = self.take(length)?;
        let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }

    /// Copy a fixed-layout record out of the buffer.
    #[inline]
    pub fn read_struct<T: FromBytes>(&mut self) -> Result<T> {
        let size = std::mem::size_of::<T>();
        let bytes = self.take(size)?;
        T::read_from_bytes(bytes).map_err(|_| Error::UnexpectedEof {
            needed: size,
            available: bytes.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::{Immutable, KnownLayout};

    #[derive(Debug, FromBytes, Immutable, KnownLayout)]
    #[repr(C, packed)]
    struct Pair {
        low: u32,
        high: u32,
    }

    #[test]
    fn test_read_words() {
        let data = [0x89, 0x83, 0x1A, 0x6D, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut reader = BinaryReader::new(&data);

        assert_eq!(reader.read_u32().unwrap(), 0x6D1A_8389);
        assert_eq!(reader.read_u32().unwrap(), u32::MAX);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_padded_name() {
        let mut reader = BinaryReader::new(b"gfx\\a.dds\0\0\0");
        assert_eq!(reader.read_padded_name(12).unwrap(), "gfx\\a.dds");
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn test_read_struct() {
        let data = [1, 0, 0, 0, 2, 0, 0, 0, 9];
        let mut reader = BinaryReader::new(&data);

        let pair: Pair = reader.read_struct().unwrap();
        assert_eq!({ pair.low }, 1);
        assert_eq!({ pair.high }, 2);
        assert_eq!(reader.remaining(), 1);
        assert!(reader.read_struct::<Pair>().is_err());
    }

    #[test]
    fn test_short_read_keeps_cursor() {
        let mut reader = BinaryReader::new(&[0x01, 0x02]);

        assert!(matches!(
            reader.read_u32(),
            Err(Error::UnexpectedEof {
                needed: 4,
                available: 2
            })
        ));
        assert_eq!(reader.remaining(), 2);
    }
}
