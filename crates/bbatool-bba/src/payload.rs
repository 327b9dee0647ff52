//! Payload encoding and decoding.

use std::io::{self, Read, Seek, SeekFrom, Write};

use bbatool_common::crc::Hasher;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::debug;

use crate::cipher::{self, Direction, Region, VariantConfig, ONE_MIB};
use crate::format::{DataEntry, FileKind, PayloadSummary};
use crate::{Error, Result};

/// Writer adapter that counts and checksums everything passing through.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Hasher,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Hasher::new(),
            written: 0,
        }
    }

    /// Bytes written so far.
    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Finish and return `(inner, bytes written, crc32)`.
    pub fn finish(self) -> (W, u64, u32) {
        (self.inner, self.written, self.hasher.finalize())
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decode an entry's payload from the archive into `out`.
///
/// Returns the number of decoded bytes written.
pub fn decode_to<R, W>(
    reader: &mut R,
    entry: &DataEntry,
    config: &VariantConfig,
    out: &mut W,
) -> Result<u64>
where
    R: Read + Seek,
    W: Write,
{
    let stored = seek_payload(reader, entry)?;
    let mut source = reader.by_ref().take(stored);

    let written = match entry.kind() {
        FileKind::Compressed => {
            let mut data = Vec::with_capacity(stored as usize);
            source.read_to_end(&mut data)?;
            check_stored_len(entry, data.len())?;

            cipher::scramble_payload(
                &mut data,
                entry.name_length(),
                &config.payload_xor,
                Direction::Decrypt,
            );

            let mut decoder = GzDecoder::new(data.as_slice());
            io::copy(&mut decoder, out).map_err(|e| Error::Decompression(e.to_string()))?
        }
        FileKind::Tea => {
            let block_size = entry.block_size() as usize;
            if block_size == 0 {
                return Err(Error::InvalidWordBuffer(0));
            }

            let params = config.params(Region::File);
            let mut remaining = stored as usize;
            let mut block = vec![0u8; block_size.min(remaining)];
            while remaining > 0 {
                let len = block_size.min(remaining);
                let block = &mut block[..len];
                source.read_exact(block)?;
                cipher::tea_block(block, block_size, entry.name_length(), params, Direction::Decrypt)?;
                out.write_all(block)?;
                remaining -= len;
            }
            stored
        }
        FileKind::Raw | FileKind::Directory | FileKind::Other(_) => {
            let copied = copy_chunked(&mut source, out)?;
            check_stored_len(entry, copied as usize)?;
            copied
        }
    };

    debug!(
        name = entry.name(),
        kind = entry.kind().label(),
        stored,
        written,
        "decoded payload"
    );
    Ok(written)
}

/// Decode an entry's payload into memory.
pub fn decode<R: Read + Seek>(reader: &mut R, entry: &DataEntry, config: &VariantConfig) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity((entry.decompressed_size() as usize).min(ONE_MIB));
    decode_to(reader, entry, config, &mut out)?;
    Ok(out)
}

/// CRC-32 of an entry's stored bytes and of its decoded bytes.
pub fn checksums<R: Read + Seek>(
    reader: &mut R,
    entry: &DataEntry,
    config: &VariantConfig,
) -> Result<(u32, u32)> {
    let len = seek_payload(reader, entry)?;
    let mut stored = HashingWriter::new(io::sink());
    copy_chunked(&mut reader.by_ref().take(len), &mut stored)?;
    let (_, _, stored_crc) = stored.finish();

    let mut decoded = HashingWriter::new(io::sink());
    decode_to(reader, entry, config, &mut decoded)?;
    let (_, _, decoded_crc) = decoded.finish();

    Ok((stored_crc, decoded_crc))
}

/// Copy `input` to `out` verbatim.
pub fn encode_raw<R: Read, W: Write>(input: &mut R, out: &mut W) -> Result<PayloadSummary> {
    let mut writer = HashingWriter::new(out);
    copy_chunked(input, &mut writer)?;
    let (_, written, crc32) = writer.finish();

    let size = fit_u32("payload size", written)?;
    Ok(PayloadSummary {
        decompressed_size: size,
        decompressed_crc32: crc32,
        compressed_size: size,
        compressed_crc32: crc32,
    })
}

/// Gzip `input`, scramble it and write it to `out`.
///
/// The compressed stream is held in memory so it can be scrambled per chunk.
pub fn encode_compressed<R: Read, W: Write>(
    input: &mut R,
    name_length: u32,
    config: &VariantConfig,
    out: &mut W,
) -> Result<PayloadSummary> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut plain = HashingWriter::new(encoder);
    copy_chunked(input, &mut plain)?;
    let (encoder, decompressed, decompressed_crc32) = plain.finish();

    let mut data = encoder
        .finish()
        .map_err(|e| Error::Compression(e.to_string()))?;
    cipher::scramble_payload(&mut data, name_length, &config.payload_xor, Direction::Encrypt);

    let compressed_crc32 = bbatool_common::crc::hash_bytes(&data);
    out.write_all(&data)?;

    Ok(PayloadSummary {
        decompressed_size: fit_u32("payload size", decompressed)?,
        decompressed_crc32,
        compressed_size: fit_u32("compressed payload size", data.len() as u64)?,
        compressed_crc32,
    })
}

/// Stream `input` into `out` through a 1 MiB buffer.
pub(crate) fn copy_chunked<R: Read + ?Sized, W: Write + ?Sized>(input: &mut R, out: &mut W) -> Result<u64> {
    let mut buffer = vec![0u8; ONE_MIB];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        out.write_all(&buffer[..n])?;
        total += n as u64;
    }
    Ok(total)
}

/// Seek to an entry's payload once its stored range is known to lie inside
/// the stream. Returns the stored length.
fn seek_payload<R: Seek>(reader: &mut R, entry: &DataEntry) -> Result<u64> {
    let stream_len = reader.seek(SeekFrom::End(0))?;
    let start = u64::from(entry.file_offset());
    let stored = u64::from(entry.compressed_size());
    if start + stored > stream_len {
        return Err(Error::OutOfBounds {
            field: "payload end",
            value: start + stored,
            limit: stream_len,
        });
    }
    reader.seek(SeekFrom::Start(start))?;
    Ok(stored)
}

pub(crate) fn fit_u32(what: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::TooLarge { what, value })
}

fn check_stored_len(entry: &DataEntry, actual: usize) -> Result<()> {
    let expected = entry.compressed_size() as usize;
    if actual != expected {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("payload of {} truncated: {actual} of {expected} bytes", entry.name()),
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::Variant;
    use bbatool_common::crc;
    use std::io::Cursor;

    fn place(entry: DataEntry, stored: &[u8], at: u32) -> (DataEntry, Cursor<Vec<u8>>) {
        let mut archive = vec![0xEEu8; at as usize];
        archive.extend_from_slice(stored);
        archive.extend_from_slice(&[0xEE; 16]);
        (entry.with_chain(at, u32::MAX), Cursor::new(archive))
    }

    /// Fresh entries use 1 MiB blocks; rewrite the record for small test blocks.
    fn with_block_size(entry: DataEntry, block_size: u32) -> DataEntry {
        let mut bytes = entry.to_bytes();
        bytes[40..44].copy_from_slice(&block_size.to_le_bytes());
        DataEntry::parse(&bytes).unwrap()
    }

    #[test]
    fn test_raw_roundtrip() {
        let data = b"0123456789".to_vec();
        let mut stored = Vec::new();
        let summary = encode_raw(&mut data.as_slice(), &mut stored).unwrap();

        assert_eq!(stored, data);
        assert_eq!(summary.compressed_size, 10);
        assert_eq!(summary.decompressed_crc32, crc::hash_bytes(&data));

        let entry = DataEntry::file("a.txt", FileKind::Raw, 0, summary);
        let (entry, mut archive) = place(entry, &stored, 80);
        let config = Variant::Product.config();
        assert_eq!(decode(&mut archive, &entry, config).unwrap(), data);
        assert_eq!(
            checksums(&mut archive, &entry, config).unwrap(),
            (summary.compressed_crc32, summary.decompressed_crc32)
        );
    }

    #[test]
    fn test_compressed_roundtrip() {
        let data: Vec<u8> = (0..5000u32).flat_map(|i| (i % 251).to_le_bytes()).collect();
        let name = "gfx\\big.xml";
        let config = Variant::Demo.config();

        let mut stored = Vec::new();
        let summary =
            encode_compressed(&mut data.as_slice(), name.len() as u32, config, &mut stored).unwrap();

        assert_eq!(summary.decompressed_size as usize, data.len());
        assert_eq!(summary.compressed_size as usize, stored.len());
        assert_eq!(summary.compressed_crc32, crc::hash_bytes(&stored));

        let entry = DataEntry::file(name, FileKind::Compressed, 0, summary);
        let (entry, mut archive) = place(entry, &stored, 80);
        assert_eq!(decode(&mut archive, &entry, config).unwrap(), data);
    }

    #[test]
    fn test_compressed_wrong_variant_fails() {
        let data = vec![7u8; 4096];
        let mut stored = Vec::new();
        let summary = encode_compressed(&mut data.as_slice(), 5, Variant::Product.config(), &mut stored).unwrap();

        let entry = DataEntry::file("x.bin", FileKind::Compressed, 0, summary);
        let (entry, mut archive) = place(entry, &stored, 80);
        assert!(matches!(
            decode(&mut archive, &entry, Variant::Demo.config()),
            Err(Error::Decompression(_))
        ));
    }

    #[test]
    fn test_tea_decode() {
        let plain: Vec<u8> = (0..96u8).collect();
        let name = "data\\secret.lua";
        let config = Variant::Product.config();

        let mut stored = plain.clone();
        cipher::tea_payload(
            &mut stored,
            32,
            name.len() as u32,
            config.params(Region::File),
            Direction::Encrypt,
        )
        .unwrap();
        assert_ne!(stored, plain);

        let summary = PayloadSummary {
            decompressed_size: 96,
            compressed_size: 96,
            ..Default::default()
        };
        let entry = with_block_size(DataEntry::file(name, FileKind::Tea, 0, summary), 32);

        let (entry, mut archive) = place(entry, &stored, 80);
        assert_eq!(decode(&mut archive, &entry, config).unwrap(), plain);
    }

    #[test]
    fn test_tea_decode_partial_tail() {
        // Product file keys masked with name length 7, 32-byte blocks, 13-byte tail.
        const STORED: [u8; 45] = [
            0x7C, 0x6F, 0x80, 0x63, 0xAE, 0x27, 0x36, 0x4D, 0xD0, 0x08, 0x89, 0x20,
            0x74, 0xD4, 0x44, 0xE6, 0xF7, 0x38, 0xF4, 0x1D, 0x8E, 0xCD, 0xFD, 0xA1,
            0x2F, 0x96, 0xFF, 0x77, 0x38, 0x91, 0x91, 0x44, 0x15, 0x05, 0x42, 0x95,
            0x2A, 0xA7, 0x5A, 0xD7, 0xAA, 0xAF, 0x80, 0x76, 0x25,
        ];
        let plain: Vec<u8> = (0..45u32).map(|i| (i * 37 + 5) as u8).collect();
        let name = "a\\b.lua";
        assert_eq!(name.len(), 7);

        let summary = PayloadSummary {
            decompressed_size: 45,
            compressed_size: 45,
            ..Default::default()
        };
        let entry = with_block_size(DataEntry::file(name, FileKind::Tea, 0, summary), 32);
        let (entry, mut archive) = place(entry, &STORED, 96);

        assert_eq!(decode(&mut archive, &entry, Variant::Product.config()).unwrap(), plain);
    }

    #[test]
    fn test_payload_past_end_rejected_before_reading() {
        let summary = PayloadSummary {
            compressed_size: u32::MAX,
            decompressed_size: u32::MAX,
            ..Default::default()
        };
        let config = Variant::Product.config();
        for kind in [FileKind::Compressed, FileKind::Tea, FileKind::Raw] {
            let entry = DataEntry::file("big.xml", kind, 0, summary).with_chain(80, u32::MAX);
            let mut archive = Cursor::new(vec![0u8; 128]);
            assert!(matches!(
                decode(&mut archive, &entry, config),
                Err(Error::OutOfBounds { field: "payload end", .. })
            ));
            assert!(checksums(&mut archive, &entry, config).is_err());
        }
    }

    #[test]
    fn test_truncated_raw_payload() {
        let summary = PayloadSummary {
            compressed_size: 100,
            decompressed_size: 100,
            ..Default::default()
        };
        let entry = DataEntry::file("a.bin", FileKind::Raw, 0, summary).with_chain(4, u32::MAX);
        let mut archive = Cursor::new(vec![0u8; 20]);
        assert!(decode(&mut archive, &entry, Variant::Product.config()).is_err());
    }

    #[test]
    fn test_fit_u32() {
        assert_eq!(fit_u32("x", 5).unwrap(), 5);
        assert!(matches!(
            fit_u32("x", u64::from(u32::MAX) + 1),
            Err(Error::TooLarge { .. })
        ));
    }
}
