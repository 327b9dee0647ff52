//! Data entry records and the entry-list walk.

use std::path::PathBuf;
use std::time::SystemTime;

use bbatool_common::{filetime, words, BinaryReader};
use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};

use super::{FileKind, CHAIN_END};
use crate::cipher::ONE_MIB;
use crate::{Error, Result};

/// Fixed part of a data entry (16 words).
///
/// The entry name follows immediately, zero-padded to a word boundary.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C, packed)]
pub struct EntryRecord {
    /// FILETIME, low word
    pub timestamp_low: u32,
    /// FILETIME, high word
    pub timestamp_high: u32,
    pub decompressed_size: u32,
    pub decompressed_crc32: u32,
    /// Payload kind tag
    pub file_type: u32,
    pub padding1: u32,
    /// Absolute payload offset within the archive
    pub file_offset: u32,
    pub padding2: u32,
    /// Stored payload size
    pub compressed_size: u32,
    /// CRC-32 of the stored payload
    pub compressed_crc32: u32,
    /// Chunk size of block-ciphered payloads
    pub block_size: u32,
    pub padding3: u32,
    /// Name length in bytes
    pub name_length: u32,
    /// Index where the base name starts
    pub name_offset: u32,
    pub next_directory_offset: u32,
    pub next_file_offset: u32,
}

impl EntryRecord {
    /// Size of the fixed part in bytes.
    pub const SIZE: usize = 64;

    /// Size of the fixed part in words.
    pub const WORDS: usize = Self::SIZE / 4;

    /// Word index of `name_length` within the fixed part.
    pub const NAME_LENGTH_WORD: usize = 12;
}

/// Number of name words following the fixed part.
///
/// Names are zero-padded to a word boundary; a name whose length is already
/// a multiple of four gets one extra zero word so that it is never mistaken
/// for the zero name-length terminator.
#[inline]
pub const fn name_words(name_length: u32) -> usize {
    let length = name_length as usize;
    let padded = words::align4(length) / 4;
    if length % 4 == 0 {
        padded + 1
    } else {
        padded
    }
}

/// A file or directory entry.
#[derive(Debug, Clone)]
pub struct DataEntry {
    record: EntryRecord,
    name: String,
}

impl DataEntry {
    /// Decode an entry from its serialized bytes (fixed part plus name).
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let record: EntryRecord = reader.read_struct()?;
        let name = reader.read_padded_name(record.name_length as usize)?;
        Ok(Self { record, name })
    }

    /// A fresh file entry. Offsets and chain pointers are set by
    /// [`DataEntry::with_chain`] once the entry's position is known.
    pub fn file(name: &str, kind: FileKind, timestamp: u64, payload: PayloadSummary) -> Self {
        let (timestamp_low, timestamp_high) = filetime::split(timestamp);

        let mut record = EntryRecord::new_zeroed();
        record.timestamp_low = timestamp_low;
        record.timestamp_high = timestamp_high;
        record.decompressed_size = payload.decompressed_size;
        record.decompressed_crc32 = payload.decompressed_crc32;
        record.file_type = kind.as_raw();
        record.compressed_size = payload.compressed_size;
        record.compressed_crc32 = payload.compressed_crc32;
        record.block_size = ONE_MIB as u32;
        record.name_length = name.len() as u32;
        record.name_offset = name.rfind('\\').map_or(0, |i| i as u32 + 1);
        record.next_directory_offset = CHAIN_END;
        record.next_file_offset = CHAIN_END;

        Self {
            record,
            name: name.to_string(),
        }
    }

    /// A fresh directory placeholder.
    pub fn directory(name: &str) -> Self {
        let mut record = EntryRecord::new_zeroed();
        record.file_type = FileKind::Directory.as_raw();
        record.name_length = name.len() as u32;
        record.next_directory_offset = CHAIN_END;
        record.next_file_offset = CHAIN_END;

        Self {
            record,
            name: name.to_string(),
        }
    }

    /// Rebuild this entry at a new position in the list.
    ///
    /// `next` is the byte offset of the following entry (or [`CHAIN_END`]).
    /// Files take `payload_offset` and chain through `next_file_offset`;
    /// directories keep their payload offset and chain through
    /// `next_directory_offset`.
    pub fn with_chain(&self, payload_offset: u32, next: u32) -> Self {
        let mut record = self.record;
        if self.is_directory() {
            record.next_file_offset = CHAIN_END;
            record.next_directory_offset = next;
        } else {
            record.file_offset = payload_offset;
            record.next_file_offset = next;
            record.next_directory_offset = CHAIN_END;
        }

        Self {
            record,
            name: self.name.clone(),
        }
    }

    /// The raw fixed record.
    #[inline]
    pub fn record(&self) -> &EntryRecord {
        &self.record
    }

    /// Full relative name, `\`-separated.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Base name (after the last separator).
    pub fn base_name(&self) -> &str {
        self.name
            .rsplit(['\\', '/'])
            .next()
            .unwrap_or(self.name.as_str())
    }

    /// Payload kind.
    #[inline]
    pub fn kind(&self) -> FileKind {
        FileKind::from_raw(self.record.file_type)
    }

    /// Check if this entry is a directory placeholder.
    #[inline]
    pub fn is_directory(&self) -> bool {
        self.kind() == FileKind::Directory
    }

    /// Check if this entry is the packed root (`.`).
    #[inline]
    pub fn is_root(&self) -> bool {
        self.name == "."
    }

    /// Lowercase extension including the dot, if the base name has one.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.name)
    }

    #[inline]
    pub fn decompressed_size(&self) -> u32 {
        self.record.decompressed_size
    }

    #[inline]
    pub fn decompressed_crc32(&self) -> u32 {
        self.record.decompressed_crc32
    }

    #[inline]
    pub fn compressed_size(&self) -> u32 {
        self.record.compressed_size
    }

    #[inline]
    pub fn compressed_crc32(&self) -> u32 {
        self.record.compressed_crc32
    }

    #[inline]
    pub fn file_offset(&self) -> u32 {
        self.record.file_offset
    }

    #[inline]
    pub fn block_size(&self) -> u32 {
        self.record.block_size
    }

    #[inline]
    pub fn name_length(&self) -> u32 {
        self.record.name_length
    }

    #[inline]
    pub fn name_offset(&self) -> u32 {
        self.record.name_offset
    }

    #[inline]
    pub fn next_file_offset(&self) -> u32 {
        self.record.next_file_offset
    }

    #[inline]
    pub fn next_directory_offset(&self) -> u32 {
        self.record.next_directory_offset
    }

    /// The chain pointer this entry uses: `next_directory_offset` for
    /// directories, `next_file_offset` otherwise.
    #[inline]
    pub fn chain_pointer(&self) -> u32 {
        if self.is_directory() {
            self.record.next_directory_offset
        } else {
            self.record.next_file_offset
        }
    }

    /// Raw FILETIME ticks.
    #[inline]
    pub fn timestamp(&self) -> u64 {
        filetime::join(self.record.timestamp_low, self.record.timestamp_high)
    }

    /// Timestamp as `SystemTime`; `None` when unset.
    pub fn modified(&self) -> Option<SystemTime> {
        match self.timestamp() {
            0 => None,
            ticks => Some(filetime::to_system_time(ticks)),
        }
    }

    /// Relative output path with platform separators.
    ///
    /// Empty, `.` and `..` components are dropped so the path never leaves
    /// the output folder.
    pub fn output_path(&self) -> PathBuf {
        self.name
            .split(['\\', '/'])
            .filter(|p| !p.is_empty() && *p != "." && *p != "..")
            .collect()
    }

    /// Serialized length in bytes.
    #[inline]
    pub fn serialized_len(&self) -> usize {
        EntryRecord::SIZE + name_words(self.record.name_length) * 4
    }

    /// Serialize the fixed part and the padded name.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.serialized_len());
        out.extend_from_slice(self.record.as_bytes());

        let name_len = (self.record.name_length as usize).min(self.name.len());
        out.extend_from_slice(&self.name.as_bytes()[..name_len]);
        out.resize(self.serialized_len(), 0);
        out
    }

    /// Public summary for listings.
    pub fn info(&self) -> EntryInfo {
        EntryInfo {
            name: self.name.clone(),
            kind: self.kind(),
            decompressed_size: self.decompressed_size(),
            compressed_size: self.compressed_size(),
            decompressed_crc32: self.decompressed_crc32(),
            compressed_crc32: self.compressed_crc32(),
            file_offset: self.file_offset(),
            timestamp: self.timestamp(),
        }
    }
}

/// Sizes and checksums of an encoded payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PayloadSummary {
    pub decompressed_size: u32,
    pub decompressed_crc32: u32,
    pub compressed_size: u32,
    pub compressed_crc32: u32,
}

/// Public view of an entry (for listings and JSON output).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EntryInfo {
    pub name: String,
    pub kind: FileKind,
    pub decompressed_size: u32,
    pub compressed_size: u32,
    pub decompressed_crc32: u32,
    pub compressed_crc32: u32,
    pub file_offset: u32,
    /// FILETIME ticks
    pub timestamp: u64,
}

/// Lowercase extension (with the dot) of a `\`-separated name.
///
/// A trailing dot or a name without one yields `None`.
pub(crate) fn extension_of(name: &str) -> Option<String> {
    let base = name.rsplit(['\\', '/']).next().unwrap_or(name);
    let dot = base.rfind('.')?;
    let extension = &base[dot..];
    (extension.len() > 1).then(|| extension.to_ascii_lowercase())
}

/// State of the entry-list walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WalkState {
    /// Expecting the 16 fixed words of the next entry at the cursor.
    ReadingFixedFields,
    /// Fixed words consumed; `words` name words remain.
    ReadingName { start: usize, words: usize },
    /// The entry spanning `start..cursor` is ready to decode.
    EntryComplete { start: usize },
    /// Terminator reached or an error was reported.
    Done,
}

/// Walks the entry list of a decrypted blob.
///
/// Yields `(offset, entry)` pairs where `offset` is the entry's byte offset
/// from the first entry, the value hash-table slots refer to. The walk stops
/// at `end` (the hash table) or at a zero name length, whichever comes first.
#[derive(Debug, Clone)]
pub struct EntryWalker<'a> {
    words: &'a [u32],
    bytes: &'a [u8],
    first: usize,
    cursor: usize,
    end: usize,
    state: WalkState,
}

impl<'a> EntryWalker<'a> {
    /// Walk `words[first..end]`. `bytes` must be the byte form of `words`.
    pub fn new(words: &'a [u32], bytes: &'a [u8], first: usize, end: usize) -> Self {
        Self {
            words,
            bytes,
            first,
            cursor: first,
            end: end.min(words.len()),
            state: WalkState::ReadingFixedFields,
        }
    }

    /// Current word position.
    #[inline]
    pub fn position(&self) -> usize {
        self.cursor
    }

    fn out_of_bounds(&mut self, field: &'static str, value: usize) -> Error {
        self.state = WalkState::Done;
        Error::OutOfBounds {
            field,
            value: value as u64,
            limit: self.end as u64,
        }
    }
}

impl Iterator for EntryWalker<'_> {
    type Item = Result<(u32, DataEntry)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                WalkState::Done => return None,
                WalkState::ReadingFixedFields => {
                    if self.cursor >= self.end {
                        self.state = WalkState::Done;
                        return None;
                    }
                    if self.cursor + EntryRecord::WORDS > self.end {
                        let value = self.cursor + EntryRecord::WORDS;
                        return Some(Err(self.out_of_bounds("entry record", value)));
                    }

                    let name_length = self.words[self.cursor + EntryRecord::NAME_LENGTH_WORD];
                    if name_length == 0 {
                        self.state = WalkState::Done;
                        return None;
                    }

                    self.state = WalkState::ReadingName {
                        start: self.cursor,
                        words: name_words(name_length),
                    };
                    self.cursor += EntryRecord::WORDS;
                }
                WalkState::ReadingName { start, words } => {
                    if self.cursor + words > self.end {
                        let value = self.cursor + words;
                        return Some(Err(self.out_of_bounds("entry name", value)));
                    }
                    self.cursor += words;
                    self.state = WalkState::EntryComplete { start };
                }
                WalkState::EntryComplete { start } => {
                    self.state = WalkState::ReadingFixedFields;
                    let offset = ((start - self.first) * 4) as u32;
                    let entry = DataEntry::parse(&self.bytes[start * 4..self.cursor * 4]);
                    return Some(entry.map(|e| (offset, e)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(size: u32) -> PayloadSummary {
        PayloadSummary {
            decompressed_size: size,
            decompressed_crc32: 0x1111_1111,
            compressed_size: size,
            compressed_crc32: 0x2222_2222,
        }
    }

    #[test]
    fn test_record_size() {
        assert_eq!(std::mem::size_of::<EntryRecord>(), EntryRecord::SIZE);
    }

    #[test]
    fn test_name_padding() {
        assert_eq!(name_words(1), 1);
        assert_eq!(name_words(3), 1);
        assert_eq!(name_words(4), 2);
        assert_eq!(name_words(5), 2);
        assert_eq!(name_words(8), 3);

        let entry = DataEntry::file("abcd", FileKind::Raw, 0, summary(1));
        assert_eq!(entry.serialized_len(), 64 + 8);
        let entry = DataEntry::file("abcde", FileKind::Raw, 0, summary(1));
        assert_eq!(entry.serialized_len(), 64 + 8);
        assert_eq!(entry.to_bytes().len(), entry.serialized_len());
    }

    #[test]
    fn test_file_entry_fields() {
        let entry = DataEntry::file("gfx\\ui\\logo.png", FileKind::Compressed, 42, summary(10));
        assert_eq!(entry.name_length(), 15);
        assert_eq!(entry.name_offset(), 7);
        assert_eq!(entry.base_name(), "logo.png");
        assert_eq!(entry.block_size(), ONE_MIB as u32);
        assert_eq!(entry.kind(), FileKind::Compressed);
        assert_eq!(entry.timestamp(), 42);
        assert_eq!(entry.extension().as_deref(), Some(".png"));
        assert_eq!(entry.output_path(), PathBuf::from("gfx").join("ui").join("logo.png"));
    }

    #[test]
    fn test_output_path_stays_inside() {
        let entry = DataEntry::file(r"..\..\evil.txt", FileKind::Raw, 0, summary(1));
        assert_eq!(entry.output_path(), PathBuf::from("evil.txt"));
        assert_eq!(DataEntry::directory(".").output_path(), PathBuf::new());
    }

    #[test]
    fn test_directory_entry_fields() {
        let entry = DataEntry::directory("gfx\\ui");
        assert!(entry.is_directory());
        assert_eq!(entry.name_offset(), 0);
        assert_eq!(entry.block_size(), 0);
        assert_eq!(entry.file_offset(), 0);
        assert_eq!(entry.modified(), None);
    }

    #[test]
    fn test_with_chain() {
        let file = DataEntry::file("a.txt", FileKind::Raw, 0, summary(3));
        let chained = file.with_chain(80, 72);
        assert_eq!(chained.file_offset(), 80);
        assert_eq!(chained.next_file_offset(), 72);
        assert_eq!(chained.next_directory_offset(), CHAIN_END);
        assert_eq!(chained.chain_pointer(), 72);

        let dir = DataEntry::directory("sub");
        let chained = dir.with_chain(80, 144);
        assert_eq!(chained.file_offset(), 0);
        assert_eq!(chained.next_file_offset(), CHAIN_END);
        assert_eq!(chained.next_directory_offset(), 144);
        assert_eq!(chained.chain_pointer(), 144);
    }

    #[test]
    fn test_parse_roundtrip_fields() {
        let entry = DataEntry::file("data\\x.bin", FileKind::Tea, 7, summary(99)).with_chain(200, 300);
        let parsed = DataEntry::parse(&entry.to_bytes()).unwrap();
        assert_eq!(parsed.name(), "data\\x.bin");
        assert_eq!(parsed.info(), entry.info());
        assert_eq!(parsed.next_file_offset(), 300);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("a\\b.TXT").as_deref(), Some(".txt"));
        assert_eq!(extension_of("dir.v2\\readme"), None);
        assert_eq!(extension_of("."), None);
        assert_eq!(extension_of("file."), None);
        assert_eq!(extension_of("sub"), None);
    }

    fn blob_of(entries: &[DataEntry], tail: &[u8]) -> (Vec<u8>, Vec<u32>) {
        let mut bytes = Vec::new();
        for entry in entries {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        bytes.extend_from_slice(tail);
        let w = words::from_bytes(&bytes).unwrap();
        (bytes, w)
    }

    #[test]
    fn test_walker_reads_all_entries() {
        let entries = vec![
            DataEntry::directory("."),
            DataEntry::file("abcd.txt", FileKind::Raw, 0, summary(4)),
            DataEntry::file("ab.c", FileKind::Raw, 0, summary(4)),
            DataEntry::file("abcdefg.h", FileKind::Raw, 0, summary(4)),
        ];
        let (bytes, w) = blob_of(&entries, &[]);

        let walked: Vec<_> = EntryWalker::new(&w, &bytes, 0, w.len())
            .collect::<Result<_>>()
            .unwrap();

        let names: Vec<_> = walked.iter().map(|(_, e)| e.name().to_string()).collect();
        assert_eq!(names, vec![".", "abcd.txt", "ab.c", "abcdefg.h"]);

        let mut expected_offset = 0;
        for ((offset, _), entry) in walked.iter().zip(&entries) {
            assert_eq!(*offset, expected_offset);
            expected_offset += entry.serialized_len() as u32;
        }
    }

    #[test]
    fn test_walker_stops_at_zero_name_length() {
        let entries = vec![DataEntry::file("a.txt", FileKind::Raw, 0, summary(1))];
        let (bytes, w) = blob_of(&entries, &[0u8; 64]);

        let walked: Vec<_> = EntryWalker::new(&w, &bytes, 0, w.len())
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(walked.len(), 1);
    }

    #[test]
    fn test_walker_reports_truncated_entry() {
        let entries = vec![DataEntry::file("name.txt", FileKind::Raw, 0, summary(1))];
        let (bytes, w) = blob_of(&entries, &[]);

        let mut walker = EntryWalker::new(&w, &bytes, 0, w.len() - 1);
        assert!(matches!(walker.next(), Some(Err(Error::OutOfBounds { .. }))));
        assert!(walker.next().is_none());
    }
}
