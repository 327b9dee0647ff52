//! Structural decode of an archive: header, Directory Header and the
//! decrypted directory blob.
//!
//! Which cipher variant an archive uses is not recorded anywhere. Decoding is
//! tried with each variant in turn; a variant is rejected as soon as a
//! declared size or offset does not fit the data.

use std::collections::HashMap;
use std::io::{Read, Seek, SeekFrom};

use bbatool_common::{crc, words};
use tracing::{debug, warn};

use crate::cipher::{self, Region, Variant};
use crate::format::{DataEntry, Directory, DirectoryHeader, EntryWalker, Header};
use crate::hash_index::HashTable;
use crate::{Error, Result};

/// Everything decoded from an archive except the payloads.
#[derive(Debug, Clone)]
pub struct ArchiveLayout {
    /// Cipher variant the archive decoded under
    pub variant: Variant,
    pub header: Header,
    pub directory_header: DirectoryHeader,
    pub directory: Directory,
    /// Entries in stored order
    pub entries: Vec<DataEntry>,
    /// Byte offset of each entry from the first entry
    pub entry_offsets: Vec<u32>,
    pub hash_table: HashTable,
    /// Offsets referenced by hash slots that match no entry
    pub orphaned_slots: Vec<u32>,
    /// CRC-32 of the encrypted blob as found on disk
    pub blob_crc32: u32,
}

impl ArchiveLayout {
    /// Decode the archive, detecting its cipher variant.
    pub fn read<R: Read + Seek>(reader: &mut R) -> Result<Self> {
        for variant in Variant::DETECTION_ORDER {
            match Self::read_with(reader, variant) {
                Ok(layout) => return Ok(layout),
                Err(e) if e.is_format_error() => {
                    debug!(%variant, error = %e, "variant rejected");
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::UnknownVariant)
    }

    /// Decode the archive with a fixed cipher variant.
    pub fn read_with<R: Read + Seek>(reader: &mut R, variant: Variant) -> Result<Self> {
        let config = variant.config();
        let file_len = reader.seek(SeekFrom::End(0))?;
        reader.seek(SeekFrom::Start(0))?;

        let mut header_bytes = [0u8; Header::SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = Header::parse(&header_bytes)?;
        if !header.has_magic() {
            let magic = header.magic;
            warn!(?magic, "unexpected header magic");
        }

        let header_size = u64::from(header.header_size);
        check_bounds("header size", Header::SIZE as u64 + header_size, file_len)?;

        let mut directory_header_bytes = vec![0u8; header_size as usize];
        reader.read_exact(&mut directory_header_bytes)?;
        cipher::decrypt_in_place(&mut directory_header_bytes, config.params(Region::Header))?;
        let directory_header = DirectoryHeader::from_decrypted(&directory_header_bytes)?;

        let blob_offset = directory_header.blob_offset();
        let blob_len = u64::from(directory_header.length);
        check_bounds("blob length", Directory::SIZE as u64, blob_len)?;
        check_bounds("blob offset", blob_offset.saturating_add(blob_len), file_len)?;

        let mut blob = vec![0u8; blob_len as usize];
        reader.seek(SeekFrom::Start(blob_offset))?;
        reader.read_exact(&mut blob)?;
        let blob_crc32 = crc::hash_bytes(&blob);

        cipher::decrypt_in_place(&mut blob, config.params(Region::File))?;
        let blob_words = words::from_bytes(&blob)?;
        let directory = Directory::parse(&blob)?;

        let table_offset = directory.offset_file_hashtable;
        if table_offset % 4 != 0 {
            return Err(Error::OutOfBounds {
                field: "hash table alignment",
                value: u64::from(table_offset),
                limit: blob_len,
            });
        }
        let table_word = directory.hashtable_word();
        check_bounds("hash table offset", Directory::WORDS as u64, table_word as u64)?;
        check_bounds("hash table offset", table_word as u64 + 1, blob_words.len() as u64)?;

        let mut entries = Vec::new();
        let mut entry_offsets = Vec::new();
        for item in EntryWalker::new(&blob_words, &blob, Directory::WORDS, table_word) {
            let (offset, entry) = item?;
            debug!(
                name = entry.name(),
                kind = entry.kind().label(),
                offset,
                size = entry.compressed_size(),
                "decoded entry"
            );
            entry_offsets.push(offset);
            entries.push(entry);
        }

        let declared = directory.number_of_files;
        if declared as usize != entries.len() {
            warn!(declared, found = entries.len(), "entry count mismatch");
        }

        let names: HashMap<u32, &str> = entry_offsets
            .iter()
            .copied()
            .zip(entries.iter().map(DataEntry::name))
            .collect();
        let (hash_table, orphaned_slots) = HashTable::parse(&blob_words, table_word, &names)?;

        debug!(
            %variant,
            entries = entries.len(),
            slots = hash_table.len(),
            orphaned = orphaned_slots.len(),
            "archive layout decoded"
        );

        Ok(Self {
            variant,
            header,
            directory_header,
            directory,
            entries,
            entry_offsets,
            hash_table,
            orphaned_slots,
            blob_crc32,
        })
    }
}

fn check_bounds(field: &'static str, value: u64, limit: u64) -> Result<()> {
    if value > limit {
        return Err(Error::OutOfBounds { field, value, limit });
    }
    Ok(())
}
