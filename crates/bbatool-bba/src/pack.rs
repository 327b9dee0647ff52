//! Archive writer.
//!
//! Packing walks the input folder, streams every file payload into a scratch
//! file, then rebuilds the directory blob (entries, chain pointers and hash
//! slots) and assembles the final archive:
//!
//! ```text
//! [Header][DirectoryHeader, encrypted][payloads][Directory + entries + hash table, encrypted]
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Component, Path, PathBuf};

use bbatool_common::{crc, filetime};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;
use zerocopy::IntoBytes;

use crate::cipher::{self, Region, VariantConfig};
use crate::extension::ExtensionTable;
use crate::format::{DataEntry, Directory, DirectoryHeader, FileKind, Header, CHAIN_END, PAYLOAD_START};
use crate::hash_index::HashTable;
use crate::payload::{self, fit_u32};
use crate::{Error, Result};

/// One file or directory found under the input folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackInput {
    /// Entry name relative to the input root, `\`-separated (`.` for the root)
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
}

/// Summary of a pack run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PackReport {
    /// Entries written, including the root
    pub entries: usize,
    pub files: usize,
    pub directories: usize,
    /// Files stored gzip-compressed
    pub compressed: usize,
    /// Total stored payload bytes
    pub payload_bytes: u64,
    /// Entries written without a hash slot because the table was full
    pub unindexed: Vec<String>,
    /// Hash slots released because their entry no longer exists
    pub released_slots: usize,
}

/// Enumerate `root` in archive order.
///
/// The root comes first. Inside every directory, files come before
/// subdirectories, both sorted by name, and every subdirectory is directly
/// followed by its own contents.
pub fn collect_inputs(root: &Path) -> Result<Vec<PackInput>> {
    if !root.is_dir() {
        return Err(Error::InputNotFound(root.to_path_buf()));
    }

    let walker = WalkDir::new(root).follow_links(false).sort_by(|a, b| {
        a.file_type()
            .is_dir()
            .cmp(&b.file_type().is_dir())
            .then_with(|| a.file_name().cmp(b.file_name()))
    });

    let mut inputs = Vec::new();
    for item in walker {
        let item = item.map_err(io::Error::from)?;
        let file_type = item.file_type();
        if !file_type.is_file() && !file_type.is_dir() {
            warn!(path = %item.path().display(), "skipping special file");
            continue;
        }

        inputs.push(PackInput {
            name: entry_name(root, item.path()),
            path: item.path().to_path_buf(),
            is_dir: file_type.is_dir(),
        });
    }
    Ok(inputs)
}

/// Entry name of `path` relative to `root`.
fn entry_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    let parts: Vec<_> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        ".".to_string()
    } else {
        parts.join("\\")
    }
}

/// FILETIME of a file's creation time, falling back to its modification time.
fn file_timestamp(metadata: &fs::Metadata) -> u64 {
    metadata
        .created()
        .or_else(|_| metadata.modified())
        .map_or(0, filetime::from_system_time)
}

/// Build the entry for one input, appending its payload to `payloads`.
pub fn build_entry<W: Write>(
    input: &PackInput,
    extensions: &ExtensionTable,
    config: &VariantConfig,
    payloads: &mut W,
) -> Result<DataEntry> {
    if input.is_dir {
        return Ok(DataEntry::directory(&input.name));
    }

    let file = File::open(&input.path)?;
    let timestamp = file_timestamp(&file.metadata()?);
    let mut reader = BufReader::new(file);

    let (kind, summary) = if extensions.is_compressed(&input.name) {
        let name_length = fit_u32("name length", input.name.len() as u64)?;
        let summary = payload::encode_compressed(&mut reader, name_length, config, payloads)?;
        (FileKind::Compressed, summary)
    } else {
        (FileKind::Raw, payload::encode_raw(&mut reader, payloads)?)
    };

    debug!(
        name = %input.name,
        kind = kind.label(),
        size = summary.decompressed_size,
        stored = summary.compressed_size,
        "packed payload"
    );
    Ok(DataEntry::file(&input.name, kind, timestamp, summary))
}

/// Entry list and hash table ready to be written.
#[derive(Debug)]
pub struct ChainedEntries {
    pub entries: Vec<DataEntry>,
    /// Serialized entries
    pub bytes: Vec<u8>,
    pub unindexed: Vec<String>,
    pub released_slots: usize,
}

/// Assign payload offsets, chain pointers and hash slots.
///
/// Payloads are laid out back to back from [`PAYLOAD_START`] in entry order.
/// A full hash table is logged and the entry is kept without a slot.
pub fn chain_entries(entries: &[DataEntry], table: &mut HashTable) -> Result<ChainedEntries> {
    let mut chained = Vec::with_capacity(entries.len());
    let mut bytes = Vec::new();
    let mut unindexed = Vec::new();
    let mut entry_offset = 0u64;
    let mut payload_offset = PAYLOAD_START;

    for (i, entry) in entries.iter().enumerate() {
        let start = fit_u32("entry list", entry_offset)?;
        match table.assign(entry.name(), start) {
            Ok(_) => {}
            Err(Error::HashTableFull(name)) => {
                error!(name = %name, slots = table.len(), "no free hash slot, entry left unindexed");
                unindexed.push(name);
            }
            Err(e) => return Err(e),
        }

        entry_offset += entry.serialized_len() as u64;
        let next = if i + 1 == entries.len() {
            CHAIN_END
        } else {
            fit_u32("entry list", entry_offset)?
        };

        let entry = entry.with_chain(fit_u32("payload offset", payload_offset)?, next);
        if !entry.is_directory() {
            payload_offset += u64::from(entry.compressed_size());
        }
        bytes.extend_from_slice(&entry.to_bytes());
        chained.push(entry);
    }

    let live: HashSet<&str> = entries.iter().map(DataEntry::name).collect();
    let released_slots = table.release_stale(&live);

    Ok(ChainedEntries {
        entries: chained,
        bytes,
        unindexed,
        released_slots,
    })
}

/// Assemble a complete archive into `out`.
///
/// `payloads` must yield exactly `payload_len` bytes laid out as described
/// by the entries in `chained`.
pub fn write_archive<W, R>(
    out: &mut W,
    config: &VariantConfig,
    chained: &ChainedEntries,
    table: &HashTable,
    payloads: &mut R,
    payload_len: u64,
) -> Result<()>
where
    W: Write,
    R: Read + ?Sized,
{
    let table_offset = fit_u32("entry list", (Directory::SIZE + chained.bytes.len()) as u64)?;
    let count = fit_u32("entry count", chained.entries.len() as u64)?;
    let directory = Directory::new(count, table_offset);

    let table_bytes = table.to_bytes();
    let mut blob = Vec::with_capacity(Directory::SIZE + chained.bytes.len() + table_bytes.len());
    blob.extend_from_slice(directory.as_bytes());
    blob.extend_from_slice(&chained.bytes);
    blob.extend_from_slice(&table_bytes);

    cipher::encrypt_in_place(&mut blob, config.params(Region::File))?;
    let blob_crc32 = crc::hash_bytes(&blob);

    let blob_offset = PAYLOAD_START + payload_len;
    let blob_len = fit_u32("directory blob", blob.len() as u64)?;
    let directory_header = DirectoryHeader::new(blob_offset, blob_len, blob_crc32);
    let mut directory_header_bytes = directory_header.as_bytes().to_vec();
    cipher::encrypt_in_place(&mut directory_header_bytes, config.params(Region::Header))?;

    out.write_all(Header::new().as_bytes())?;
    out.write_all(&directory_header_bytes)?;
    let copied = payload::copy_chunked(payloads, out)?;
    if copied != payload_len {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("payload scratch holds {copied} bytes, expected {payload_len}"),
        )));
    }
    out.write_all(&blob)?;
    out.flush()?;

    debug!(
        blob_offset,
        blob_len,
        crc32 = blob_crc32,
        "archive assembled"
    );
    Ok(())
}

/// Pack `input` into `out`, reusing the slots of `table`.
pub fn pack_folder<W, F>(
    input: &Path,
    out: &mut W,
    config: &VariantConfig,
    extensions: &ExtensionTable,
    table: &mut HashTable,
    mut progress: F,
) -> Result<PackReport>
where
    W: Write,
    F: FnMut(usize, usize, &str),
{
    let inputs = collect_inputs(input)?;
    info!(input = %input.display(), entries = inputs.len(), "packing folder");

    let mut scratch = BufWriter::new(tempfile::tempfile()?);
    let mut entries = Vec::with_capacity(inputs.len());
    for (i, item) in inputs.iter().enumerate() {
        entries.push(build_entry(item, extensions, config, &mut scratch)?);
        progress(i + 1, inputs.len(), &item.name);
    }

    let mut scratch = scratch.into_inner().map_err(io::IntoInnerError::into_error)?;
    let payload_len = scratch.stream_position()?;
    scratch.rewind()?;

    let chained = chain_entries(&entries, table)?;
    write_archive(out, config, &chained, table, &mut BufReader::new(scratch), payload_len)?;

    let directories = entries.iter().filter(|e| e.is_directory()).count();
    let report = PackReport {
        entries: entries.len(),
        files: entries.len() - directories,
        directories,
        compressed: entries.iter().filter(|e| e.kind() == FileKind::Compressed).count(),
        payload_bytes: payload_len,
        unindexed: chained.unindexed,
        released_slots: chained.released_slots,
    };
    info!(
        entries = report.entries,
        payload_bytes = report.payload_bytes,
        unindexed = report.unindexed.len(),
        released = report.released_slots,
        "pack complete"
    );
    Ok(report)
}
