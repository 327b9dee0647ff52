//! BBA archive orchestrator.
//!
//! [`BbaArchive`] owns the open archive file exclusively for its lifetime and
//! holds the decoded layout: entries, hash table and the extension table
//! learned from the entries. Packing rebuilds the whole archive next to the
//! original and swaps it in with a single rename.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::cipher::Variant;
use crate::extension::ExtensionTable;
use crate::filter::NameFilter;
use crate::format::{DataEntry, EntryInfo};
use crate::hash_index::{HashSlot, HashTable};
use crate::layout::ArchiveLayout;
use crate::pack::{self, ChainedEntries, PackReport};
use crate::payload;
use crate::{Error, Result};

/// An open BBA archive.
pub struct BbaArchive {
    path: PathBuf,
    name: String,
    file: File,
    layout: ArchiveLayout,
    extensions: ExtensionTable,
}

/// Summary of an unpack run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct UnpackReport {
    pub files: usize,
    pub directories: usize,
    /// Entries excluded by the filter
    pub skipped: usize,
    /// Decoded bytes written
    pub bytes: u64,
}

/// A checksum that did not match on verification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CrcMismatch {
    pub name: String,
    /// `"stored"` or `"decoded"`
    pub field: &'static str,
    pub expected: u32,
    pub actual: u32,
}

/// Result of [`BbaArchive::verify`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct VerifyReport {
    /// Entries whose payload was checked
    pub checked: usize,
    pub blob_crc32_expected: u32,
    pub blob_crc32_actual: u32,
    pub mismatches: Vec<CrcMismatch>,
    /// Entries whose payload could not be decoded, with the error message
    pub failures: Vec<(String, String)>,
}

impl VerifyReport {
    /// Check whether every checksum matched.
    pub fn is_ok(&self) -> bool {
        self.blob_crc32_expected == self.blob_crc32_actual
            && self.mismatches.is_empty()
            && self.failures.is_empty()
    }
}

impl BbaArchive {
    /// Open an archive, detecting its cipher variant.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_inner(path.as_ref(), None)
    }

    /// Open an archive with a fixed cipher variant.
    pub fn open_as<P: AsRef<Path>>(path: P, variant: Variant) -> Result<Self> {
        Self::open_inner(path.as_ref(), Some(variant))
    }

    fn open_inner(path: &Path, variant: Option<Variant>) -> Result<Self> {
        let mut file = open_exclusive(path)?;
        let layout = match variant {
            Some(variant) => ArchiveLayout::read_with(&mut file, variant)?,
            None => ArchiveLayout::read(&mut file)?,
        };

        let mut extensions = ExtensionTable::new();
        extensions.learn(&layout.entries);

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        info!(
            archive = %name,
            variant = %layout.variant,
            entries = layout.entries.len(),
            slots = layout.hash_table.len(),
            "opened archive"
        );
        if !layout.orphaned_slots.is_empty() {
            warn!(count = layout.orphaned_slots.len(), "hash table has orphaned slots");
        }

        Ok(Self {
            path: path.to_path_buf(),
            name,
            file,
            layout,
            extensions,
        })
    }

    /// Write an empty archive with `slot_count` hash slots and open it.
    ///
    /// An existing file at `path` is replaced.
    pub fn create<P: AsRef<Path>>(path: P, variant: Variant, slot_count: usize) -> Result<Self> {
        let path = path.as_ref();
        let table = HashTable::with_capacity(slot_count);
        let chained = ChainedEntries {
            entries: Vec::new(),
            bytes: Vec::new(),
            unindexed: Vec::new(),
            released_slots: 0,
        };

        let mut staged = staging_file(path)?;
        {
            let mut out = BufWriter::new(staged.as_file_mut());
            pack::write_archive(&mut out, variant.config(), &chained, &table, &mut io::empty(), 0)?;
        }
        persist(staged, path)?;

        info!(path = %path.display(), %variant, slot_count, "created archive");
        Self::open_as(path, variant)
    }

    /// Archive file name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Archive path.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cipher variant the archive uses.
    #[inline]
    pub fn variant(&self) -> Variant {
        self.layout.variant
    }

    /// Decoded structure.
    #[inline]
    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    #[inline]
    pub fn entry_count(&self) -> usize {
        self.layout.entries.len()
    }

    /// Entries in stored order.
    #[inline]
    pub fn entries(&self) -> &[DataEntry] {
        &self.layout.entries
    }

    /// Iterate over entry summaries.
    pub fn iter(&self) -> impl Iterator<Item = EntryInfo> + '_ {
        self.layout.entries.iter().map(DataEntry::info)
    }

    /// Find an entry by name.
    ///
    /// Uses the hash index first and falls back to a case-insensitive scan
    /// for entries without a slot. `/` is accepted as separator.
    pub fn find(&self, name: &str) -> Option<&DataEntry> {
        let normalized = name.replace('/', "\\");

        let indexed = self
            .layout
            .hash_table
            .lookup(&normalized)
            .and_then(|slot| self.layout.entry_offsets.binary_search(&slot.offset).ok())
            .map(|i| &self.layout.entries[i]);

        indexed.or_else(|| {
            self.layout
                .entries
                .iter()
                .find(|e| e.name().eq_ignore_ascii_case(&normalized))
        })
    }

    /// Hash table slots.
    #[inline]
    pub fn hash_slots(&self) -> &[HashSlot] {
        self.layout.hash_table.slots()
    }

    /// Offsets referenced by hash slots that match no entry.
    #[inline]
    pub fn orphaned_slots(&self) -> &[u32] {
        &self.layout.orphaned_slots
    }

    /// Extension table used for packing.
    #[inline]
    pub fn extensions(&self) -> &ExtensionTable {
        &self.extensions
    }

    /// Mutable extension table, for seeding classifications before packing.
    #[inline]
    pub fn extensions_mut(&mut self) -> &mut ExtensionTable {
        &mut self.extensions
    }

    /// Read and decode an entry's payload.
    pub fn read(&self, entry: &DataEntry) -> Result<Vec<u8>> {
        let mut reader = &self.file;
        payload::decode(&mut reader, entry, self.layout.variant.config())
    }

    /// Read an entry by name.
    pub fn read_by_name(&self, name: &str) -> Result<Vec<u8>> {
        let entry = self
            .find(name)
            .ok_or_else(|| Error::EntryNotFound(name.to_string()))?;
        self.read(entry)
    }

    /// Default extraction folder: `<stem>_Extracted` next to the archive.
    pub fn default_output_dir(&self) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.name.clone());
        let parent = self.path.parent().unwrap_or_else(|| Path::new(""));
        parent.join(format!("{stem}_Extracted"))
    }

    /// Extract every entry into [`BbaArchive::default_output_dir`].
    pub fn unpack(&self) -> Result<UnpackReport> {
        self.unpack_to(&self.default_output_dir(), None)
    }

    /// Extract entries into `output`, optionally only those matching `filter`.
    pub fn unpack_to(&self, output: &Path, filter: Option<&NameFilter>) -> Result<UnpackReport> {
        self.unpack_with_progress(output, filter, |_, _, _| {})
    }

    /// Like [`BbaArchive::unpack_to`], calling `progress(done, total, entry)`
    /// after every entry.
    pub fn unpack_with_progress<F>(
        &self,
        output: &Path,
        filter: Option<&NameFilter>,
        mut progress: F,
    ) -> Result<UnpackReport>
    where
        F: FnMut(usize, usize, &DataEntry),
    {
        fs::create_dir_all(output)?;
        let total = self.layout.entries.len();
        let mut report = UnpackReport::default();

        for (i, entry) in self.layout.entries.iter().enumerate() {
            if !entry.is_root() {
                if filter.is_some_and(|f| !f.matches(entry.name())) {
                    report.skipped += 1;
                } else if let Some(written) = self.unpack_entry(entry, output)? {
                    report.files += 1;
                    report.bytes += written;
                } else {
                    report.directories += 1;
                }
            }
            progress(i + 1, total, entry);
        }

        info!(
            output = %output.display(),
            files = report.files,
            directories = report.directories,
            bytes = report.bytes,
            "unpack complete"
        );
        Ok(report)
    }

    /// Extract one entry below `output`.
    ///
    /// Directory entries and names without an extension only create a
    /// directory and return `None`; files return the decoded byte count.
    pub fn unpack_entry(&self, entry: &DataEntry, output: &Path) -> Result<Option<u64>> {
        let target = output.join(entry.output_path());

        if entry.is_directory() || entry.extension().is_none() {
            fs::create_dir_all(&target)?;
            return Ok(None);
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut out = BufWriter::new(File::create(&target)?);
        let mut reader = &self.file;
        let written = payload::decode_to(&mut reader, entry, self.layout.variant.config(), &mut out)?;
        out.flush()?;
        Ok(Some(written))
    }

    /// Recompute the blob checksum and every payload checksum.
    pub fn verify(&self) -> Result<VerifyReport> {
        let mut report = VerifyReport {
            blob_crc32_expected: self.layout.directory_header.crc32,
            blob_crc32_actual: self.layout.blob_crc32,
            ..Default::default()
        };
        if !report.is_ok() {
            warn!(
                expected = report.blob_crc32_expected,
                actual = report.blob_crc32_actual,
                "directory blob checksum mismatch"
            );
        }

        let config = self.layout.variant.config();
        for entry in self.layout.entries.iter().filter(|e| !e.is_directory()) {
            report.checked += 1;

            let mut reader = &self.file;
            let (stored, decoded) = match payload::checksums(&mut reader, entry, config) {
                Ok(crcs) => crcs,
                Err(e) => {
                    warn!(name = entry.name(), error = %e, "payload failed to decode");
                    report.failures.push((entry.name().to_string(), e.to_string()));
                    continue;
                }
            };

            for (field, expected, actual) in [
                ("stored", entry.compressed_crc32(), stored),
                ("decoded", entry.decompressed_crc32(), decoded),
            ] {
                if expected != actual {
                    warn!(name = entry.name(), field, expected, actual, "checksum mismatch");
                    report.mismatches.push(CrcMismatch {
                        name: entry.name().to_string(),
                        field,
                        expected,
                        actual,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Rebuild the archive from the contents of `input`.
    ///
    /// The original file is only replaced once the new archive is complete.
    /// Returns the reopened archive and the pack report.
    pub fn pack<P: AsRef<Path>>(self, input: P) -> Result<(Self, PackReport)> {
        self.pack_with_progress(input, |_, _, _| {})
    }

    /// Like [`BbaArchive::pack`], calling `progress(done, total, name)` after
    /// every payload.
    pub fn pack_with_progress<P, F>(self, input: P, progress: F) -> Result<(Self, PackReport)>
    where
        P: AsRef<Path>,
        F: FnMut(usize, usize, &str),
    {
        let Self {
            path,
            file,
            layout,
            extensions,
            ..
        } = self;
        let variant = layout.variant;
        let mut table = layout.hash_table;

        let mut staged = staging_file(&path)?;
        let report = {
            let mut out = BufWriter::new(staged.as_file_mut());
            pack::pack_folder(
                input.as_ref(),
                &mut out,
                variant.config(),
                &extensions,
                &mut table,
                progress,
            )?
        };
        staged.as_file().sync_all()?;

        drop(file);
        persist(staged, &path)?;

        let mut archive = Self::open_as(&path, variant)?;
        archive.extensions = extensions;
        Ok((archive, report))
    }
}

impl std::fmt::Debug for BbaArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BbaArchive")
            .field("path", &self.path)
            .field("variant", &self.layout.variant)
            .field("entries", &self.layout.entries.len())
            .finish()
    }
}

/// Open `path` for reading and writing without sharing.
fn open_exclusive(path: &Path) -> Result<File> {
    let mut options = OpenOptions::new();
    options.read(true).write(true);

    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        options.share_mode(0);
    }

    Ok(options.open(path)?)
}

/// Scratch file in the destination folder, so the final rename stays on one
/// filesystem.
fn staging_file(path: &Path) -> Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    Ok(NamedTempFile::new_in(dir)?)
}

fn persist(staged: NamedTempFile, path: &Path) -> Result<()> {
    staged.persist(path).map_err(|e| Error::Persist {
        path: path.to_path_buf(),
        source: e.error,
    })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.bba");

        let archive = BbaArchive::create(&path, Variant::Demo, 16).unwrap();
        assert_eq!(archive.entry_count(), 0);
        assert_eq!(archive.hash_slots().len(), 16);
        assert_eq!(archive.variant(), Variant::Demo);
        assert!(archive.orphaned_slots().is_empty());
        drop(archive);

        let reopened = BbaArchive::open(&path).unwrap();
        assert_eq!(reopened.variant(), Variant::Demo);
        assert!(reopened.verify().unwrap().is_ok());
    }

    #[test]
    fn test_default_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Base.bba");
        let archive = BbaArchive::create(&path, Variant::Product, 4).unwrap();
        assert_eq!(archive.default_output_dir(), dir.path().join("Base_Extracted"));
        assert_eq!(archive.name(), "Base.bba");
    }

    #[test]
    fn test_open_garbage_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.bba");
        let mut data = b"BAF\x06".to_vec();
        data.extend_from_slice(&7u32.to_le_bytes());
        data.extend_from_slice(&64u32.to_le_bytes());
        data.extend_from_slice(&0x6D1A_8389u32.to_le_bytes());
        data.extend_from_slice(&[0x5A; 200]);
        fs::write(&path, data).unwrap();

        assert!(matches!(BbaArchive::open(&path), Err(Error::UnknownVariant)));
    }

    #[test]
    fn test_read_missing_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = BbaArchive::create(dir.path().join("a.bba"), Variant::Product, 4).unwrap();
        assert!(matches!(
            archive.read_by_name("nope.txt"),
            Err(Error::EntryNotFound(_))
        ));
    }
}
