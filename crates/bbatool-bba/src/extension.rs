//! Extension to payload-kind classification used when packing.
//!
//! Archives do not record which files the game expects compressed. The table
//! is learned from the entries of the archive being repacked and can be
//! seeded by the caller.

use std::collections::BTreeMap;

use crate::format::{extension_of, DataEntry, FileKind};

/// Kinds a file can be classified as, in lookup priority order.
const CLASSIFIED_KINDS: [FileKind; 3] = [FileKind::Tea, FileKind::Compressed, FileKind::Raw];

/// Extension table keyed by payload kind.
#[derive(Debug, Clone, Default)]
pub struct ExtensionTable {
    kinds: BTreeMap<FileKind, Vec<String>>,
}

impl ExtensionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the extensions of `entries` under their stored kind.
    ///
    /// Directories, extensionless names and unknown kinds are skipped.
    pub fn learn<'a, I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = &'a DataEntry>,
    {
        for entry in entries {
            if let Some(extension) = entry.extension() {
                self.insert(entry.kind(), extension);
            }
        }
    }

    /// Classify `extension` (with or without the leading dot) as `kind`.
    ///
    /// Returns `false` for kinds that cannot be classified.
    pub fn register(&mut self, extension: &str, kind: FileKind) -> bool {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        if extension.is_empty() {
            return false;
        }
        self.insert(kind, format!(".{extension}"))
    }

    fn insert(&mut self, kind: FileKind, extension: String) -> bool {
        if !CLASSIFIED_KINDS.contains(&kind) {
            return false;
        }
        let list = self.kinds.entry(kind).or_default();
        if !list.contains(&extension) {
            list.push(extension);
        }
        true
    }

    /// Kind recorded for the extension of `name`, if any.
    pub fn classify(&self, name: &str) -> Option<FileKind> {
        let extension = extension_of(name)?;
        CLASSIFIED_KINDS.into_iter().find(|kind| {
            self.kinds
                .get(kind)
                .is_some_and(|list| list.contains(&extension))
        })
    }

    /// Check whether files named `name` are gzipped on pack.
    pub fn is_compressed(&self, name: &str) -> bool {
        self.classify(name) == Some(FileKind::Compressed)
    }

    /// Iterate `(kind, extension)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (FileKind, &str)> + '_ {
        self.kinds
            .iter()
            .flat_map(|(kind, list)| list.iter().map(move |e| (*kind, e.as_str())))
    }

    pub fn len(&self) -> usize {
        self.kinds.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::PayloadSummary;

    fn entry(name: &str, kind: FileKind) -> DataEntry {
        DataEntry::file(name, kind, 0, PayloadSummary::default())
    }

    #[test]
    fn test_learn_from_entries() {
        let entries = vec![
            entry("a\\b.XML", FileKind::Compressed),
            entry("a\\c.dds", FileKind::Raw),
            entry("a\\d.lua", FileKind::Tea),
            entry("a\\noext", FileKind::Raw),
            DataEntry::directory("a"),
        ];
        let mut table = ExtensionTable::new();
        table.learn(&entries);

        assert_eq!(table.len(), 3);
        assert_eq!(table.classify("x\\y.xml"), Some(FileKind::Compressed));
        assert_eq!(table.classify("y.dds"), Some(FileKind::Raw));
        assert_eq!(table.classify("y.lua"), Some(FileKind::Tea));
        assert_eq!(table.classify("y.png"), None);
        assert!(table.is_compressed("q.Xml"));
    }

    #[test]
    fn test_priority_order() {
        let mut table = ExtensionTable::new();
        table.register("bin", FileKind::Raw);
        table.register(".bin", FileKind::Compressed);
        assert_eq!(table.classify("a.bin"), Some(FileKind::Compressed));

        table.register("BIN", FileKind::Tea);
        assert_eq!(table.classify("a.bin"), Some(FileKind::Tea));
    }

    #[test]
    fn test_register_rejects_unclassifiable() {
        let mut table = ExtensionTable::new();
        assert!(!table.register("x", FileKind::Directory));
        assert!(!table.register("", FileKind::Raw));
        assert!(table.is_empty());
    }
}
