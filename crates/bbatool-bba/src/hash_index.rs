//! Name-hash lookup table stored at the end of the directory blob.
//!
//! The table is a slot count followed by `(hash, offset)` pairs, where `hash`
//! is the CRC-32 of an entry's full name and `offset` is the entry's byte
//! offset from the first entry. The slot count is fixed when the archive is
//! created; packing reuses slots and never grows the table.

use std::collections::{HashMap, HashSet};

use bbatool_common::{crc, words};
use tracing::warn;

use crate::{Error, Result};

/// Who a hash slot belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotOwner {
    /// Free for allocation.
    Empty,
    /// Indexes the named entry.
    Entry(String),
    /// Non-zero hash whose offset matches no entry. Never reused for
    /// allocation; released on the next rebuild.
    Orphaned,
}

/// One slot of the hash table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashSlot {
    /// CRC-32 of the owning entry's name (0 when empty)
    pub hash: u32,
    /// Byte offset of the owning entry from the first entry
    pub offset: u32,
    /// Slot owner
    pub owner: SlotOwner,
}

impl HashSlot {
    /// An empty slot.
    pub const fn empty() -> Self {
        Self {
            hash: 0,
            offset: 0,
            owner: SlotOwner::Empty,
        }
    }

    /// Check whether the slot is free for allocation.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.owner == SlotOwner::Empty
    }

    /// Name of the owning entry, if any.
    pub fn name(&self) -> Option<&str> {
        match &self.owner {
            SlotOwner::Entry(name) => Some(name),
            _ => None,
        }
    }
}

/// Hash table with a name-to-slot index.
#[derive(Debug, Clone, Default)]
pub struct HashTable {
    slots: Vec<HashSlot>,
    index: HashMap<String, usize>,
}

impl HashTable {
    /// A table of `count` empty slots.
    pub fn with_capacity(count: usize) -> Self {
        Self {
            slots: vec![HashSlot::empty(); count],
            index: HashMap::new(),
        }
    }

    /// Decode the table starting at word `at` of the decrypted blob.
    ///
    /// `names` maps entry offsets to entry names. Returns the table and the
    /// offsets of orphaned slots.
    pub fn parse(words: &[u32], at: usize, names: &HashMap<u32, &str>) -> Result<(Self, Vec<u32>)> {
        let count = *words.get(at).ok_or(Error::OutOfBounds {
            field: "hash table offset",
            value: at as u64,
            limit: words.len() as u64,
        })? as usize;

        let end = (at + 1).saturating_add(count.saturating_mul(2));
        if end > words.len() {
            return Err(Error::OutOfBounds {
                field: "hash table size",
                value: end as u64,
                limit: words.len() as u64,
            });
        }

        let mut table = Self {
            slots: Vec::with_capacity(count),
            index: HashMap::new(),
        };
        let mut orphans = Vec::new();

        for (i, pair) in words[at + 1..end].chunks_exact(2).enumerate() {
            let (hash, offset) = (pair[0], pair[1]);
            let owner = if hash == 0 {
                SlotOwner::Empty
            } else if let Some(name) = names.get(&offset) {
                table.index.entry((*name).to_string()).or_insert(i);
                SlotOwner::Entry((*name).to_string())
            } else {
                warn!(slot = i, offset, hash, "hash slot references no entry");
                orphans.push(offset);
                SlotOwner::Orphaned
            };
            table.slots.push(HashSlot { hash, offset, owner });
        }

        Ok((table, orphans))
    }

    /// Number of slots.
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Check if the table has no slots.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// All slots in stored order.
    #[inline]
    pub fn slots(&self) -> &[HashSlot] {
        &self.slots
    }

    /// Number of slots owned by an entry.
    pub fn occupied(&self) -> usize {
        self.slots.iter().filter(|s| s.name().is_some()).count()
    }

    /// Slot indexing `name`.
    pub fn lookup(&self, name: &str) -> Option<&HashSlot> {
        self.index.get(name).map(|&i| &self.slots[i])
    }

    /// Index `name` at `offset`.
    ///
    /// An existing slot is updated in place; otherwise the first empty slot
    /// is claimed. Returns the slot index.
    pub fn assign(&mut self, name: &str, offset: u32) -> Result<usize> {
        if let Some(&i) = self.index.get(name) {
            self.slots[i].offset = offset;
            return Ok(i);
        }

        let i = self
            .slots
            .iter()
            .position(HashSlot::is_empty)
            .ok_or_else(|| Error::HashTableFull(name.to_string()))?;

        self.slots[i] = HashSlot {
            hash: crc::hash_str(name),
            offset,
            owner: SlotOwner::Entry(name.to_string()),
        };
        self.index.insert(name.to_string(), i);
        Ok(i)
    }

    /// Release every slot not indexing one of `live`.
    ///
    /// Orphaned slots and duplicate slots for the same name are released too.
    /// Returns the number of released slots.
    pub fn release_stale(&mut self, live: &HashSet<&str>) -> usize {
        let mut released = 0;
        for (i, slot) in self.slots.iter_mut().enumerate() {
            let keep = match &slot.owner {
                SlotOwner::Empty => continue,
                SlotOwner::Orphaned => false,
                SlotOwner::Entry(name) => {
                    live.contains(name.as_str()) && self.index.get(name) == Some(&i)
                }
            };
            if !keep {
                *slot = HashSlot::empty();
                released += 1;
            }
        }

        self.index.retain(|name, _| live.contains(name.as_str()));
        released
    }

    /// Serialize the slot count and the slot pairs.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(1 + self.slots.len() * 2);
        out.push(self.slots.len() as u32);
        for slot in &self.slots {
            out.extend([slot.hash, slot.offset]);
        }
        words::to_bytes(&out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names<'a>(pairs: &[(u32, &'a str)]) -> HashMap<u32, &'a str> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_parse_resolves_owners() {
        let words = vec![
            0xAAAA, // unrelated leading word
            3,
            crc::hash_str("a.txt"),
            0,
            0,
            0,
            0xDEAD,
            500,
        ];
        let (table, orphans) = HashTable::parse(&words, 1, &names(&[(0, "a.txt")])).unwrap();

        assert_eq!(table.len(), 3);
        assert_eq!(table.slots()[0].name(), Some("a.txt"));
        assert!(table.slots()[1].is_empty());
        assert_eq!(table.slots()[2].owner, SlotOwner::Orphaned);
        assert_eq!(orphans, vec![500]);
        assert_eq!(table.lookup("a.txt").map(|s| s.offset), Some(0));
    }

    #[test]
    fn test_parse_rejects_oversized_count() {
        let words = vec![10, 0, 0];
        assert!(matches!(
            HashTable::parse(&words, 0, &HashMap::new()),
            Err(Error::OutOfBounds { .. })
        ));
        assert!(HashTable::parse(&words, 5, &HashMap::new()).is_err());
    }

    #[test]
    fn test_assign_reuses_existing_slot() {
        let mut table = HashTable::with_capacity(2);
        let first = table.assign("x.bin", 0).unwrap();
        let again = table.assign("x.bin", 96).unwrap();

        assert_eq!(first, again);
        assert_eq!(table.slots()[first].offset, 96);
        assert_eq!(table.slots()[first].hash, crc::hash_str("x.bin"));
        assert_eq!(table.occupied(), 1);
    }

    #[test]
    fn test_assign_full_table() {
        let mut table = HashTable::with_capacity(1);
        table.assign("a", 0).unwrap();
        assert!(matches!(
            table.assign("b", 72),
            Err(Error::HashTableFull(name)) if name == "b"
        ));
    }

    #[test]
    fn test_orphans_not_allocated_but_released() {
        let words = vec![2, 0x1234, 900, 0, 0];
        let (mut table, _) = HashTable::parse(&words, 0, &HashMap::new()).unwrap();

        let i = table.assign("new.txt", 0).unwrap();
        assert_eq!(i, 1);

        let live: HashSet<&str> = ["new.txt"].into_iter().collect();
        assert_eq!(table.release_stale(&live), 1);
        assert!(table.slots()[0].is_empty());
        assert_eq!(table.slots()[1].name(), Some("new.txt"));
    }

    #[test]
    fn test_release_removed_and_duplicate_names() {
        let words = vec![
            3,
            crc::hash_str("keep"),
            0,
            crc::hash_str("keep"),
            0,
            crc::hash_str("gone"),
            72,
        ];
        let (mut table, orphans) =
            HashTable::parse(&words, 0, &names(&[(0, "keep"), (72, "gone")])).unwrap();
        assert!(orphans.is_empty());

        let live: HashSet<&str> = ["keep"].into_iter().collect();
        assert_eq!(table.release_stale(&live), 2);
        assert_eq!(table.occupied(), 1);
        assert!(table.lookup("gone").is_none());
        assert_eq!(table.lookup("keep").map(|s| s.offset), Some(0));
    }

    #[test]
    fn test_to_bytes_layout() {
        let mut table = HashTable::with_capacity(2);
        table.assign("a", 64).unwrap();

        let w = words::from_bytes(&table.to_bytes()).unwrap();
        assert_eq!(w, vec![2, crc::hash_str("a"), 64, 0, 0]);
    }
}
