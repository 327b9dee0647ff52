//! BBA archive reader and writer for The Settlers 7 game files.
//!
//! BBA is the encrypted asset container of the game. An archive consists of:
//!
//! - A plaintext 16-byte header ("BAF", version 6)
//! - An encrypted Directory Header locating the directory blob
//! - The file payloads, stored raw, gzip-compressed or block-ciphered
//! - An encrypted blob holding the directory, the entry list and a name-hash
//!   lookup table
//!
//! Two cipher variants exist (product and demo builds). Nothing in the file
//! says which one applies; it is detected by trial decoding on open.
//!
//! # Example
//!
//! ```no_run
//! use bbatool_bba::BbaArchive;
//!
//! let archive = BbaArchive::open("Base.bba")?;
//!
//! for entry in archive.iter() {
//!     println!("{}: {} bytes", entry.name, entry.decompressed_size);
//! }
//!
//! // Extract everything into Base_Extracted/
//! let report = archive.unpack()?;
//! println!("{} files", report.files);
//!
//! // Repack from the extracted folder
//! let (archive, report) = archive.pack("Base_Extracted")?;
//! println!("{} entries, {} unindexed", report.entries, report.unindexed.len());
//! # Ok::<(), bbatool_bba::Error>(())
//! ```

mod archive;
pub mod cipher;
mod error;
mod extension;
mod filter;
pub mod format;
mod hash_index;
mod layout;
pub mod pack;
pub mod payload;

pub use archive::{BbaArchive, CrcMismatch, UnpackReport, VerifyReport};
pub use cipher::{Variant, VariantConfig};
pub use error::{Error, Result};
pub use extension::ExtensionTable;
pub use filter::NameFilter;
pub use format::{DataEntry, EntryInfo, FileKind};
pub use hash_index::{HashSlot, HashTable, SlotOwner};
pub use layout::ArchiveLayout;
pub use pack::PackReport;
