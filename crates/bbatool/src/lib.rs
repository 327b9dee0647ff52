//! bbatool - The Settlers 7 BBA archive library.
//!
//! This crate provides a unified interface to the bbatool crates.
//!
//! # Crates
//!
//! - [`bbatool_common`] - Common utilities (binary reading, word buffers, CRC-32, FILETIME)
//! - [`bbatool_bba`] - BBA archive codec (cipher, directory blob, pack and unpack)
//!
//! # Example
//!
//! ```no_run
//! use bbatool::prelude::*;
//!
//! let archive = BbaArchive::open("Base.bba")?;
//! if let Some(entry) = archive.find("Data\\Base\\config.xml") {
//!     let data = archive.read(entry)?;
//!     println!("{} bytes", data.len());
//! }
//!
//! archive.unpack_to(std::path::Path::new("out"), Some(&NameFilter::new("*.xml")))?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export all sub-crates
pub use bbatool_bba as bba;
pub use bbatool_common as common;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use bbatool_bba::{
        BbaArchive, DataEntry, EntryInfo, ExtensionTable, FileKind, NameFilter, PackReport,
        UnpackReport, Variant, VerifyReport,
    };
    pub use bbatool_common::{crc, BinaryReader};
}

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
