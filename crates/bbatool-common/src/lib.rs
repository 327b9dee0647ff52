//! Common utilities for bbatool.
//!
//! This crate provides the foundational pieces shared by the BBA codec:
//!
//! - [`BinaryReader`] - Bounds-checked reading of decrypted records
//! - [`words`] - Little-endian 32-bit word buffers (the unit the BBA cipher works on)
//! - [`crc`] - CRC-32 (ISO-3309) hashing utilities
//! - [`filetime`] - Windows FILETIME conversion for entry timestamps

mod error;
mod reader;

pub mod crc;
pub mod filetime;
pub mod words;

pub use error::{Error, Result};
pub use reader::BinaryReader;

/// Re-export zerocopy traits for convenience
pub use zerocopy::{FromBytes, FromZeros, Immutable, IntoBytes, KnownLayout};
