//! Index file format
//!
//! ## File Format (Version 2)
//!
//! ```text
//! Header (12 bytes): "DIRC", version 2, entry count
//! Entries: sorted by (path, stage), each padded to 8-byte alignment
//! Checksum (20 bytes): SHA-1 of all preceding bytes
//! ```

pub mod checksum;
pub mod entry_mode;
pub mod index_entry;
pub mod index_header;

pub const CHECKSUM_SIZE: usize = 20;

/// 4 bytes marker, 4 bytes version, 4 bytes entry count
pub const HEADER_SIZE: usize = 12;

pub const SIGNATURE: &str = "DIRC";

pub const VERSION: u32 = 2;
