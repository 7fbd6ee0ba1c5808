//! Object types stored in the object database
//!
//! Every object is a typed byte payload identified by the SHA-1 of
//! `"<type> <size>\0" + payload`:
//!
//! - **Blob**: file content (raw bytes)
//! - **Tree**: directory listing (names, modes and object IDs)
//! - **Commit**: snapshot with metadata (tree, parents, author, message)
//! - **Tag**: annotated pointer to another object

pub mod blob;
pub mod commit;
pub mod object;
pub mod object_id;
pub mod object_type;
pub mod tag;
pub mod tree;

/// Length of a SHA-1 hash in hexadecimal format
pub const OBJECT_ID_LENGTH: usize = 40;

/// Length of a SHA-1 hash in raw bytes
pub const OBJECT_ID_RAW_LENGTH: usize = 20;
