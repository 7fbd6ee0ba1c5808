//! Packfiles
//!
//! ```text
//! "PACK" | version (u32 BE, = 2) | object count (u32 BE)
//! per object: type/size varint header | zlib payload
//! SHA-1 of everything above
//! ```
//!
//! The varint header's first byte holds a continuation bit, the type in bits
//! 4-6 and the low 4 bits of the size; following bytes carry 7 more size bits
//! each.
//!
//! Received packs may hold delta records: an offset delta (type 6) names its
//! base by the distance back to it, a ref delta (type 7) by object id. Deltas
//! are expanded into whole objects on arrival, so packs are only ever written
//! with whole objects.

pub mod delta;
pub mod indexer;
pub mod numbers;
pub mod pack_index;
pub mod packed_db;
pub mod reader;
pub mod stream;
pub mod unpacker;
pub mod writer;

use crate::artifacts::objects::object_type::ObjectType;
use crate::errors::RepoError;

pub const SIGNATURE: &[u8; 4] = b"PACK";
pub const VERSION: u32 = 2;
pub const HEADER_SIZE: usize = 12;

pub const COMMIT: u8 = 1;
pub const TREE: u8 = 2;
pub const BLOB: u8 = 3;
pub const TAG: u8 = 4;
pub const OFS_DELTA: u8 = 6;
pub const REF_DELTA: u8 = 7;

pub fn type_code(object_type: ObjectType) -> u8 {
    match object_type {
        ObjectType::Commit => COMMIT,
        ObjectType::Tree => TREE,
        ObjectType::Blob => BLOB,
        ObjectType::Tag => TAG,
    }
}

pub fn object_type(code: u8) -> anyhow::Result<ObjectType> {
    match code {
        COMMIT => Ok(ObjectType::Commit),
        TREE => Ok(ObjectType::Tree),
        BLOB => Ok(ObjectType::Blob),
        TAG => Ok(ObjectType::Tag),
        _ => Err(RepoError::CorruptPack(format!("unknown object type {}", code)).into()),
    }
}
