//! Delta expansion
//!
//! Delta data starts with the base and result sizes, then a list of
//! instructions. A byte with the high bit set copies from the base: its low
//! seven bits say which of the following little-endian offset (4) and size (3)
//! bytes are present. Any other non-zero byte inserts that many literal bytes.

use crate::areas::database::Database;
use crate::artifacts::database::pack::numbers::read_size;
use crate::artifacts::database::pack::reader::{DeltaBase, PackEntry, PackRecord};
use crate::artifacts::database::pack::unpacker::validate;
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepoError;
use std::collections::HashMap;
use tracing::trace;

const COPY: u8 = 0x80;
/// A copy with no size bytes copies this much.
const DEFAULT_COPY_SIZE: usize = 0x10000;
const PREALLOCATION_LIMIT: u64 = 64 * 1024;

fn corrupt(reason: impl Into<String>) -> anyhow::Error {
    RepoError::CorruptPack(reason.into()).into()
}

/// Rebuild an object's payload from its base and delta data.
pub fn expand(source: &[u8], delta: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut input = delta;
    let source_size = read_size(&mut input).map_err(|_| corrupt("truncated delta header"))?;
    let target_size = read_size(&mut input).map_err(|_| corrupt("truncated delta header"))?;

    if source_size != source.len() as u64 {
        return Err(corrupt(format!(
            "delta expects a {} byte base, found {}",
            source_size,
            source.len()
        )));
    }

    let mut target = Vec::with_capacity(target_size.min(PREALLOCATION_LIMIT) as usize);
    while let Some((&op, rest)) = input.split_first() {
        input = rest;

        if op & COPY != 0 {
            let mut value = 0u64;
            for bit in 0..7 {
                if op & (1 << bit) == 0 {
                    continue;
                }
                let (&byte, rest) = input
                    .split_first()
                    .ok_or_else(|| corrupt("truncated copy instruction"))?;
                input = rest;
                value |= (byte as u64) << (8 * bit);
            }

            let offset = (value & 0xffff_ffff) as usize;
            let size = match (value >> 32) as usize {
                0 => DEFAULT_COPY_SIZE,
                size => size,
            };
            let chunk = offset
                .checked_add(size)
                .and_then(|end| source.get(offset..end))
                .ok_or_else(|| corrupt("copy reaches past the delta base"))?;
            target.extend_from_slice(chunk);
        } else if op > 0 {
            let size = op as usize;
            if input.len() < size {
                return Err(corrupt("truncated insert instruction"));
            }
            target.extend_from_slice(&input[..size]);
            input = &input[size..];
        } else {
            return Err(corrupt("reserved delta instruction"));
        }

        if target.len() as u64 > target_size {
            return Err(corrupt("delta produces more than it announced"));
        }
    }

    if target.len() as u64 != target_size {
        return Err(corrupt(format!(
            "delta announced {} bytes, produced {}",
            target_size,
            target.len()
        )));
    }

    Ok(target)
}

/// Turns the records of one pack into whole, verified objects.
///
/// Offset deltas must point at an earlier record. Ref deltas may name an
/// earlier record or an object the repository already holds.
pub struct DeltaResolver<'d> {
    database: &'d Database,
    by_offset: HashMap<u64, RawObject>,
    by_oid: HashMap<ObjectId, u64>,
}

impl<'d> DeltaResolver<'d> {
    pub fn new(database: &'d Database) -> Self {
        DeltaResolver {
            database,
            by_offset: HashMap::new(),
            by_oid: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, record: PackRecord) -> anyhow::Result<(ObjectId, RawObject)> {
        let object = match record.entry {
            PackEntry::Whole(object) => object,
            PackEntry::Delta { base, data } => {
                let base = self.base(&base)?;
                let expanded = expand(&base.data, &data)?;
                trace!(offset = record.position.offset, size = expanded.len(), "expanded delta");
                RawObject::new(base.object_type, expanded.into())
            }
        };

        let oid = validate(&object)?;
        self.by_oid.insert(oid.clone(), record.position.offset);
        self.by_offset.insert(record.position.offset, object.clone());

        Ok((oid, object))
    }

    fn base(&self, base: &DeltaBase) -> anyhow::Result<RawObject> {
        let offset = match base {
            DeltaBase::Offset(offset) => Some(*offset),
            DeltaBase::Object(oid) => self.by_oid.get(oid).copied(),
        };
        if let Some(object) = offset.and_then(|offset| self.by_offset.get(&offset)) {
            return Ok(object.clone());
        }

        match base {
            DeltaBase::Object(oid) if self.database.has(oid)? => self.database.load_raw(oid),
            DeltaBase::Object(oid) => Err(corrupt(format!("missing delta base {}", oid))),
            DeltaBase::Offset(offset) => {
                Err(corrupt(format!("no record at delta base offset {}", offset)))
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::artifacts::database::pack::numbers::write_record_header;
    use crate::artifacts::database::pack::{OFS_DELTA, REF_DELTA, SIGNATURE, VERSION, type_code};
    use crate::artifacts::objects::object::RawObject;
    use crate::artifacts::objects::object_id::ObjectId;
    use sha1::{Digest, Sha1};
    use std::io::Write;

    pub(crate) enum Record {
        Whole(RawObject),
        /// Delta against the record at this index
        OffsetDelta(usize, Vec<u8>),
        RefDelta(ObjectId, Vec<u8>),
    }

    fn zlib(data: &[u8]) -> Vec<u8> {
        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    fn size_bytes(mut size: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        loop {
            let byte = (size & 0x7f) as u8;
            size >>= 7;
            if size == 0 {
                bytes.push(byte);
                return bytes;
            }
            bytes.push(byte | 0x80);
        }
    }

    fn offset_bytes(mut distance: u64) -> Vec<u8> {
        let mut bytes = vec![(distance & 0x7f) as u8];
        distance >>= 7;
        while distance != 0 {
            distance -= 1;
            bytes.push(0x80 | (distance & 0x7f) as u8);
            distance >>= 7;
        }
        bytes.reverse();
        bytes
    }

    /// Delta data turning a `source_len` byte base into `target_len` bytes.
    pub(crate) fn delta(source_len: usize, target_len: usize, instructions: &[u8]) -> Vec<u8> {
        let mut data = size_bytes(source_len);
        data.extend(size_bytes(target_len));
        data.extend_from_slice(instructions);
        data
    }

    /// A complete pack, trailer included.
    pub(crate) fn pack(records: &[Record]) -> Vec<u8> {
        let mut bytes = SIGNATURE.to_vec();
        bytes.extend_from_slice(&VERSION.to_be_bytes());
        bytes.extend_from_slice(&(records.len() as u32).to_be_bytes());

        let mut offsets = Vec::new();
        for record in records {
            let offset = bytes.len() as u64;
            offsets.push(offset);
            match record {
                Record::Whole(object) => {
                    let code = type_code(object.object_type);
                    write_record_header(&mut bytes, code, object.data.len() as u64).unwrap();
                    bytes.extend(zlib(&object.data));
                }
                Record::OffsetDelta(base, data) => {
                    write_record_header(&mut bytes, OFS_DELTA, data.len() as u64).unwrap();
                    bytes.extend(offset_bytes(offset - offsets[*base]));
                    bytes.extend(zlib(data));
                }
                Record::RefDelta(base, data) => {
                    write_record_header(&mut bytes, REF_DELTA, data.len() as u64).unwrap();
                    bytes.extend_from_slice(&base.to_raw().unwrap());
                    bytes.extend(zlib(data));
                }
            }
        }

        let checksum = Sha1::digest(&bytes);
        bytes.extend_from_slice(&checksum);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[test]
    fn copies_and_inserts_rebuild_the_target() {
        // copy "hello " (offset 0, size 6), insert "there", copy "\n" (offset 11, size 1)
        let mut instructions = vec![0x90, 0x06, 0x05];
        instructions.extend_from_slice(b"there");
        instructions.extend_from_slice(&[0x91, 0x0b, 0x01]);
        let delta = fixtures::delta(12, 12, &instructions);

        assert_eq!(expand(b"hello world\n", &delta).unwrap(), b"hello there\n");
    }

    #[test]
    fn copy_without_size_bytes_takes_the_default_size() {
        let source = vec![7u8; DEFAULT_COPY_SIZE];
        let delta = fixtures::delta(DEFAULT_COPY_SIZE, DEFAULT_COPY_SIZE, &[0x80]);

        assert_eq!(expand(&source, &delta).unwrap(), source);
    }

    #[rstest]
    #[case::wrong_base_size(fixtures::delta(4, 1, &[0x01, b'x']))]
    #[case::copy_past_the_end(fixtures::delta(3, 4, &[0x90, 0x04]))]
    #[case::truncated_insert(fixtures::delta(3, 5, &[0x05, b'a']))]
    #[case::reserved_opcode(fixtures::delta(3, 0, &[0x00]))]
    #[case::short_result(fixtures::delta(3, 9, &[0x90, 0x03]))]
    #[case::huge_announced_result(fixtures::delta(3, usize::MAX >> 1, &[0x90, 0x03]))]
    fn malformed_deltas_are_corrupt(#[case] delta: Vec<u8>) {
        let error = expand(b"abc", &delta).unwrap_err();

        assert!(matches!(
            error.downcast_ref::<RepoError>(),
            Some(RepoError::CorruptPack(_))
        ));
    }
}
