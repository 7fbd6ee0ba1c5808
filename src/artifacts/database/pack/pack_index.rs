//! Pack index (`.idx`) version 2
//!
//! ```text
//! ff 74 4f 63 | version 2
//! fanout[256]          cumulative count of ids by first byte (u32 BE)
//! ids[n]               sorted, 20 bytes each
//! crc32[n]             of each raw record
//! offset32[n]          MSB set => index into offset64
//! offset64[m]
//! pack checksum | index checksum
//! ```

use crate::artifacts::database::pack::writer::RecordPosition;
use crate::artifacts::objects::OBJECT_ID_RAW_LENGTH;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepoError;
use byteorder::{ByteOrder, NetworkEndian, WriteBytesExt};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

const IDX_SIGNATURE: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
const IDX_VERSION: u32 = 2;
const FANOUT_SIZE: usize = 256;
const LARGE_OFFSET: u32 = 0x8000_0000;

#[derive(Debug, Clone, Default)]
pub struct PackIndex {
    offsets: BTreeMap<ObjectId, u64>,
    pack_checksum: [u8; 20],
}

impl PackIndex {
    pub fn offset(&self, oid: &ObjectId) -> Option<u64> {
        self.offsets.get(oid).copied()
    }

    pub fn oids(&self) -> impl Iterator<Item = &ObjectId> {
        self.offsets.keys()
    }

    pub fn pack_checksum(&self) -> &[u8; 20] {
        &self.pack_checksum
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&bytes)
    }

    pub fn parse(bytes: &[u8]) -> anyhow::Result<Self> {
        let corrupt = |reason: &str| RepoError::CorruptPack(format!("pack index: {}", reason));

        let header_len = 8 + FANOUT_SIZE * 4;
        if bytes.len() < header_len + 40 {
            anyhow::bail!(corrupt("file too short"));
        }
        if bytes[..4] != IDX_SIGNATURE || NetworkEndian::read_u32(&bytes[4..8]) != IDX_VERSION {
            anyhow::bail!(corrupt("unsupported format"));
        }

        let (body, checksum) = bytes.split_at(bytes.len() - 20);
        if Sha1::digest(body).as_slice() != checksum {
            anyhow::bail!(corrupt("checksum mismatch"));
        }

        let count = NetworkEndian::read_u32(&bytes[8 + (FANOUT_SIZE - 1) * 4..header_len]) as usize;
        let ids_start = header_len;
        let crcs_start = ids_start + count * OBJECT_ID_RAW_LENGTH;
        let offsets_start = crcs_start + count * 4;
        let large_start = offsets_start + count * 4;
        if body.len() < large_start + 20 {
            anyhow::bail!(corrupt("truncated tables"));
        }

        let mut offsets = BTreeMap::new();
        for i in 0..count {
            let id_at = ids_start + i * OBJECT_ID_RAW_LENGTH;
            let oid = ObjectId::from_raw(&bytes[id_at..id_at + OBJECT_ID_RAW_LENGTH])?;

            let small = NetworkEndian::read_u32(&bytes[offsets_start + i * 4..]);
            let offset = if small & LARGE_OFFSET == 0 {
                small as u64
            } else {
                let at = large_start + ((small & !LARGE_OFFSET) as usize) * 8;
                if at + 8 > body.len() - 20 {
                    anyhow::bail!(corrupt("large offset out of range"));
                }
                NetworkEndian::read_u64(&bytes[at..at + 8])
            };

            offsets.insert(oid, offset);
        }

        let mut pack_checksum = [0u8; 20];
        pack_checksum.copy_from_slice(&body[body.len() - 20..]);

        Ok(PackIndex {
            offsets,
            pack_checksum,
        })
    }

    /// Serialize an index for the given records.
    pub fn write(
        entries: &BTreeMap<ObjectId, RecordPosition>,
        pack_checksum: &[u8; 20],
        writer: &mut impl Write,
    ) -> anyhow::Result<()> {
        let mut out = Vec::new();
        out.extend_from_slice(&IDX_SIGNATURE);
        out.write_u32::<NetworkEndian>(IDX_VERSION)?;

        let mut fanout = [0u32; FANOUT_SIZE];
        for oid in entries.keys() {
            fanout[oid.first_byte() as usize] += 1;
        }
        let mut running = 0;
        for bucket in fanout.iter_mut() {
            running += *bucket;
            *bucket = running;
        }
        for bucket in fanout {
            out.write_u32::<NetworkEndian>(bucket)?;
        }

        for oid in entries.keys() {
            oid.write_h40_to(&mut out)?;
        }
        for position in entries.values() {
            out.write_u32::<NetworkEndian>(position.crc32)?;
        }

        let mut large = Vec::new();
        for position in entries.values() {
            if position.offset < LARGE_OFFSET as u64 {
                out.write_u32::<NetworkEndian>(position.offset as u32)?;
            } else {
                out.write_u32::<NetworkEndian>(LARGE_OFFSET | large.len() as u32)?;
                large.push(position.offset);
            }
        }
        for offset in large {
            out.write_u64::<NetworkEndian>(offset)?;
        }

        out.extend_from_slice(pack_checksum);
        let checksum = Sha1::digest(&out);
        out.extend_from_slice(&checksum);

        writer.write_all(&out)?;
        Ok(())
    }
}
