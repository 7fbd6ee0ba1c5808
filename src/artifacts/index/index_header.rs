use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Packable, Unpackable};
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use derive_new::new;
use std::io::{BufRead, Read, Write};

#[derive(Debug, Clone, new)]
pub struct IndexHeader {
    pub marker: String,
    pub version: u32,
    pub entries_count: u32,
}

impl IndexHeader {
    pub fn empty() -> Self {
        IndexHeader::new(String::from(SIGNATURE), VERSION, 0)
    }
}

impl Packable for IndexHeader {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        bytes.write_all(self.marker.as_bytes())?;
        bytes.write_u32::<NetworkEndian>(self.version)?;
        bytes.write_u32::<NetworkEndian>(self.entries_count)?;

        Ok(Bytes::from(bytes))
    }
}

impl Unpackable for IndexHeader {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut marker = [0u8; 4];
        reader.read_exact(&mut marker)?;
        let marker = String::from_utf8(marker.to_vec())
            .map_err(|_| anyhow::anyhow!("Invalid marker in index header"))?;
        let version = reader.read_u32::<NetworkEndian>()?;
        let entries_count = reader.read_u32::<NetworkEndian>()?;

        Ok(IndexHeader::new(marker, version, entries_count))
    }
}
