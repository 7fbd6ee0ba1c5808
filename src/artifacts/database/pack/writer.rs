use crate::artifacts::database::pack::numbers::write_record_header;
use crate::artifacts::database::pack::{SIGNATURE, VERSION, type_code};
use crate::artifacts::objects::object::RawObject;
use anyhow::Context;
use byteorder::{NetworkEndian, WriteBytesExt};
use flate2::Crc;
use sha1::{Digest, Sha1};
use std::io::Write;

/// Where a record landed in the pack, for building the `.idx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordPosition {
    pub offset: u64,
    pub crc32: u32,
}

/// Streams whole objects into a pack, hashing everything it writes.
pub struct PackWriter<W: Write> {
    inner: W,
    digest: Sha1,
    offset: u64,
    expected: u32,
    written: u32,
}

impl<W: Write> PackWriter<W> {
    pub fn new(inner: W, count: u32) -> anyhow::Result<Self> {
        let mut writer = PackWriter {
            inner,
            digest: Sha1::new(),
            offset: 0,
            expected: count,
            written: 0,
        };

        let mut header = Vec::with_capacity(12);
        header.extend_from_slice(SIGNATURE);
        header.write_u32::<NetworkEndian>(VERSION)?;
        header.write_u32::<NetworkEndian>(count)?;
        writer.emit(&header)?;

        Ok(writer)
    }

    pub fn write_object(&mut self, object: &RawObject) -> anyhow::Result<RecordPosition> {
        let mut record = Vec::new();
        write_record_header(
            &mut record,
            type_code(object.object_type),
            object.data.len() as u64,
        )?;

        let mut encoder = flate2::write::ZlibEncoder::new(record, flate2::Compression::default());
        encoder
            .write_all(&object.data)
            .context("Unable to compress pack record")?;
        let record = encoder.finish().context("Unable to compress pack record")?;

        let mut crc = Crc::new();
        crc.update(&record);
        let position = RecordPosition {
            offset: self.offset,
            crc32: crc.sum(),
        };

        self.emit(&record)?;
        self.written += 1;

        Ok(position)
    }

    /// Append the trailing checksum and hand back the sink.
    pub fn finish(mut self) -> anyhow::Result<([u8; 20], W)> {
        if self.written != self.expected {
            anyhow::bail!(
                "pack header announced {} objects but {} were written",
                self.expected,
                self.written
            );
        }

        let checksum: [u8; 20] = self.digest.clone().finalize().into();
        self.inner.write_all(&checksum)?;
        self.inner.flush()?;

        Ok((checksum, self.inner))
    }

    fn emit(&mut self, bytes: &[u8]) -> anyhow::Result<()> {
        self.inner.write_all(bytes)?;
        self.digest.update(bytes);
        self.offset += bytes.len() as u64;

        Ok(())
    }
}
