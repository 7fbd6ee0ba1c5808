use crate::artifacts::database::pack::numbers::{read_offset, read_record_header};
use crate::artifacts::database::pack::stream::Stream;
use crate::artifacts::database::pack::writer::RecordPosition;
use crate::artifacts::database::pack::{
    HEADER_SIZE, OFS_DELTA, REF_DELTA, SIGNATURE, VERSION, object_type,
};
use crate::artifacts::objects::object::RawObject;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepoError;
use byteorder::{ByteOrder, NetworkEndian};
use std::io::{BufRead, Read};

/// Upper bound on what a record header may make us reserve up front; the
/// inflated payload still grows to its real size.
const PREALLOCATION_LIMIT: u64 = 64 * 1024;

/// What a delta record is expressed against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeltaBase {
    /// Absolute offset of an earlier record in the same pack
    Offset(u64),
    Object(ObjectId),
}

#[derive(Debug, Clone)]
pub enum PackEntry {
    Whole(RawObject),
    Delta { base: DeltaBase, data: Vec<u8> },
}

/// A decoded record and where it sat in the stream.
#[derive(Debug, Clone)]
pub struct PackRecord {
    pub entry: PackEntry,
    pub position: RecordPosition,
}

/// Sequential reader of a pack stream.
pub struct PackReader<R> {
    stream: Stream<R>,
    count: u32,
    read: u32,
}

impl<R: Read> PackReader<R> {
    pub fn new(inner: R) -> anyhow::Result<Self> {
        let mut stream = Stream::new(inner);

        let mut header = [0u8; HEADER_SIZE];
        stream
            .read_exact(&mut header)
            .map_err(|_| RepoError::CorruptPack("truncated pack header".into()))?;

        if &header[0..4] != SIGNATURE {
            anyhow::bail!(RepoError::CorruptPack("bad pack signature".into()));
        }
        let version = NetworkEndian::read_u32(&header[4..8]);
        if version != VERSION {
            anyhow::bail!(RepoError::CorruptPack(format!(
                "unsupported pack version {}",
                version
            )));
        }

        Ok(PackReader {
            stream,
            count: NetworkEndian::read_u32(&header[8..12]),
            read: 0,
        })
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// Next record, or `None` once all announced records were read.
    pub fn next_record(&mut self) -> anyhow::Result<Option<PackRecord>> {
        if self.read == self.count {
            return Ok(None);
        }

        let offset = self.stream.offset();
        self.stream.begin_record();
        let entry = decode_entry(&mut self.stream, offset)?;
        let crc32 = self.stream.end_record();
        self.read += 1;

        Ok(Some(PackRecord {
            entry,
            position: RecordPosition { offset, crc32 },
        }))
    }

    /// Check the trailer; returns the pack checksum and total pack length.
    pub fn finish(mut self) -> anyhow::Result<([u8; 20], u64)> {
        if self.read != self.count {
            anyhow::bail!(RepoError::CorruptPack(format!(
                "expected {} objects, read {}",
                self.count, self.read
            )));
        }

        let checksum = self.stream.verify_trailer()?;
        Ok((checksum, self.stream.offset() + checksum.len() as u64))
    }
}

/// Decode a whole-object record from the current position. Packs written to
/// disk by this crate never hold deltas, so one here is corruption.
pub fn decode_record(input: &mut impl BufRead) -> anyhow::Result<RawObject> {
    match decode_entry(input, 0)? {
        PackEntry::Whole(object) => Ok(object),
        PackEntry::Delta { .. } => anyhow::bail!(RepoError::CorruptPack(
            "unexpected delta record in stored pack".into()
        )),
    }
}

/// Decode the record starting at `offset`: its header, the delta base if it
/// has one, then the zlib payload.
pub fn decode_entry(input: &mut impl BufRead, offset: u64) -> anyhow::Result<PackEntry> {
    let (code, size) = read_record_header(input)
        .map_err(|_| RepoError::CorruptPack("truncated record header".into()))?;

    match code {
        OFS_DELTA => {
            let distance = read_offset(input)
                .map_err(|_| RepoError::CorruptPack("bad delta base offset".into()))?;
            let base = offset
                .checked_sub(distance)
                .filter(|_| distance > 0)
                .ok_or_else(|| {
                    RepoError::CorruptPack(format!(
                        "delta at {} points {} bytes back",
                        offset, distance
                    ))
                })?;
            let data = inflate(input, size)?;
            Ok(PackEntry::Delta {
                base: DeltaBase::Offset(base),
                data,
            })
        }
        REF_DELTA => {
            let mut oid = [0u8; 20];
            input
                .read_exact(&mut oid)
                .map_err(|_| RepoError::CorruptPack("truncated delta base id".into()))?;
            let data = inflate(input, size)?;
            Ok(PackEntry::Delta {
                base: DeltaBase::Object(ObjectId::from_raw(&oid)?),
                data,
            })
        }
        _ => {
            let object_type = object_type(code)?;
            let data = inflate(input, size)?;
            Ok(PackEntry::Whole(RawObject::new(object_type, data.into())))
        }
    }
}

fn inflate(input: &mut impl BufRead, size: u64) -> anyhow::Result<Vec<u8>> {
    let mut data = Vec::with_capacity(size.min(PREALLOCATION_LIMIT) as usize);
    flate2::bufread::ZlibDecoder::new(input)
        .take(size.saturating_add(1))
        .read_to_end(&mut data)
        .map_err(|error| RepoError::CorruptPack(format!("bad record payload: {}", error)))?;

    if data.len() as u64 != size {
        anyhow::bail!(RepoError::CorruptPack(format!(
            "record size mismatch: expected {} bytes, inflated {}",
            size,
            data.len()
        )));
    }

    Ok(data)
}
