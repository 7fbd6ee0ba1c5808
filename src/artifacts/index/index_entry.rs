//! Index entries
//!
//! An entry records one tracked path at one merge stage: the blob id, the
//! mode and the stat data used to skip rehashing unchanged files.
//!
//! ## Entry Format
//!
//! ```text
//! ctime ctime_nsec mtime mtime_nsec dev ino mode uid gid size  (10 x u32)
//! oid                                                          (20 bytes)
//! flags: stage << 12 | min(path length, 0xfff)                 (u16)
//! path, NUL terminated, padded with NULs to a multiple of 8
//! ```

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use byteorder::{NetworkEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use is_executable::IsExecutable;
use std::cmp::min;
use std::fs::Metadata;
use std::io::{BufRead, Write};
use std::os::unix::prelude::MetadataExt;
use std::path::{Path, PathBuf};

const MAX_PATH_SIZE: usize = 0xfff;

/// Entries are padded to this block size
pub const ENTRY_BLOCK: usize = 8;

/// 62 fixed bytes, at least one path byte and its NUL terminator
pub const ENTRY_MIN_SIZE: usize = 64;

const STAGE_SHIFT: u32 = 12;
const STAGE_MASK: u32 = 0x3;

/// Merge stage of an index entry
///
/// Stage 0 is the normal resolved state; stages 1-3 hold the base, ours and
/// theirs versions of a path that failed to merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Stage {
    #[default]
    Resolved = 0,
    Base = 1,
    Ours = 2,
    Theirs = 3,
}

impl Stage {
    pub const CONFLICTED: [Stage; 3] = [Stage::Base, Stage::Ours, Stage::Theirs];

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u32> for Stage {
    type Error = anyhow::Error;

    fn try_from(value: u32) -> anyhow::Result<Self> {
        match value {
            0 => Ok(Stage::Resolved),
            1 => Ok(Stage::Base),
            2 => Ok(Stage::Ours),
            3 => Ok(Stage::Theirs),
            _ => Err(anyhow::anyhow!("Invalid index stage: {}", value)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexEntry {
    pub name: PathBuf,
    pub oid: ObjectId,
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    pub fn new(name: PathBuf, oid: ObjectId, mut metadata: EntryMetadata) -> Self {
        let stage = metadata.flags >> STAGE_SHIFT & STAGE_MASK;
        metadata.flags = path_flags(&name) | stage << STAGE_SHIFT;

        IndexEntry {
            name,
            oid,
            metadata,
        }
    }

    /// Entry for a path taken from a tree, with no stat information.
    ///
    /// The zeroed stat makes the next status check rehash the file.
    pub fn from_database_entry(name: PathBuf, entry: &DatabaseEntry, stage: Stage) -> Self {
        let metadata = EntryMetadata {
            mode: entry.mode,
            ..Default::default()
        };

        IndexEntry::new(name, entry.oid.clone(), metadata).with_stage(stage)
    }

    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.metadata.flags =
            (self.metadata.flags & !(STAGE_MASK << STAGE_SHIFT)) | (stage as u32) << STAGE_SHIFT;
        self
    }

    pub fn stage(&self) -> Stage {
        Stage::try_from(self.metadata.flags >> STAGE_SHIFT & STAGE_MASK).unwrap_or_default()
    }

    pub fn mode(&self) -> EntryMode {
        self.metadata.mode
    }

    pub fn basename(&self) -> anyhow::Result<&str> {
        self.name
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow::anyhow!("Invalid file name"))
    }

    /// Ancestor directories of the entry, outermost first.
    pub fn parent_dirs(&self) -> Vec<&Path> {
        let mut dirs = self
            .name
            .ancestors()
            .skip(1)
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect::<Vec<_>>();
        dirs.reverse();

        dirs
    }

    pub fn to_database_entry(&self) -> DatabaseEntry {
        DatabaseEntry::new(self.oid.clone(), self.metadata.mode)
    }

    pub fn stat_match(&self, other: &EntryMetadata) -> bool {
        (self.metadata.size == 0 || self.metadata.size == other.size)
            && self.metadata.mode == other.mode
    }

    pub fn times_match(&self, other: &EntryMetadata) -> bool {
        self.metadata.ctime == other.ctime
            && self.metadata.ctime_nsec == other.ctime_nsec
            && self.metadata.mtime == other.mtime
            && self.metadata.mtime_nsec == other.mtime_nsec
    }
}

fn path_flags(name: &Path) -> u32 {
    min(name.as_os_str().len(), MAX_PATH_SIZE) as u32
}

impl PartialEq for IndexEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.stage() == other.stage()
    }
}

impl Eq for IndexEntry {}

/// Stat data cached for an index entry
#[derive(Debug, Clone, Default)]
pub struct EntryMetadata {
    pub ctime: i64,
    pub ctime_nsec: i64,
    pub mtime: i64,
    pub mtime_nsec: i64,
    pub dev: u64,
    pub ino: u64,
    pub mode: EntryMode,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub flags: u32,
}

impl Packable for IndexEntry {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let entry_name = self
            .name
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid entry name"))?;

        let mut entry_bytes = Vec::with_capacity(ENTRY_MIN_SIZE + entry_name.len());
        for field in [
            self.metadata.ctime as u32,
            self.metadata.ctime_nsec as u32,
            self.metadata.mtime as u32,
            self.metadata.mtime_nsec as u32,
            self.metadata.dev as u32,
            self.metadata.ino as u32,
            self.metadata.mode.as_u32(),
            self.metadata.uid,
            self.metadata.gid,
            self.metadata.size as u32,
        ] {
            entry_bytes.write_u32::<NetworkEndian>(field)?;
        }
        self.oid.write_h40_to(&mut entry_bytes)?;
        entry_bytes.write_u16::<NetworkEndian>(self.metadata.flags as u16)?;
        entry_bytes.write_all(entry_name.as_bytes())?;

        // at least one NUL, then pad to the block size
        entry_bytes.push(0);
        while entry_bytes.len() % ENTRY_BLOCK != 0 {
            entry_bytes.push(0);
        }

        Ok(Bytes::from(entry_bytes))
    }
}

impl Unpackable for IndexEntry {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut fields = [0u32; 10];
        for field in fields.iter_mut() {
            *field = reader.read_u32::<NetworkEndian>()?;
        }
        let [ctime, ctime_nsec, mtime, mtime_nsec, dev, ino, mode, uid, gid, size] = fields;

        let oid = ObjectId::read_h40_from(&mut reader)?;
        let flags = reader.read_u16::<NetworkEndian>()? as u32;

        let mut name_bytes = Vec::new();
        reader.read_until(0, &mut name_bytes)?;
        if name_bytes.pop() != Some(0) {
            anyhow::bail!("Missing null terminator in entry name");
        }
        let name = PathBuf::from(
            std::str::from_utf8(&name_bytes)
                .map_err(|_| anyhow::anyhow!("Invalid UTF-8 in entry name"))?,
        );

        Ok(IndexEntry {
            name,
            oid,
            metadata: EntryMetadata {
                ctime: ctime as i64,
                ctime_nsec: ctime_nsec as i64,
                mtime: mtime as i64,
                mtime_nsec: mtime_nsec as i64,
                dev: dev as u64,
                ino: ino as u64,
                mode: EntryMode::try_from(mode)?,
                uid,
                gid,
                size: size as u64,
                flags,
            },
        })
    }
}

impl TryFrom<(&Path, Metadata)> for EntryMetadata {
    type Error = anyhow::Error;

    fn try_from((file_path, metadata): (&Path, Metadata)) -> Result<Self, Self::Error> {
        let mode = if metadata.is_dir() {
            EntryMode::Directory
        } else if file_path.is_executable() {
            EntryMode::File(FileMode::Executable)
        } else {
            EntryMode::File(FileMode::Regular)
        };

        Ok(Self {
            ctime: metadata.ctime(),
            ctime_nsec: metadata.ctime_nsec(),
            mtime: metadata.mtime(),
            mtime_nsec: metadata.mtime_nsec(),
            dev: metadata.dev(),
            ino: metadata.ino(),
            mode,
            uid: metadata.uid(),
            gid: metadata.gid(),
            size: metadata.size(),
            flags: 0,
        })
    }
}
