//! Object identifiers
//!
//! An id is the lowercase hex SHA-1 of an object's framed bytes. Loose
//! objects live at `objects/<first-2>/<remaining-38>`.

use crate::artifacts::objects::{OBJECT_ID_LENGTH, OBJECT_ID_RAW_LENGTH};
use std::io;
use std::path::PathBuf;

/// Hex digits shown for abbreviated ids
pub const SHORT_OID_LENGTH: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse a 40 character hex id; uppercase digits are normalized.
    pub fn try_parse(id: impl Into<String>) -> anyhow::Result<Self> {
        let id = id.into();

        if id.len() != OBJECT_ID_LENGTH {
            anyhow::bail!("Invalid object ID length: {}", id.len());
        }
        if !id.chars().all(|c| c.is_ascii_hexdigit()) {
            anyhow::bail!("Invalid object ID characters: {}", id);
        }

        Ok(Self(id.to_ascii_lowercase()))
    }

    /// The all-zero id used on the wire for "no object".
    pub fn null() -> Self {
        Self("0".repeat(OBJECT_ID_LENGTH))
    }

    pub fn is_null(&self) -> bool {
        self.0.bytes().all(|b| b == b'0')
    }

    pub fn from_raw(raw: &[u8]) -> anyhow::Result<Self> {
        if raw.len() != OBJECT_ID_RAW_LENGTH {
            anyhow::bail!("Invalid raw object ID length: {}", raw.len());
        }

        Ok(Self(raw.iter().map(|b| format!("{:02x}", b)).collect()))
    }

    pub fn to_raw(&self) -> anyhow::Result<[u8; OBJECT_ID_RAW_LENGTH]> {
        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        for (i, byte) in raw.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&self.0[2 * i..2 * i + 2], 16)
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "Invalid hex digit"))?;
        }

        Ok(raw)
    }

    /// Write the 20 raw bytes of the id (tree entries, index entries, pack index).
    pub fn write_h40_to<W: io::Write + ?Sized>(&self, writer: &mut W) -> anyhow::Result<()> {
        writer.write_all(&self.to_raw()?)?;
        Ok(())
    }

    pub fn read_h40_from<R: io::Read + ?Sized>(reader: &mut R) -> anyhow::Result<Self> {
        let mut raw = [0u8; OBJECT_ID_RAW_LENGTH];
        reader.read_exact(&mut raw)?;

        Self::from_raw(&raw)
    }

    /// First byte of the raw id, the bucket used by pack index fanout tables.
    pub fn first_byte(&self) -> u8 {
        u8::from_str_radix(&self.0[..2], 16).unwrap_or_default()
    }

    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    pub fn to_short_oid(&self) -> String {
        self.0[..SHORT_OID_LENGTH].to_string()
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(&prefix.to_ascii_lowercase())
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
