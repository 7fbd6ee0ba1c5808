use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tag::Tag;
use crate::artifacts::objects::tree::Tree;
use anyhow::{Context, Result};
use bytes::Bytes;
use derive_new::new;
use sha1::{Digest, Sha1};
use std::io::{BufRead, Cursor};
use std::path::PathBuf;

/// Encode a value into its on-disk payload (without the object header).
pub trait Packable {
    fn serialize(&self) -> Result<Bytes>;
}

pub trait Unpackable {
    fn deserialize(reader: impl BufRead) -> Result<Self>
    where
        Self: Sized;
}

pub trait Object: Packable {
    fn object_type(&self) -> ObjectType;

    fn display(&self) -> String;

    fn to_raw(&self) -> Result<RawObject> {
        Ok(RawObject::new(self.object_type(), self.serialize()?))
    }

    fn object_id(&self) -> Result<ObjectId> {
        self.to_raw()?.object_id()
    }

    fn object_path(&self) -> Result<PathBuf> {
        Ok(self.object_id()?.to_path())
    }
}

/// Type tag plus payload: the form every object takes at the storage layer.
///
/// Loose files and pack records both decode to a `RawObject`; typed decoding
/// happens on top of it through `ObjectBox`.
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct RawObject {
    pub object_type: ObjectType,
    pub data: Bytes,
}

impl RawObject {
    /// `"<type> <size>\0" + payload`, the bytes the identity is computed over.
    pub fn framed(&self) -> Bytes {
        let header = format!("{} {}\0", self.object_type, self.data.len());
        let mut framed = Vec::with_capacity(header.len() + self.data.len());
        framed.extend_from_slice(header.as_bytes());
        framed.extend_from_slice(&self.data);

        framed.into()
    }

    pub fn object_id(&self) -> Result<ObjectId> {
        let mut hasher = Sha1::new();
        hasher.update(self.framed());

        ObjectId::from_raw(&hasher.finalize())
    }

    /// Parse a framed buffer, checking the declared size against the payload.
    pub fn parse_framed(framed: Bytes) -> Result<Self> {
        let mut reader = Cursor::new(framed.clone());
        let (object_type, size) = ObjectType::parse_header(&mut reader)?;
        let offset = reader.position() as usize;
        let data = framed.slice(offset..);

        if data.len() != size {
            anyhow::bail!(
                "object size mismatch: header says {} but payload has {} bytes",
                size,
                data.len()
            );
        }

        Ok(RawObject::new(object_type, data))
    }

    pub fn parse(&self) -> Result<ObjectBox> {
        let reader = Cursor::new(self.data.clone());

        match self.object_type {
            ObjectType::Blob => Ok(ObjectBox::Blob(Box::new(Blob::deserialize(reader)?))),
            ObjectType::Tree => Ok(ObjectBox::Tree(Box::new(Tree::deserialize(reader)?))),
            ObjectType::Commit => Ok(ObjectBox::Commit(Box::new(
                Commit::deserialize(reader).context("invalid commit object")?,
            ))),
            ObjectType::Tag => Ok(ObjectBox::Tag(Box::new(Tag::deserialize(reader)?))),
        }
    }
}

pub enum ObjectBox {
    Blob(Box<Blob>),
    Tree(Box<Tree>),
    Commit(Box<Commit>),
    Tag(Box<Tag>),
}

impl ObjectBox {
    pub fn display(&self) -> String {
        match self {
            ObjectBox::Blob(blob) => blob.display(),
            ObjectBox::Tree(tree) => tree.display(),
            ObjectBox::Commit(commit) => commit.display(),
            ObjectBox::Tag(tag) => tag.display(),
        }
    }
}
