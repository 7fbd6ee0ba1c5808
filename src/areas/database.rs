//! Object database
//!
//! Objects are addressed by the SHA-1 of their framed bytes and live either
//! loose (`objects/ab/cdef...`, zlib-compressed) or inside packs under
//! `objects/pack`. Reads consult loose objects first, then packs, and every
//! object read back is re-hashed before it is trusted.

use crate::areas::graph::RevisionGraph;
use crate::artifacts::database::commit_cache::CommitCache;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::database::pack::indexer::Indexer;
use crate::artifacts::database::pack::packed_db::PackedDb;
use crate::artifacts::database::pack::reader::PackReader;
use crate::artifacts::database::pack::unpacker::Unpacker;
use crate::artifacts::database::pack::writer::PackWriter;
use crate::artifacts::diff::tree_diff::TreeDiff;
use crate::artifacts::log::path_filter::PathFilter;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::{Commit, SlimCommit};
use crate::artifacts::objects::object::{Object, ObjectBox, RawObject};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::tree::Tree;
use crate::errors::RepoError;
use anyhow::Context;
use bytes::Bytes;
use fake::rand;
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug)]
pub struct Database {
    path: Box<Path>,
    packed: PackedDb,
    commit_cache: CommitCache,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        let packed = PackedDb::new(path.join("pack").into_boxed_path());

        Database {
            path,
            packed,
            commit_cache: CommitCache::default(),
        }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    pub fn pack_dir(&self) -> PathBuf {
        self.path.join("pack")
    }

    pub fn reload_packs(&self) {
        self.packed.reload();
    }

    pub fn graph(&self) -> RevisionGraph<'_> {
        RevisionGraph::new(self)
    }

    pub fn tree_diff(
        &self,
        old_oid: Option<&ObjectId>,
        new_oid: Option<&ObjectId>,
        path_filter: &PathFilter,
    ) -> anyhow::Result<TreeDiff<'_>> {
        let mut tree_diff = TreeDiff::new(self);
        tree_diff.compare_oids(old_oid, new_oid, path_filter)?;
        Ok(tree_diff)
    }

    /// Store a typed object; returns its id. Storing existing content is a no-op.
    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        self.store_raw(&object.to_raw()?)
    }

    pub fn store_raw(&self, object: &RawObject) -> anyhow::Result<ObjectId> {
        let object_id = object.object_id()?;

        if self.has(&object_id)? {
            return Ok(object_id);
        }

        let object_path = self.path.join(object_id.to_path());
        let object_dir = object_path
            .parent()
            .with_context(|| format!("Invalid object path {}", object_path.display()))?;
        std::fs::create_dir_all(object_dir)
            .with_context(|| format!("Unable to create object directory {}", object_dir.display()))?;

        self.write_object(&object_path, object.framed())?;
        debug!(oid = %object_id, kind = %object.object_type, "stored loose object");

        Ok(object_id)
    }

    pub fn has(&self, object_id: &ObjectId) -> anyhow::Result<bool> {
        if self.path.join(object_id.to_path()).exists() {
            return Ok(true);
        }

        self.packed.has(object_id)
    }

    /// Load type and payload, checking the content hashes to `object_id`.
    pub fn load_raw(&self, object_id: &ObjectId) -> anyhow::Result<RawObject> {
        let object_path = self.path.join(object_id.to_path());

        if object_path.exists() {
            let framed = self.read_object(&object_path)?;
            let object = RawObject::parse_framed(framed).map_err(|error| {
                RepoError::CorruptObject(object_id.clone(), format!("{:#}", error))
            })?;

            if &object.object_id()? != object_id {
                anyhow::bail!(RepoError::CorruptObject(
                    object_id.clone(),
                    format!("{} does not hash to its name", object_path.display())
                ));
            }
            return Ok(object);
        }

        match self.packed.load_raw(object_id)? {
            Some(object) => Ok(object),
            None => anyhow::bail!(RepoError::NotFound(format!("object {} not found", object_id))),
        }
    }

    pub fn parse_object(&self, object_id: &ObjectId) -> anyhow::Result<ObjectBox> {
        self.load_raw(object_id)?.parse()
    }

    pub fn parse_object_as_blob(&self, object_id: &ObjectId) -> anyhow::Result<Option<Blob>> {
        match self.parse_object(object_id)? {
            ObjectBox::Blob(blob) => Ok(Some(*blob)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_tree(&self, object_id: &ObjectId) -> anyhow::Result<Option<Tree>> {
        match self.parse_object(object_id)? {
            ObjectBox::Tree(tree) => Ok(Some(*tree)),
            _ => Ok(None),
        }
    }

    pub fn parse_object_as_commit(&self, object_id: &ObjectId) -> anyhow::Result<Option<Commit>> {
        match self.parse_object(object_id)? {
            ObjectBox::Commit(commit) => Ok(Some(*commit)),
            _ => Ok(None),
        }
    }

    /// Like `parse_object_as_commit`, but a non-commit is an error.
    pub fn load_commit(&self, object_id: &ObjectId) -> anyhow::Result<Commit> {
        self.parse_object_as_commit(object_id)?
            .with_context(|| format!("object {} is not a commit", object_id))
    }

    /// Tree of a commit, or the tree itself when given a tree id.
    pub fn load_tree_of(&self, object_id: &ObjectId) -> anyhow::Result<Tree> {
        match self.parse_object(object_id)? {
            ObjectBox::Tree(tree) => Ok(*tree),
            ObjectBox::Commit(commit) => self.load_tree_of(commit.tree_oid()),
            ObjectBox::Tag(tag) => self.load_tree_of(tag.target()),
            ObjectBox::Blob(_) => anyhow::bail!("object {} is not a tree", object_id),
        }
    }

    /// Every blob below a tree (or a commit's tree), keyed by full path.
    ///
    /// `None` is the empty tree.
    pub fn load_tree_list(
        &self,
        object_id: Option<&ObjectId>,
    ) -> anyhow::Result<BTreeMap<PathBuf, DatabaseEntry>> {
        let mut list = BTreeMap::new();
        if let Some(object_id) = object_id {
            self.build_tree_list(object_id, Path::new(""), &mut list)?;
        }

        Ok(list)
    }

    fn build_tree_list(
        &self,
        tree_oid: &ObjectId,
        prefix: &Path,
        list: &mut BTreeMap<PathBuf, DatabaseEntry>,
    ) -> anyhow::Result<()> {
        for (name, entry) in self.load_tree_of(tree_oid)?.into_entries() {
            let path = prefix.join(name);
            if entry.is_tree() {
                self.build_tree_list(&entry.oid, &path, list)?;
            } else {
                list.insert(path, entry);
            }
        }

        Ok(())
    }

    pub fn load_slim_commit(&self, object_id: &ObjectId) -> anyhow::Result<SlimCommit> {
        self.commit_cache.get_or_load(object_id, |oid| {
            Ok(self.load_commit(oid)?.to_slim(oid.clone()))
        })
    }

    pub fn get_object_type(&self, object_id: &ObjectId) -> anyhow::Result<ObjectType> {
        Ok(self.load_raw(object_id)?.object_type)
    }

    /// Every object id, loose or packed, starting with `prefix`.
    pub fn prefix_match(&self, prefix: &str) -> anyhow::Result<Vec<ObjectId>> {
        let prefix = prefix.to_ascii_lowercase();
        let mut matches = Vec::new();

        let dirs = if prefix.len() >= 2 {
            vec![prefix[..2].to_string()]
        } else {
            (0..=255u8).map(|i| format!("{:02x}", i)).collect()
        };

        for dir_name in dirs {
            let dir_path = self.path.join(&dir_name);
            if !dir_path.is_dir() {
                continue;
            }

            for entry in std::fs::read_dir(&dir_path)? {
                let file_name = entry?.file_name();
                let candidate = format!("{}{}", dir_name, file_name.to_string_lossy());

                if let Ok(oid) = ObjectId::try_parse(candidate)
                    && oid.starts_with(&prefix)
                {
                    matches.push(oid);
                }
            }
        }

        matches.extend(self.packed.prefix_match(&prefix)?);
        matches.sort();
        matches.dedup();

        Ok(matches)
    }

    /// Install a received pack.
    ///
    /// Small packs are exploded into loose objects, larger ones are kept whole
    /// with an index. Nothing becomes visible unless the whole pack verifies.
    pub fn receive_pack(&self, reader: impl Read, unpack_limit: usize) -> anyhow::Result<Vec<ObjectId>> {
        let pack = PackReader::new(reader)?;
        let count = pack.count() as usize;

        let oids = if count > unpack_limit {
            info!(count, "indexing received pack");
            let oids = Indexer::new(self).index(pack)?;
            self.reload_packs();
            oids
        } else {
            info!(count, "unpacking received pack");
            Unpacker::new(self).unpack(pack)?
        };

        Ok(oids)
    }

    /// Serialize `oids` as a pack into `writer`, returning the pack checksum.
    pub fn send_pack<W: Write>(&self, oids: &[ObjectId], writer: W) -> anyhow::Result<[u8; 20]> {
        let mut pack = PackWriter::new(writer, oids.len() as u32)?;
        for oid in oids {
            pack.write_object(&self.load_raw(oid)?)?;
        }
        let (checksum, _) = pack.finish()?;
        debug!(count = oids.len(), "sent pack");

        Ok(checksum)
    }

    fn read_object(&self, object_path: &Path) -> anyhow::Result<Bytes> {
        let compressed = std::fs::read(object_path)
            .with_context(|| format!("Unable to read object file {}", object_path.display()))?;

        let mut decoder = flate2::read::ZlibDecoder::new(compressed.as_slice());
        let mut framed = Vec::new();
        decoder
            .read_to_end(&mut framed)
            .with_context(|| format!("Unable to decompress {}", object_path.display()))?;

        Ok(framed.into())
    }

    fn write_object(&self, object_path: &Path, framed: Bytes) -> anyhow::Result<()> {
        let object_dir = object_path
            .parent()
            .with_context(|| format!("Invalid object path {}", object_path.display()))?;
        let temp_path = object_dir.join(format!("tmp-obj-{}", rand::random::<u32>()));

        let mut encoder =
            flate2::write::ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        encoder
            .write_all(&framed)
            .context("Unable to compress object content")?;
        let compressed = encoder
            .finish()
            .context("Unable to finish compressing object content")?;

        std::fs::write(&temp_path, compressed)
            .with_context(|| format!("Unable to write object file {}", temp_path.display()))?;

        // rename so readers never observe a partially written object
        std::fs::rename(&temp_path, object_path)
            .with_context(|| format!("Unable to rename object file to {}", object_path.display()))?;

        Ok(())
    }
}
