//! Tree objects
//!
//! A tree lists the entries of one directory: `<mode> <name>\0<20-byte oid>`
//! repeated, sorted by name with directories compared as if they ended in `/`.
//!
//! Trees are read from the database into `readable_entries`, and built from
//! the index into `writeable_entries`.

use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::{IndexEntry, Stage};
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::{BufRead, Write};
use std::path::Path;

#[derive(Debug, Clone)]
enum TreeEntry {
    File(IndexEntry),
    Directory(Tree),
}

impl TreeEntry {
    fn object_type(&self) -> ObjectType {
        match self {
            TreeEntry::File(_) => ObjectType::Blob,
            TreeEntry::Directory(_) => ObjectType::Tree,
        }
    }

    fn mode(&self) -> EntryMode {
        match self {
            TreeEntry::File(entry) => entry.metadata.mode,
            TreeEntry::Directory(_) => EntryMode::Directory,
        }
    }

    fn oid(&self) -> anyhow::Result<ObjectId> {
        match self {
            TreeEntry::File(entry) => Ok(entry.oid.clone()),
            TreeEntry::Directory(tree) => tree.object_id(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    readable_entries: BTreeMap<String, DatabaseEntry>,
    // directory keys carry a trailing '/' so the map iterates in tree order
    writeable_entries: BTreeMap<String, TreeEntry>,
}

impl Tree {
    /// Build the root tree from resolved index entries.
    pub fn build<'e>(entries: impl Iterator<Item = &'e IndexEntry>) -> anyhow::Result<Self> {
        let mut root = Self::default();

        for entry in entries.filter(|entry| entry.stage() == Stage::Resolved) {
            let parents = entry.parent_dirs();
            root.add_entry(&parents, entry)?;
        }

        Ok(root)
    }

    /// Visit subtrees before their parent, so every child id is known (and
    /// stored) by the time the parent is serialized.
    pub fn traverse<F>(&self, func: &mut F) -> anyhow::Result<()>
    where
        F: FnMut(&Tree) -> anyhow::Result<()>,
    {
        for entry in self.writeable_entries.values() {
            if let TreeEntry::Directory(tree) = entry {
                tree.traverse(func)?;
            }
        }

        func(self)
    }

    fn add_entry(&mut self, parents: &[&Path], entry: &IndexEntry) -> anyhow::Result<()> {
        let Some((parent, rest)) = parents.split_first() else {
            self.writeable_entries.insert(
                entry.basename()?.to_string(),
                TreeEntry::File(entry.clone()),
            );
            return Ok(());
        };

        let parent = parent
            .file_name()
            .and_then(|s| s.to_str())
            .context("Invalid parent")?;
        let key = format!("{}/", parent);

        let slot = self
            .writeable_entries
            .entry(key)
            .or_insert_with(|| TreeEntry::Directory(Tree::default()));
        if let TreeEntry::File(_) = slot {
            *slot = TreeEntry::Directory(Tree::default());
        }

        match slot {
            TreeEntry::Directory(tree) => tree.add_entry(rest, entry),
            TreeEntry::File(_) => anyhow::bail!("{} is tracked as a file", parent),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &DatabaseEntry)> {
        self.readable_entries.iter()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (String, DatabaseEntry)> {
        self.readable_entries.into_iter()
    }

    pub fn get(&self, name: &str) -> Option<&DatabaseEntry> {
        self.readable_entries.get(name)
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content = Vec::new();

        for (name, tree_entry) in &self.writeable_entries {
            let name = name.trim_end_matches('/');
            write!(content, "{:o} {}", tree_entry.mode().as_u32(), name)?;
            content.push(0);
            tree_entry.oid()?.write_h40_to(&mut content)?;
        }

        Ok(Bytes::from(content))
    }
}

impl Unpackable for Tree {
    fn deserialize(mut reader: impl BufRead) -> anyhow::Result<Self> {
        let mut entries = BTreeMap::new();

        let mut mode_bytes = Vec::new();
        let mut name_bytes = Vec::new();

        loop {
            mode_bytes.clear();
            if reader.read_until(b' ', &mut mode_bytes)? == 0 {
                break;
            }
            if mode_bytes.pop() != Some(b' ') {
                anyhow::bail!("unexpected EOF in mode");
            }
            let mode = EntryMode::from_octal_str(std::str::from_utf8(&mode_bytes)?)?;

            name_bytes.clear();
            reader.read_until(b'\0', &mut name_bytes)?;
            if name_bytes.pop() != Some(b'\0') {
                anyhow::bail!("unexpected EOF in name");
            }
            let name = std::str::from_utf8(&name_bytes)?.to_owned();

            let oid =
                ObjectId::read_h40_from(&mut reader).context("unexpected EOF in object id")?;

            entries.insert(name, DatabaseEntry::new(oid, mode));
        }

        Ok(Tree {
            readable_entries: entries,
            writeable_entries: Default::default(),
        })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }

    fn display(&self) -> String {
        if !self.readable_entries.is_empty() {
            return self
                .readable_entries
                .iter()
                .map(|(name, entry)| {
                    let object_type = if entry.is_tree() {
                        ObjectType::Tree
                    } else {
                        ObjectType::Blob
                    };
                    format!("{} {} {}\t{}", entry.mode, object_type, entry.oid, name)
                })
                .collect::<Vec<String>>()
                .join("\n");
        }

        self.writeable_entries
            .iter()
            .map(|(name, tree_entry)| {
                format!(
                    "{} {} {}\t{}",
                    tree_entry.mode(),
                    tree_entry.object_type(),
                    tree_entry.oid().unwrap_or_default(),
                    name.trim_end_matches('/')
                )
            })
            .collect::<Vec<String>>()
            .join("\n")
    }
}
