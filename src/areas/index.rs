//! Index (staging area)
//!
//! The index tracks which content goes into the next commit, along with the
//! stat data that lets status skip rehashing unchanged files.
//!
//! Entries are keyed by `(path, stage)`. A path normally has a single stage 0
//! entry; after a failed merge it instead has up to three entries at stages
//! 1 (base), 2 (ours) and 3 (theirs) until the user stages a resolution.
//!
//! ## Data Structures
//!
//! - `entries`: entries ordered by path bytes then stage, the on-disk order
//! - `children`: directory path to the tracked paths below it, used to
//!   discard file/directory conflicts when adding
//!
//! Commands that change the index load it with `load_for_update`, which takes
//! `index.lock` before reading and keeps it until `write_updates` or `release`.

use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::checksum::Checksum;
use crate::artifacts::index::index_entry::{
    ENTRY_BLOCK, ENTRY_MIN_SIZE, EntryMetadata, IndexEntry, Stage,
};
use crate::artifacts::index::index_header::IndexHeader;
use crate::artifacts::index::{HEADER_SIZE, SIGNATURE, VERSION};
use crate::artifacts::objects::object::{Packable, Unpackable};
use crate::errors::RepoError;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

type EntryKey = (String, Stage);

#[derive(Debug)]
pub struct Index {
    /// Path to the index file (typically `.git/index`)
    path: Box<Path>,
    entries: BTreeMap<EntryKey, IndexEntry>,
    children: BTreeMap<PathBuf, BTreeSet<String>>,
    header: IndexHeader,
    /// Whether the in-memory index differs from what was loaded
    changed: bool,
    lockfile: Option<Lockfile>,
}

fn key_of(path: &Path, stage: Stage) -> EntryKey {
    (path.to_string_lossy().into_owned(), stage)
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
            children: BTreeMap::new(),
            header: IndexHeader::empty(),
            changed: false,
            lockfile: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_changed(&self) -> bool {
        self.changed
    }

    /// The resolved (stage 0) entry for `path`.
    pub fn entry_by_path(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(&key_of(path, Stage::Resolved))
    }

    pub fn entry_for(&self, path: &Path, stage: Stage) -> Option<&IndexEntry> {
        self.entries.get(&key_of(path, stage))
    }

    /// Base, ours and theirs entries of a conflicted path.
    pub fn conflict_entries(&self, path: &Path) -> [Option<&IndexEntry>; 3] {
        Stage::CONFLICTED.map(|stage| self.entry_for(path, stage))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.children.clear();
        self.header = IndexHeader::empty();
        self.changed = true;
    }

    /// Load the index from disk, replacing the in-memory state.
    ///
    /// A missing or empty file is an empty index. A bad signature, version or
    /// checksum fails with `RepoError::CorruptIndex`.
    pub fn rehydrate(&mut self) -> anyhow::Result<()> {
        self.clear();
        self.changed = false;

        if !self.path.exists() {
            return Ok(());
        }

        let data = std::fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(());
        }

        let mut reader = Checksum::new(Cursor::new(data));
        let entries_count = self.parse_header(&mut reader)?;
        self.parse_entries(entries_count, &mut reader)?;

        reader.verify()?;
        debug!(entries = entries_count, "loaded index");

        Ok(())
    }

    /// Take `index.lock`, then load the index under it.
    ///
    /// Fails with `RepoError::Locked` while another handle holds the lock.
    /// Calling it again on the handle that holds the lock just reloads.
    pub fn load_for_update(&mut self) -> anyhow::Result<()> {
        if self.lockfile.is_none() {
            self.lockfile = Some(Lockfile::acquire(&self.path)?);
        }

        if let Err(err) = self.rehydrate() {
            self.release();
            return Err(err);
        }

        Ok(())
    }

    /// Give up a lock taken by `load_for_update` without writing.
    pub fn release(&mut self) {
        self.lockfile = None;
    }

    pub fn is_locked(&self) -> bool {
        self.lockfile.is_some()
    }

    fn parse_header<R: std::io::Read>(&self, reader: &mut Checksum<R>) -> anyhow::Result<u32> {
        let header_bytes = reader.read(HEADER_SIZE)?;
        let header = IndexHeader::deserialize(Cursor::new(header_bytes))
            .map_err(|_| RepoError::CorruptIndex("unreadable header".to_string()))?;

        if header.marker != SIGNATURE {
            anyhow::bail!(RepoError::CorruptIndex(format!(
                "signature: expected '{}' but found '{}'",
                SIGNATURE, header.marker
            )));
        }

        if header.version != VERSION {
            anyhow::bail!(RepoError::CorruptIndex(format!(
                "version: expected '{}' but found '{}'",
                VERSION, header.version
            )));
        }

        Ok(header.entries_count)
    }

    fn parse_entries<R: std::io::Read>(
        &mut self,
        entries_count: u32,
        reader: &mut Checksum<R>,
    ) -> anyhow::Result<()> {
        for _ in 0..entries_count {
            let mut entry_bytes = reader.read(ENTRY_MIN_SIZE)?.to_vec();

            while entry_bytes.last() != Some(&0) {
                entry_bytes.extend_from_slice(&reader.read(ENTRY_BLOCK)?);
            }

            let entry = IndexEntry::deserialize(Cursor::new(Bytes::from(entry_bytes)))
                .map_err(|err| RepoError::CorruptIndex(format!("bad entry: {}", err)))?;
            self.store_entry(entry);
        }

        self.header.entries_count = entries_count;

        Ok(())
    }

    /// Whether `path` is a tracked file or a directory containing tracked files.
    pub fn is_directly_tracked(&self, path: &Path) -> bool {
        let name = path.to_string_lossy();
        Stage::CONFLICTED
            .iter()
            .chain(std::iter::once(&Stage::Resolved))
            .any(|stage| self.entries.contains_key(&(name.to_string(), *stage)))
            || self.children.contains_key(path)
    }

    /// Whether `path` itself has an entry at any stage.
    pub fn is_tracked_file(&self, path: &Path) -> bool {
        let name = path.to_string_lossy().into_owned();
        self.entries
            .range((name.clone(), Stage::Resolved)..=(name, Stage::Theirs))
            .next()
            .is_some()
    }

    pub fn has_conflict(&self) -> bool {
        self.entries.keys().any(|(_, stage)| *stage != Stage::Resolved)
    }

    pub fn conflict_paths(&self) -> BTreeSet<String> {
        self.entries
            .keys()
            .filter(|(_, stage)| *stage != Stage::Resolved)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Stage `entry`, replacing any conflict stages for its path and any
    /// entries it collides with as a file or as a directory.
    pub fn add(&mut self, entry: IndexEntry) {
        let entry = entry.with_stage(Stage::Resolved);

        self.discard_conflicts(&entry);
        for stage in Stage::CONFLICTED {
            self.remove_entry(&entry.name, stage);
        }
        self.store_entry(entry);
        self.changed = true;
    }

    pub fn add_from_db(&mut self, path: &Path, entry: &DatabaseEntry) {
        self.add(IndexEntry::from_database_entry(
            path.to_path_buf(),
            entry,
            Stage::Resolved,
        ));
    }

    /// Record a conflicted path: base, ours, theirs, any of which may be absent.
    pub fn add_conflict_set(&mut self, path: &Path, items: [Option<DatabaseEntry>; 3]) {
        self.remove_entry(path, Stage::Resolved);

        for (stage, item) in Stage::CONFLICTED.into_iter().zip(items) {
            self.remove_entry(path, stage);
            if let Some(item) = item {
                self.store_entry(IndexEntry::from_database_entry(
                    path.to_path_buf(),
                    &item,
                    stage,
                ));
            }
        }

        self.changed = true;
    }

    /// Remove `path` at every stage, along with anything tracked below it.
    pub fn remove(&mut self, path: &Path) {
        for stage in [Stage::Resolved, Stage::Base, Stage::Ours, Stage::Theirs] {
            self.remove_entry(path, stage);
        }
        self.remove_children(path);
        self.changed = true;
    }

    fn discard_conflicts(&mut self, entry: &IndexEntry) {
        for parent in entry.parent_dirs() {
            for stage in [Stage::Resolved, Stage::Base, Stage::Ours, Stage::Theirs] {
                self.remove_entry(parent, stage);
            }
        }
        self.remove_children(&entry.name);
    }

    fn store_entry(&mut self, entry: IndexEntry) {
        let name = entry.name.to_string_lossy().into_owned();

        for parent in entry.parent_dirs() {
            self.children
                .entry(parent.to_path_buf())
                .or_default()
                .insert(name.clone());
        }

        self.entries.insert((name, entry.stage()), entry);
    }

    fn remove_children(&mut self, path: &Path) {
        if let Some(children) = self.children.remove(path) {
            for child in children {
                for stage in [Stage::Resolved, Stage::Base, Stage::Ours, Stage::Theirs] {
                    self.remove_entry(Path::new(&child), stage);
                }
            }
        }
    }

    fn remove_entry(&mut self, path: &Path, stage: Stage) {
        let key = key_of(path, stage);
        let Some(entry) = self.entries.remove(&key) else {
            return;
        };

        let still_tracked = [Stage::Resolved, Stage::Base, Stage::Ours, Stage::Theirs]
            .iter()
            .any(|stage| self.entries.contains_key(&(key.0.clone(), *stage)));
        if still_tracked {
            return;
        }

        for parent in entry.parent_dirs() {
            if let Some(children) = self.children.get_mut(parent) {
                children.remove(&key.0);
                if children.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
    }

    /// Persist the index through `index.lock`, reusing the lock taken by
    /// `load_for_update` when there is one.
    ///
    /// Fails with `RepoError::Locked` if another handle holds the lock.
    pub fn write_updates(&mut self) -> anyhow::Result<()> {
        let lockfile = match self.lockfile.take() {
            Some(lockfile) => lockfile,
            None => Lockfile::acquire(&self.path)?,
        };
        let mut writer = Checksum::new(lockfile);

        self.header = IndexHeader {
            entries_count: self.entries.len() as u32,
            ..IndexHeader::empty()
        };
        writer.write(&self.header.serialize()?)?;

        for entry in self.entries.values() {
            writer.write(&entry.serialize()?)?;
        }

        writer.write_checksum()?;
        writer.into_inner().commit()?;
        self.changed = false;
        debug!(entries = self.entries.len(), "wrote index");

        Ok(())
    }

    pub fn update_entry_stat(&mut self, entry: &IndexEntry, stat: EntryMetadata) {
        let key = key_of(&entry.name, entry.stage());
        if let Some(existing_entry) = self.entries.get_mut(&key) {
            existing_entry.metadata = EntryMetadata {
                mode: existing_entry.metadata.mode,
                flags: existing_entry.metadata.flags,
                ..stat
            };
            self.changed = true;
        }
    }

    /// All entries in on-disk order: by path bytes, then stage.
    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn into_entries(self) -> impl Iterator<Item = IndexEntry> {
        self.entries.into_values()
    }

    /// Tracked paths equal to or below `path` (`.` means everything).
    pub fn entries_under_path(&self, path: &Path) -> Vec<PathBuf> {
        let paths = self
            .entries
            .keys()
            .map(|(name, _)| PathBuf::from(name))
            .filter(|name| path == Path::new(".") || name.starts_with(path))
            .collect::<BTreeSet<_>>();

        paths.into_iter().collect()
    }
}
