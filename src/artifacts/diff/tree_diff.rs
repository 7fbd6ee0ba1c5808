//! Recursive tree comparison
//!
//! Two trees are walked side by side. Entries with identical `(mode, oid)`
//! are skipped without loading them, so identical subtrees cost nothing and
//! the work done is proportional to the number of changed paths.

use crate::areas::database::Database;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::log::path_filter::PathFilter;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub enum TreeChangeType {
    Added(DatabaseEntry),
    Deleted(DatabaseEntry),
    Modified {
        old: DatabaseEntry,
        new: DatabaseEntry,
    },
}

impl TreeChangeType {
    pub fn from_entries(old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) -> Option<Self> {
        match (old, new) {
            (None, Some(new)) => Some(TreeChangeType::Added(new)),
            (Some(old), None) => Some(TreeChangeType::Deleted(old)),
            (Some(old), Some(new)) if old != new => Some(TreeChangeType::Modified { old, new }),
            _ => None,
        }
    }

    pub fn old_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Deleted(entry) => Some(entry),
            TreeChangeType::Modified { old, .. } => Some(old),
            TreeChangeType::Added(_) => None,
        }
    }

    pub fn new_entry(&self) -> Option<&DatabaseEntry> {
        match self {
            TreeChangeType::Added(entry) => Some(entry),
            TreeChangeType::Modified { new, .. } => Some(new),
            TreeChangeType::Deleted(_) => None,
        }
    }

    pub fn status_char(&self) -> char {
        match self {
            TreeChangeType::Added(_) => 'A',
            TreeChangeType::Deleted(_) => 'D',
            TreeChangeType::Modified { .. } => 'M',
        }
    }
}

pub type ChangeSet = BTreeMap<PathBuf, TreeChangeType>;
type TreeEntryMap = BTreeMap<String, DatabaseEntry>;

#[derive(Debug)]
pub struct TreeDiff<'r> {
    database: &'r Database,
    change_set: ChangeSet,
}

impl<'r> TreeDiff<'r> {
    pub fn new(database: &'r Database) -> Self {
        TreeDiff {
            database,
            change_set: BTreeMap::new(),
        }
    }

    /// Changed blob paths; a file replaced by a directory shows up as the
    /// file deleted plus every file added below the new directory.
    pub fn changes(&self) -> &ChangeSet {
        &self.change_set
    }

    pub fn into_changes(self) -> ChangeSet {
        self.change_set
    }

    pub fn get_entries(&self, path: &Path) -> (Option<&DatabaseEntry>, Option<&DatabaseEntry>) {
        match self.change_set.get(path) {
            Some(change) => (change.old_entry(), change.new_entry()),
            None => (None, None),
        }
    }

    /// Compare two trees (or the trees of two commits); `None` is the empty tree.
    pub fn compare_oids(
        &mut self,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
        filter: &PathFilter,
    ) -> anyhow::Result<()> {
        if old == new {
            return Ok(());
        }

        let old_entries = self.tree_entries(old, filter)?;
        let new_entries = self.tree_entries(new, filter)?;

        self.detect_deletions(&old_entries, &new_entries, filter)?;
        self.detect_additions(&old_entries, &new_entries, filter)?;

        Ok(())
    }

    fn tree_entries(
        &self,
        oid: Option<&ObjectId>,
        filter: &PathFilter,
    ) -> anyhow::Result<TreeEntryMap> {
        match oid {
            None => Ok(BTreeMap::new()),
            Some(oid) => Ok(self
                .database
                .load_tree_of(oid)?
                .into_entries()
                .filter(|(name, _)| filter.matches(name))
                .collect()),
        }
    }

    fn detect_deletions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        filter: &PathFilter,
    ) -> anyhow::Result<()> {
        for (name, entry) in old {
            let other = new.get(name);
            if other == Some(entry) {
                continue;
            }

            let old_tree = entry.is_tree().then_some(&entry.oid);
            let new_tree = other.filter(|other| other.is_tree()).map(|other| &other.oid);
            self.compare_oids(old_tree, new_tree, &filter.subpath(name))?;

            let old_blob = (!entry.is_tree()).then(|| entry.clone());
            let new_blob = other.filter(|other| !other.is_tree()).cloned();

            if let Some(change) = TreeChangeType::from_entries(old_blob, new_blob) {
                self.change_set.insert(filter.join(name), change);
            }
        }

        Ok(())
    }

    fn detect_additions(
        &mut self,
        old: &TreeEntryMap,
        new: &TreeEntryMap,
        filter: &PathFilter,
    ) -> anyhow::Result<()> {
        for (name, entry) in new {
            if old.contains_key(name) {
                continue;
            }

            if entry.is_tree() {
                self.compare_oids(None, Some(&entry.oid), &filter.subpath(name))?;
            } else {
                self.change_set
                    .insert(filter.join(name), TreeChangeType::Added(entry.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::index::entry_mode::{EntryMode, FileMode};
    use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
    use crate::artifacts::objects::blob::Blob;
    use crate::artifacts::objects::object::Object;
    use crate::artifacts::objects::tree::Tree;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn write_tree(database: &Database, files: &[(&str, &str)]) -> ObjectId {
        let entries = files
            .iter()
            .map(|(path, content)| {
                let oid = database.store(&Blob::from(*content)).unwrap();
                IndexEntry::new(
                    PathBuf::from(path),
                    oid,
                    EntryMetadata {
                        mode: EntryMode::File(FileMode::Regular),
                        ..Default::default()
                    },
                )
            })
            .collect::<Vec<_>>();

        let tree = Tree::build(entries.iter()).unwrap();
        tree.traverse(&mut |subtree: &Tree| database.store(subtree).map(|_| ()))
            .unwrap();
        tree.object_id().unwrap()
    }

    fn summary(changes: &ChangeSet) -> Vec<(String, char)> {
        changes
            .iter()
            .map(|(path, change)| (path.display().to_string(), change.status_char()))
            .collect()
    }

    #[test]
    fn nested_changes_are_reported_with_full_paths() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());
        let old = write_tree(&database, &[("a.txt", "1"), ("lib/x.rs", "x"), ("lib/y.rs", "y")]);
        let new = write_tree(&database, &[("a.txt", "1"), ("lib/x.rs", "x2"), ("lib/z.rs", "z")]);

        let diff = database
            .tree_diff(Some(&old), Some(&new), &PathFilter::empty())
            .unwrap();

        assert_eq!(
            summary(diff.changes()),
            vec![
                ("lib/x.rs".to_string(), 'M'),
                ("lib/y.rs".to_string(), 'D'),
                ("lib/z.rs".to_string(), 'A'),
            ]
        );
    }

    #[test]
    fn file_replaced_by_directory() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());
        let old = write_tree(&database, &[("thing", "file")]);
        let new = write_tree(&database, &[("thing/inner.txt", "nested")]);

        let diff = database
            .tree_diff(Some(&old), Some(&new), &PathFilter::empty())
            .unwrap();

        assert_eq!(
            summary(diff.changes()),
            vec![
                ("thing".to_string(), 'D'),
                ("thing/inner.txt".to_string(), 'A'),
            ]
        );
    }

    #[test]
    fn path_filter_limits_the_reported_changes() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());
        let old = write_tree(&database, &[("a.txt", "1"), ("lib/x.rs", "x")]);
        let new = write_tree(&database, &[("a.txt", "2"), ("lib/x.rs", "x2")]);

        let diff = database
            .tree_diff(
                Some(&old),
                Some(&new),
                &PathFilter::new(&[PathBuf::from("lib")]),
            )
            .unwrap();

        assert_eq!(summary(diff.changes()), vec![("lib/x.rs".to_string(), 'M')]);
    }

    #[test]
    fn identical_trees_have_no_changes() {
        let dir = TempDir::new().unwrap();
        let database = Database::new(dir.path().to_path_buf().into_boxed_path());
        let tree = write_tree(&database, &[("a.txt", "1")]);

        let diff = database
            .tree_diff(Some(&tree), Some(&tree), &PathFilter::empty())
            .unwrap();

        assert!(diff.changes().is_empty());
    }
}
