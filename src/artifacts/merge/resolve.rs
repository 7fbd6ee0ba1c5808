//! Three-way tree merge
//!
//! Both sides are diffed against the base. Paths changed on one side only go
//! straight into the clean diff; paths changed on both sides are merged
//! blob by blob with diff3 and mode by mode. The clean diff is applied to the
//! workspace and index as a checkout migration, after which conflicted paths
//! are recorded in the index at stages 1 to 3.
//!
//! A file on one side where the other side has a directory keeps the
//! directory in place and writes the file next to it as `<path>~<side>`.

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::log::path_filter::PathFilter;
use crate::artifacts::merge::diff3;
use crate::artifacts::merge::inputs::MergeInputs;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

type ConflictSet = [Option<DatabaseEntry>; 3];

pub struct Resolve<'r, I: MergeInputs> {
    repository: &'r Repository,
    inputs: &'r I,
    left_diff: ChangeSet,
    right_diff: ChangeSet,
    clean_diff: ChangeSet,
    conflicts: BTreeMap<PathBuf, ConflictSet>,
    untracked: BTreeMap<PathBuf, DatabaseEntry>,
    messages: Vec<String>,
}

impl<'r, I: MergeInputs> Resolve<'r, I> {
    pub fn new(repository: &'r Repository, inputs: &'r I) -> Self {
        Self {
            repository,
            inputs,
            left_diff: ChangeSet::new(),
            right_diff: ChangeSet::new(),
            clean_diff: ChangeSet::new(),
            conflicts: BTreeMap::new(),
            untracked: BTreeMap::new(),
            messages: Vec::new(),
        }
    }

    /// Progress lines (`Auto-merging ...`, `CONFLICT (...)`) in the order
    /// they happened.
    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn conflicted_paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.conflicts.keys()
    }

    /// Merge into `index` and the workspace. The index is left for the
    /// caller to write.
    pub fn execute(&mut self, index: &mut Index) -> anyhow::Result<()> {
        self.prepare_tree_diffs()?;

        let clean_diff = std::mem::take(&mut self.clean_diff);
        Migration::new(self.repository, index, clean_diff).apply_changes()?;

        self.add_conflicts_to_index(index);
        self.write_untracked_files()?;

        debug!(
            conflicts = self.conflicts.len(),
            untracked = self.untracked.len(),
            "resolved merge"
        );

        Ok(())
    }

    fn prepare_tree_diffs(&mut self) -> anyhow::Result<()> {
        let database = self.repository.database();
        let base = self.inputs.base_oid();
        let filter = PathFilter::empty();

        self.left_diff = database
            .tree_diff(base, Some(self.inputs.left_oid()), &filter)?
            .into_changes();
        self.right_diff = database
            .tree_diff(base, Some(self.inputs.right_oid()), &filter)?
            .into_changes();

        let right_changes = self
            .right_diff
            .iter()
            .map(|(path, change)| (path.clone(), change.clone()))
            .collect::<Vec<_>>();
        for (path, change) in right_changes {
            if change.new_entry().is_some() {
                self.file_dir_conflict(&path, Side::Left);
            }
            self.same_path_conflict(&path, change.old_entry(), change.new_entry())?;
        }

        let left_additions = self
            .left_diff
            .iter()
            .filter(|(_, change)| change.new_entry().is_some())
            .map(|(path, _)| path.clone())
            .collect::<Vec<_>>();
        for path in left_additions {
            self.file_dir_conflict(&path, Side::Right);
        }

        Ok(())
    }

    /// A change on the right at `path`, checked against the left.
    fn same_path_conflict(
        &mut self,
        path: &Path,
        base: Option<&DatabaseEntry>,
        right: Option<&DatabaseEntry>,
    ) -> anyhow::Result<()> {
        if self.conflicts.contains_key(path) {
            return Ok(());
        }

        let Some(left_change) = self.left_diff.get(path) else {
            self.record_clean(path, base.cloned(), right.cloned());
            return Ok(());
        };

        let left = left_change.new_entry().cloned();
        if left.as_ref() == right {
            return Ok(());
        }

        if left.is_some() && right.is_some() {
            self.messages.push(format!("Auto-merging {}", path.display()));
        }

        let (oid_ok, oid) = self.merge_blobs(
            base.map(|entry| &entry.oid),
            left.as_ref().map(|entry| &entry.oid),
            right.map(|entry| &entry.oid),
        )?;
        let (mode_ok, mode) = merge_modes(
            base.map(|entry| entry.mode),
            left.as_ref().map(|entry| entry.mode),
            right.map(|entry| entry.mode),
        );

        self.record_clean(path, left.clone(), Some(DatabaseEntry::new(oid, mode)));

        if !(oid_ok && mode_ok) {
            self.conflicts
                .insert(path.to_path_buf(), [base.cloned(), left, right.cloned()]);
            self.log_conflict(path, None);
        }

        Ok(())
    }

    fn record_clean(&mut self, path: &Path, old: Option<DatabaseEntry>, new: Option<DatabaseEntry>) {
        match TreeChangeType::from_entries(old, new) {
            Some(change) => {
                self.clean_diff.insert(path.to_path_buf(), change);
            }
            None => {
                self.clean_diff.remove(path);
            }
        }
    }

    /// A file added at `path` on one side while `side`'s diff adds a file
    /// at one of its parent directories.
    fn file_dir_conflict(&mut self, path: &Path, side: Side) {
        let parents = path
            .parent()
            .into_iter()
            .flat_map(Path::ancestors)
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect::<Vec<_>>();

        for parent in parents.into_iter().rev() {
            let diff = match side {
                Side::Left => &self.left_diff,
                Side::Right => &self.right_diff,
            };
            let Some(change) = diff.get(&parent) else {
                continue;
            };
            let Some(new_entry) = change.new_entry().cloned() else {
                continue;
            };
            let old_entry = change.old_entry().cloned();
            let path_in_diff = diff.contains_key(path);

            let (name, conflict) = match side {
                Side::Left => (
                    self.inputs.left_name().to_string(),
                    [old_entry, Some(new_entry.clone()), None],
                ),
                Side::Right => (
                    self.inputs.right_name().to_string(),
                    [old_entry, None, Some(new_entry.clone())],
                ),
            };

            self.conflicts.insert(parent.clone(), conflict);
            self.clean_diff.remove(&parent);

            let rename = PathBuf::from(format!("{}~{}", parent.display(), name));
            self.untracked.insert(rename.clone(), new_entry);

            if !path_in_diff {
                self.messages.push(format!("Adding {}", path.display()));
            }
            self.log_conflict(&parent, Some(&rename));
        }
    }

    fn merge_blobs(
        &self,
        base: Option<&ObjectId>,
        left: Option<&ObjectId>,
        right: Option<&ObjectId>,
    ) -> anyhow::Result<(bool, ObjectId)> {
        if let Some((ok, oid)) = merge3(base, left, right) {
            return Ok((ok, oid.clone()));
        }

        let text = |oid: Option<&ObjectId>| -> anyhow::Result<String> {
            match oid {
                Some(oid) => Ok(self.load_blob(oid)?.text().into_owned()),
                None => Ok(String::new()),
            }
        };

        let merged = diff3::merge(&text(base)?, &text(left)?, &text(right)?);
        let data = merged.to_text(self.inputs.left_name(), self.inputs.right_name());
        let oid = self
            .repository
            .database()
            .store(&Blob::new(Bytes::from(data)))?;

        Ok((merged.is_clean(), oid))
    }

    fn load_blob(&self, oid: &ObjectId) -> anyhow::Result<Blob> {
        self.repository
            .database()
            .parse_object_as_blob(oid)?
            .with_context(|| format!("object {} is not a blob", oid))
    }

    fn add_conflicts_to_index(&self, index: &mut Index) {
        for (path, items) in &self.conflicts {
            index.add_conflict_set(path, items.clone());
        }
    }

    fn write_untracked_files(&self) -> anyhow::Result<()> {
        for (path, entry) in &self.untracked {
            let blob = self.load_blob(&entry.oid)?;
            self.repository
                .workspace()
                .write_file(path, blob.content(), entry.mode)?;
        }

        Ok(())
    }

    fn log_conflict(&mut self, path: &Path, rename: Option<&Path>) {
        let Some([base, left, right]) = self.conflicts.get(path) else {
            return;
        };
        let left_name = self.inputs.left_name();
        let right_name = self.inputs.right_name();

        let message = match (base, left, right) {
            (base, Some(_), Some(_)) => {
                let kind = if base.is_some() { "content" } else { "add/add" };
                format!("CONFLICT ({}): Merge conflict in {}", kind, path.display())
            }
            (Some(_), left, right) if left.is_some() || right.is_some() => {
                let (deleted, modified) = if left.is_some() {
                    (right_name, left_name)
                } else {
                    (left_name, right_name)
                };
                let rename = rename
                    .map(|rename| format!(" at {}", rename.display()))
                    .unwrap_or_default();
                format!(
                    "CONFLICT (modify/delete): {path} deleted in {deleted} and modified in {modified}. \
                     Version {modified} of {path} left in tree{rename}.",
                    path = path.display(),
                )
            }
            (_, left, _) => {
                let (kind, branch) = if left.is_some() {
                    ("file/directory", right_name)
                } else {
                    ("directory/file", left_name)
                };
                let rename = rename.map(Path::display).map(|r| r.to_string()).unwrap_or_default();
                format!(
                    "CONFLICT ({}): There is a directory with name {} in {}. Adding {} as {}",
                    kind,
                    path.display(),
                    branch,
                    path.display(),
                    rename
                )
            }
        };

        self.messages.push(message);
    }
}

#[derive(Debug, Clone, Copy)]
enum Side {
    Left,
    Right,
}

/// The trivial cases of a three-way merge, or `None` when both sides changed.
/// A missing side is a conflict that keeps the other side.
fn merge3<T: PartialEq + Clone>(
    base: Option<T>,
    left: Option<T>,
    right: Option<T>,
) -> Option<(bool, T)> {
    match (left, right) {
        (None, Some(right)) => Some((false, right)),
        (Some(left), None) => Some((false, left)),
        (Some(left), Some(right)) => {
            if Some(&left) == base.as_ref() || left == right {
                Some((true, right))
            } else if Some(&right) == base.as_ref() {
                Some((true, left))
            } else {
                None
            }
        }
        (None, None) => None,
    }
}

/// Modes have no content to merge: a two-sided change keeps the left mode
/// and is reported as a conflict.
fn merge_modes(
    base: Option<EntryMode>,
    left: Option<EntryMode>,
    right: Option<EntryMode>,
) -> (bool, EntryMode) {
    match merge3(base, left, right) {
        Some(result) => result,
        None => (false, left.unwrap_or_default()),
    }
}
