//! Moving the workspace and index from one tree to another
//!
//! A migration is planned from a tree diff before anything on disk is
//! touched:
//!
//! 1. Every changed path is checked for local work that would be lost.
//! 2. Each change becomes a create, update or delete action, and the
//!    directories that must appear or may disappear are collected.
//! 3. Only when no conflicts were found are the workspace and index updated.
//!
//! With `force`, step 1 is skipped and local changes are overwritten.

use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::checkout::conflict::ConflictType;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::tree_diff::{ChangeSet, TreeChangeType};
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::inspector::Inspector;
use crate::errors::RepoError;
use anyhow::Context;
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActionType {
    Create,
    Update,
    Delete,
}

pub type Action = (PathBuf, Option<DatabaseEntry>);

pub struct Migration<'r> {
    repository: &'r Repository,
    index: &'r mut Index,
    changes: ChangeSet,
    inspector: Inspector<'r>,
    force: bool,
    actions: BTreeMap<ActionType, Vec<Action>>,
    conflicts: BTreeMap<ConflictType, BTreeSet<PathBuf>>,
    mkdirs: BTreeSet<PathBuf>,
    rmdirs: BTreeSet<PathBuf>,
}

impl<'r> Migration<'r> {
    pub fn new(repository: &'r Repository, index: &'r mut Index, changes: ChangeSet) -> Self {
        Self {
            repository,
            index,
            changes,
            inspector: Inspector::new(repository),
            force: false,
            actions: BTreeMap::new(),
            conflicts: BTreeMap::new(),
            mkdirs: BTreeSet::new(),
            rmdirs: BTreeSet::new(),
        }
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn actions_for(&self, action: ActionType) -> &[Action] {
        self.actions.get(&action).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn mkdirs(&self) -> &BTreeSet<PathBuf> {
        &self.mkdirs
    }

    pub fn rmdirs(&self) -> &BTreeSet<PathBuf> {
        &self.rmdirs
    }

    /// Plan, refuse on conflicts, then update workspace and index. The
    /// index is modified in memory only; the caller writes it.
    pub fn apply_changes(&mut self) -> anyhow::Result<()> {
        self.plan_changes()?;
        self.repository.workspace().apply_migration(self)?;
        self.update_index()?;

        Ok(())
    }

    fn plan_changes(&mut self) -> anyhow::Result<()> {
        let changes = std::mem::take(&mut self.changes);

        for (path, change) in &changes {
            if !self.force {
                self.check_for_conflict(path, change)?;
            }
            self.record_change(path, change);
        }
        self.changes = changes;

        if self.conflicts.is_empty() {
            return Ok(());
        }

        let report = self
            .conflicts
            .iter()
            .map(|(conflict_type, paths)| conflict_type.report(paths))
            .collect::<Vec<_>>()
            .join("\n");

        anyhow::bail!(RepoError::WouldOverwriteChanges(format!("{}\nAborting", report)))
    }

    fn check_for_conflict(&mut self, path: &Path, change: &TreeChangeType) -> anyhow::Result<()> {
        let entry = self.index.entry_by_path(path).cloned();
        let entry = entry.as_ref();
        let old_entry = change.old_entry();
        let new_entry = change.new_entry();

        if self.index_differs_from_trees(entry, old_entry, new_entry) {
            self.record_conflict(ConflictType::StaleFile, path);
            return Ok(());
        }

        let stat = self.repository.workspace().stat_file(path)?;
        let conflict_type = ConflictType::classify(stat.as_ref(), entry, new_entry);

        match stat {
            None => {
                if let Some(parent) = self.untracked_parent(path)? {
                    let conflicted = if entry.is_some() { path.to_path_buf() } else { parent };
                    self.record_conflict(conflict_type, &conflicted);
                }
            }
            Some(stat) if stat.mode.is_tree() => {
                if self.inspector.is_trackable(path, &stat, &*self.index)? {
                    self.record_conflict(conflict_type, path);
                }
            }
            Some(stat) => {
                let change = self
                    .inspector
                    .check_index_against_workspace(entry, Some(&stat))?;
                if change != WorkspaceChangeType::None {
                    self.record_conflict(conflict_type, path);
                }
            }
        }

        Ok(())
    }

    fn record_conflict(&mut self, conflict_type: ConflictType, path: &Path) {
        self.conflicts
            .entry(conflict_type)
            .or_default()
            .insert(path.to_path_buf());
    }

    /// An untracked file sitting where one of `path`'s parent directories
    /// needs to go.
    fn untracked_parent(&self, path: &Path) -> anyhow::Result<Option<PathBuf>> {
        let Some(parent) = path.parent() else {
            return Ok(None);
        };

        for ancestor in parent.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }

            match self.repository.workspace().stat_file(ancestor)? {
                Some(stat) if !stat.mode.is_tree() => {
                    if self.inspector.is_trackable(ancestor, &stat, &*self.index)? {
                        return Ok(Some(ancestor.to_path_buf()));
                    }
                }
                _ => continue,
            }
        }

        Ok(None)
    }

    /// The index matches neither side of the change, so it holds staged
    /// work of its own.
    fn index_differs_from_trees(
        &self,
        index_entry: Option<&IndexEntry>,
        old_entry: Option<&DatabaseEntry>,
        new_entry: Option<&DatabaseEntry>,
    ) -> bool {
        self.inspector
            .check_index_against_head_tree(index_entry, old_entry)
            != IndexChangeType::None
            && self
                .inspector
                .check_index_against_head_tree(index_entry, new_entry)
                != IndexChangeType::None
    }

    fn record_change(&mut self, path: &Path, change: &TreeChangeType) {
        let parents = path
            .parent()
            .into_iter()
            .flat_map(Path::ancestors)
            .filter(|ancestor| !ancestor.as_os_str().is_empty())
            .map(Path::to_path_buf);

        let (action, entry) = match change {
            TreeChangeType::Deleted(_) => {
                self.rmdirs.extend(parents);
                (ActionType::Delete, None)
            }
            TreeChangeType::Added(new) => {
                self.mkdirs.extend(parents);
                (ActionType::Create, Some(new.clone()))
            }
            TreeChangeType::Modified { new, .. } => {
                self.mkdirs.extend(parents);
                (ActionType::Update, Some(new.clone()))
            }
        };

        self.actions
            .entry(action)
            .or_default()
            .push((path.to_path_buf(), entry));
    }

    fn update_index(&mut self) -> anyhow::Result<()> {
        for (path, _) in self.actions_for(ActionType::Delete).to_vec() {
            self.index.remove(&path);
        }

        for action in [ActionType::Create, ActionType::Update] {
            for (path, entry) in self.actions_for(action).to_vec() {
                let entry = entry.with_context(|| format!("no target entry for {}", path.display()))?;
                let stat = self
                    .repository
                    .workspace()
                    .stat_file(&path)?
                    .with_context(|| format!("{} vanished during checkout", path.display()))?;

                self.index.add(IndexEntry::new(path, entry.oid, stat));
            }
        }

        debug!(
            created = self.actions_for(ActionType::Create).len(),
            updated = self.actions_for(ActionType::Update).len(),
            deleted = self.actions_for(ActionType::Delete).len(),
            "migrated index"
        );

        Ok(())
    }

    pub fn load_blob_data(&self, object_id: &ObjectId) -> anyhow::Result<Bytes> {
        let blob = self
            .repository
            .database()
            .parse_object_as_blob(object_id)?
            .with_context(|| format!("object {} is not a blob", object_id))?;

        Ok(blob.content().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::repository::fixtures::{repository, write};
    use crate::artifacts::log::path_filter::PathFilter;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn commit_all(repository: &mut Repository, message: &str) -> ObjectId {
        repository.add(&[".".into()]).await.unwrap();
        repository.commit(Some(message)).await.unwrap();
        repository.refs().read_head().unwrap().unwrap()
    }

    async fn migrate(
        repository: &Repository,
        from: &ObjectId,
        to: &ObjectId,
        force: bool,
    ) -> anyhow::Result<()> {
        let changes = repository
            .database()
            .tree_diff(Some(from), Some(to), &PathFilter::empty())?
            .into_changes();

        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate()?;
        Migration::new(repository, &mut index, changes)
            .with_force(force)
            .apply_changes()?;
        index.write_updates()
    }

    #[tokio::test]
    async fn moves_workspace_between_trees() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "keep.txt", "keep");
        write(dir.path(), "old/file.txt", "old");
        let first = commit_all(&mut repository, "first").await;

        write(dir.path(), "keep.txt", "kept");
        write(dir.path(), "new/deep/file.txt", "new");
        repository.add(&["keep.txt".into(), "new".into()]).await.unwrap();
        repository.rm(&["old/file.txt".into()], false).await.unwrap();
        assert!(!dir.path().join("old").exists());
        repository.commit(Some("second")).await.unwrap();
        let second = repository.refs().read_head().unwrap().unwrap();

        migrate(&repository, &second, &first, false).await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("keep.txt")).unwrap(), "keep");
        assert_eq!(std::fs::read_to_string(dir.path().join("old/file.txt")).unwrap(), "old");
        assert!(!dir.path().join("new").exists());
    }

    #[tokio::test]
    async fn refuses_to_overwrite_local_changes() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "one");
        let first = commit_all(&mut repository, "first").await;
        write(dir.path(), "a.txt", "two");
        let second = commit_all(&mut repository, "second").await;

        write(dir.path(), "a.txt", "local edit");
        let error = migrate(&repository, &second, &first, false).await.unwrap_err();

        assert!(matches!(
            error.downcast_ref::<RepoError>(),
            Some(RepoError::WouldOverwriteChanges(_))
        ));
        assert!(error.to_string().contains("\ta.txt"));
        assert!(error.to_string().ends_with("Aborting"));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "local edit");
    }

    #[tokio::test]
    async fn force_discards_local_changes() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "one");
        let first = commit_all(&mut repository, "first").await;
        write(dir.path(), "a.txt", "two");
        let second = commit_all(&mut repository, "second").await;

        write(dir.path(), "a.txt", "local edit");
        migrate(&repository, &second, &first, true).await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one");
    }

    #[tokio::test]
    async fn untracked_file_in_the_way_is_reported() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "one");
        let first = commit_all(&mut repository, "first").await;
        write(dir.path(), "b.txt", "tracked later");
        let second = commit_all(&mut repository, "second").await;
        migrate(&repository, &second, &first, false).await.unwrap();

        write(dir.path(), "b.txt", "untracked");
        let error = migrate(&repository, &first, &second, false).await.unwrap_err();

        assert!(error.to_string().contains(
            "The following untracked working tree files would be overwritten by checkout:\n\tb.txt"
        ));
    }
}
