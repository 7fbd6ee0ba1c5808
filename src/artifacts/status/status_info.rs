use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry, Stage};
use crate::artifacts::status::file_change::{
    ConflictKind, FileChange, FileChangeType, IndexChangeType, WorkspaceChangeType,
};
use crate::artifacts::status::inspector::Inspector;
use derive_new::new;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub type FileStatSet = BTreeMap<PathBuf, EntryMetadata>;
pub type ChangeSet = BTreeMap<PathBuf, FileChangeType>;
pub type FileSet = BTreeSet<PathBuf>;
pub type HeadTree = BTreeMap<PathBuf, DatabaseEntry>;

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub(crate) file_stats: FileStatSet,
    /// Untracked files, and untracked directories with a trailing separator
    pub(crate) untracked_files: FileSet,
    pub(crate) changed_files: BTreeMap<PathBuf, FileChange>,
    pub(crate) workspace_changeset: ChangeSet,
    pub(crate) index_changeset: ChangeSet,
    pub(crate) conflicts: BTreeMap<PathBuf, ConflictKind>,
    pub(crate) head_tree: HeadTree,
}

impl StatusInfo {
    pub fn is_clean(&self) -> bool {
        self.changed_files.is_empty() && self.conflicts.is_empty()
    }

    pub fn has_staged_changes(&self) -> bool {
        !self.index_changeset.is_empty()
    }
}

#[derive(new)]
pub struct Status<'r> {
    repository: &'r Repository,
}

impl<'r> Status<'r> {
    /// Compare workspace, index and HEAD.
    ///
    /// Entries whose stat data went stale but whose content is unchanged get
    /// fresh stat data in `index`; the caller decides whether to write it.
    pub async fn initialize(&self, index: &mut Index) -> anyhow::Result<StatusInfo> {
        let mut file_stats = FileStatSet::new();
        let mut untracked_files = FileSet::new();

        let inspector = Inspector::new(self.repository);

        self.scan_workspace(None, &mut untracked_files, &mut file_stats, index, &inspector)
            .await?;
        let head_oid = self.repository.refs().read_head()?;
        let head_tree = self.repository.database().load_tree_list(head_oid.as_ref())?;
        let conflicts = Self::collect_conflicts(index);
        let mut changed_files =
            self.check_index_entries(&file_stats, &head_tree, index, &inspector)?;
        Self::collect_deleted_head_files(&head_tree, index, &mut changed_files);

        let workspace_changeset = changed_files
            .iter()
            .filter(|(_, change)| change.workspace_change != WorkspaceChangeType::None)
            .map(|(file, change)| (file.clone(), FileChangeType::Workspace(change.workspace_change)))
            .collect();
        let index_changeset = changed_files
            .iter()
            .filter(|(_, change)| change.index_change != IndexChangeType::None)
            .map(|(file, change)| (file.clone(), FileChangeType::Index(change.index_change)))
            .collect();

        Ok(StatusInfo {
            file_stats,
            untracked_files,
            changed_files,
            workspace_changeset,
            index_changeset,
            conflicts,
            head_tree,
        })
    }

    async fn scan_workspace(
        &self,
        prefix_path: Option<&Path>,
        untracked_files: &mut FileSet,
        file_stats: &mut FileStatSet,
        index: &Index,
        inspector: &Inspector<'_>,
    ) -> anyhow::Result<()> {
        let items = self.repository.workspace().list_dir(prefix_path)?;

        for (path, stat) in items {
            if index.is_directly_tracked(&path) {
                if stat.mode.is_tree() {
                    Box::pin(self.scan_workspace(
                        Some(&path),
                        untracked_files,
                        file_stats,
                        index,
                        inspector,
                    ))
                    .await?;
                } else {
                    file_stats.insert(path, stat);
                }
            } else if inspector.is_trackable(&path, &stat, index)? {
                let path = if stat.mode.is_tree() {
                    path.join("")
                } else {
                    path
                };
                untracked_files.insert(path);
            }
        }

        Ok(())
    }

    fn collect_conflicts(index: &Index) -> BTreeMap<PathBuf, ConflictKind> {
        let mut stages = BTreeMap::<PathBuf, Vec<Stage>>::new();
        for entry in index.entries().filter(|entry| entry.stage() != Stage::Resolved) {
            stages.entry(entry.name.clone()).or_default().push(entry.stage());
        }

        stages
            .into_iter()
            .filter_map(|(path, stages)| ConflictKind::from_stages(&stages).map(|kind| (path, kind)))
            .collect()
    }

    fn check_index_entries(
        &self,
        file_stats: &FileStatSet,
        head_tree: &HeadTree,
        index: &mut Index,
        inspector: &Inspector<'_>,
    ) -> anyhow::Result<BTreeMap<PathBuf, FileChange>> {
        let mut changed_files = BTreeMap::<PathBuf, FileChange>::new();
        let index_entries = index
            .entries()
            .filter(|entry| entry.stage() == Stage::Resolved)
            .cloned()
            .collect::<Vec<_>>();

        for entry in index_entries {
            self.check_index_entry_against_workspace(
                &entry,
                file_stats,
                index,
                inspector,
                &mut changed_files,
            )?;

            let status = inspector.check_index_against_head_tree(Some(&entry), head_tree.get(&entry.name));
            if status != IndexChangeType::None {
                changed_files.entry(entry.name.clone()).or_default().index_change = status;
            }
        }

        Ok(changed_files)
    }

    fn check_index_entry_against_workspace(
        &self,
        index_entry: &IndexEntry,
        file_stats: &FileStatSet,
        index: &mut Index,
        inspector: &Inspector<'_>,
        changed_files: &mut BTreeMap<PathBuf, FileChange>,
    ) -> anyhow::Result<()> {
        let stat = file_stats.get(&index_entry.name);
        let status = inspector.check_index_against_workspace(Some(index_entry), stat)?;

        if status != WorkspaceChangeType::None {
            changed_files
                .entry(index_entry.name.clone())
                .or_default()
                .workspace_change = status;
        } else if let Some(stat) = stat {
            index.update_entry_stat(index_entry, stat.clone());
        }

        Ok(())
    }

    fn collect_deleted_head_files(
        head_tree: &HeadTree,
        index: &Index,
        changed_files: &mut BTreeMap<PathBuf, FileChange>,
    ) {
        for path in head_tree.keys() {
            if !index.is_tracked_file(path) {
                changed_files.entry(path.clone()).or_default().index_change =
                    IndexChangeType::Deleted;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::repository::fixtures::{repository, write};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    async fn status_of(repository: &Repository) -> StatusInfo {
        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate().unwrap();
        repository.status().initialize(&mut index).await.unwrap()
    }

    #[tokio::test]
    async fn untracked_directories_are_listed_once() {
        let dir = TempDir::new().unwrap();
        let repository = repository(dir.path()).await;
        write(dir.path(), "top.txt", "x");
        write(dir.path(), "nested/deeper/file.txt", "y");
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();

        let status = status_of(&repository).await;

        assert_eq!(
            status.untracked_files.into_iter().collect::<Vec<_>>(),
            vec![PathBuf::from("nested/"), PathBuf::from("top.txt")]
        );
    }

    #[tokio::test]
    async fn staged_and_unstaged_changes_are_separated() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "one");
        write(dir.path(), "b.txt", "two");
        repository.add(&["a.txt".into(), "b.txt".into()]).await.unwrap();
        repository.commit(Some("first")).await.unwrap();

        write(dir.path(), "a.txt", "changed");
        write(dir.path(), "c.txt", "three");
        repository.add(&["c.txt".into()]).await.unwrap();
        std::fs::remove_file(dir.path().join("b.txt")).unwrap();

        let status = status_of(&repository).await;

        assert_eq!(
            status
                .changed_files
                .iter()
                .map(|(path, change)| format!("{} {}", change, path.display()))
                .collect::<Vec<_>>(),
            vec![" M a.txt", " D b.txt", "A  c.txt"]
        );
    }
}
