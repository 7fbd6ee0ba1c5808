use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::index::index_entry::{EntryMetadata, IndexEntry};
use crate::artifacts::objects::object::Object;
use crate::artifacts::status::file_change::{IndexChangeType, WorkspaceChangeType};
use derive_new::new;
use std::path::Path;

/// Comparisons shared by status and checkout.
#[derive(new)]
pub struct Inspector<'r> {
    repository: &'r Repository,
}

impl<'r> Inspector<'r> {
    /// Whether an untracked path holds something that could be added: an
    /// untracked file, or a directory with an untracked file somewhere below.
    pub fn is_trackable(
        &self,
        path: &Path,
        stat: &EntryMetadata,
        index: &Index,
    ) -> anyhow::Result<bool> {
        if !stat.mode.is_tree() {
            return Ok(!index.is_tracked_file(path));
        }

        let items = self.repository.workspace().list_dir(Some(path))?;
        let (dirs, files): (Vec<_>, Vec<_>) =
            items.iter().partition(|(_, stat)| stat.mode.is_tree());

        for (item_path, item_stat) in files.into_iter().chain(dirs) {
            if self.is_trackable(item_path, item_stat, index)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn is_content_changed(&self, index_entry: &IndexEntry) -> anyhow::Result<bool> {
        let blob = self.repository.workspace().parse_blob(&index_entry.name)?;

        Ok(blob.object_id()? != index_entry.oid)
    }

    /// Stat data decides when it can; otherwise the file is rehashed.
    pub fn check_index_against_workspace(
        &self,
        entry: Option<&IndexEntry>,
        stat: Option<&EntryMetadata>,
    ) -> anyhow::Result<WorkspaceChangeType> {
        match (entry, stat) {
            (None, _) => Ok(WorkspaceChangeType::Untracked),
            (Some(_), None) => Ok(WorkspaceChangeType::Deleted),
            (Some(entry), Some(stat)) if !entry.stat_match(stat) => {
                Ok(WorkspaceChangeType::Modified)
            }
            (Some(entry), Some(stat)) if entry.times_match(stat) => Ok(WorkspaceChangeType::None),
            (Some(entry), Some(_)) if self.is_content_changed(entry)? => {
                Ok(WorkspaceChangeType::Modified)
            }
            _ => Ok(WorkspaceChangeType::None),
        }
    }

    pub fn check_index_against_head_tree(
        &self,
        index_entry: Option<&IndexEntry>,
        head_entry: Option<&DatabaseEntry>,
    ) -> IndexChangeType {
        match (index_entry, head_entry) {
            (Some(index_entry), Some(head_entry))
                if head_entry.mode != index_entry.metadata.mode
                    || head_entry.oid != index_entry.oid =>
            {
                IndexChangeType::Modified
            }
            (Some(_), None) => IndexChangeType::Added,
            (None, Some(_)) => IndexChangeType::Deleted,
            _ => IndexChangeType::None,
        }
    }
}
