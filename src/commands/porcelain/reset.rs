use crate::areas::index::Index;
use crate::areas::refs::ORIG_HEAD;
use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::PathBuf;
use tracing::debug;

const DEFAULT_REVISION: &str = "HEAD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetMode {
    /// Move HEAD only
    Soft,
    /// Move HEAD and reset the index
    #[default]
    Mixed,
    /// Move HEAD and reset both index and workspace
    Hard,
}

impl Repository {
    /// Move HEAD to `revision` and bring the index (and with `Hard` the
    /// workspace) in line with it. With `paths`, only those index entries are
    /// reset and HEAD stays where it is.
    pub async fn reset(
        &mut self,
        mode: ResetMode,
        revision: Option<&str>,
        paths: &[String],
    ) -> anyhow::Result<()> {
        let revision = revision.unwrap_or(DEFAULT_REVISION);
        let target = Revision::try_parse(revision)?.resolve(self)?;

        let index = self.index();
        let mut index = index.lock().await;
        index.load_for_update()?;

        if !paths.is_empty() {
            if mode != ResetMode::Mixed {
                anyhow::bail!(
                    "Cannot do {} reset with paths.",
                    format!("{:?}", mode).to_lowercase()
                );
            }
            let paths = paths
                .iter()
                .map(|path| self.relative_path(path))
                .collect::<anyhow::Result<Vec<_>>>()?;
            self.reset_paths(&mut index, &target, &paths)?;
            return index.write_updates();
        }

        if let Some(head) = self.refs().read_head()? {
            self.refs().update_ref(ORIG_HEAD, &head)?;
        }
        self.refs().update_head(&target)?;

        match mode {
            ResetMode::Soft => index.release(),
            ResetMode::Mixed => {
                self.reset_index(&mut index, &target)?;
                index.write_updates()?;
            }
            ResetMode::Hard => {
                self.reset_index_and_workspace(&mut index, &target)?;
                index.write_updates()?;
            }
        }

        if mode != ResetMode::Soft
            && let Some(kind) = self.pending_commit().in_progress()
        {
            self.pending_commit().clear(kind)?;
        }

        if mode == ResetMode::Hard {
            let commit = self.database().load_commit(&target)?;
            writeln!(
                self.writer(),
                "HEAD is now at {} {}",
                target.to_short_oid(),
                commit.short_message()
            )?;
        }

        Ok(())
    }

    fn reset_paths(
        &self,
        index: &mut Index,
        target: &ObjectId,
        paths: &[PathBuf],
    ) -> anyhow::Result<()> {
        let tree = self.database().load_tree_list(Some(target))?;

        for path in paths {
            index.remove(path);
            for (entry_path, entry) in tree.range(path.clone()..) {
                if !entry_path.starts_with(path) {
                    break;
                }
                index.add_from_db(entry_path, entry);
            }
        }

        Ok(())
    }

    /// Replace the index with the tree of `target`.
    pub(crate) fn reset_index(&self, index: &mut Index, target: &ObjectId) -> anyhow::Result<()> {
        let tree = self.database().load_tree_list(Some(target))?;

        index.clear();
        for (path, entry) in &tree {
            index.add_from_db(path, entry);
        }

        Ok(())
    }

    /// Make the index and every tracked workspace file match `target`.
    /// Untracked files are left alone.
    pub(crate) fn reset_index_and_workspace(
        &self,
        index: &mut Index,
        target: &ObjectId,
    ) -> anyhow::Result<()> {
        let tree = self.database().load_tree_list(Some(target))?;
        let workspace = self.workspace();

        let tracked = index
            .entries()
            .map(|entry| entry.name.clone())
            .collect::<BTreeSet<_>>();
        for path in tracked.iter().filter(|path| !tree.contains_key(*path)) {
            debug!(path = %path.display(), "removing file absent from target");
            workspace.remove_file(path)?;
        }

        index.clear();
        for (path, entry) in &tree {
            let current = workspace.stat_file(path)?;
            let unchanged = match &current {
                Some(stat) if stat.mode == entry.mode => {
                    Blob::new(workspace.read_file(path)?).object_id()? == entry.oid
                }
                _ => false,
            };

            if !unchanged {
                let blob = self
                    .database()
                    .parse_object_as_blob(&entry.oid)?
                    .ok_or_else(|| anyhow::anyhow!("object {} is not a blob", entry.oid))?;
                workspace.write_file(path, blob.content(), entry.mode)?;
            }

            match workspace.stat_file(path)? {
                Some(stat) => index.add(IndexEntry::new(path.clone(), entry.oid.clone(), stat)),
                None => index.add_from_db(path, entry),
            }
        }

        Ok(())
    }
}
