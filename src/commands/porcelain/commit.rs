use crate::areas::repository::Repository;
use crate::artifacts::merge::pending_commit::PendingKind;
use crate::errors::RepoError;
use tracing::info;

impl Repository {
    /// Snapshot the index as a new commit on top of HEAD.
    ///
    /// While a merge is pending the commit gets `MERGE_HEAD` as a second
    /// parent and `MERGE_MSG` as its default message. A pending cherry-pick
    /// or revert is concluded by the commit; a cherry-pick keeps the author
    /// of the picked commit.
    pub async fn commit(&mut self, message: Option<&str>) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.load_for_update()?;
        if index.has_conflict() {
            index.release();
            anyhow::bail!(RepoError::UnresolvedConflicts);
        }

        let pending = self.pending_commit();
        let pending_kind = pending.in_progress();

        let mut parents = self.refs().read_head()?.into_iter().collect::<Vec<_>>();
        if pending_kind == Some(PendingKind::Merge) {
            parents.push(pending.merge_oid(PendingKind::Merge)?);
        }

        let message = match message {
            Some(message) => message.to_string(),
            None if pending_kind.is_some() => pending.merge_message()?,
            None => String::new(),
        };
        let message = message.trim();
        if message.is_empty() {
            index.release();
            anyhow::bail!("Aborting commit due to empty commit message.");
        }

        let tree_id = self.write_tree(&index)?;
        let author = match pending_kind {
            Some(PendingKind::CherryPick) => {
                let picked = pending.merge_oid(PendingKind::CherryPick)?;
                self.database().load_commit(&picked)?.author().clone()
            }
            _ => self.current_author()?,
        };
        let (commit_id, commit) =
            self.write_commit(parents, tree_id, author, format!("{}\n", message))?;
        index.release();

        if let Some(kind) = pending_kind {
            info!(kind = kind.name(), "concluded pending commit");
            pending.clear(kind)?;
        }

        self.print_commit(&commit_id, &commit)
    }
}
