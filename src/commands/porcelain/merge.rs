use crate::areas::refs::{HEAD, ORIG_HEAD};
use crate::areas::repository::Repository;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::log::path_filter::PathFilter;
use crate::artifacts::merge::inputs::{Inputs, MergeInputs};
use crate::artifacts::merge::pending_commit::PendingKind;
use crate::artifacts::merge::resolve::Resolve;
use std::io::Write;
use tracing::{debug, info};

const AUTOMATIC_MERGE_FAILED: &str =
    "Automatic merge failed; fix conflicts and then commit the result.";

impl Repository {
    /// Merge `revision` into HEAD.
    ///
    /// A revision already reachable from HEAD is a no-op, one that HEAD can
    /// move forward to is a fast-forward without a new commit, and anything
    /// else is a three-way merge against the best common ancestor. A merge
    /// that stops on conflicts leaves `MERGE_HEAD` and `MERGE_MSG` behind
    /// for `commit` or `merge --continue`.
    pub async fn merge(
        &mut self,
        revision: &str,
        message: Option<&str>,
        allow_unrelated: bool,
    ) -> anyhow::Result<()> {
        if self.pending_commit().is_in_progress(PendingKind::Merge) {
            anyhow::bail!(
                "You have not concluded your merge (MERGE_HEAD exists).\n\
                 Please, commit your changes before you merge."
            );
        }

        let inputs = Inputs::new(self, HEAD, revision, allow_unrelated)?;
        debug!(
            left = %inputs.left_oid(),
            right = %inputs.right_oid(),
            base = ?inputs.base_oid().map(ToString::to_string),
            "merge inputs"
        );

        if inputs.is_already_merged() {
            writeln!(self.writer(), "Already up to date.")?;
            return Ok(());
        }

        if inputs.is_fast_forward() {
            return self.fast_forward(&inputs).await;
        }

        self.refs().update_ref(ORIG_HEAD, inputs.left_oid())?;
        let pending = self.pending_commit();
        pending.start(inputs.right_oid(), PendingKind::Merge)?;
        let message = match message {
            Some(message) => format!("{}\n", message.trim()),
            None => format!("Merge branch '{}'\n", revision),
        };
        pending.write_message(&message)?;

        let has_conflicts = {
            let index = self.index();
            let mut index = index.lock().await;
            index.load_for_update()?;

            let mut resolve = Resolve::new(self, &inputs);
            resolve.execute(&mut index)?;
            index.write_updates()?;

            for line in resolve.messages() {
                writeln!(self.writer(), "{}", line)?;
            }
            resolve.conflicted_paths().next().is_some()
        };

        if has_conflicts {
            anyhow::bail!(AUTOMATIC_MERGE_FAILED);
        }

        self.conclude_merge(&message).await
    }

    /// Commit a merge whose conflicts have been resolved.
    pub async fn merge_continue(&mut self) -> anyhow::Result<()> {
        self.pending_commit().merge_oid(PendingKind::Merge)?;
        self.commit(None).await
    }

    /// Drop the pending merge and restore HEAD's tree.
    pub async fn merge_abort(&mut self) -> anyhow::Result<()> {
        self.pending_commit().clear(PendingKind::Merge)?;

        let target = match self.refs().read_ref(ORIG_HEAD)? {
            Some(oid) => oid,
            None => self
                .refs()
                .read_head()?
                .ok_or_else(|| anyhow::anyhow!("Not a valid object name: 'HEAD'."))?,
        };

        let index = self.index();
        let mut index = index.lock().await;
        index.load_for_update()?;
        self.reset_index_and_workspace(&mut index, &target)?;
        index.write_updates()?;
        self.refs().update_head(&target)?;
        info!(head = %target, "merge aborted");

        Ok(())
    }

    async fn fast_forward(&mut self, inputs: &Inputs) -> anyhow::Result<()> {
        let left = inputs.left_oid();
        let right = inputs.right_oid();

        writeln!(
            self.writer(),
            "Updating {}..{}",
            left.to_short_oid(),
            right.to_short_oid()
        )?;
        writeln!(self.writer(), "Fast-forward")?;

        {
            let index = self.index();
            let mut index = index.lock().await;
            index.load_for_update()?;

            let tree_diff = self
                .database()
                .tree_diff(Some(left), Some(right), &PathFilter::empty())?;
            Migration::new(self, &mut index, tree_diff.into_changes()).apply_changes()?;
            index.write_updates()?;
        }

        self.refs().update_ref(ORIG_HEAD, left)?;
        self.refs().update_head(right)
    }

    async fn conclude_merge(&mut self, message: &str) -> anyhow::Result<()> {
        let pending = self.pending_commit();
        let head = self
            .refs()
            .read_head()?
            .ok_or_else(|| anyhow::anyhow!("Not a valid object name: 'HEAD'."))?;
        let theirs = pending.merge_oid(PendingKind::Merge)?;

        let tree_id = {
            let index = self.index();
            let index = index.lock().await;
            self.write_tree(&index)?
        };
        let author = self.current_author()?;
        let (commit_id, commit) =
            self.write_commit(vec![head, theirs], tree_id, author, message.to_string())?;
        pending.clear(PendingKind::Merge)?;

        writeln!(self.writer(), "Merge made by the 'recursive' strategy.")?;
        self.print_commit(&commit_id, &commit)
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::Repository;
    use crate::areas::repository::fixtures::{capturing_repository, write};
    use crate::artifacts::merge::pending_commit::PendingKind;
    use crate::errors::RepoError;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    async fn commit_file(repository: &mut Repository, root: &Path, path: &str, content: &str, message: &str) {
        write(root, path, content);
        repository.add(&[path.into()]).await.unwrap();
        repository.commit(Some(message)).await.unwrap();
    }

    #[tokio::test]
    async fn merged_revision_is_up_to_date() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "a", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        commit_file(&mut repository, dir.path(), "a.txt", "b", "ahead").await;
        capture.take();

        repository.merge("topic", None, false).await.unwrap();

        assert_eq!(capture.take(), "Already up to date.\n");
    }

    #[tokio::test]
    async fn fast_forward_moves_head_without_a_commit() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "a", "base").await;
        let base = repository.refs().read_head().unwrap().unwrap();
        repository.branch_create("topic", None).await.unwrap();
        repository.checkout("topic", false).await.unwrap();
        commit_file(&mut repository, dir.path(), "b.txt", "b", "topic").await;
        let topic = repository.refs().read_head().unwrap().unwrap();
        repository.checkout("master", false).await.unwrap();
        capture.take();

        repository.merge("topic", None, false).await.unwrap();

        let output = capture.take();
        assert!(output.ends_with("Fast-forward\n"));
        assert_eq!(repository.refs().read_head().unwrap(), Some(topic));
        assert_ne!(repository.refs().read_head().unwrap(), Some(base));
        assert_eq!(std::fs::read_to_string(dir.path().join("b.txt")).unwrap(), "b");
    }

    #[tokio::test]
    async fn clean_three_way_merge_commits_both_parents() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "a", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        commit_file(&mut repository, dir.path(), "ours.txt", "ours", "ours").await;
        let ours = repository.refs().read_head().unwrap().unwrap();
        repository.checkout("topic", false).await.unwrap();
        commit_file(&mut repository, dir.path(), "theirs.txt", "theirs", "theirs").await;
        let theirs = repository.refs().read_head().unwrap().unwrap();
        repository.checkout("master", false).await.unwrap();
        capture.take();

        repository.merge("topic", None, false).await.unwrap();

        let head = repository.refs().read_head().unwrap().unwrap();
        let commit = repository.database().load_commit(&head).unwrap();
        assert_eq!(commit.parents(), &[ours, theirs]);
        assert_eq!(commit.message(), "Merge branch 'topic'\n");
        assert!(dir.path().join("theirs.txt").exists());
        assert!(!repository.pending_commit().is_in_progress(PendingKind::Merge));
    }

    #[tokio::test]
    async fn conflicts_stop_until_resolved() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "f.txt", "base\n", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        commit_file(&mut repository, dir.path(), "f.txt", "ours\n", "ours").await;
        repository.checkout("topic", false).await.unwrap();
        commit_file(&mut repository, dir.path(), "f.txt", "theirs\n", "theirs").await;
        repository.checkout("master", false).await.unwrap();
        capture.take();

        let error = repository.merge("topic", None, false).await.unwrap_err();
        assert!(error.to_string().starts_with("Automatic merge failed"));
        assert!(capture.take().contains("CONFLICT (content): Merge conflict in f.txt"));
        assert_eq!(
            std::fs::read_to_string(dir.path().join("f.txt")).unwrap(),
            "<<<<<<< HEAD\nours\n=======\ntheirs\n>>>>>>> topic\n"
        );

        let error = repository.merge_continue().await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RepoError>(),
            Some(RepoError::UnresolvedConflicts)
        ));

        write(dir.path(), "f.txt", "both\n");
        repository.add(&["f.txt".into()]).await.unwrap();
        repository.merge_continue().await.unwrap();

        let head = repository.refs().read_head().unwrap().unwrap();
        assert!(repository.database().load_commit(&head).unwrap().is_merge());
    }

    #[tokio::test]
    async fn abort_restores_head_tree() {
        let dir = TempDir::new().unwrap();
        let (mut repository, _capture) = capturing_repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "f.txt", "base\n", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        commit_file(&mut repository, dir.path(), "f.txt", "ours\n", "ours").await;
        repository.checkout("topic", false).await.unwrap();
        commit_file(&mut repository, dir.path(), "f.txt", "theirs\n", "theirs").await;
        repository.checkout("master", false).await.unwrap();
        let _ = repository.merge("topic", None, false).await;

        repository.merge_abort().await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("f.txt")).unwrap(), "ours\n");
        assert!(repository.pending_commit().in_progress().is_none());
    }
}
