use crate::areas::refs::HEAD;
use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::merge::inputs::CherryPick;
use crate::artifacts::merge::pending_commit::PendingKind;
use crate::artifacts::merge::resolve::Resolve;
use crate::artifacts::merge::sequencer::{Sequencer, SequencerAction, SequencerOptions};
use crate::artifacts::objects::commit::{Author, Commit};
use crate::artifacts::objects::object_id::ObjectId;
use std::io::Write;
use tracing::{debug, info, warn};

const CONFLICT_HINT: &str = "hint: after resolving the conflicts, mark the corrected paths\n\
     hint: with 'graft add <paths>' or 'graft rm <paths>'\n\
     hint: and commit the result with 'graft commit'";

impl Repository {
    /// Apply the changes introduced by each of `revisions` on top of HEAD,
    /// oldest first, committing each with its original author and message.
    pub async fn cherry_pick(
        &mut self,
        revisions: &[String],
        mainline: Option<usize>,
    ) -> anyhow::Result<()> {
        self.start_sequence(SequencerAction::Pick, revisions, mainline).await
    }

    /// Commit the inverse of each of `revisions`, newest first.
    pub async fn revert(&mut self, revisions: &[String], mainline: Option<usize>) -> anyhow::Result<()> {
        self.start_sequence(SequencerAction::Revert, revisions, mainline).await
    }

    /// Commit the resolved conflicts of the stopped command, then carry on
    /// with the rest of the queue.
    pub async fn sequencer_continue(&mut self) -> anyhow::Result<()> {
        let mut sequencer = Sequencer::new(self.git_path());
        sequencer.load()?;

        let head = self.refs().read_head()?;
        if let Some(kind) = self.pending_commit().in_progress() {
            if kind == PendingKind::Merge {
                anyhow::bail!("You have not concluded your merge (MERGE_HEAD exists).");
            }
            self.commit(None).await?;
            sequencer.drop_command(&self.head_oid()?)?;
        } else if !sequencer.is_abort_safe(head.as_ref())? {
            // committed by hand after resolving
            sequencer.drop_command(&self.head_oid()?)?;
        }

        self.resume_sequence(&mut sequencer).await
    }

    /// Return to where HEAD was before the run started.
    pub async fn sequencer_abort(&mut self) -> anyhow::Result<()> {
        let mut sequencer = Sequencer::new(self.git_path());
        sequencer.load()?;
        self.clear_pick_state()?;

        let head = self.refs().read_head()?;
        if !sequencer.is_abort_safe(head.as_ref())? {
            sequencer.quit()?;
            anyhow::bail!("You seem to have moved HEAD. Not rewinding, check your HEAD!");
        }

        let target = sequencer.original_head()?;
        {
            let index = self.index();
            let mut index = index.lock().await;
            index.load_for_update()?;
            self.reset_index_and_workspace(&mut index, &target)?;
            index.write_updates()?;
        }
        self.refs().update_head(&target)?;
        info!(head = %target, "sequence aborted");

        sequencer.quit()
    }

    /// Forget the run, keeping the commits made so far.
    pub async fn sequencer_quit(&mut self) -> anyhow::Result<()> {
        let mut sequencer = Sequencer::new(self.git_path());
        if !sequencer.is_active() {
            anyhow::bail!("no cherry-pick or revert in progress");
        }
        self.clear_pick_state()?;

        sequencer.quit()
    }

    async fn start_sequence(
        &mut self,
        action: SequencerAction,
        revisions: &[String],
        mainline: Option<usize>,
    ) -> anyhow::Result<()> {
        if let Some(kind) = self.pending_commit().in_progress() {
            anyhow::bail!(
                "a {} is already in progress\nhint: conclude it before starting another one",
                kind.name()
            );
        }

        let head = self.head_oid()?;
        let commits = self.sequence_commits(action, revisions)?;
        if commits.is_empty() {
            anyhow::bail!("empty commit set passed");
        }
        for (oid, commit) in &commits {
            select_parent(oid, commit, mainline)?;
        }

        let mut sequencer = Sequencer::new(self.git_path());
        sequencer.start(&head, SequencerOptions { mainline })?;
        for (oid, commit) in &commits {
            sequencer.push(action, oid.clone(), commit);
        }
        sequencer.dump()?;
        debug!(commands = commits.len(), "sequence started");

        self.resume_sequence(&mut sequencer).await
    }

    /// Plain revisions name single commits; a range or a `^` exclusion walks
    /// the history like `log` does.
    fn sequence_commits(
        &self,
        action: SequencerAction,
        revisions: &[String],
    ) -> anyhow::Result<Vec<(ObjectId, Commit)>> {
        let walks = revisions
            .iter()
            .any(|revision| revision.contains("..") || revision.starts_with('^'));

        if !walks {
            return revisions
                .iter()
                .map(|revision| {
                    let oid = Revision::try_parse(revision)?.resolve(self)?;
                    let commit = self.database().load_commit(&oid)?;
                    Ok((oid, commit))
                })
                .collect();
        }

        let mut commits = RevList::new(self, revisions, &[])?.commits()?;
        if action == SequencerAction::Pick {
            commits.reverse();
        }

        Ok(commits)
    }

    async fn resume_sequence(&mut self, sequencer: &mut Sequencer) -> anyhow::Result<()> {
        let mainline = sequencer.options().mainline;

        while let Some(command) = sequencer.next_command().cloned() {
            match command.action {
                SequencerAction::Pick => self.pick_commit(&command.oid, mainline).await?,
                SequencerAction::Revert => self.revert_commit(&command.oid, mainline).await?,
            }
            sequencer.drop_command(&self.head_oid()?)?;
        }

        sequencer.quit()
    }

    async fn pick_commit(&mut self, oid: &ObjectId, mainline: Option<usize>) -> anyhow::Result<()> {
        let commit = self.database().load_commit(oid)?;
        let base = select_parent(oid, &commit, mainline)?;

        let inputs = CherryPick::new(
            HEAD.to_string(),
            format!("{}... {}", oid.to_short_oid(), commit.short_message()),
            self.head_oid()?,
            oid.clone(),
            base,
        );

        self.apply_picked_change(
            &inputs,
            PendingKind::CherryPick,
            oid,
            commit.message().to_string(),
            commit.author().clone(),
        )
        .await
    }

    async fn revert_commit(&mut self, oid: &ObjectId, mainline: Option<usize>) -> anyhow::Result<()> {
        let commit = self.database().load_commit(oid)?;
        let parent = select_parent(oid, &commit, mainline)?
            .ok_or_else(|| anyhow::anyhow!("cannot revert root commit {}", oid.to_short_oid()))?;

        let title = commit.short_message();
        let inputs = CherryPick::new(
            HEAD.to_string(),
            format!("parent of {}... {}", oid.to_short_oid(), title),
            self.head_oid()?,
            parent,
            Some(oid.clone()),
        );
        let message = format!("Revert \"{}\"\n\nThis reverts commit {}.\n", title, oid);
        let author = self.current_author()?;

        self.apply_picked_change(&inputs, PendingKind::Revert, oid, message, author)
            .await
    }

    async fn apply_picked_change(
        &mut self,
        inputs: &CherryPick,
        kind: PendingKind,
        oid: &ObjectId,
        message: String,
        author: Author,
    ) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;
        index.load_for_update()?;

        let mut resolve = Resolve::new(self, inputs);
        resolve.execute(&mut index)?;
        index.write_updates()?;
        for line in resolve.messages() {
            writeln!(self.writer(), "{}", line)?;
        }

        if resolve.conflicted_paths().next().is_some() {
            let pending = self.pending_commit();
            pending.start(oid, kind)?;
            pending.write_message(&message)?;

            let verb = match kind {
                PendingKind::Revert => "revert",
                _ => "apply",
            };
            let title = self.database().load_commit(oid)?.short_message();
            warn!(oid = %oid, "stopped on conflicts");
            anyhow::bail!(
                "could not {} {}... {}\n{}",
                verb,
                oid.to_short_oid(),
                title,
                CONFLICT_HINT
            );
        }

        let tree_id = self.write_tree(&index)?;
        let (commit_id, commit) = self.write_commit(vec![self.head_oid()?], tree_id, author, message)?;
        self.print_commit(&commit_id, &commit)
    }

    fn clear_pick_state(&self) -> anyhow::Result<()> {
        let pending = self.pending_commit();
        for kind in [PendingKind::CherryPick, PendingKind::Revert] {
            if pending.is_in_progress(kind) {
                pending.clear(kind)?;
            }
        }

        Ok(())
    }

    fn head_oid(&self) -> anyhow::Result<ObjectId> {
        self.refs()
            .read_head()?
            .ok_or_else(|| anyhow::anyhow!("Not a valid object name: 'HEAD'."))
    }
}

/// The parent whose diff to the commit is replayed. A merge needs
/// `mainline` (1-based) to pick one; anything else must not be given one.
fn select_parent(
    oid: &ObjectId,
    commit: &Commit,
    mainline: Option<usize>,
) -> anyhow::Result<Option<ObjectId>> {
    match (commit.is_merge(), mainline) {
        (true, None) => anyhow::bail!(
            "commit {} is a merge but no -m option was given.",
            oid
        ),
        (true, Some(number)) => number
            .checked_sub(1)
            .and_then(|i| commit.parents().get(i))
            .cloned()
            .map(Some)
            .ok_or_else(|| anyhow::anyhow!("commit {} does not have parent {}", oid, number)),
        (false, Some(_)) => anyhow::bail!(
            "mainline was specified but commit {} is not a merge.",
            oid
        ),
        (false, None) => Ok(commit.parent().cloned()),
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::Repository;
    use crate::areas::repository::fixtures::{repository, write};
    use crate::artifacts::objects::commit::Author;
    use crate::artifacts::objects::object_id::ObjectId;
    use crate::errors::RepoError;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use tempfile::TempDir;

    async fn commit_file(
        repository: &mut Repository,
        root: &Path,
        path: &str,
        content: &str,
        message: &str,
    ) -> ObjectId {
        write(root, path, content);
        repository.add(&[path.into()]).await.unwrap();
        repository.commit(Some(message)).await.unwrap();
        repository.refs().read_head().unwrap().unwrap()
    }

    fn read(root: &Path, path: &str) -> String {
        std::fs::read_to_string(root.join(path)).unwrap()
    }

    #[tokio::test]
    async fn pick_keeps_author_and_message() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "a\n", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        repository.checkout("topic", false).await.unwrap();

        write(dir.path(), "b.txt", "b\n");
        repository.add(&["b.txt".into()]).await.unwrap();
        let picked = {
            let index = repository.index();
            let index = index.lock().await;
            let tree_id = repository.write_tree(&index).unwrap();
            let parent = repository.refs().read_head().unwrap().unwrap();
            let author = Author::new("Other".into(), "other@example.com".into());
            repository
                .write_commit(vec![parent], tree_id, author, "add b\n".into())
                .unwrap()
                .0
        };
        repository.checkout("master", false).await.unwrap();
        commit_file(&mut repository, dir.path(), "c.txt", "c\n", "add c").await;

        repository.cherry_pick(&[picked.to_string()], None).await.unwrap();

        let head = repository.refs().read_head().unwrap().unwrap();
        let commit = repository.database().load_commit(&head).unwrap();
        assert_eq!(commit.message(), "add b\n");
        assert_eq!(commit.author().name(), "Other");
        assert_eq!(read(dir.path(), "b.txt"), "b\n");
        assert!(dir.path().join("c.txt").exists());
        assert!(!dir.path().join(".git/sequencer").exists());
    }

    #[tokio::test]
    async fn revert_commits_the_inverse() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "one\n", "first").await;
        let second = commit_file(&mut repository, dir.path(), "a.txt", "two\n", "second").await;

        repository.revert(&["HEAD".into()], None).await.unwrap();

        let head = repository.refs().read_head().unwrap().unwrap();
        let commit = repository.database().load_commit(&head).unwrap();
        assert_eq!(
            commit.message(),
            format!("Revert \"second\"\n\nThis reverts commit {}.\n", second)
        );
        assert_eq!(commit.parents(), &[second]);
        assert_eq!(read(dir.path(), "a.txt"), "one\n");
    }

    #[tokio::test]
    async fn range_picks_oldest_first() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "a\n", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        repository.checkout("topic", false).await.unwrap();
        commit_file(&mut repository, dir.path(), "b.txt", "b\n", "add b").await;
        commit_file(&mut repository, dir.path(), "b.txt", "bb\n", "grow b").await;
        repository.checkout("master", false).await.unwrap();

        repository.cherry_pick(&["master..topic".into()], None).await.unwrap();

        let head = repository.refs().read_head().unwrap().unwrap();
        let commit = repository.database().load_commit(&head).unwrap();
        assert_eq!(commit.short_message(), "grow b");
        let parent = repository.database().load_commit(commit.parent().unwrap()).unwrap();
        assert_eq!(parent.short_message(), "add b");
        assert_eq!(read(dir.path(), "b.txt"), "bb\n");
    }

    #[tokio::test]
    async fn conflicts_stop_the_sequence_until_continued() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "f.txt", "base\n", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        commit_file(&mut repository, dir.path(), "f.txt", "ours\n", "ours").await;
        repository.checkout("topic", false).await.unwrap();
        let theirs = commit_file(&mut repository, dir.path(), "f.txt", "theirs\n", "theirs").await;
        commit_file(&mut repository, dir.path(), "g.txt", "g\n", "add g").await;
        repository.checkout("master", false).await.unwrap();

        let error = repository
            .cherry_pick(&["master..topic".into()], None)
            .await
            .unwrap_err();
        assert!(error.to_string().starts_with(&format!("could not apply {}", theirs.to_short_oid())));
        assert!(dir.path().join(".git/CHERRY_PICK_HEAD").exists());
        assert!(!dir.path().join("g.txt").exists());

        let error = repository.sequencer_continue().await.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<RepoError>(),
            Some(RepoError::UnresolvedConflicts)
        ));

        write(dir.path(), "f.txt", "resolved\n");
        repository.add(&["f.txt".into()]).await.unwrap();
        repository.sequencer_continue().await.unwrap();

        assert_eq!(read(dir.path(), "g.txt"), "g\n");
        assert!(!dir.path().join(".git/sequencer").exists());
        let head = repository.refs().read_head().unwrap().unwrap();
        let commit = repository.database().load_commit(&head).unwrap();
        let resolved = repository.database().load_commit(commit.parent().unwrap()).unwrap();
        assert_eq!(resolved.short_message(), "theirs");
    }

    #[tokio::test]
    async fn abort_rewinds_to_the_original_head() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "f.txt", "base\n", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        let ours = commit_file(&mut repository, dir.path(), "f.txt", "ours\n", "ours").await;
        repository.checkout("topic", false).await.unwrap();
        commit_file(&mut repository, dir.path(), "f.txt", "theirs\n", "theirs").await;
        repository.checkout("master", false).await.unwrap();
        assert!(repository.cherry_pick(&["topic".into()], None).await.is_err());

        repository.sequencer_abort().await.unwrap();

        assert_eq!(repository.refs().read_head().unwrap(), Some(ours));
        assert_eq!(read(dir.path(), "f.txt"), "ours\n");
        assert!(repository.pending_commit().in_progress().is_none());
    }

    #[tokio::test]
    async fn merges_need_a_mainline() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        commit_file(&mut repository, dir.path(), "a.txt", "a\n", "base").await;
        repository.branch_create("topic", None).await.unwrap();
        commit_file(&mut repository, dir.path(), "ours.txt", "o\n", "ours").await;
        repository.checkout("topic", false).await.unwrap();
        commit_file(&mut repository, dir.path(), "theirs.txt", "t\n", "theirs").await;
        repository.checkout("master", false).await.unwrap();
        repository.merge("topic", None, false).await.unwrap();
        let merge = repository.refs().read_head().unwrap().unwrap();

        let error = repository.revert(&[merge.to_string()], None).await.unwrap_err();
        assert!(error.to_string().contains("is a merge but no -m option was given"));

        assert!(!dir.path().join(".git/sequencer").exists());
        repository.revert(&[merge.to_string()], Some(1)).await.unwrap();
        assert!(!dir.path().join("theirs.txt").exists());
        assert!(dir.path().join("ours.txt").exists());
    }
}
