use crate::areas::refs::ORIG_HEAD;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::SymRefName;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::checkout::migration::Migration;
use crate::artifacts::log::path_filter::PathFilter;
use crate::artifacts::objects::object_id::ObjectId;
use tracing::debug;

const DETACHMENT_NOTICE: &str = r#"
You are in 'detached HEAD' state. You can look around, make experimental
changes and commit them, and you can discard any commits you make in this
state without impacting any branches by performing another checkout.

If you want to create a new branch to retain commits you create, you may
do so (now or later) by using the branch command. Example:

    graft branch <new-branch-name>
"#;

impl Repository {
    /// Switch to a branch, or detach HEAD at any other revision.
    ///
    /// Local changes that would be overwritten abort the checkout unless
    /// `force` is set, in which case every tracked file is reset to the
    /// target.
    pub async fn checkout(&mut self, target: &str, force: bool) -> anyhow::Result<()> {
        let current_ref = self.refs().current_ref(None)?;
        let current_oid = self.refs().read_head()?;

        let target_oid = Revision::try_parse(target)?.resolve(self)?;

        {
            let index = self.index();
            let mut index = index.lock().await;
            index.load_for_update()?;

            if force {
                self.reset_index_and_workspace(&mut index, &target_oid)?;
            } else {
                let tree_diff = self.database().tree_diff(
                    current_oid.as_ref(),
                    Some(&target_oid),
                    &PathFilter::empty(),
                )?;
                Migration::new(self, &mut index, tree_diff.into_changes()).apply_changes()?;
            }

            index.write_updates()?;
        }

        if let Some(current_oid) = &current_oid {
            self.refs().update_ref(ORIG_HEAD, current_oid)?;
        }
        self.refs().set_head(target, &target_oid)?;
        let new_ref = self.refs().current_ref(None)?;
        debug!(from = %current_ref, to = %new_ref, "checked out");

        if let Some(current_oid) = &current_oid {
            self.print_previous_head(&current_ref, current_oid, &target_oid)?;
        }
        self.print_detachment_notice(&current_ref, &new_ref, target);
        self.print_new_head(&current_ref, &new_ref, &target_oid, target)?;

        Ok(())
    }

    fn print_previous_head(
        &self,
        current_ref: &SymRefName,
        current_oid: &ObjectId,
        target_oid: &ObjectId,
    ) -> anyhow::Result<()> {
        if current_ref.is_detached_head() && current_oid != target_oid {
            self.print_head_position("Previous HEAD position was", current_oid)?;
        }

        Ok(())
    }

    fn print_detachment_notice(&self, current_ref: &SymRefName, new_ref: &SymRefName, target: &str) {
        if !current_ref.is_detached_head() && new_ref.is_detached_head() {
            eprintln!("Note: checking out '{}'.\n{}", target, DETACHMENT_NOTICE);
        }
    }

    fn print_new_head(
        &self,
        current_ref: &SymRefName,
        new_ref: &SymRefName,
        target_oid: &ObjectId,
        target: &str,
    ) -> anyhow::Result<()> {
        if new_ref.is_detached_head() {
            self.print_head_position("HEAD is now at", target_oid)?;
        } else if new_ref == current_ref {
            eprintln!("Already on '{}'", target);
        } else {
            eprintln!("Switched to branch '{}'", target);
        }

        Ok(())
    }

    fn print_head_position(&self, message: &str, oid: &ObjectId) -> anyhow::Result<()> {
        let commit = self.database().load_commit(oid)?;

        eprintln!("{} {} {}", message, oid.to_short_oid(), commit.short_message());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::fixtures::{repository, write};
    use crate::errors::RepoError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn switches_branches_and_files() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "one");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("first")).await.unwrap();
        repository.branch_create("topic", None).await.unwrap();

        write(dir.path(), "a.txt", "two");
        write(dir.path(), "dir/b.txt", "bee");
        repository.add(&[".".into()]).await.unwrap();
        repository.commit(Some("second")).await.unwrap();

        repository.checkout("topic", false).await.unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one");
        assert!(!dir.path().join("dir").exists());
        let current = repository.refs().current_ref(None).unwrap();
        assert_eq!(current.as_ref_path(), "refs/heads/topic");
    }

    #[tokio::test]
    async fn local_changes_block_checkout_unless_forced() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "one");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("first")).await.unwrap();
        repository.branch_create("topic", None).await.unwrap();
        write(dir.path(), "a.txt", "two");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("second")).await.unwrap();
        write(dir.path(), "a.txt", "local edit");

        let error = repository.checkout("topic", false).await.unwrap_err();
        let Some(RepoError::WouldOverwriteChanges(message)) = error.downcast_ref::<RepoError>() else {
            panic!("unexpected error: {error}");
        };
        assert!(message.contains("\ta.txt"));
        assert!(message.ends_with("Aborting"));
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "local edit");

        repository.checkout("topic", true).await.unwrap();
        assert_eq!(std::fs::read_to_string(dir.path().join("a.txt")).unwrap(), "one");
    }

    #[tokio::test]
    async fn revisions_detach_head() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "one");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("first")).await.unwrap();
        let first = repository.refs().read_head().unwrap().unwrap();
        write(dir.path(), "a.txt", "two");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("second")).await.unwrap();

        repository.checkout("HEAD^", false).await.unwrap();

        assert!(repository.refs().current_ref(None).unwrap().is_detached_head());
        assert_eq!(repository.refs().read_head().unwrap(), Some(first));
    }
}
