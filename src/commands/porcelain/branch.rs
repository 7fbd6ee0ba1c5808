use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::BranchName;
use crate::artifacts::branch::revision::Revision;
use colored::Colorize;
use std::io::Write;

impl Repository {
    /// Create `name` at `start_point`, or at HEAD.
    pub async fn branch_create(&mut self, name: &str, start_point: Option<&str>) -> anyhow::Result<()> {
        let branch_name = BranchName::try_parse(name.to_string())?;

        let source_oid = match start_point {
            Some(revision) => Revision::try_parse(revision)?.resolve(self)?,
            None => self
                .refs()
                .read_head()?
                .ok_or_else(|| anyhow::anyhow!("Not a valid object name: 'HEAD'."))?,
        };

        self.refs().create_branch(&branch_name, &source_oid)
    }

    /// Local branches, the current one starred; with `verbose` each line
    /// also shows the tip's short id and title.
    pub async fn branch_list(&mut self, verbose: bool) -> anyhow::Result<()> {
        let current_ref = self.refs().current_ref(None)?;
        let branches = self.refs().list_branches()?;

        let width = branches
            .iter()
            .map(|branch| self.refs().short_name(branch).len())
            .max()
            .unwrap_or_default();

        for branch in branches {
            let name = self.refs().short_name(&branch);
            let line = if branch == current_ref {
                format!("* {}", format!("{:<width$}", name).green())
            } else {
                format!("  {:<width$}", name)
            };

            if verbose {
                let Some(oid) = self.refs().read_ref(branch.as_ref_path())? else {
                    continue;
                };
                let commit = self.database().load_commit(&oid)?;
                writeln!(
                    self.writer(),
                    "{} {} {}",
                    line,
                    oid.to_short_oid(),
                    commit.short_message()
                )?;
            } else {
                writeln!(self.writer(), "{}", line.trim_end())?;
            }
        }

        Ok(())
    }

    /// Delete branches. Without `force`, a branch whose tip is not reachable
    /// from HEAD is kept.
    pub async fn branch_delete(&mut self, names: &[String], force: bool) -> anyhow::Result<()> {
        for name in names {
            let branch_name = BranchName::try_parse(name.clone())?;

            if self.refs().is_current_branch(&branch_name)? {
                anyhow::bail!("Cannot delete branch '{}' checked out", branch_name);
            }

            if !force {
                let tip = self.refs().read_ref(branch_name.to_sym_ref_name().as_ref_path())?;
                let head = self.refs().read_head()?;
                if let (Some(tip), Some(head)) = (tip, head)
                    && !self.database().graph().is_ancestor(&tip, &head)?
                {
                    anyhow::bail!(
                        "The branch '{}' is not fully merged.\n\
                         If you are sure you want to delete it, run 'graft branch -D {}'.",
                        branch_name,
                        branch_name
                    );
                }
            }

            let oid = self.refs().delete_branch(&branch_name)?;
            writeln!(
                self.writer(),
                "Deleted branch {} (was {}).",
                branch_name,
                oid.to_short_oid()
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::fixtures::{capturing_repository, write};
    use crate::errors::RepoError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn create_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        write(dir.path(), "a.txt", "a");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("initial")).await.unwrap();
        let head = repository.refs().read_head().unwrap().unwrap();

        repository.branch_create("topic", None).await.unwrap();
        repository.branch_create("older", Some("@")).await.unwrap();
        assert!(repository.branch_create("topic", None).await.is_err());
        capture.take();

        repository.branch_list(false).await.unwrap();
        assert_eq!(capture.take(), "* master\n  older\n  topic\n");

        repository.branch_delete(&["topic".into()], false).await.unwrap();
        assert_eq!(
            capture.take(),
            format!("Deleted branch topic (was {}).\n", head.to_short_oid())
        );
    }

    #[tokio::test]
    async fn deleting_a_missing_branch_fails() {
        let dir = TempDir::new().unwrap();
        let (mut repository, _capture) = capturing_repository(dir.path()).await;

        let error = repository.branch_delete(&["nope".into()], true).await.unwrap_err();

        assert!(matches!(error.downcast_ref::<RepoError>(), Some(RepoError::NotFound(_))));
    }

    #[tokio::test]
    async fn invalid_names_are_rejected() {
        let dir = TempDir::new().unwrap();
        let (mut repository, _capture) = capturing_repository(dir.path()).await;

        assert!(repository.branch_create("bad..name", None).await.is_err());
    }
}
