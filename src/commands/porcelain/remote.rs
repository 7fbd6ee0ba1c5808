use crate::areas::refs::REMOTES_DIR;
use crate::areas::repository::Repository;
use anyhow::Context;
use std::io::Write;
use tracing::debug;

pub const DEFAULT_REMOTE: &str = "origin";

impl Repository {
    pub async fn remote_add(&mut self, name: &str, url: &str) -> anyhow::Result<()> {
        let mut config = self.config_mut();
        config.add_remote(name, url)?;
        config.save()
    }

    /// Forget `name` along with its remote-tracking refs.
    pub async fn remote_remove(&mut self, name: &str) -> anyhow::Result<()> {
        {
            let mut config = self.config_mut();
            config.remove_remote(name)?;
            config.save()?;
        }

        let tracking = self.git_path().join(REMOTES_DIR).join(name);
        if tracking.is_dir() {
            std::fs::remove_dir_all(&tracking)
                .with_context(|| format!("Unable to remove {}", tracking.display()))?;
            debug!(path = %tracking.display(), "removed remote-tracking refs");
        }

        Ok(())
    }

    pub async fn remote_list(&mut self, verbose: bool) -> anyhow::Result<()> {
        let remotes = self
            .config()
            .remotes()
            .map(|(name, section)| (name.clone(), section.url.clone()))
            .collect::<Vec<_>>();

        for (name, url) in remotes {
            if verbose {
                writeln!(self.writer(), "{}\t{} (fetch)", name, url)?;
                writeln!(self.writer(), "{}\t{} (push)", name, url)?;
            } else {
                writeln!(self.writer(), "{}", name)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::fixtures::capturing_repository;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn add_list_and_remove() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;

        repository.remote_add("origin", "../upstream").await.unwrap();
        assert!(repository.remote_add("origin", "elsewhere").await.is_err());
        repository.remote_list(true).await.unwrap();
        assert_eq!(
            capture.take(),
            "origin\t../upstream (fetch)\norigin\t../upstream (push)\n"
        );

        std::fs::create_dir_all(dir.path().join(".git/refs/remotes/origin")).unwrap();
        repository.remote_remove("origin").await.unwrap();
        repository.remote_list(false).await.unwrap();

        assert_eq!(capture.take(), "");
        assert!(!dir.path().join(".git/refs/remotes/origin").exists());
        assert!(repository.remote_remove("origin").await.is_err());
    }
}
