use crate::areas::repository::Repository;
use crate::errors::RepoError;
use std::io::Write;

impl Repository {
    pub async fn config_get(&mut self, key: &str) -> anyhow::Result<()> {
        let value = self
            .config()
            .get(key)
            .ok_or_else(|| RepoError::NotFound(format!("key '{}' is not set", key)))?;

        writeln!(self.writer(), "{}", value)?;
        Ok(())
    }

    pub async fn config_set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut config = self.config_mut();
        config.set(key, value)?;
        config.save()
    }

    pub async fn config_unset(&mut self, key: &str) -> anyhow::Result<()> {
        let mut config = self.config_mut();
        if !config.unset(key)? {
            anyhow::bail!(RepoError::NotFound(format!("key '{}' is not set", key)));
        }
        config.save()
    }

    /// `key=value` for every key that is set.
    pub async fn config_list(&mut self) -> anyhow::Result<()> {
        let entries = self.config().entries();
        for (key, value) in entries {
            writeln!(self.writer(), "{}={}", key, value)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::fixtures::capturing_repository;
    use crate::errors::RepoError;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn set_get_and_unset() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;

        repository.config_set("transfer.unpack_limit", "7").await.unwrap();
        repository.config_get("transfer.unpack_limit").await.unwrap();
        assert_eq!(capture.take(), "7\n");
        assert_eq!(repository.config().unpack_limit(), 7);

        repository.config_unset("transfer.unpack_limit").await.unwrap();
        let error = repository.config_get("transfer.unpack_limit").await.unwrap_err();
        assert!(matches!(error.downcast_ref::<RepoError>(), Some(RepoError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_shows_every_key() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        capture.take();

        repository.config_list().await.unwrap();

        assert_eq!(
            capture.take(),
            "user.name=A U Thor\nuser.email=author@example.com\n"
        );
    }
}
