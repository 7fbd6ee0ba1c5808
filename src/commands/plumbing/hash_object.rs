use crate::areas::repository::Repository;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use std::io::Write;

impl Repository {
    /// Print the blob id of `path`, storing the blob when `write` is set.
    pub async fn hash_object(&mut self, path: &str, write: bool) -> anyhow::Result<()> {
        let path = self.relative_path(path)?;
        let blob = Blob::new(self.workspace().read_file(&path)?);

        let oid = if write {
            self.database().store(&blob)?
        } else {
            blob.object_id()?
        };

        writeln!(self.writer(), "{}", oid)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::fixtures::{capturing_repository, write};
    use crate::artifacts::objects::object_id::ObjectId;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn ids_match_git_and_only_write_on_request() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        write(dir.path(), "hello.txt", "hello\n");

        repository.hash_object("hello.txt", false).await.unwrap();
        let oid = ObjectId::try_parse(capture.take().trim()).unwrap();

        assert_eq!(oid.as_ref(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert!(!repository.database().has(&oid).unwrap());

        repository.hash_object("hello.txt", true).await.unwrap();
        assert!(repository.database().has(&oid).unwrap());
    }
}
