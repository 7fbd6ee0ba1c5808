use crate::areas::repository::Repository;
use crate::artifacts::index::index_entry::IndexEntry;
use crate::artifacts::objects::blob::Blob;
use crate::errors::RepoError;
use tracing::debug;

impl Repository {
    /// Stage files, expanding directories. A path that no longer exists in
    /// the workspace but is still tracked is unstaged instead.
    pub async fn add(&mut self, paths: &[String]) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.load_for_update()?;

        let mut files = Vec::new();
        for path in paths {
            let path = self.relative_path(path)?;

            if self.workspace().stat_file(&path)?.is_none() {
                if index.is_directly_tracked(&path) {
                    debug!(path = %path.display(), "unstaging deleted path");
                    index.remove(&path);
                    continue;
                }
                anyhow::bail!(RepoError::NotFound(format!(
                    "pathspec '{}' did not match any files",
                    path.display()
                )));
            }

            files.extend(self.workspace().list_files(Some(&path))?);
        }

        for path in files {
            let data = self.workspace().read_file(&path)?;
            let Some(stat) = self.workspace().stat_file(&path)? else {
                continue;
            };

            let blob_id = self.database().store(&Blob::new(data))?;
            index.add(IndexEntry::new(path, blob_id, stat));
        }

        index.write_updates()?;

        Ok(())
    }
}
