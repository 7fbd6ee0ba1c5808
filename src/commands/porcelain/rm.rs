use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::status::status_info::HeadTree;
use crate::errors::RepoError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

const BOTH_CHANGED: &str = "staged content different from both the file and the HEAD";
const INDEX_CHANGED: &str = "changes staged in the index";
const WORKSPACE_CHANGED: &str = "local modifications";

impl Repository {
    /// Untrack paths and delete them from the workspace, or only untrack
    /// them with `cached`. Refuses when that would lose uncommitted content.
    pub async fn rm(&mut self, paths: &[String], cached: bool) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.load_for_update()?;

        let head_oid = self.refs().read_head()?;
        let head_tree = self.database().load_tree_list(head_oid.as_ref())?;

        let mut targets = Vec::new();
        for path in paths {
            let path = self.relative_path(path)?;
            let tracked = index.entries_under_path(&path);
            if tracked.is_empty() {
                anyhow::bail!(RepoError::NotFound(format!(
                    "pathspec '{}' did not match any files",
                    path.display()
                )));
            }
            targets.extend(tracked);
        }
        targets.sort();
        targets.dedup();

        let mut errors = BTreeMap::<&str, Vec<&PathBuf>>::new();
        for path in &targets {
            if let Some(reason) = self.removal_risk(path, &index, &head_tree, cached)? {
                errors.entry(reason).or_default().push(path);
            }
        }

        if !errors.is_empty() {
            let report = errors
                .into_iter()
                .map(|(reason, paths)| {
                    let (noun, verb) = if paths.len() == 1 {
                        ("file", "has")
                    } else {
                        ("files", "have")
                    };
                    let listing = paths
                        .iter()
                        .map(|path| format!("    {}", path.display()))
                        .collect::<Vec<_>>()
                        .join("\n");
                    format!("error: the following {} {} {}:\n{}", noun, verb, reason, listing)
                })
                .collect::<Vec<_>>()
                .join("\n");
            anyhow::bail!(report);
        }

        for path in &targets {
            index.remove(path);
            if !cached {
                self.workspace().remove_file(path)?;
            }
            writeln!(self.writer(), "rm '{}'", path.display())?;
        }

        index.write_updates()?;

        Ok(())
    }

    fn removal_risk(
        &self,
        path: &Path,
        index: &Index,
        head_tree: &HeadTree,
        cached: bool,
    ) -> anyhow::Result<Option<&'static str>> {
        let Some(entry) = index.entry_by_path(path) else {
            return Ok(None);
        };

        let staged = head_tree
            .get(path)
            .is_none_or(|head_entry| head_entry.oid != entry.oid || head_entry.mode != entry.mode());

        let unstaged = match self.workspace().stat_file(path)? {
            Some(stat) if !stat.mode.is_tree() => {
                let blob = Blob::new(self.workspace().read_file(path)?);
                blob.object_id()? != entry.oid || stat.mode != entry.mode()
            }
            _ => false,
        };

        Ok(match (staged, unstaged) {
            (true, true) => Some(BOTH_CHANGED),
            (true, false) if !cached => Some(INDEX_CHANGED),
            (false, true) if !cached => Some(WORKSPACE_CHANGED),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::fixtures::{repository, write};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn removes_from_index_and_workspace() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "keep.txt", "keep");
        write(dir.path(), "gone/file.txt", "gone");
        repository.add(&[".".into()]).await.unwrap();
        repository.commit(Some("initial")).await.unwrap();

        repository.rm(&["gone".into()], false).await.unwrap();

        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate().unwrap();
        let tracked = index
            .entries()
            .map(|entry| entry.name.display().to_string())
            .collect::<Vec<_>>();
        assert_eq!(tracked, vec!["keep.txt"]);
        assert!(!dir.path().join("gone").exists());
    }

    #[tokio::test]
    async fn cached_keeps_the_file() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "a");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("initial")).await.unwrap();

        repository.rm(&["a.txt".into()], true).await.unwrap();

        assert!(dir.path().join("a.txt").exists());
        let index = repository.index();
        let mut index = index.lock().await;
        index.rehydrate().unwrap();
        assert_eq!(index.entries().count(), 0);
    }

    #[tokio::test]
    async fn refuses_to_drop_local_modifications() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;
        write(dir.path(), "a.txt", "a");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("initial")).await.unwrap();
        write(dir.path(), "a.txt", "changed");

        let error = repository.rm(&["a.txt".into()], false).await.unwrap_err();

        assert_eq!(
            error.to_string(),
            "error: the following file has local modifications:\n    a.txt"
        );
        assert!(dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn unknown_paths_are_reported() {
        let dir = TempDir::new().unwrap();
        let mut repository = repository(dir.path()).await;

        let error = repository.rm(&["nope".into()], false).await.unwrap_err();

        assert_eq!(error.to_string(), "pathspec 'nope' did not match any files");
    }
}
