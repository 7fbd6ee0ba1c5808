use crate::areas::index::Index;
use crate::areas::repository::Repository;
use crate::artifacts::diff::diff_target::DiffTarget;
use crate::artifacts::diff::hunk::Hunk;
use crate::artifacts::diff::myers::{EditKind, diff_lines};
use crate::artifacts::status::file_change::{FileChangeType, IndexChangeType, WorkspaceChangeType};
use crate::artifacts::status::status_info::StatusInfo;
use anyhow::Context;
use colored::Colorize;
use std::io::Write;
use std::path::Path;

impl Repository {
    /// Unified diff of the workspace against the index, or with `cached`
    /// of the index against HEAD.
    pub async fn diff(&mut self, cached: bool) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.rehydrate()?;
        let status_info = self.status().initialize(&mut index).await?;

        if cached {
            self.diff_head_index(&status_info, &index)
        } else {
            self.diff_index_workspace(&status_info, &index)
        }
    }

    fn diff_index_workspace(&self, status_info: &StatusInfo, index: &Index) -> anyhow::Result<()> {
        for (path, change) in &status_info.workspace_changeset {
            let a = self.index_target(path, index)?;
            let b = match change {
                FileChangeType::Workspace(WorkspaceChangeType::Deleted) => {
                    DiffTarget::from_nothing(path)
                }
                _ => {
                    let stat = status_info
                        .file_stats
                        .get(path)
                        .with_context(|| format!("no stat data for {}", path.display()))?;
                    DiffTarget::from_file(path, stat.mode, self.workspace())?
                }
            };

            self.print_diff(&a, &b)?;
        }

        Ok(())
    }

    fn diff_head_index(&self, status_info: &StatusInfo, index: &Index) -> anyhow::Result<()> {
        for (path, change) in &status_info.index_changeset {
            let (a, b) = match change {
                FileChangeType::Index(IndexChangeType::Added) => {
                    (DiffTarget::from_nothing(path), self.index_target(path, index)?)
                }
                FileChangeType::Index(IndexChangeType::Deleted) => {
                    (self.head_target(path, status_info)?, DiffTarget::from_nothing(path))
                }
                _ => (self.head_target(path, status_info)?, self.index_target(path, index)?),
            };

            self.print_diff(&a, &b)?;
        }

        Ok(())
    }

    fn index_target(&self, path: &Path, index: &Index) -> anyhow::Result<DiffTarget> {
        let entry = index
            .entry_by_path(path)
            .with_context(|| format!("{} is not in the index", path.display()))?;

        DiffTarget::from_entry(path, &entry.to_database_entry(), self.database())
    }

    fn head_target(&self, path: &Path, status_info: &StatusInfo) -> anyhow::Result<DiffTarget> {
        let entry = status_info
            .head_tree
            .get(path)
            .with_context(|| format!("{} is not in HEAD", path.display()))?;

        DiffTarget::from_entry(path, entry, self.database())
    }

    pub(crate) fn print_diff(&self, a: &DiffTarget, b: &DiffTarget) -> anyhow::Result<()> {
        if a.oid == b.oid && a.mode == b.mode {
            return Ok(());
        }

        self.print_meta(&format!(
            "diff --git {} {}",
            Path::new("a").join(&a.path).display(),
            Path::new("b").join(&b.path).display()
        ))?;
        self.print_diff_mode(a, b)?;
        self.print_diff_content(a, b)
    }

    fn print_diff_mode(&self, a: &DiffTarget, b: &DiffTarget) -> anyhow::Result<()> {
        match (a.mode, b.mode) {
            (None, _) => self.print_meta(&format!("new file mode {}", b.pretty_mode())),
            (_, None) => self.print_meta(&format!("deleted file mode {}", a.pretty_mode())),
            (Some(a_mode), Some(b_mode)) if a_mode != b_mode => {
                self.print_meta(&format!("old mode {}", a.pretty_mode()))?;
                self.print_meta(&format!("new mode {}", b.pretty_mode()))
            }
            _ => Ok(()),
        }
    }

    fn print_diff_content(&self, a: &DiffTarget, b: &DiffTarget) -> anyhow::Result<()> {
        if a.oid == b.oid {
            return Ok(());
        }

        let mut oid_range = format!("index {}..{}", a.oid.to_short_oid(), b.oid.to_short_oid());
        if a.mode == b.mode {
            oid_range.push_str(&format!(" {}", a.pretty_mode()));
        }
        self.print_meta(&oid_range)?;

        if a.is_binary() || b.is_binary() {
            writeln!(
                self.writer(),
                "Binary files {} and {} differ",
                a.diff_path("a"),
                b.diff_path("b")
            )?;
            return Ok(());
        }

        self.print_meta(&format!("--- {}", a.diff_path("a")))?;
        self.print_meta(&format!("+++ {}", b.diff_path("b")))?;

        let edits = diff_lines(&a.lines(), &b.lines());
        for hunk in Hunk::filter(&edits) {
            self.print_hunk(&hunk)?;
        }

        Ok(())
    }

    fn print_hunk(&self, hunk: &Hunk) -> anyhow::Result<()> {
        writeln!(self.writer(), "{}", hunk.header().cyan())?;

        for edit in &hunk.edits {
            let line = edit.to_string();
            let line = match edit.kind {
                EditKind::Eql => line.normal(),
                EditKind::Ins => line.green(),
                EditKind::Del => line.red(),
            };
            writeln!(self.writer(), "{}", line)?;
        }

        Ok(())
    }

    fn print_meta(&self, line: &str) -> anyhow::Result<()> {
        writeln!(self.writer(), "{}", line.bold())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::areas::repository::fixtures::{capturing_repository, write};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[tokio::test]
    async fn workspace_changes_show_against_the_index() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        write(dir.path(), "a.txt", "one\ntwo\nthree\n");
        repository.add(&["a.txt".into()]).await.unwrap();
        repository.commit(Some("first")).await.unwrap();
        write(dir.path(), "a.txt", "one\n2\nthree\n");
        capture.take();

        repository.diff(false).await.unwrap();

        let output = capture.take();
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "diff --git a/a.txt b/a.txt");
        assert_eq!(
            &lines[2..],
            &["--- a/a.txt", "+++ b/a.txt", "@@ -1,3 +1,3 @@", " one", "-two", "+2", " three"]
        );
    }

    #[tokio::test]
    async fn cached_shows_new_files() {
        let dir = TempDir::new().unwrap();
        let (mut repository, capture) = capturing_repository(dir.path()).await;
        write(dir.path(), "new.txt", "hello\n");
        repository.add(&["new.txt".into()]).await.unwrap();

        repository.diff(true).await.unwrap();

        let output = capture.take();
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "diff --git a/new.txt b/new.txt");
        assert_eq!(lines[1], "new file mode 100644");
        assert_eq!(&lines[3..], &["--- /dev/null", "+++ b/new.txt", "@@ -0,0 +1,1 @@", "+hello"]);
    }
}
