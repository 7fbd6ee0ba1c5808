use crate::areas::repository::Repository;
use crate::artifacts::merge::pending_commit::PendingKind;
use crate::artifacts::status::file_change::FileChangeType;
use crate::artifacts::status::status_info::{ChangeSet, StatusInfo};
use colored::Colorize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;

impl Repository {
    /// Print the state of the workspace and index, in long form or as
    /// two-letter porcelain codes.
    ///
    /// Refreshed stat data found along the way is written back to the index.
    pub async fn show_status(&mut self, porcelain: bool) -> anyhow::Result<()> {
        let index = self.index();
        let mut index = index.lock().await;

        index.load_for_update()?;
        let status_info = self.status().initialize(&mut index).await?;
        if index.is_changed() {
            index.write_updates()?;
        } else {
            index.release();
        }

        if porcelain {
            self.print_porcelain_status(&status_info)
        } else {
            self.print_long_status(&status_info)
        }
    }

    fn print_porcelain_status(&self, status_info: &StatusInfo) -> anyhow::Result<()> {
        let mut lines = BTreeMap::<&PathBuf, String>::new();
        for (path, change) in &status_info.changed_files {
            lines.insert(path, change.to_string());
        }
        for (path, kind) in &status_info.conflicts {
            lines.insert(path, kind.short_code().to_string());
        }

        for (path, code) in lines {
            writeln!(self.writer(), "{} {}", code, path.display())?;
        }
        for path in &status_info.untracked_files {
            writeln!(self.writer(), "?? {}", path.display())?;
        }

        Ok(())
    }

    fn print_long_status(&self, status_info: &StatusInfo) -> anyhow::Result<()> {
        self.print_branch_status()?;

        self.print_changeset("Changes to be committed", &status_info.index_changeset)?;

        let conflicts = status_info
            .conflicts
            .iter()
            .map(|(path, kind)| (path.clone(), FileChangeType::Conflict(*kind)))
            .collect::<ChangeSet>();
        self.print_changeset("Unmerged paths", &conflicts)?;

        self.print_changeset("Changes not staged for commit", &status_info.workspace_changeset)?;

        if !status_info.untracked_files.is_empty() {
            writeln!(self.writer(), "Untracked files:\n")?;
            for path in &status_info.untracked_files {
                writeln!(self.writer(), "\t{}", path.display().to_string().red())?;
            }
            writeln!(self.writer())?;
        }

        self.print_commit_status(status_info)
    }

    fn print_branch_status(&self) -> anyhow::Result<()> {
        let current_ref = self.refs().current_ref(None)?;
        if current_ref.is_detached_head() {
            let head = self.refs().read_head()?;
            let position = head
                .map(|oid| oid.to_short_oid())
                .unwrap_or_else(|| "nothing".to_string());
            writeln!(self.writer(), "{}", format!("HEAD detached at {}", position).red())?;
        } else {
            writeln!(self.writer(), "On branch {}", self.refs().short_name(&current_ref))?;
        }

        if let Some(kind) = self.pending_commit().in_progress() {
            let hint = match kind {
                PendingKind::Merge => "You have unmerged paths.\n  (fix conflicts and run \"graft commit\")",
                PendingKind::CherryPick => "You are currently cherry-picking.\n  (fix conflicts and run \"graft cherry-pick --continue\")",
                PendingKind::Revert => "You are currently reverting.\n  (fix conflicts and run \"graft revert --continue\")",
            };
            writeln!(self.writer(), "{}", hint)?;
        }
        writeln!(self.writer())?;

        Ok(())
    }

    fn print_changeset(&self, title: &str, changeset: &ChangeSet) -> anyhow::Result<()> {
        if changeset.is_empty() {
            return Ok(());
        }

        writeln!(self.writer(), "{}:", title)?;
        for (path, change) in changeset {
            let path = match change {
                FileChangeType::Index(_) => path.display().to_string().green(),
                _ => path.display().to_string().red(),
            };
            writeln!(self.writer(), "\t{}{}", change, path)?;
        }
        writeln!(self.writer())?;

        Ok(())
    }

    fn print_commit_status(&self, status_info: &StatusInfo) -> anyhow::Result<()> {
        if status_info.has_staged_changes() {
            return Ok(());
        }

        let message = if !status_info.workspace_changeset.is_empty() {
            "no changes added to commit"
        } else if !status_info.untracked_files.is_empty() {
            "nothing added to commit but untracked files present"
        } else {
            "nothing to commit, working tree clean"
        };
        writeln!(self.writer(), "{}", message)?;

        Ok(())
    }
}
