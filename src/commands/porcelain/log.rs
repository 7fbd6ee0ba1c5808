use crate::areas::refs::HEAD;
use crate::areas::repository::Repository;
use crate::artifacts::branch::branch_name::SymRefName;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::diff_target::DiffTarget;
use crate::artifacts::log::rev_list::RevList;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use colored::Colorize;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct LogOptions {
    pub oneline: bool,
    /// Follow each commit with its diff against the first parent. Merges
    /// get no patch.
    pub patch: bool,
    pub revisions: Vec<String>,
    pub paths: Vec<PathBuf>,
}

impl Repository {
    pub async fn log(&mut self, options: &LogOptions) -> anyhow::Result<()> {
        let rev_list = RevList::new(self, &options.revisions, &options.paths)?;
        let commits = rev_list.commits()?;
        let decorations = self.decorations()?;

        for (i, (oid, commit)) in commits.iter().enumerate() {
            let decoration = decorations
                .get(oid)
                .map(|names| format!(" ({})", names.join(", ")).yellow().to_string())
                .unwrap_or_default();

            if options.oneline {
                writeln!(
                    self.writer(),
                    "{}{} {}",
                    oid.to_short_oid().yellow(),
                    decoration,
                    commit.short_message()
                )?;
            } else {
                if i > 0 {
                    writeln!(self.writer())?;
                }
                self.show_commit_medium(oid, commit, &decoration)?;
            }

            if options.patch {
                self.show_patch(&rev_list, commit, !options.oneline)?;
            }
        }

        Ok(())
    }

    fn show_patch(&self, rev_list: &RevList, commit: &Commit, separate: bool) -> anyhow::Result<()> {
        if commit.is_merge() {
            return Ok(());
        }

        if separate {
            writeln!(self.writer())?;
        }
        for (path, change) in rev_list.tree_diff(commit)? {
            let a = self.patch_target(&path, change.old_entry())?;
            let b = self.patch_target(&path, change.new_entry())?;
            self.print_diff(&a, &b)?;
        }

        Ok(())
    }

    fn patch_target(&self, path: &Path, entry: Option<&DatabaseEntry>) -> anyhow::Result<DiffTarget> {
        match entry {
            Some(entry) => DiffTarget::from_entry(path, entry, self.database()),
            None => Ok(DiffTarget::from_nothing(path)),
        }
    }

    fn show_commit_medium(
        &self,
        oid: &ObjectId,
        commit: &Commit,
        decoration: &str,
    ) -> anyhow::Result<()> {
        writeln!(self.writer(), "{}{}", format!("commit {}", oid).yellow(), decoration)?;
        if commit.is_merge() {
            let parents = commit
                .parents()
                .iter()
                .map(ObjectId::to_short_oid)
                .collect::<Vec<_>>()
                .join(" ");
            writeln!(self.writer(), "Merge: {}", parents)?;
        }
        writeln!(self.writer(), "Author: {}", commit.author().display_name())?;
        writeln!(self.writer(), "Date:   {}", commit.author().readable_timestamp())?;
        writeln!(self.writer())?;
        for line in commit.message().lines() {
            writeln!(self.writer(), "    {}", line)?;
        }

        Ok(())
    }

    /// Ref names per commit, with `HEAD -> <branch>` for the checked out branch.
    fn decorations(&self) -> anyhow::Result<HashMap<ObjectId, Vec<String>>> {
        let current_ref = self.refs().current_ref(None)?;
        let mut decorations = HashMap::<ObjectId, Vec<String>>::new();

        for (oid, mut names) in self.refs().reverse_refs()? {
            names.sort();
            let head = SymRefName::new(HEAD.to_string());
            let mut labels = Vec::with_capacity(names.len());

            if current_ref.is_detached_head() && names.contains(&head) {
                labels.push(HEAD.to_string());
            }
            for name in names.iter().filter(|name| **name != head) {
                let short = self.refs().short_name(name);
                if *name == current_ref {
                    labels.insert(0, format!("{} -> {}", HEAD, short));
                } else {
                    labels.push(short);
                }
            }

            if !labels.is_empty() {
                decorations.insert(oid, labels);
            }
        }

        Ok(decorations)
    }
}
