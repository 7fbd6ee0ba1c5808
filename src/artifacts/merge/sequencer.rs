//! Persistent queue for multi-commit cherry-picks and reverts
//!
//! Layout under `.git/sequencer/`:
//!
//! - `head`: where `HEAD` was before the first command, for `--abort`
//! - `abort-safety`: where `HEAD` was after the last completed command;
//!   aborting refuses to rewind if `HEAD` has moved since
//! - `todo`: the remaining commands, one `pick <oid> <title>` or
//!   `revert <oid> <title>` per line
//! - `opts`: options shared by every command, as TOML

use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Write;
use std::path::{Path, PathBuf};

const SEQUENCER_DIR: &str = "sequencer";
const HEAD_FILE: &str = "head";
const ABORT_SAFETY_FILE: &str = "abort-safety";
const TODO_FILE: &str = "todo";
const OPTS_FILE: &str = "opts";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerAction {
    Pick,
    Revert,
}

impl SequencerAction {
    fn keyword(&self) -> &'static str {
        match self {
            SequencerAction::Pick => "pick",
            SequencerAction::Revert => "revert",
        }
    }

    fn parse(keyword: &str) -> anyhow::Result<Self> {
        match keyword {
            "pick" => Ok(SequencerAction::Pick),
            "revert" => Ok(SequencerAction::Revert),
            other => anyhow::bail!("unknown sequencer command: {}", other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencerCommand {
    pub action: SequencerAction,
    pub oid: ObjectId,
    pub title: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mainline: Option<usize>,
}

#[derive(Debug)]
pub struct Sequencer {
    path: PathBuf,
    commands: VecDeque<SequencerCommand>,
    options: SequencerOptions,
}

impl Sequencer {
    pub fn new(git_path: &Path) -> Self {
        Self {
            path: git_path.join(SEQUENCER_DIR),
            commands: VecDeque::new(),
            options: SequencerOptions::default(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.path.is_dir()
    }

    pub fn options(&self) -> &SequencerOptions {
        &self.options
    }

    /// Begin a new run from `head`. Fails if another run is still active.
    pub fn start(&mut self, head: &ObjectId, options: SequencerOptions) -> anyhow::Result<()> {
        if self.is_active() {
            anyhow::bail!(
                "a cherry-pick or revert is already in progress\n\
                 hint: try \"cherry-pick (--continue | --quit | --abort)\""
            );
        }

        std::fs::create_dir_all(&self.path)
            .with_context(|| format!("Unable to create {}", self.path.display()))?;
        self.write_file(HEAD_FILE, &format!("{}\n", head))?;
        self.write_file(ABORT_SAFETY_FILE, &format!("{}\n", head))?;
        self.write_file(OPTS_FILE, &toml::to_string(&options)?)?;
        self.options = options;
        self.commands.clear();

        Ok(())
    }

    pub fn push(&mut self, action: SequencerAction, oid: ObjectId, commit: &Commit) {
        self.commands.push_back(SequencerCommand {
            action,
            oid,
            title: commit.short_message(),
        });
    }

    pub fn next_command(&self) -> Option<&SequencerCommand> {
        self.commands.front()
    }

    /// Mark the front command done; `head` is where it left `HEAD`.
    pub fn drop_command(&mut self, head: &ObjectId) -> anyhow::Result<()> {
        self.commands.pop_front();
        self.write_file(ABORT_SAFETY_FILE, &format!("{}\n", head))?;
        self.dump()
    }

    pub fn load(&mut self) -> anyhow::Result<()> {
        if !self.is_active() {
            anyhow::bail!("no cherry-pick or revert in progress");
        }

        let opts = self.read_file(OPTS_FILE)?;
        self.options = toml::from_str(&opts).context("invalid sequencer options")?;

        self.commands = self
            .read_file(TODO_FILE)?
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(Self::parse_command)
            .collect::<anyhow::Result<_>>()?;

        Ok(())
    }

    fn parse_command(line: &str) -> anyhow::Result<SequencerCommand> {
        let mut parts = line.splitn(3, ' ');
        let action = SequencerAction::parse(parts.next().unwrap_or_default())?;
        let oid = ObjectId::try_parse(
            parts
                .next()
                .with_context(|| format!("malformed sequencer line: {}", line))?,
        )?;
        let title = parts.next().unwrap_or_default().to_string();

        Ok(SequencerCommand { action, oid, title })
    }

    pub fn dump(&self) -> anyhow::Result<()> {
        let todo = self
            .commands
            .iter()
            .map(|command| format!("{} {} {}\n", command.action.keyword(), command.oid, command.title))
            .collect::<String>();

        self.write_file(TODO_FILE, &todo)
    }

    /// `HEAD` before the run started.
    pub fn original_head(&self) -> anyhow::Result<ObjectId> {
        ObjectId::try_parse(self.read_file(HEAD_FILE)?.trim())
    }

    /// Whether `HEAD` is still where the last completed command left it.
    pub fn is_abort_safe(&self, head: Option<&ObjectId>) -> anyhow::Result<bool> {
        let expected = ObjectId::try_parse(self.read_file(ABORT_SAFETY_FILE)?.trim())?;
        Ok(head == Some(&expected))
    }

    /// Forget the run, keeping whatever has been committed so far.
    pub fn quit(&mut self) -> anyhow::Result<()> {
        self.commands.clear();
        if self.is_active() {
            std::fs::remove_dir_all(&self.path)
                .with_context(|| format!("Unable to remove {}", self.path.display()))?;
        }

        Ok(())
    }

    fn write_file(&self, name: &str, content: &str) -> anyhow::Result<()> {
        let mut lockfile = Lockfile::acquire(self.path.join(name))?;
        lockfile.write_all(content.as_bytes())?;
        lockfile.commit()
    }

    fn read_file(&self, name: &str) -> anyhow::Result<String> {
        let path = self.path.join(name);
        std::fs::read_to_string(&path).with_context(|| format!("Unable to read {}", path.display()))
    }
}
