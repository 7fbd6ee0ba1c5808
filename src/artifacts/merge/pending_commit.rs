use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use std::io::Write;
use std::path::{Path, PathBuf};

const MERGE_MSG: &str = "MERGE_MSG";

/// The operation a stopped commit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingKind {
    Merge,
    CherryPick,
    Revert,
}

impl PendingKind {
    const ALL: [PendingKind; 3] = [PendingKind::Merge, PendingKind::CherryPick, PendingKind::Revert];

    pub fn head_file(&self) -> &'static str {
        match self {
            PendingKind::Merge => "MERGE_HEAD",
            PendingKind::CherryPick => "CHERRY_PICK_HEAD",
            PendingKind::Revert => "REVERT_HEAD",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            PendingKind::Merge => "merge",
            PendingKind::CherryPick => "cherry-pick",
            PendingKind::Revert => "revert",
        }
    }
}

/// State kept in the metadata directory while a merge, cherry-pick or revert
/// waits for conflicts to be resolved.
#[derive(Debug)]
pub struct PendingCommit {
    path: Box<Path>,
}

impl PendingCommit {
    pub fn new(path: Box<Path>) -> Self {
        Self { path }
    }

    fn head_path(&self, kind: PendingKind) -> PathBuf {
        self.path.join(kind.head_file())
    }

    fn message_path(&self) -> PathBuf {
        self.path.join(MERGE_MSG)
    }

    pub fn start(&self, oid: &ObjectId, kind: PendingKind) -> anyhow::Result<()> {
        let mut lockfile = Lockfile::acquire(self.head_path(kind))?;
        writeln!(lockfile, "{}", oid)?;
        lockfile.commit()
    }

    pub fn write_message(&self, message: &str) -> anyhow::Result<()> {
        let mut lockfile = Lockfile::acquire(self.message_path())?;
        lockfile.write_all(message.as_bytes())?;
        lockfile.commit()
    }

    pub fn in_progress(&self) -> Option<PendingKind> {
        PendingKind::ALL
            .into_iter()
            .find(|kind| self.head_path(*kind).is_file())
    }

    pub fn is_in_progress(&self, kind: PendingKind) -> bool {
        self.head_path(kind).is_file()
    }

    pub fn merge_oid(&self, kind: PendingKind) -> anyhow::Result<ObjectId> {
        let path = self.head_path(kind);
        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "There is no {} in progress ({} missing).",
                kind.name(),
                kind.head_file()
            )
        })?;

        ObjectId::try_parse(content.trim())
    }

    pub fn merge_message(&self) -> anyhow::Result<String> {
        std::fs::read_to_string(self.message_path())
            .with_context(|| format!("Unable to read {}", MERGE_MSG))
    }

    pub fn clear(&self, kind: PendingKind) -> anyhow::Result<()> {
        let head_path = self.head_path(kind);
        if !head_path.is_file() {
            anyhow::bail!(
                "There is no {} to abort ({} missing).",
                kind.name(),
                kind.head_file()
            );
        }

        std::fs::remove_file(&head_path)
            .with_context(|| format!("Unable to remove {}", head_path.display()))?;

        match std::fs::remove_file(self.message_path()) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
