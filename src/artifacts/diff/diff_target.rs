use crate::areas::database::Database;
use crate::areas::workspace::Workspace;
use crate::artifacts::database::database_entry::DatabaseEntry;
use crate::artifacts::diff::myers::{Line, lines};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use anyhow::Context;
use bytes::Bytes;
use std::path::{Path, PathBuf};

const NULL_PATH: &str = "/dev/null";

/// One side of a file diff.
///
/// A side with no mode is a file that does not exist on that side.
#[derive(Debug, Clone)]
pub struct DiffTarget {
    pub path: PathBuf,
    pub oid: ObjectId,
    pub mode: Option<EntryMode>,
    pub data: Bytes,
}

impl DiffTarget {
    /// A blob from the object database, as named by a tree or index entry.
    pub fn from_entry(
        path: &Path,
        entry: &DatabaseEntry,
        database: &Database,
    ) -> anyhow::Result<Self> {
        let blob = database
            .parse_object_as_blob(&entry.oid)?
            .with_context(|| format!("object {} is not a blob", entry.oid))?;

        Ok(Self {
            path: path.to_path_buf(),
            oid: entry.oid.clone(),
            mode: Some(entry.mode),
            data: blob.content().clone(),
        })
    }

    /// The current content of a workspace file.
    pub fn from_file(path: &Path, mode: EntryMode, workspace: &Workspace) -> anyhow::Result<Self> {
        let data = workspace.read_file(path)?;
        let oid = Blob::new(data.clone()).object_id()?;

        Ok(Self {
            path: path.to_path_buf(),
            oid,
            mode: Some(mode),
            data,
        })
    }

    pub fn from_nothing(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            oid: ObjectId::null(),
            mode: None,
            data: Bytes::new(),
        }
    }

    /// `a/<path>` or `b/<path>`, or `/dev/null` for a missing side.
    pub fn diff_path(&self, prefix: &str) -> String {
        match self.mode {
            Some(_) => Path::new(prefix).join(&self.path).display().to_string(),
            None => NULL_PATH.to_string(),
        }
    }

    pub fn pretty_mode(&self) -> &'static str {
        self.mode
            .as_ref()
            .map(EntryMode::as_str)
            .unwrap_or("100644")
    }

    pub fn lines(&self) -> Vec<Line> {
        lines(&String::from_utf8_lossy(&self.data))
    }

    pub fn is_binary(&self) -> bool {
        self.data.iter().take(8000).any(|&b| b == 0)
    }
}
