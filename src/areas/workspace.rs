use crate::artifacts::checkout::migration::{ActionType, Migration};
use crate::artifacts::index::entry_mode::EntryMode;
use crate::artifacts::index::index_entry::EntryMetadata;
use crate::artifacts::objects::blob::Blob;
use anyhow::Context;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

const IGNORED_PATHS: [&str; 1] = [".git"];

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn parse_blob(&self, path: &Path) -> anyhow::Result<Blob> {
        Ok(Blob::new(self.read_file(path)?))
    }

    /// Direct children of `dir_path` (the root when `None`) with their stat.
    pub fn list_dir(
        &self,
        dir_path: Option<&Path>,
    ) -> anyhow::Result<BTreeMap<PathBuf, EntryMetadata>> {
        let relative = dir_path.unwrap_or(Path::new(""));
        let full_path = self.path.join(relative);

        let mut stats = BTreeMap::new();
        for entry in std::fs::read_dir(&full_path)
            .with_context(|| format!("Unable to list directory {}", full_path.display()))?
        {
            let entry = entry?;
            let name = entry.file_name();
            if IGNORED_PATHS.contains(&name.to_string_lossy().as_ref()) {
                continue;
            }

            let path = relative.join(&name);
            if let Some(stat) = self.stat_file(&path)? {
                stats.insert(path, stat);
            }
        }

        Ok(stats)
    }

    /// Files at or below `root_path`, relative to the workspace root.
    pub fn list_files(&self, root_path: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let relative = root_path.unwrap_or(Path::new(""));
        let full_path = self.path.join(relative);

        if !full_path.exists() {
            anyhow::bail!(
                "pathspec '{}' did not match any files",
                relative.display()
            );
        }

        if full_path.is_file() {
            return Ok(vec![relative.to_path_buf()]);
        }

        let mut files = WalkDir::new(&full_path)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| !Self::is_ignored(entry.file_name().to_string_lossy().as_ref()))
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                entry
                    .path()
                    .strip_prefix(self.path.as_ref())
                    .ok()
                    .map(Path::to_path_buf)
            })
            .collect::<Vec<_>>();
        files.sort();

        Ok(files)
    }

    fn is_ignored(name: &str) -> bool {
        IGNORED_PATHS.contains(&name)
    }

    pub fn read_file(&self, file_path: &Path) -> anyhow::Result<Bytes> {
        let full_path = self.path.join(file_path);
        let content = std::fs::read(&full_path)
            .with_context(|| format!("Unable to read file {}", file_path.display()))?;

        Ok(Bytes::from(content))
    }

    /// Stat data for `file_path`, or `None` when nothing is there.
    pub fn stat_file(&self, file_path: &Path) -> anyhow::Result<Option<EntryMetadata>> {
        let full_path = self.path.join(file_path);

        match std::fs::symlink_metadata(&full_path) {
            Ok(metadata) => Ok(Some((full_path.as_path(), metadata).try_into()?)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) if err.kind() == std::io::ErrorKind::NotADirectory => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("Unable to stat file {}", file_path.display())),
        }
    }

    /// Write `data` to `file_path`, creating parent directories and
    /// replacing a directory that stands in the way.
    pub fn write_file(&self, file_path: &Path, data: &[u8], mode: EntryMode) -> anyhow::Result<()> {
        let full_path = self.path.join(file_path);

        if full_path.is_dir() {
            std::fs::remove_dir_all(&full_path)
                .with_context(|| format!("Unable to remove directory {}", file_path.display()))?;
        }
        if let Some(parent) = file_path.parent() {
            self.make_directory_all(parent)?;
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&full_path)
            .with_context(|| format!("Unable to open file {}", file_path.display()))?;
        file.write_all(data)
            .with_context(|| format!("Unable to write file {}", file_path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let permissions = std::fs::Permissions::from_mode(mode.as_u32() & 0o777);
            std::fs::set_permissions(&full_path, permissions).with_context(|| {
                format!("Unable to set permissions of {}", file_path.display())
            })?;
        }

        Ok(())
    }

    /// Remove a file or directory, then any parent directories left empty.
    pub fn remove_file(&self, file_path: &Path) -> anyhow::Result<()> {
        let full_path = self.path.join(file_path);

        match std::fs::symlink_metadata(&full_path) {
            Ok(metadata) if metadata.is_dir() => std::fs::remove_dir_all(&full_path)
                .with_context(|| format!("Unable to remove {}", file_path.display()))?,
            Ok(_) => std::fs::remove_file(&full_path)
                .with_context(|| format!("Unable to remove {}", file_path.display()))?,
            Err(_) => return Ok(()),
        }

        for parent in file_path.ancestors().skip(1) {
            if parent.as_os_str().is_empty() {
                break;
            }
            if std::fs::remove_dir(self.path.join(parent)).is_err() {
                break;
            }
        }

        Ok(())
    }

    /// Rename `from` to `to` within the workspace.
    pub fn move_file(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        std::fs::rename(self.path.join(from), self.path.join(to)).with_context(|| {
            format!("Unable to move {} to {}", from.display(), to.display())
        })
    }

    /// Deletions first, then empty directories are pruned deepest first,
    /// then new directories are created parents first, then file contents
    /// are written.
    pub fn apply_migration(&self, migration: &Migration) -> anyhow::Result<()> {
        self.apply_action_set(migration, ActionType::Delete)?;

        for dir_path in migration.rmdirs().iter().rev() {
            self.remove_directory(dir_path);
        }
        for dir_path in migration.mkdirs() {
            self.make_directory(dir_path)?;
        }

        self.apply_action_set(migration, ActionType::Update)?;
        self.apply_action_set(migration, ActionType::Create)?;

        Ok(())
    }

    fn apply_action_set(&self, migration: &Migration, action: ActionType) -> anyhow::Result<()> {
        for (file_path, entry) in migration.actions_for(action) {
            let full_path = self.path.join(file_path);

            if let Ok(metadata) = std::fs::symlink_metadata(&full_path) {
                if metadata.is_dir() {
                    std::fs::remove_dir_all(&full_path).with_context(|| {
                        format!("Unable to remove directory {}", file_path.display())
                    })?;
                } else {
                    std::fs::remove_file(&full_path)
                        .with_context(|| format!("Unable to remove {}", file_path.display()))?;
                }
            }

            if let Some(entry) = entry {
                let data = migration.load_blob_data(&entry.oid)?;
                self.write_file(file_path, &data, entry.mode)?;
            }
        }

        debug!(?action, count = migration.actions_for(action).len(), "applied actions");
        Ok(())
    }

    /// Only empty directories go; anything else is left for the user.
    fn remove_directory(&self, dir_path: &Path) {
        let _ = std::fs::remove_dir(self.path.join(dir_path));
    }

    fn make_directory(&self, dir_path: &Path) -> anyhow::Result<()> {
        let full_path = self.path.join(dir_path);

        match std::fs::symlink_metadata(&full_path) {
            Ok(metadata) if metadata.is_dir() => return Ok(()),
            Ok(_) => std::fs::remove_file(&full_path)
                .with_context(|| format!("Unable to remove {}", dir_path.display()))?,
            Err(_) => {}
        }

        std::fs::create_dir(&full_path)
            .with_context(|| format!("Unable to create directory {}", dir_path.display()))
    }

    fn make_directory_all(&self, dir_path: &Path) -> anyhow::Result<()> {
        let mut parents = dir_path
            .ancestors()
            .filter(|dir| !dir.as_os_str().is_empty())
            .collect::<Vec<_>>();
        parents.reverse();

        for parent in parents {
            self.make_directory(parent)?;
        }

        Ok(())
    }
}
