//! References (branches, remote-tracking refs, HEAD)
//!
//! References are human-readable names pointing to commits. A ref file holds
//! either a 40-character object id or `ref: <path>` for a symbolic ref; in
//! practice only `HEAD` is symbolic.
//!
//! ## Layout
//!
//! - `HEAD`, `ORIG_HEAD`, `MERGE_HEAD`, ...: top-level refs under `.git`
//! - `refs/heads/*`: local branches
//! - `refs/remotes/<remote>/*`: remote-tracking branches
//!
//! Every write goes through a `<ref>.lock` file, so two concurrent writers of
//! the same ref cannot interleave: the second fails with `RepoError::Locked`.

use crate::artifacts::branch::branch_name::{BranchName, SymRefName, check_ref_format};
use crate::artifacts::core::lockfile::Lockfile;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepoError;
use anyhow::Context;
use derive_new::new;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

#[derive(Debug, new)]
pub struct Refs {
    /// Path to the repository metadata directory (typically `.git`)
    path: Box<Path>,
}

const SYMREF_REGEX: &str = r"^ref: (.+)$";

pub const HEAD: &str = "HEAD";
pub const ORIG_HEAD: &str = "ORIG_HEAD";

pub const REFS_DIR: &str = "refs";
pub const HEADS_DIR: &str = "refs/heads";
pub const REMOTES_DIR: &str = "refs/remotes";

#[derive(Debug, Clone, PartialEq)]
enum SymRefOrOid {
    SymRef { sym_ref_name: SymRefName },
    Oid(ObjectId),
}

impl SymRefOrOid {
    fn read_symref_or_oid(path: &Path) -> anyhow::Result<Option<SymRefOrOid>> {
        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ref file at {:?}", path))?;
        let content = content.trim();

        if content.is_empty() {
            return Ok(None);
        }

        let symref_match = regex::Regex::new(SYMREF_REGEX)?.captures(content);
        if let Some(symref_match) = symref_match {
            Ok(Some(SymRefOrOid::SymRef {
                sym_ref_name: SymRefName::new(symref_match[1].to_string()),
            }))
        } else {
            Ok(Some(SymRefOrOid::Oid(ObjectId::try_parse(content)?)))
        }
    }
}

impl Refs {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join(REFS_DIR)
    }

    pub fn heads_path(&self) -> PathBuf {
        self.path.join(HEADS_DIR)
    }

    pub fn remotes_path(&self) -> PathBuf {
        self.path.join(REMOTES_DIR)
    }

    /// Follow `source` (default `HEAD`) to the last ref in the symbolic chain.
    ///
    /// With `HEAD -> refs/heads/main` this returns `refs/heads/main`, even if
    /// that branch does not exist yet. A detached HEAD returns `HEAD`.
    pub fn current_ref(&self, source: Option<SymRefName>) -> anyhow::Result<SymRefName> {
        let source = source.unwrap_or_else(|| SymRefName::new(HEAD.to_string()));

        match SymRefOrOid::read_symref_or_oid(&self.path.join(source.as_ref_path()))? {
            Some(SymRefOrOid::SymRef { sym_ref_name }) => self.current_ref(Some(sym_ref_name)),
            Some(_) | None => Ok(source),
        }
    }

    pub fn is_current_branch(&self, branch_name: &BranchName) -> anyhow::Result<bool> {
        let current_ref = self.current_ref(None)?;
        Ok(current_ref.as_ref_path() == format!("{}/{}", HEADS_DIR, branch_name))
    }

    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        self.read_symref(&self.head_path())
    }

    /// Resolve a ref by name.
    ///
    /// `name` is looked up as given, then under `refs/`, `refs/heads/` and
    /// `refs/remotes/`. Returns `None` when no such ref exists.
    pub fn read_ref(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        match self.find_ref_path(name) {
            Some(path) => self.read_symref(&path),
            None => Ok(None),
        }
    }

    /// Whether `name` names an existing ref file.
    pub fn ref_exists(&self, name: &str) -> bool {
        self.find_ref_path(name).is_some()
    }

    fn find_ref_path(&self, name: &str) -> Option<PathBuf> {
        [
            self.path.to_path_buf(),
            self.refs_path(),
            self.heads_path(),
            self.remotes_path(),
        ]
        .iter()
        .map(|base_path| base_path.join(name))
        .find(|path| path.is_file())
    }

    fn read_symref(&self, path: &Path) -> anyhow::Result<Option<ObjectId>> {
        match SymRefOrOid::read_symref_or_oid(path)? {
            Some(SymRefOrOid::SymRef { sym_ref_name }) => {
                self.read_symref(&self.path.join(sym_ref_name.as_ref_path()))
            }
            Some(SymRefOrOid::Oid(oid)) => Ok(Some(oid)),
            None => Ok(None),
        }
    }

    /// Point whatever HEAD resolves to at `oid`.
    ///
    /// On a branch this moves the branch; when detached it rewrites HEAD.
    pub fn update_head(&self, oid: &ObjectId) -> anyhow::Result<()> {
        self.update_symref(&self.head_path(), oid)
    }

    fn update_symref(&self, path: &Path, oid: &ObjectId) -> anyhow::Result<()> {
        let lockfile = Lockfile::acquire(path)?;

        match SymRefOrOid::read_symref_or_oid(path)? {
            Some(SymRefOrOid::SymRef { sym_ref_name }) => {
                lockfile.rollback()?;
                self.update_symref(&self.path.join(sym_ref_name.as_ref_path()), oid)
            }
            Some(SymRefOrOid::Oid(_)) | None => Self::write_locked(lockfile, oid.as_ref()),
        }
    }

    /// Attach HEAD to branch `revision` if it exists, otherwise detach it at `oid`.
    pub fn set_head(&self, revision: &str, oid: &ObjectId) -> anyhow::Result<()> {
        let content = if self.heads_path().join(revision).is_file() {
            format!("ref: {}/{}", HEADS_DIR, revision)
        } else {
            oid.to_string()
        };

        Self::write_locked(Lockfile::acquire(self.head_path())?, &content)
    }

    /// Make HEAD a symbolic ref to `target` (e.g. `refs/heads/main`).
    pub fn set_head_symref(&self, target: &str) -> anyhow::Result<()> {
        Self::write_locked(
            Lockfile::acquire(self.head_path())?,
            &format!("ref: {}", target),
        )
    }

    /// Write `oid` to the ref at `name`, relative to `.git` (e.g. `ORIG_HEAD`).
    pub fn update_ref(&self, name: &str, oid: &ObjectId) -> anyhow::Result<()> {
        Self::write_locked(Lockfile::acquire(self.path.join(name))?, oid.as_ref())
    }

    /// Atomically move `name` from `old` to `new`.
    ///
    /// `None` as `old` means the ref must not exist, `None` as `new` deletes
    /// it. Fails without touching the ref if its current value is not `old`,
    /// and with `RepoError::InvalidRefName` if `name` is not a ref under `refs/`.
    pub fn compare_and_swap(
        &self,
        name: &str,
        old: Option<&ObjectId>,
        new: Option<&ObjectId>,
    ) -> anyhow::Result<()> {
        check_ref_format(name)?;
        let path = self.path.join(name);
        let lockfile = Lockfile::acquire(&path)?;

        let current = match SymRefOrOid::read_symref_or_oid(&path)? {
            Some(SymRefOrOid::Oid(oid)) => Some(oid),
            Some(SymRefOrOid::SymRef { .. }) => {
                lockfile.rollback()?;
                anyhow::bail!("cannot compare-and-swap symbolic ref {}", name);
            }
            None => None,
        };

        if current.as_ref() != old {
            lockfile.rollback()?;
            anyhow::bail!(
                "ref {} is at {} but expected {}",
                name,
                current.map(|oid| oid.to_string()).unwrap_or_else(|| "nothing".to_string()),
                old.map(|oid| oid.to_string()).unwrap_or_else(|| "nothing".to_string()),
            );
        }

        debug!(%name, ?old, ?new, "compare-and-swap ref");
        match new {
            Some(new) => Self::write_locked(lockfile, new.as_ref()),
            None => {
                if path.exists() {
                    std::fs::remove_file(&path)
                        .with_context(|| format!("failed to delete ref {}", name))?;
                }
                lockfile.rollback()?;
                self.prune_empty_parent_dirs(&path)
            }
        }
    }

    /// Remove a top-level ref such as `ORIG_HEAD`; missing refs are ignored.
    pub fn delete_ref(&self, name: &str) -> anyhow::Result<()> {
        let path = self.path.join(name);
        let lockfile = Lockfile::acquire(&path)?;

        if path.exists() {
            std::fs::remove_file(&path).with_context(|| format!("failed to delete ref {}", name))?;
        }

        lockfile.rollback()
    }

    fn write_locked(mut lockfile: Lockfile, content: &str) -> anyhow::Result<()> {
        lockfile.write_all(content.as_bytes())?;
        lockfile.write_all(b"\n")?;
        lockfile.commit()
    }

    pub fn create_branch(&self, name: &BranchName, source_oid: &ObjectId) -> anyhow::Result<()> {
        let branch_path = self.heads_path().join(name.as_ref());

        if branch_path.exists() {
            anyhow::bail!("A branch named '{}' already exists.", name);
        }

        Self::write_locked(Lockfile::acquire(&branch_path)?, source_oid.as_ref())
    }

    pub fn delete_branch(&self, name: &BranchName) -> anyhow::Result<ObjectId> {
        let ref_name = format!("{}/{}", HEADS_DIR, name);

        match self.read_symref(&self.path.join(&ref_name))? {
            Some(oid) => {
                self.compare_and_swap(&ref_name, Some(&oid), None)?;
                Ok(oid)
            }
            None => anyhow::bail!(RepoError::NotFound(format!("branch '{}' not found.", name))),
        }
    }

    pub fn list_branches(&self) -> anyhow::Result<Vec<SymRefName>> {
        self.list_refs(&self.heads_path())
    }

    pub fn list_remotes(&self) -> anyhow::Result<Vec<SymRefName>> {
        self.list_refs(&self.remotes_path())
    }

    /// Every ref under `refs/`, sorted by name.
    pub fn list_all_refs(&self) -> anyhow::Result<Vec<SymRefName>> {
        self.list_refs(&self.refs_path())
    }

    /// `(name, oid)` for every ref under `refs/` with a value.
    pub fn all_ref_values(&self) -> anyhow::Result<Vec<(SymRefName, ObjectId)>> {
        let mut values = Vec::new();
        for sym_ref in self.list_all_refs()? {
            if let Some(oid) = self.read_symref(&self.path.join(sym_ref.as_ref_path()))? {
                values.push((sym_ref, oid));
            }
        }

        Ok(values)
    }

    fn list_refs(&self, path: &Path) -> anyhow::Result<Vec<SymRefName>> {
        let mut refs = WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .extension()
                    .is_none_or(|extension| extension != "lock")
            })
            .filter_map(|entry| {
                let relative_path = entry.path().strip_prefix(&self.path).ok()?;
                Some(SymRefName::new(
                    relative_path.to_string_lossy().replace('\\', "/"),
                ))
            })
            .collect::<Vec<_>>();
        refs.sort();

        Ok(refs)
    }

    /// Commit id to the refs pointing at it, HEAD included.
    pub fn reverse_refs(&self) -> anyhow::Result<HashMap<ObjectId, Vec<SymRefName>>> {
        let mut reverse = HashMap::<ObjectId, Vec<SymRefName>>::new();

        for (sym_ref, oid) in self.all_ref_values()? {
            reverse.entry(oid).or_default().push(sym_ref);
        }
        if let Some(oid) = self.read_head()? {
            reverse
                .entry(oid)
                .or_default()
                .push(SymRefName::new(HEAD.to_string()));
        }

        Ok(reverse)
    }

    /// `refs/heads/main` -> `main`, `refs/remotes/origin/main` -> `origin/main`.
    pub fn short_name(&self, sym_ref: &SymRefName) -> String {
        let name = sym_ref.as_ref_path();

        [HEADS_DIR, REMOTES_DIR, REFS_DIR]
            .iter()
            .find_map(|prefix| name.strip_prefix(&format!("{}/", prefix)))
            .unwrap_or(name)
            .to_string()
    }

    fn prune_empty_parent_dirs(&self, path: &Path) -> anyhow::Result<()> {
        let stop_dirs = [self.heads_path(), self.remotes_path(), self.refs_path()];

        if let Some(parent) = path.parent()
            && !stop_dirs.iter().any(|dir| dir == parent)
            && parent.starts_with(self.refs_path())
            && parent.read_dir()?.next().is_none()
        {
            std::fs::remove_dir(parent).with_context(|| {
                format!("failed to remove empty ref directory at {:?}", parent)
            })?;
            self.prune_empty_parent_dirs(parent)?;
        }

        Ok(())
    }
}
