use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::diff::tree_diff::ChangeSet;
use crate::artifacts::log::path_filter::PathFilter;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;

const RANGE_SEPARATOR: &str = "..";
const EXCLUDE_PREFIX: &str = "^";
const DEFAULT_REVISION: &str = "HEAD";

/// The commits selected by `log` arguments.
///
/// `a..b` means reachable from `b` but not from `a` (an empty side is `HEAD`),
/// `^a` excludes everything reachable from `a`, anything else is included.
/// Without any included revision, `HEAD` is used. With paths, only commits
/// touching one of them relative to their first parent are kept.
pub struct RevList<'r> {
    repository: &'r Repository,
    includes: Vec<ObjectId>,
    excludes: Vec<ObjectId>,
    filter: PathFilter,
}

impl<'r> RevList<'r> {
    pub fn new(
        repository: &'r Repository,
        revisions: &[String],
        paths: &[PathBuf],
    ) -> anyhow::Result<Self> {
        let mut includes = Vec::new();
        let mut excludes = Vec::new();

        for revision in revisions {
            if let Some((excluded, included)) = revision.split_once(RANGE_SEPARATOR) {
                excludes.push(Self::resolve(repository, excluded)?);
                includes.push(Self::resolve(repository, included)?);
            } else if let Some(excluded) = revision.strip_prefix(EXCLUDE_PREFIX) {
                excludes.push(Self::resolve(repository, excluded)?);
            } else {
                includes.push(Self::resolve(repository, revision)?);
            }
        }

        if includes.is_empty() {
            includes.push(Self::resolve(repository, DEFAULT_REVISION)?);
        }

        Ok(Self {
            repository,
            includes,
            excludes,
            filter: PathFilter::new(paths),
        })
    }

    fn resolve(repository: &Repository, revision: &str) -> anyhow::Result<ObjectId> {
        let revision = if revision.is_empty() {
            DEFAULT_REVISION
        } else {
            revision
        };

        Revision::try_parse(revision)?.resolve(repository)
    }

    /// Selected commits, newest first.
    pub fn commits(&self) -> anyhow::Result<Vec<(ObjectId, Commit)>> {
        let database = self.repository.database();
        let oids = database.graph().rev_list(&self.includes, &self.excludes)?;

        let mut commits = Vec::with_capacity(oids.len());
        for oid in oids {
            let commit = database.load_commit(&oid)?;
            if self.is_interesting(&commit)? {
                commits.push((oid, commit));
            }
        }

        Ok(commits)
    }

    fn is_interesting(&self, commit: &Commit) -> anyhow::Result<bool> {
        if self.filter == PathFilter::empty() {
            return Ok(true);
        }

        Ok(!self.tree_diff(commit)?.is_empty())
    }

    /// Changes `commit` makes against its first parent, limited to the
    /// selected paths.
    pub fn tree_diff(&self, commit: &Commit) -> anyhow::Result<ChangeSet> {
        let changes = self.repository.database().tree_diff(
            commit.parent(),
            Some(commit.tree_oid()),
            &self.filter,
        )?;

        Ok(changes.into_changes())
    }
}
