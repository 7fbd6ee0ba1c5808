//! Read-only queries over the commit graph
//!
//! Every walk loads commits through the database's commit cache, so repeated
//! queries in one command (merge-base, then ancestry checks, then a rev list)
//! parse each commit at most once.

use crate::areas::database::Database;
use crate::artifacts::merge::bca_finder::BCAFinder;
use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object::ObjectBox;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepoError;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tracing::debug;

pub struct RevisionGraph<'d> {
    database: &'d Database,
}

impl<'d> RevisionGraph<'d> {
    pub fn new(database: &'d Database) -> Self {
        Self { database }
    }

    fn load(&self, oid: &ObjectId) -> anyhow::Result<SlimCommit> {
        self.database.load_slim_commit(oid)
    }

    /// Whether `ancestor` is reachable from `descendant` by parent edges.
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> anyhow::Result<bool> {
        BCAFinder::new(|oid| self.load(oid)).is_ancestor(ancestor, descendant)
    }

    /// Every best common ancestor, sorted by id.
    pub fn best_common_ancestors(
        &self,
        left: &ObjectId,
        right: &ObjectId,
    ) -> anyhow::Result<Vec<ObjectId>> {
        BCAFinder::new(|oid| self.load(oid)).find_best_common_ancestors(left, right)
    }

    /// The single merge base of `left` and `right`.
    ///
    /// When several best common ancestors exist they are taken in id order
    /// and folded pairwise with this same function, which makes the result
    /// independent of argument order. Candidates from disjoint root
    /// histories cannot be folded; the one with the lower id is kept.
    pub fn merge_base(&self, left: &ObjectId, right: &ObjectId) -> anyhow::Result<ObjectId> {
        let candidates = self.best_common_ancestors(left, right)?;
        let mut candidates = candidates.into_iter();

        let Some(mut base) = candidates.next() else {
            anyhow::bail!(RepoError::Unrelated(left.clone(), right.clone()));
        };

        for candidate in candidates {
            debug!(%base, %candidate, "folding merge base candidates");
            base = match self.merge_base(&base, &candidate) {
                Ok(folded) => folded,
                Err(error) if matches!(RepoError::from_anyhow(&error), Some(RepoError::Unrelated(..))) => {
                    debug!(%base, %candidate, "candidates share no ancestor, keeping the first");
                    base
                }
                Err(error) => return Err(error),
            };
        }

        Ok(base)
    }

    /// Commits reachable from `includes` but not from `excludes`, in
    /// topological order: every commit comes before its parents. Among
    /// commits that are ready at the same time the newest goes first, so a
    /// parent with a skewed clock never lands between its children.
    pub fn rev_list(
        &self,
        includes: &[ObjectId],
        excludes: &[ObjectId],
    ) -> anyhow::Result<Vec<ObjectId>> {
        let excluded = self.reachable_commits(excludes, &HashSet::new())?;
        let included = self.reachable_commits(includes, &excluded)?;

        self.topo_order(&included)
    }

    fn topo_order(&self, oids: &HashSet<ObjectId>) -> anyhow::Result<Vec<ObjectId>> {
        let commits = oids
            .iter()
            .map(|oid| self.load(oid))
            .collect::<anyhow::Result<Vec<_>>>()?;

        let mut children_count = HashMap::<ObjectId, usize>::new();
        for commit in &commits {
            for parent in commit.parents.iter().filter(|parent| oids.contains(*parent)) {
                *children_count.entry(parent.clone()).or_default() += 1;
            }
        }

        let mut ready = commits
            .iter()
            .filter(|commit| !children_count.contains_key(&commit.oid))
            .cloned()
            .collect::<BinaryHeap<_>>();

        let mut order = Vec::with_capacity(commits.len());
        while let Some(commit) = ready.pop() {
            for parent in &commit.parents {
                let Some(count) = children_count.get_mut(parent) else {
                    continue;
                };
                *count -= 1;
                if *count == 0 {
                    ready.push(self.load(parent)?);
                }
            }
            order.push(commit.oid);
        }

        Ok(order)
    }

    /// Commits reachable from `tips` without passing through `stop`.
    fn reachable_commits(
        &self,
        tips: &[ObjectId],
        stop: &HashSet<ObjectId>,
    ) -> anyhow::Result<HashSet<ObjectId>> {
        let mut seen = HashSet::new();
        let mut stack = tips.to_vec();

        while let Some(oid) = stack.pop() {
            if stop.contains(&oid) || !seen.insert(oid.clone()) {
                continue;
            }
            stack.extend(self.load(&oid)?.parents);
        }

        Ok(seen)
    }

    /// Ids of every object a peer holding `haves` needs to reconstruct `wants`.
    ///
    /// Commits come newest first, followed by the trees and blobs they
    /// introduce. Objects reachable from the trees of boundary commits (the
    /// excluded parents of sent commits) are left out. Unknown `haves` are
    /// ignored; tags in `wants` are sent and peeled.
    pub fn reachable_objects(
        &self,
        wants: &[ObjectId],
        haves: &[ObjectId],
    ) -> anyhow::Result<Vec<ObjectId>> {
        let mut objects = Vec::new();
        let mut want_commits = Vec::new();

        for oid in wants {
            let mut oid = oid.clone();
            while let ObjectBox::Tag(tag) = self.database.parse_object(&oid)? {
                objects.push(oid.clone());
                oid = tag.target().clone();
            }
            want_commits.push(oid);
        }

        let mut known_haves = Vec::new();
        for oid in haves {
            if self.database.has(oid)? && self.database.parse_object_as_commit(oid)?.is_some() {
                known_haves.push(oid.clone());
            }
        }

        let commits = self.rev_list(&want_commits, &known_haves)?;
        let sent = commits.iter().cloned().collect::<HashSet<_>>();

        let mut shared = HashSet::new();
        for commit_oid in &commits {
            for parent in &self.load(commit_oid)?.parents {
                if !sent.contains(parent) {
                    let tree = self.database.load_commit(parent)?.tree_oid().clone();
                    self.collect_tree(&tree, &mut shared, &mut Vec::new())?;
                }
            }
        }

        let mut trees_and_blobs = Vec::new();
        for commit_oid in &commits {
            let tree = self.database.load_commit(commit_oid)?.tree_oid().clone();
            self.collect_tree(&tree, &mut shared, &mut trees_and_blobs)?;
        }

        objects.extend(commits);
        objects.extend(trees_and_blobs);
        debug!(count = objects.len(), "objects selected for packing");

        Ok(objects)
    }

    fn collect_tree(
        &self,
        tree_oid: &ObjectId,
        seen: &mut HashSet<ObjectId>,
        out: &mut Vec<ObjectId>,
    ) -> anyhow::Result<()> {
        if !seen.insert(tree_oid.clone()) {
            return Ok(());
        }
        out.push(tree_oid.clone());

        for (_, entry) in self.database.load_tree_of(tree_oid)?.into_entries() {
            if entry.is_tree() {
                self.collect_tree(&entry.oid, seen, out)?;
            } else if seen.insert(entry.oid.clone()) {
                out.push(entry.oid);
            }
        }

        Ok(())
    }
}
