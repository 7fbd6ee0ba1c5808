//! Best common ancestor search
//!
//! Phase 1 walks both histories newest first, painting every commit with the
//! side(s) it is reachable from. A commit painted from both sides is a common
//! ancestor; its own ancestors are marked stale since they can never be
//! *best*.
//!
//! Phase 2 drops any remaining candidate that is an ancestor of another
//! candidate. What is left are the best common ancestors; there can be more
//! than one after criss-cross merges.

use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use bitflags::bitflags;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::fmt;
use tracing::debug;

bitflags! {
    #[derive(Clone, Copy, PartialEq, Eq, Hash)]
    struct VisitState: u8 {
        const NONE = 0b0000;
        const VISITED_FROM_SOURCE = 0b0001;
        const VISITED_FROM_TARGET = 0b0010;
        const VISITED_FROM_BOTH = Self::VISITED_FROM_SOURCE.bits() | Self::VISITED_FROM_TARGET.bits();
        const STALE = 0b0100;
        const RESULT = 0b1000;
    }
}

impl fmt::Debug for VisitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .iter_names()
            .map(|(name, _)| name)
            .collect::<Vec<_>>()
            .join("|");

        write!(f, "{}", if names.is_empty() { "NONE" } else { names.as_str() })
    }
}

pub struct BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    commit_loader: CommitLoaderFn,
}

impl<CommitLoaderFn> BCAFinder<CommitLoaderFn>
where
    CommitLoaderFn: Fn(&ObjectId) -> anyhow::Result<SlimCommit>,
{
    /// `commit_loader` yields the parents and timestamp of a commit id.
    pub fn new(commit_loader: CommitLoaderFn) -> Self {
        Self { commit_loader }
    }

    /// All best common ancestors of `source` and `target`, sorted by id.
    ///
    /// Empty when the histories share no commit.
    pub fn find_best_common_ancestors(
        &self,
        source: &ObjectId,
        target: &ObjectId,
    ) -> anyhow::Result<Vec<ObjectId>> {
        let candidates = self.find_common_ancestors(source, &[target.clone()])?;
        debug!(?candidates, "common ancestor candidates");

        if candidates.len() <= 1 {
            return Ok(candidates);
        }

        let mut redundant = HashSet::new();
        for candidate in &candidates {
            if redundant.contains(candidate) {
                continue;
            }

            let others = candidates
                .iter()
                .filter(|other| *other != candidate && !redundant.contains(*other))
                .cloned()
                .collect::<Vec<_>>();
            let states = self.paint(candidate, &others)?;

            if states
                .get(candidate)
                .is_some_and(|state| state.contains(VisitState::VISITED_FROM_TARGET))
            {
                redundant.insert(candidate.clone());
            }
            for other in others {
                if states
                    .get(&other)
                    .is_some_and(|state| state.contains(VisitState::VISITED_FROM_SOURCE))
                {
                    redundant.insert(other);
                }
            }
        }

        debug!(?redundant, "redundant common ancestors");
        Ok(candidates
            .into_iter()
            .filter(|candidate| !redundant.contains(candidate))
            .collect())
    }

    /// Whether `ancestor` is reachable from `descendant` (a commit is its own ancestor).
    pub fn is_ancestor(&self, ancestor: &ObjectId, descendant: &ObjectId) -> anyhow::Result<bool> {
        if ancestor == descendant {
            return Ok(true);
        }

        let states = self.paint(ancestor, &[descendant.clone()])?;
        Ok(states
            .get(ancestor)
            .is_some_and(|state| state.contains(VisitState::VISITED_FROM_TARGET)))
    }

    fn find_common_ancestors(
        &self,
        source: &ObjectId,
        targets: &[ObjectId],
    ) -> anyhow::Result<Vec<ObjectId>> {
        let mut results = self
            .paint(source, targets)?
            .into_iter()
            .filter(|(_, state)| {
                state.contains(VisitState::RESULT) && !state.contains(VisitState::STALE)
            })
            .map(|(oid, _)| oid)
            .collect::<Vec<_>>();
        results.sort();

        Ok(results)
    }

    fn paint(
        &self,
        source: &ObjectId,
        targets: &[ObjectId],
    ) -> anyhow::Result<HashMap<ObjectId, VisitState>> {
        let mut states = HashMap::<ObjectId, VisitState>::new();
        let mut queue = BinaryHeap::new();

        if targets.contains(source) {
            states.insert(source.clone(), VisitState::VISITED_FROM_BOTH | VisitState::RESULT);
            return Ok(states);
        }

        queue.push((self.commit_loader)(source)?);
        states.insert(source.clone(), VisitState::VISITED_FROM_SOURCE);

        for target in targets {
            queue.push((self.commit_loader)(target)?);
            *states.entry(target.clone()).or_insert(VisitState::NONE) |=
                VisitState::VISITED_FROM_TARGET;
        }

        while let Some(commit) = queue.pop() {
            let mut flags = states
                .get(&commit.oid)
                .copied()
                .unwrap_or(VisitState::NONE)
                & (VisitState::VISITED_FROM_BOTH | VisitState::STALE);

            if flags == VisitState::VISITED_FROM_BOTH {
                states
                    .entry(commit.oid.clone())
                    .and_modify(|state| *state |= VisitState::RESULT);
                flags |= VisitState::STALE;
            }

            for parent in &commit.parents {
                let parent_state = states.get(parent).copied().unwrap_or(VisitState::NONE);
                if parent_state.contains(flags) {
                    continue;
                }

                states.insert(parent.clone(), parent_state | flags);
                queue.push((self.commit_loader)(parent)?);
            }
        }

        Ok(states)
    }
}
