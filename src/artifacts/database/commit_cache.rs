use crate::artifacts::objects::commit::SlimCommit;
use crate::artifacts::objects::object_id::ObjectId;
use std::cell::RefCell;
use std::collections::HashMap;

/// Memoizes the graph-relevant fields of commits read during a walk.
#[derive(Debug, Default)]
pub struct CommitCache {
    commits: RefCell<HashMap<ObjectId, SlimCommit>>,
}

impl CommitCache {
    pub fn get_or_load(
        &self,
        oid: &ObjectId,
        load: impl FnOnce(&ObjectId) -> anyhow::Result<SlimCommit>,
    ) -> anyhow::Result<SlimCommit> {
        if let Some(commit) = self.commits.borrow().get(oid) {
            return Ok(commit.clone());
        }

        let commit = load(oid)?;
        self.commits.borrow_mut().insert(oid.clone(), commit.clone());

        Ok(commit)
    }

    pub fn len(&self) -> usize {
        self.commits.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commits.borrow().is_empty()
    }
}
