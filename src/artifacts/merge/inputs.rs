use crate::areas::repository::Repository;
use crate::artifacts::branch::revision::Revision;
use crate::artifacts::objects::object_id::ObjectId;
use crate::errors::RepoError;

/// The two sides of a three-way merge and the base they are compared against.
pub trait MergeInputs {
    fn left_name(&self) -> &str;
    fn right_name(&self) -> &str;
    fn left_oid(&self) -> &ObjectId;
    fn right_oid(&self) -> &ObjectId;
    /// `None` merges against the empty tree.
    fn base_oid(&self) -> Option<&ObjectId>;
}

/// A branch merge: `HEAD` on the left, a revision on the right, and their
/// merge base in between.
#[derive(Debug, Clone)]
pub struct Inputs {
    left_name: String,
    right_name: String,
    left_oid: ObjectId,
    right_oid: ObjectId,
    base_oid: Option<ObjectId>,
}

impl Inputs {
    /// Unrelated histories are refused unless `allow_unrelated`, in which
    /// case they merge against the empty tree.
    pub fn new(
        repository: &Repository,
        left_name: &str,
        right_name: &str,
        allow_unrelated: bool,
    ) -> anyhow::Result<Self> {
        let left_oid = Revision::try_parse(left_name)?.resolve(repository)?;
        let right_oid = Revision::try_parse(right_name)?.resolve(repository)?;

        let base_oid = match repository.database().graph().merge_base(&left_oid, &right_oid) {
            Ok(base) => Some(base),
            Err(error)
                if allow_unrelated
                    && matches!(RepoError::from_anyhow(&error), Some(RepoError::Unrelated(..))) =>
            {
                None
            }
            Err(error) => return Err(error),
        };

        Ok(Self {
            left_name: left_name.to_string(),
            right_name: right_name.to_string(),
            left_oid,
            right_oid,
            base_oid,
        })
    }

    /// The right side is already contained in the left.
    pub fn is_already_merged(&self) -> bool {
        self.base_oid.as_ref() == Some(&self.right_oid)
    }

    /// The left side can simply move forward to the right.
    pub fn is_fast_forward(&self) -> bool {
        self.base_oid.as_ref() == Some(&self.left_oid)
    }
}

impl MergeInputs for Inputs {
    fn left_name(&self) -> &str {
        &self.left_name
    }

    fn right_name(&self) -> &str {
        &self.right_name
    }

    fn left_oid(&self) -> &ObjectId {
        &self.left_oid
    }

    fn right_oid(&self) -> &ObjectId {
        &self.right_oid
    }

    fn base_oid(&self) -> Option<&ObjectId> {
        self.base_oid.as_ref()
    }
}

/// Applying one commit's change on top of `HEAD`. For a revert the picked
/// commit is the base and its parent is the right side.
#[derive(Debug, Clone, derive_new::new)]
pub struct CherryPick {
    left_name: String,
    right_name: String,
    left_oid: ObjectId,
    right_oid: ObjectId,
    base_oid: Option<ObjectId>,
}

impl MergeInputs for CherryPick {
    fn left_name(&self) -> &str {
        &self.left_name
    }

    fn right_name(&self) -> &str {
        &self.right_name
    }

    fn left_oid(&self) -> &ObjectId {
        &self.left_oid
    }

    fn right_oid(&self) -> &ObjectId {
        &self.right_oid
    }

    fn base_oid(&self) -> Option<&ObjectId> {
        self.base_oid.as_ref()
    }
}
