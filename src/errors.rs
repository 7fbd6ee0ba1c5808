use crate::artifacts::objects::object_id::ObjectId;
use std::path::PathBuf;
use thiserror::Error;

/// Failures callers are expected to recognise and react to.
///
/// Everything else travels as a plain `anyhow::Error` with context attached.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{0}")]
    NotFound(String),

    #[error("corrupt pack: {0}")]
    CorruptPack(String),

    #[error("corrupt object {0}: {1}")]
    CorruptObject(ObjectId, String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    #[error("refusing to merge unrelated histories {0} and {1}")]
    Unrelated(ObjectId, ObjectId),

    #[error("'{0}' is not a valid ref name")]
    InvalidRefName(String),

    #[error("non-fast-forward update of {0}")]
    NonFastForward(String),

    #[error("committing is not possible because you have unmerged files")]
    UnresolvedConflicts,

    #[error("unable to create '{}': file exists; another process seems to be running", .0.display())]
    Locked(PathBuf),

    #[error("{0}")]
    WouldOverwriteChanges(String),
}

impl RepoError {
    pub fn from_anyhow(error: &anyhow::Error) -> Option<&RepoError> {
        error.downcast_ref::<RepoError>()
    }
}
