//! Merging histories
//!
//! - `bca_finder`: best common ancestors of two commits
//! - `diff3`: three-way merge of text
//! - `inputs`: the sides and base of a merge
//! - `resolve`: three-way merge of trees into the index and workspace
//! - `pending_commit`: state of a merge, cherry-pick or revert stopped on conflicts
//! - `sequencer`: queue of commits for multi-commit cherry-pick and revert

pub mod bca_finder;
pub mod diff3;
pub mod inputs;
pub mod pending_commit;
pub mod resolve;
pub mod sequencer;
