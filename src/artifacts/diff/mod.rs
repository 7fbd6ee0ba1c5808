//! Line and tree diffing
//!
//! - `myers`: shortest edit script between two line sequences
//! - `hunk`: grouping of edits into unified-diff hunks
//! - `diff_target`: one side of a file diff (a blob, a workspace file, or nothing)
//! - `tree_diff`: recursive comparison of two trees

pub mod diff_target;
pub mod hunk;
pub mod myers;
pub mod tree_diff;
