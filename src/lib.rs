//! graft: a distributed version control core
//!
//! The crate is split into three layers:
//!
//! - `areas`: the on-disk state of a repository (objects, refs, index, workspace, config)
//! - `artifacts`: data types and algorithms operating on that state
//! - `commands`: user-facing operations implemented on top of `Repository`

pub mod areas;
pub mod artifacts;
pub mod commands;
pub mod errors;
