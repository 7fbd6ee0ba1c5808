//! Types shared by the object database readers
//!
//! `DatabaseEntry` is what a tree lookup yields; the pack submodules hold the
//! packfile and pack index formats.

pub mod commit_cache;
pub mod database_entry;
pub mod pack;
