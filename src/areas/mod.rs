//! Core repository components
//!
//! This module contains the fundamental building blocks of a Git repository:
//!
//! - `config`: Per-repository settings stored as TOML
//! - `database`: Object database for storing blobs, trees, and commits
//! - `graph`: Ancestry queries and history walks over commits
//! - `index`: Staging area (index/cache) for tracking file changes
//! - `refs`: Reference management (branches, HEAD, tags)
//! - `repository`: High-level repository operations and coordination
//! - `workspace`: Working directory file system operations

pub mod config;
pub mod database;
pub mod graph;
pub mod index;
pub mod refs;
pub mod repository;
pub mod workspace;
