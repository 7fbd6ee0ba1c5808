//! Shared building blocks used by several areas of the repository.

pub mod lockfile;
