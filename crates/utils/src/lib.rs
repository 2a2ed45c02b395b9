//! Shared helpers for the vcs-sync workspace: executable lookup, path
//! normalization for pathspec files, process-keyed lock files and tracing
//! setup.

pub mod lock;
pub mod log;
pub mod path;
pub mod shell;
