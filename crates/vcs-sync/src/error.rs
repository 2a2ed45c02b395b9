use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::backend::git::cli::GitCliError;

/// Errors that can occur during repository operations
///
/// Expected divergence (conflicts, missing upstream, nothing to shelve) is not
/// an error: it is reported through [`crate::SyncResult`], `Option` or `bool`
/// return values instead.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Git repository found in subfolder {0} instead of the project root")]
    RepositoryInSubfolder(PathBuf),

    #[error("Nested git repository at {0}; submodules are not supported")]
    NestedRepository(PathBuf),

    #[error("File is not writable: {0}")]
    FileNotWritable(PathBuf),

    #[error("Another fetch or update is running in this repository")]
    SyncInProgress,

    #[error("Invalid change ID: {0}")]
    InvalidChangeId(String),

    #[error("Branch not found: {0}")]
    BranchNotFound(String),

    #[error("HEAD is detached")]
    DetachedHead,

    #[error("Repository has no commits yet")]
    UnbornBranch,

    #[error("No merge or diff tool configured")]
    NoToolConfigured,

    #[error("External tool not found: {0}")]
    ToolNotFound(String),

    #[error("Operation canceled")]
    Canceled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Git command failed: {0}")]
    Cli(#[from] GitCliError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend-specific error: {0}")]
    Backend(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl VcsError {
    /// Create a RepositoryNotFound error from a path
    pub fn repo_not_found(path: &Path) -> Self {
        Self::RepositoryNotFound(path.display().to_string())
    }

    /// Create a Backend error from any error type
    pub fn backend<E: std::error::Error>(error: E) -> Self {
        Self::Backend(error.to_string())
    }

    /// Structural problems with the project layout. Retrying will not help;
    /// the user has to change the folder structure first.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::RepositoryInSubfolder(_) | Self::NestedRepository(_)
        )
    }

    /// Environment faults that usually go away on their own (a file held open
    /// by another program, for example).
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::FileNotWritable(_) | Self::SyncInProgress)
    }
}
