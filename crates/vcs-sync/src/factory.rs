use crate::backend::git::GitRepository;
use crate::config::RepoConfig;
use crate::error::VcsError;
use crate::progress::Progress;
use crate::traits::{VcsBackend, VcsRepository};
use std::path::Path;

/// Type of VCS backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VcsBackendType {
    Git,
}

/// Factory for creating VCS backends
pub struct VcsFactory;

impl VcsFactory {
    /// Open the repository containing `config.path`
    pub fn load(config: &RepoConfig) -> Result<Box<dyn VcsBackend>, VcsError> {
        Ok(Box::new(GitRepository::load(config)?))
    }

    /// Initialize a new repository at `config.path`
    pub fn create(config: &RepoConfig) -> Result<Box<dyn VcsBackend>, VcsError> {
        Ok(Box::new(GitRepository::create(config)?))
    }

    /// Clone `url` into `config.path`
    pub fn clone(
        url: &str,
        config: &RepoConfig,
        progress: Option<&dyn Progress>,
    ) -> Result<Box<dyn VcsBackend>, VcsError> {
        Ok(Box::new(GitRepository::clone(url, config, progress)?))
    }

    /// True when `path` is the root of a working tree
    pub fn is_repo(path: &Path) -> bool {
        path.join(".git").exists()
    }

    /// Auto-detect backend for `path` or one of its parents
    pub fn detect(path: &Path) -> Result<VcsBackendType, VcsError> {
        if path.ancestors().any(Self::is_repo) {
            Ok(VcsBackendType::Git)
        } else {
            Err(VcsError::repo_not_found(path))
        }
    }
}
