use crate::error::VcsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// How the git executable is located and configured for every invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitEnvironment {
    /// Program name or path of the git executable
    pub git_executable: String,
    /// Overrides `GIT_EXEC_PATH` when the bundled git keeps its helpers elsewhere
    pub exec_path: Option<PathBuf>,
    /// Value of `credential.helper`; always registered
    pub credential_helper: String,
    /// Sets `core.longPaths`
    pub long_paths: bool,
    /// Run git-lfs around network operations when the repository uses it
    pub lfs: bool,
}

impl Default for GitEnvironment {
    fn default() -> Self {
        Self {
            git_executable: "git".to_string(),
            exec_path: None,
            credential_helper: "manager".to_string(),
            long_paths: cfg!(windows),
            lfs: true,
        }
    }
}

/// Author identity written to the repository's local config
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub name: String,
    pub email: String,
}

/// Configuration for opening or creating a repository
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub identity: Option<Identity>,
    #[serde(default)]
    pub environment: GitEnvironment,
}

impl RepoConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            identity: None,
            environment: GitEnvironment::default(),
        }
    }

    pub fn with_identity(mut self, name: impl Into<String>, email: impl Into<String>) -> Self {
        self.identity = Some(Identity {
            name: name.into(),
            email: email.into(),
        });
        self
    }

    pub fn with_environment(mut self, environment: GitEnvironment) -> Self {
        self.environment = environment;
        self
    }

    pub fn from_toml_str(s: &str) -> Result<Self, VcsError> {
        toml::from_str(s).map_err(|e| VcsError::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self, VcsError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}
