//! Shared fixtures: a bare "server" repository plus working clones of it.

#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
    process::Command,
};

use tempfile::TempDir;
use vcs_sync::{ChangeId, GitRepository, RepoConfig, VcsChanges, VcsRepository};

pub const USER_NAME: &str = "Test User";
pub const USER_EMAIL: &str = "test@example.com";

/// A temp directory holding `remote.git` and any number of clones
pub struct Sandbox {
    pub root: TempDir,
    pub remote: PathBuf,
}

impl Sandbox {
    pub fn new() -> Self {
        let root = TempDir::new().expect("create temp dir");
        let remote = root.path().join("remote.git");
        let status = Command::new("git")
            .args(["init", "--bare", "-b", "main"])
            .arg(&remote)
            .status()
            .expect("run git init");
        assert!(status.success(), "git init --bare failed");
        Self { root, remote }
    }

    pub fn url(&self) -> &str {
        self.remote.to_str().expect("utf-8 temp path")
    }

    pub fn config(&self, name: &str) -> RepoConfig {
        RepoConfig::new(self.root.path().join(name)).with_identity(USER_NAME, USER_EMAIL)
    }

    /// Clone the remote into `<root>/<name>` with the test identity
    pub fn clone(&self, name: &str) -> GitRepository {
        let repo = GitRepository::clone(self.url(), &self.config(name), None).expect("clone");
        if repo.is_unborn() {
            set_unborn_branch(repo.work_dir(), "main");
        }
        repo
    }

    /// A clone with one pushed commit containing `a.txt`
    pub fn seeded_clone(&self, name: &str) -> GitRepository {
        use vcs_sync::{SyncResult, VcsRemotes};

        let repo = self.clone(name);
        commit_file(&repo, "a.txt", "base\n");
        assert_eq!(repo.push(None).expect("push"), SyncResult::Ok);
        repo
    }
}

/// Point HEAD of an unborn repository at `refs/heads/<name>`
pub fn set_unborn_branch(repo_path: &Path, name: &str) {
    let repo = git2::Repository::open(repo_path).unwrap();
    repo.set_head(&format!("refs/heads/{name}")).unwrap();
}

/// Write a file, creating parent directories
pub fn write_file<P: AsRef<Path>>(base: P, rel: &str, content: &str) {
    let path = base.as_ref().join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

pub fn read_file<P: AsRef<Path>>(base: P, rel: &str) -> String {
    fs::read_to_string(base.as_ref().join(rel)).unwrap()
}

/// Write, stage and commit a single file
pub fn commit_file(repo: &GitRepository, rel: &str, content: &str) -> ChangeId {
    write_file(repo.work_dir(), rel, content);
    repo.stage_files(&[rel.to_string()], None).unwrap();
    repo.commit(&format!("Update {rel}")).unwrap()
}

/// A fresh repository without remote
pub fn init_repo() -> (TempDir, GitRepository) {
    let root = TempDir::new().expect("create temp dir");
    let config = RepoConfig::new(root.path()).with_identity(USER_NAME, USER_EMAIL);
    let repo = GitRepository::create(&config).expect("create repo");
    (root, repo)
}
