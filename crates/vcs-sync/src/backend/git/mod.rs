//! Git backend implementation for the VCS abstraction layer
//!
//! Working-tree mutations and network operations run through the `git` CLI
//! ([`cli::GitCli`]); read-only graph queries use git2.

mod branches;
mod changes;
pub(crate) mod cli;
mod conflicts;
mod env;
mod history;
mod lfs;
mod porcelain;
mod remotes;
mod shelf;

pub use cli::{GitCli, GitCliError, StreamOutcome, StreamOutput, StreamSource};

use crate::config::{GitEnvironment, RepoConfig};
use crate::error::VcsError;
use crate::factory::VcsBackendType;
use crate::progress::{
    is_lfs_smudge_error, parse_progress_line, Progress, ProgressPhase, ProgressTracker,
    ProgressUpdate,
};
use crate::traits::*;
use crate::types::*;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use git2::{ErrorCode, Repository};
use utils::path::PathspecFile;
use walkdir::WalkDir;

/// Above this many paths, bulk commands read them from a pathspec file
const PATHSPEC_THRESHOLD: usize = 20;

const EMPTY_TREE_SHA1: &str = "4b825dc642cb6eb9a060e54bf8d69288fbee4904";
const EMPTY_TREE_SHA256: &str = "6ef19b41225c5369f1c104d45d8d85efa9b057b53b14b4b9b939dd74decc5321";

/// Git implementation of VCS backend
pub struct GitRepository {
    path: PathBuf,
    git_dir: PathBuf,
    repo: Repository,
    environment: GitEnvironment,
}

impl GitRepository {
    /// Create a new GitRepository from an existing git2::Repository
    pub fn from_git2(repo: Repository, environment: GitEnvironment) -> Result<Self, VcsError> {
        let path = repo
            .workdir()
            .ok_or_else(|| VcsError::InvalidOperation("Bare repositories not supported".into()))?
            .to_path_buf();
        let git_dir = repo.path().to_path_buf();

        Ok(Self {
            path,
            git_dir,
            repo,
            environment,
        })
    }

    /// Get the underlying git2::Repository
    pub fn git2_repo(&self) -> &Repository {
        &self.repo
    }

    pub fn environment(&self) -> &GitEnvironment {
        &self.environment
    }

    /// Release the repository handle
    pub fn close(self) {
        tracing::debug!(repo = %self.path.display(), "closing repository");
    }

    /// Runner configured for this repository's remote
    pub(crate) fn cli(&self) -> Result<GitCli, VcsError> {
        let remote_url = self
            .default_remote()
            .and_then(|remote| self.remote_url(&remote));
        Ok(GitCli::new(&self.environment, remote_url.as_deref())?)
    }

    /// Run a git command in the working tree and return its stdout
    pub(crate) fn git<I, S>(&self, args: I) -> Result<String, VcsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        Ok(self.cli()?.git(&self.path, args)?)
    }

    /// Run `args` followed by `paths`, switching to `--pathspec-from-file`
    /// for long path lists
    pub(crate) fn git_with_paths(
        &self,
        args: &[&str],
        paths: &[String],
        spec_name: &str,
    ) -> Result<String, VcsError> {
        let (argv, _spec) = path_args(args, paths, spec_name)?;
        self.git(argv)
    }

    /// Branch HEAD points at, also for unborn branches
    pub(crate) fn head_branch_name(&self) -> Option<String> {
        let head = self.repo.find_reference("HEAD").ok()?;
        head.symbolic_target()
            .and_then(|target| target.strip_prefix("refs/heads/"))
            .map(str::to_string)
    }

    /// `branch.<b>.remote`, else the first configured remote
    pub(crate) fn default_remote(&self) -> Option<String> {
        if let Some(branch) = self.head_branch_name() {
            if let Some(remote) = self.config_string(&format!("branch.{branch}.remote")) {
                return Some(remote);
            }
        }

        let remotes = self.repo.remotes().ok()?;
        let first = remotes.iter().flatten().next().map(str::to_string);
        first
    }

    pub(crate) fn remote_url(&self, remote: &str) -> Option<String> {
        self.config_string(&format!("remote.{remote}.url"))
    }

    pub(crate) fn config_string(&self, key: &str) -> Option<String> {
        let config = self.repo.config().ok()?;
        config.get_string(key).ok().filter(|value| !value.is_empty())
    }

    /// Object id of the empty tree in this repository's hash format
    pub(crate) fn empty_tree_id(&self) -> Result<&'static str, VcsError> {
        let format = self.git(["rev-parse", "--show-object-format"])?;
        Ok(if format.trim() == "sha256" {
            EMPTY_TREE_SHA256
        } else {
            EMPTY_TREE_SHA1
        })
    }

    /// Convert ChangeId to git2::Oid
    pub(crate) fn change_id_to_oid(id: &ChangeId) -> Result<git2::Oid, VcsError> {
        git2::Oid::from_str(id.as_str()).map_err(|_| VcsError::InvalidChangeId(id.to_string()))
    }
}

/// Build `args -- paths` or `args --pathspec-from-file=<file>`. The returned
/// file must outlive the command.
pub(crate) fn path_args(
    args: &[&str],
    paths: &[String],
    spec_name: &str,
) -> Result<(Vec<OsString>, Option<PathspecFile>), VcsError> {
    let mut argv: Vec<OsString> = args.iter().map(OsString::from).collect();

    if paths.len() > PATHSPEC_THRESHOLD {
        let spec = PathspecFile::write(spec_name, paths)?;
        let mut arg = OsString::from("--pathspec-from-file=");
        arg.push(spec.path());
        argv.push(arg);
        Ok((argv, Some(spec)))
    } else {
        argv.push("--".into());
        argv.extend(paths.iter().map(OsString::from));
        Ok((argv, None))
    }
}

/// Run a network command, forwarding progress and honoring cancellation
fn run_transfer<I, S>(
    cli: &GitCli,
    dir: &Path,
    args: I,
    progress: Option<&dyn Progress>,
) -> Result<StreamOutcome, GitCliError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    if let Some(progress) = progress {
        progress.on_update(&ProgressUpdate::indeterminate(ProgressPhase::TalkingToServer));
    }

    let mut tracker = ProgressTracker::new();
    let mut on_line = |line: &str| {
        if is_lfs_smudge_error(line) {
            tracing::warn!(line, "git-lfs smudge error");
            return;
        }
        if let Some(progress) = progress {
            if let Some(update) = parse_progress_line(line).and_then(|u| tracker.accept(u)) {
                progress.on_update(&update);
            }
        }
    };
    let is_canceled = || progress.is_some_and(|p| p.is_canceled());

    cli.git_streaming(dir, args, StreamSource::Stderr, &mut on_line, &is_canceled)
}

/// First working tree strictly below `path` (the metadata directory of `path`
/// itself is skipped)
pub(crate) fn find_nested_repository(path: &Path) -> Option<PathBuf> {
    WalkDir::new(path)
        .max_depth(4)
        .into_iter()
        .filter_entry(|entry| entry.depth() != 1 || entry.file_name() != ".git")
        .filter_map(Result::ok)
        .find(|entry| entry.depth() >= 2 && entry.file_name() == ".git")
        .and_then(|entry| entry.path().parent().map(Path::to_path_buf))
}

// ============================================================================
// VcsRepository Implementation
// ============================================================================

impl VcsRepository for GitRepository {
    fn load(config: &RepoConfig) -> Result<Self, VcsError> {
        let repo = match Repository::discover(&config.path) {
            Ok(repo) => repo,
            Err(e) if e.code() == ErrorCode::NotFound => {
                if let Some(nested) = find_nested_repository(&config.path) {
                    return Err(VcsError::RepositoryInSubfolder(nested));
                }
                return Err(VcsError::repo_not_found(&config.path));
            }
            Err(e) => return Err(VcsError::backend(e)),
        };

        let repository = Self::from_git2(repo, config.environment.clone())?;
        tracing::debug!(repo = %repository.path.display(), "loaded repository");

        if let Some(identity) = &config.identity {
            repository.set_username(&identity.name, &identity.email)?;
        }
        Ok(repository)
    }

    fn create(config: &RepoConfig) -> Result<Self, VcsError> {
        if !config.path.exists() {
            std::fs::create_dir_all(&config.path)?;
        }

        let cli = GitCli::new(&config.environment, None)?;
        cli.git(&config.path, ["init", "-b", "main"])?;
        tracing::info!(repo = %config.path.display(), "initialized repository");

        Self::load(config)
    }

    fn clone(
        url: &str,
        config: &RepoConfig,
        progress: Option<&dyn Progress>,
    ) -> Result<Self, VcsError> {
        let target = std::path::absolute(&config.path)?;
        let parent = target
            .parent()
            .ok_or_else(|| VcsError::InvalidOperation("Cannot clone into a filesystem root".into()))?;
        std::fs::create_dir_all(parent)?;

        let cli = GitCli::new(&config.environment, Some(url))?;
        let args: [&OsStr; 4] = [
            "clone".as_ref(),
            "--progress".as_ref(),
            url.as_ref(),
            target.as_os_str(),
        ];
        match run_transfer(&cli, parent, args, progress)? {
            StreamOutcome::Completed(_) => {
                tracing::info!(url, repo = %target.display(), "cloned repository");
            }
            StreamOutcome::Canceled => return Err(VcsError::Canceled),
        }

        Self::load(&RepoConfig {
            path: target,
            identity: config.identity.clone(),
            environment: config.environment.clone(),
        })
    }

    fn work_dir(&self) -> &Path {
        &self.path
    }

    fn metadata_dir(&self) -> &Path {
        &self.git_dir
    }

    fn head(&self) -> Result<HeadInfo, VcsError> {
        match self.repo.head() {
            Ok(head) => {
                let oid = head
                    .target()
                    .ok_or_else(|| VcsError::InvalidOperation("HEAD has no target".into()))?;
                let change_id = ChangeId::from(oid);
                if head.is_branch() {
                    let branch = head
                        .shorthand()
                        .map(String::from)
                        .ok_or_else(|| VcsError::InvalidOperation("Invalid branch name".into()))?;
                    Ok(HeadInfo::Branch { branch, change_id })
                } else {
                    Ok(HeadInfo::Detached { change_id })
                }
            }
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                let branch = self.head_branch_name().ok_or(VcsError::UnbornBranch)?;
                Ok(HeadInfo::Unborn { branch })
            }
            Err(e) => Err(VcsError::backend(e)),
        }
    }

    fn is_clean(&self) -> Result<bool, VcsError> {
        // Check for ongoing operations
        if self.repo.state() != git2::RepositoryState::Clean {
            return Ok(false);
        }

        // Check for conflicts
        let mut index = self.repo.index().map_err(VcsError::backend)?;
        index.read(false).map_err(VcsError::backend)?;
        Ok(!index.has_conflicts())
    }

    fn is_valid(&self) -> bool {
        !self.repo.is_bare() && self.git_dir.exists()
    }

    fn is_unborn(&self) -> bool {
        self.repo.revparse_single("HEAD").is_err()
    }

    fn is_head_detached(&self) -> bool {
        self.repo.head_detached().unwrap_or(false)
    }

    fn current_branch_name(&self) -> Result<String, VcsError> {
        self.head_branch_name().ok_or(VcsError::DetachedHead)
    }

    fn set_username(&self, name: &str, email: &str) -> Result<(), VcsError> {
        let apply = || -> Result<(), VcsError> {
            self.git(["config", "user.name", name])?;
            self.git(["config", "user.email", email])?;
            Ok(())
        };

        match apply() {
            Ok(()) => Ok(()),
            Err(err) => {
                // Repositories on drives without ownership info (FAT32, network
                // shares) are refused until marked safe.
                tracing::warn!(%err, repo = %self.path.display(), "setting identity failed, marking directory safe");
                let safe = self.path.to_string_lossy().replace('\\', "/");
                self.git(["config", "--global", "--add", "safe.directory", safe.as_str()])?;
                apply()
            }
        }
    }

    fn ongoing_operation(&self) -> Result<Option<ConflictOperation>, VcsError> {
        match self.repo.state() {
            git2::RepositoryState::Merge => Ok(Some(ConflictOperation::Merge)),
            git2::RepositoryState::Rebase
            | git2::RepositoryState::RebaseInteractive
            | git2::RepositoryState::RebaseMerge
            | git2::RepositoryState::ApplyMailboxOrRebase => Ok(Some(ConflictOperation::Rebase)),
            git2::RepositoryState::CherryPick | git2::RepositoryState::CherryPickSequence => {
                Ok(Some(ConflictOperation::CherryPick))
            }
            git2::RepositoryState::Revert | git2::RepositoryState::RevertSequence => {
                Ok(Some(ConflictOperation::Revert))
            }
            _ => Ok(None),
        }
    }

    fn is_rebasing(&self) -> bool {
        self.git_dir.join("rebase-merge").exists() || self.git_dir.join("rebase-apply").exists()
    }

    fn continue_rebasing(&self) -> Result<(), VcsError> {
        self.git(["-c", "core.editor=true", "rebase", "--continue"])?;
        Ok(())
    }

    fn abort_rebasing(&self) -> Result<(), VcsError> {
        self.git(["rebase", "--abort"])?;
        Ok(())
    }

    fn is_merging(&self) -> bool {
        self.git_dir.join("MERGE_HEAD").exists()
    }

    fn continue_merge(&self) -> Result<(), VcsError> {
        self.git(["-c", "core.editor=true", "merge", "--continue"])?;
        Ok(())
    }

    fn abort_merge(&self) -> Result<(), VcsError> {
        self.git(["merge", "--abort"])?;
        Ok(())
    }
}

// ============================================================================
// VcsBackend Implementation
// ============================================================================

impl VcsBackend for GitRepository {
    fn backend_type(&self) -> VcsBackendType {
        VcsBackendType::Git
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::TempDir;

    pub(crate) fn setup_test_repo() -> (TempDir, GitRepository) {
        let temp = TempDir::new().unwrap();
        let config = RepoConfig::new(temp.path()).with_identity("Test User", "test@example.com");
        let repo = GitRepository::create(&config).unwrap();
        (temp, repo)
    }

    /// A bare `origin` under `temp/remote.git` and a first clone of it
    pub(crate) fn setup_with_remote() -> (TempDir, GitRepository) {
        let temp = TempDir::new().unwrap();
        let bare = temp.path().join("remote.git");
        let status = std::process::Command::new("git")
            .args(["init", "--bare", "-b", "main"])
            .arg(&bare)
            .status()
            .unwrap();
        assert!(status.success());

        let repo = clone_remote(&temp, "first");
        // older git names the unborn branch of an empty clone after init.defaultBranch
        repo.git(["symbolic-ref", "HEAD", "refs/heads/main"]).unwrap();
        (temp, repo)
    }

    pub(crate) fn clone_remote(temp: &TempDir, name: &str) -> GitRepository {
        let url = temp.path().join("remote.git");
        let config =
            RepoConfig::new(temp.path().join(name)).with_identity("Test User", "test@example.com");
        GitRepository::clone(url.to_str().unwrap(), &config, None).unwrap()
    }

    pub(crate) fn commit_file(repo: &GitRepository, name: &str, content: &str) -> ChangeId {
        let path = repo.work_dir().join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
        repo.stage_files(&[name.to_string()], None).unwrap();
        repo.commit(&format!("Update {name}")).unwrap()
    }

    #[test]
    fn test_create_repository() {
        let (_temp, repo) = setup_test_repo();
        assert!(repo.is_valid());
        assert!(repo.is_unborn());
        assert_eq!(
            repo.head().unwrap(),
            HeadInfo::Unborn {
                branch: "main".to_string()
            }
        );
        assert_eq!(repo.config_string("user.email").as_deref(), Some("test@example.com"));
    }

    #[test]
    fn test_head_after_commit() {
        let (_temp, repo) = setup_test_repo();
        let id = commit_file(&repo, "README.md", "hello");

        let head = repo.head().unwrap();
        assert_eq!(head.branch(), Some("main"));
        assert_eq!(head.change_id(), Some(&id));
        assert!(!repo.is_unborn());
        assert!(!repo.is_head_detached());
        assert_eq!(repo.current_branch_name().unwrap(), "main");
    }

    #[test]
    fn test_is_clean() {
        let (_temp, repo) = setup_test_repo();
        commit_file(&repo, "a.txt", "a");
        assert!(repo.is_clean().unwrap());
        assert_eq!(repo.ongoing_operation().unwrap(), None);
        assert!(!repo.is_merging());
        assert!(!repo.is_rebasing());
    }

    #[test]
    fn test_load_searches_parent_directories() {
        let (temp, repo) = setup_test_repo();
        std::fs::create_dir_all(temp.path().join("Assets/Models")).unwrap();

        let loaded =
            GitRepository::load(&RepoConfig::new(temp.path().join("Assets/Models"))).unwrap();
        assert_eq!(
            loaded.work_dir().canonicalize().unwrap(),
            repo.work_dir().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_load_reports_repository_in_subfolder() {
        let temp = TempDir::new().unwrap();
        let inner = temp.path().join("game");
        GitRepository::create(&RepoConfig::new(&inner)).unwrap();

        match GitRepository::load(&RepoConfig::new(temp.path())) {
            Err(VcsError::RepositoryInSubfolder(path)) => assert_eq!(path, inner),
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("expected an error"),
        }
    }

    #[test]
    fn test_load_missing_repository() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            GitRepository::load(&RepoConfig::new(temp.path())),
            Err(VcsError::RepositoryNotFound(_))
        ));
    }

    #[test]
    fn test_empty_tree_id() {
        let (_temp, repo) = setup_test_repo();
        assert_eq!(repo.empty_tree_id().unwrap(), EMPTY_TREE_SHA1);
    }

    #[test]
    fn test_path_args_switches_to_pathspec_file() {
        let few: Vec<String> = (0..3).map(|i| format!("f{i}")).collect();
        let (argv, spec) = path_args(&["add"], &few, "stage_spec").unwrap();
        assert!(spec.is_none());
        assert_eq!(argv, vec!["add", "--", "f0", "f1", "f2"]);

        let many: Vec<String> = (0..21).map(|i| format!("f{i}")).collect();
        let (argv, spec) = path_args(&["add"], &many, "stage_spec").unwrap();
        let spec = spec.unwrap();
        assert_eq!(argv.len(), 2);
        assert!(argv[1].to_string_lossy().starts_with("--pathspec-from-file="));
        assert_eq!(std::fs::read_to_string(spec.path()).unwrap().lines().count(), 21);
    }
}
