use crate::config::RepoConfig;
use crate::error::VcsError;
use crate::progress::Progress;
use crate::types::*;
use std::path::Path;

/// Core repository operations
///
/// Lifecycle, identity and the state of HEAD and of any half-finished
/// operation (merge, rebase).
///
/// Note: We don't require Sync because git2::Repository is not Sync.
/// Users should wrap in Arc<Mutex<_>> if they need to share across threads.
pub trait VcsRepository: Send {
    /// Open the repository containing `config.path`, searching parent directories
    fn load(config: &RepoConfig) -> Result<Self, VcsError>
    where
        Self: Sized;

    /// Initialize a new repository on `main` at `config.path`
    fn create(config: &RepoConfig) -> Result<Self, VcsError>
    where
        Self: Sized;

    /// Clone `url` into `config.path`
    fn clone(
        url: &str,
        config: &RepoConfig,
        progress: Option<&dyn Progress>,
    ) -> Result<Self, VcsError>
    where
        Self: Sized;

    /// Get the working directory path
    fn work_dir(&self) -> &Path;

    /// The metadata directory (`.git`)
    fn metadata_dir(&self) -> &Path;

    /// Get the current head information
    fn head(&self) -> Result<HeadInfo, VcsError>;

    /// Check if repository is in a clean state (no conflicts, no ongoing operations)
    fn is_clean(&self) -> Result<bool, VcsError>;

    /// Check if the repository exists and is valid
    fn is_valid(&self) -> bool;

    fn is_unborn(&self) -> bool;

    fn is_head_detached(&self) -> bool;

    /// Name of the checked-out branch; fails on detached HEAD
    fn current_branch_name(&self) -> Result<String, VcsError>;

    /// Write `user.name` / `user.email` to the local config
    fn set_username(&self, name: &str, email: &str) -> Result<(), VcsError>;

    /// Get the type of ongoing operation, if any
    fn ongoing_operation(&self) -> Result<Option<ConflictOperation>, VcsError>;

    fn is_rebasing(&self) -> bool;

    fn continue_rebasing(&self) -> Result<(), VcsError>;

    fn abort_rebasing(&self) -> Result<(), VcsError>;

    fn is_merging(&self) -> bool;

    fn continue_merge(&self) -> Result<(), VcsError>;

    fn abort_merge(&self) -> Result<(), VcsError>;
}

/// Pending changes, staging and commits
pub trait VcsChanges: VcsRepository {
    /// Working tree vs index (plus untracked files) or, with `staged`, index vs HEAD
    fn get_pending_changes(&self, staged: bool) -> Result<ChangeSet, VcsError>;

    /// Changes a commit introduced relative to its first parent
    fn get_changes_for_changelist(&self, id: &ChangeId) -> Result<ChangeSet, VcsError>;

    fn has_pending_changes(&self, include_untracked: bool) -> Result<bool, VcsError>;

    /// Stage `paths`; `on_staged(done, total)` fires once per staged file
    fn stage_files(
        &self,
        paths: &[String],
        on_staged: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<(), VcsError>;

    fn unstage_files(&self, paths: &[String]) -> Result<(), VcsError>;

    fn stage_all(&self) -> Result<(), VcsError>;

    fn unstage_all(&self) -> Result<(), VcsError>;

    /// Make the index contain exactly `paths` (or everything with `add_all`)
    fn sync_staged_files(
        &self,
        paths: &[String],
        add_all: bool,
        on_staged: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<(), VcsError>;

    fn remove_files(&self, paths: &[String]) -> Result<(), VcsError>;

    /// Commit the index
    fn commit(&self, message: &str) -> Result<ChangeId, VcsError>;

    /// Apply the inverse of a commit to the working tree without committing
    fn revert_changelist(&self, id: &ChangeId) -> Result<(), VcsError>;

    /// Bring the working tree files of a commit back, keeping newer files
    fn restore_changelist(&self, id: &ChangeId) -> Result<(), VcsError>;

    fn restore_files(&self, paths: &[String]) -> Result<(), VcsError>;

    fn restore_all_files(&self) -> Result<(), VcsError>;

    /// Delete untracked files and directories
    fn clean(&self) -> Result<(), VcsError>;

    /// Add an ignore pattern; only the local `info/exclude` is supported
    fn ignore(&self, pattern: &str, local_only: bool) -> Result<(), VcsError>;
}

/// Stash-based shelving keyed by branch
pub trait VcsShelf: VcsRepository {
    /// Stash all pending changes tagged with the current branch.
    /// Returns `false` when there was nothing to shelve.
    fn shelve(&self, include_untracked: bool) -> Result<bool, VcsError>;

    /// Pop the newest shelf of the current branch, `None` if there is none
    fn unshelve(&self) -> Result<Option<Stash>, VcsError>;

    fn has_shelf_for_current_branch(&self) -> Result<bool, VcsError>;

    fn get_branch_stash(&self) -> Result<Option<Stash>, VcsError>;

    /// All stashes, newest first
    fn list_stashes(&self) -> Result<Vec<Stash>, VcsError>;

    fn list_stash_changes(&self, stash: &Stash) -> Result<ChangeSet, VcsError>;
}

/// Remote repository operations
pub trait VcsRemotes: VcsRepository {
    fn fetch(&self, progress: Option<&dyn Progress>) -> Result<SyncResult, VcsError>;

    fn push(&self, progress: Option<&dyn Progress>) -> Result<SyncResult, VcsError>;

    /// Bring upstream changes into the current branch
    fn update(&self, progress: Option<&dyn Progress>, rebase: bool)
        -> Result<SyncResult, VcsError>;

    fn has_remote(&self) -> bool;

    fn add_remote(&self, url: &str, name: &str) -> Result<(), VcsError>;

    /// URL of the remote the current branch synchronizes with
    fn get_remote_url(&self) -> Result<Option<String>, VcsError>;

    fn set_upstream(&self, branch: &str, remote: &str) -> Result<(), VcsError>;

    /// Whether the credentials on this machine can read `url`
    fn is_authenticated(&self, url: &str) -> bool;

    fn get_current_change_id(&self) -> Result<ChangeId, VcsError>;

    /// Tip of the upstream branch
    fn get_remote_change_id(&self) -> Result<ChangeId, VcsError>;

    fn is_pull_required(&self) -> bool;

    fn is_push_required(&self) -> bool;

    /// Commits that have not been pushed yet, newest first
    fn get_local_commits(&self) -> Result<Vec<HistoryEntry>, VcsError>;
}

/// Conflict detection and resolution
pub trait VcsConflicts: VcsRepository {
    fn get_conflicts(&self) -> Result<Vec<String>, VcsError>;

    fn has_conflicts(&self) -> Result<bool, VcsError>;

    /// Resolve `paths` (all conflicts when `None`) by taking one side
    fn resolve(&self, paths: Option<&[String]>, strategy: ConflictStrategy)
        -> Result<(), VcsError>;

    /// Run an external merge tool over the conflicted files
    fn launch_external_merge(
        &self,
        tool: Option<&str>,
        paths: Option<&[String]>,
    ) -> Result<(), VcsError>;

    /// Open pending changes in an external diff tool
    fn launch_external_diff(
        &self,
        tool: Option<&str>,
        paths: Option<&[String]>,
    ) -> Result<(), VcsError>;
}

/// Classified commit history
pub trait VcsHistory: VcsRepository {
    /// Commits newest first: the HEAD range (or `from_revision`) classified as
    /// local or synced, followed by upstream commits not merged yet
    fn get_history(
        &self,
        max_count: Option<usize>,
        skip: Option<usize>,
        from_revision: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, VcsError>;

    /// Commits on branch `base` (local or its remote counterpart) missing from `target`
    fn get_new_commits_between(
        &self,
        base: &str,
        target: &str,
    ) -> Result<std::collections::HashSet<ChangeId>, VcsError>;
}

/// Branch management operations
pub trait VcsBranches: VcsRepository {
    /// Local branches followed by remote branches without a local counterpart
    fn get_branches(&self) -> Result<Vec<Branch>, VcsError>;

    /// Create a branch at HEAD and switch to it
    fn create_branch(&self, name: &str) -> Result<(), VcsError>;

    /// Switch branches, carrying pending changes over on a shelf
    fn switch_branch(&self, name: &str) -> Result<(), VcsError>;

    /// Whether the current branch contains commit `id`
    fn branch_contains(&self, id: &ChangeId) -> Result<bool, VcsError>;
}

/// Git LFS helpers
pub trait VcsLfs: VcsRepository {
    /// Whether network operations run the LFS pre-transfer step
    fn uses_lfs(&self) -> bool;

    /// Track files by extension (`.psd` becomes `*.psd`)
    fn track_lfs(&self, extensions: &[String]) -> Result<(), VcsError>;

    fn track_lfs_files(&self, paths: &[String]) -> Result<(), VcsError>;

    /// Delete old local LFS objects; returns how many were removed
    fn prune_lfs(&self) -> Result<usize, VcsError>;
}

/// Combined trait representing a full VCS backend
///
/// This is the main trait that users will interact with, combining all
/// VCS capabilities into a single interface.
pub trait VcsBackend:
    VcsRepository
    + VcsChanges
    + VcsShelf
    + VcsRemotes
    + VcsConflicts
    + VcsHistory
    + VcsBranches
    + VcsLfs
{
    /// Get backend type
    fn backend_type(&self) -> crate::factory::VcsBackendType;

    /// Get a human-readable description of this backend
    fn description(&self) -> String {
        format!("{:?} backend at {}", self.backend_type(), self.work_dir().display())
    }
}
