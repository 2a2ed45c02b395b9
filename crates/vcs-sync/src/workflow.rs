//! Multi-step sequences a host runs on top of a [`VcsBackend`].
//!
//! Each sequence shelves pending work before touching the network or HEAD
//! and restores it afterwards. When a step faults the shelf is restored
//! first and the error is returned after that.

use std::fs::OpenOptions;
use std::path::Path;

use tracing::{debug, info, warn};
use utils::lock::LockFile;

use crate::config::Identity;
use crate::error::VcsError;
use crate::progress::Progress;
use crate::traits::VcsBackend;
use crate::types::{ChangeId, ChangeSet, FileStatus, PendingChange, SyncResult};

/// Prefix of the lock file that serializes background fetches
pub const FETCH_LOCK_PREFIX: &str = "vcs-sync-fetch";

/// Outcome of [`pull`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullReport {
    pub result: SyncResult,
    /// Pending changes were put on a shelf before updating
    pub shelved: bool,
    /// The shelf was popped again afterwards. A shelf left behind on
    /// `Conflict` is restored once the conflicts are resolved.
    pub restored: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(ChangeId),
    /// Nothing ended up staged
    NothingToCommit,
}

fn is_writable(path: &Path) -> bool {
    let Ok(metadata) = path.metadata() else {
        // deleted files and paths that never existed
        return true;
    };
    if metadata.is_dir() {
        return true;
    }
    !metadata.permissions().readonly() && OpenOptions::new().append(true).open(path).is_ok()
}

/// Fail with [`VcsError::FileNotWritable`] for the first changed file the
/// shelf could not replace
pub fn ensure_writable(work_dir: &Path, changes: &[&ChangeSet]) -> Result<(), VcsError> {
    for (_, change) in changes.iter().flat_map(|set| set.iter()) {
        let path = work_dir.join(&change.path);
        if !is_writable(&path) {
            return Err(VcsError::FileNotWritable(path));
        }
    }
    Ok(())
}

/// Shelve everything pending after checking the files can be moved aside
fn shelve_pending<R: VcsBackend + ?Sized>(repo: &R) -> Result<bool, VcsError> {
    if repo.is_unborn() {
        debug!("unborn branch, nothing can be shelved");
        return Ok(false);
    }
    let unstaged = repo.get_pending_changes(false)?;
    let staged = repo.get_pending_changes(true)?;
    if unstaged.is_empty() && staged.is_empty() {
        return Ok(false);
    }

    ensure_writable(repo.work_dir(), &[&unstaged, &staged])?;
    repo.shelve(true)
}

/// Pop the shelf while already handling `err`; a failure here is only logged
fn restore_then_fail<R: VcsBackend + ?Sized, T>(
    repo: &R,
    shelved: bool,
    err: VcsError,
) -> Result<T, VcsError> {
    if shelved {
        if let Err(restore) = repo.unshelve() {
            warn!(%restore, "failed to restore shelved changes");
        }
    }
    Err(err)
}

/// Shelve pending changes, update from the remote and restore the shelf.
///
/// The shelf stays in place when the update ends in conflicts so the user can
/// resolve them on a clean working tree. Fails with
/// [`VcsError::SyncInProgress`] while a [`refresh`] holds the fetch lock.
pub fn pull<R: VcsBackend + ?Sized>(
    repo: &R,
    progress: Option<&dyn Progress>,
) -> Result<PullReport, VcsError> {
    let Some(_lock) = LockFile::try_acquire(repo.metadata_dir(), FETCH_LOCK_PREFIX)? else {
        debug!("fetch already running, refusing to pull");
        return Err(VcsError::SyncInProgress);
    };
    let shelved = shelve_pending(repo)?;

    let result = match repo.update(progress, false) {
        Ok(result) => result,
        Err(err) => return restore_then_fail(repo, shelved, err),
    };

    let restored = match &result {
        SyncResult::Conflict => {
            info!(shelved, "pull stopped on conflicts, shelf kept");
            false
        }
        SyncResult::Ok => {
            if repo.is_merging() {
                if let Err(err) = repo.continue_merge() {
                    return restore_then_fail(repo, shelved, err);
                }
            }
            shelved && repo.unshelve()?.is_some()
        }
        SyncResult::NoRemote | SyncResult::Canceled | SyncResult::Error(_) => {
            shelved && repo.unshelve()?.is_some()
        }
    };

    info!(?result, shelved, restored, "pull finished");
    Ok(PullReport {
        result,
        shelved,
        restored,
    })
}

/// Fetch unless another fetch of this process holds the lock. `Ok(None)`
/// means the refresh was skipped.
pub fn refresh<R: VcsBackend + ?Sized>(
    repo: &R,
    progress: Option<&dyn Progress>,
) -> Result<Option<SyncResult>, VcsError> {
    let Some(_lock) = LockFile::try_acquire(repo.metadata_dir(), FETCH_LOCK_PREFIX)? else {
        debug!("fetch already running, skipping refresh");
        return Ok(None);
    };
    repo.fetch(progress).map(Some)
}

/// Switch branches after checking that pending files can be shelved
pub fn switch_branch<R: VcsBackend + ?Sized>(repo: &R, name: &str) -> Result<(), VcsError> {
    let unstaged = repo.get_pending_changes(false)?;
    let staged = repo.get_pending_changes(true)?;
    ensure_writable(repo.work_dir(), &[&unstaged, &staged])?;
    repo.switch_branch(name)
}

/// Stage the selected paths and commit them.
///
/// `all_selected` stages every pending change instead of just `paths`.
pub fn commit_paths<R: VcsBackend + ?Sized>(
    repo: &R,
    paths: &[String],
    all_selected: bool,
    message: &str,
    identity: Option<&Identity>,
) -> Result<CommitOutcome, VcsError> {
    if !paths.is_empty() || all_selected {
        repo.sync_staged_files(paths, all_selected, None)?;
    }

    if repo.get_pending_changes(true)?.is_empty() {
        info!("nothing staged, skipping commit");
        return Ok(CommitOutcome::NothingToCommit);
    }

    if let Some(identity) = identity.filter(|i| !i.name.is_empty() && !i.email.is_empty()) {
        repo.set_username(&identity.name, &identity.email)?;
    }
    repo.commit(message).map(CommitOutcome::Committed)
}

/// Staged changes, unstaged changes and conflicts as one list. A path shows
/// up once; conflicted paths always end up [`FileStatus::Conflicted`].
pub fn pending_change_view<R: VcsBackend + ?Sized>(
    repo: &R,
) -> Result<Vec<PendingChange>, VcsError> {
    let mut view: Vec<PendingChange> = Vec::new();

    for (staged, changes) in [
        (true, repo.get_pending_changes(true)?),
        (false, repo.get_pending_changes(false)?),
    ] {
        for (kind, change) in changes.iter() {
            if view.iter().any(|entry| entry.path == change.path) {
                continue;
            }
            view.push(PendingChange {
                path: change.path.clone(),
                old_path: change.old_path.clone(),
                status: FileStatus::from(kind),
                staged,
            });
        }
    }

    for path in repo.get_conflicts()? {
        match view.iter_mut().find(|entry| entry.path == path) {
            Some(entry) => entry.status = FileStatus::Conflicted,
            None => view.push(PendingChange {
                path,
                old_path: None,
                status: FileStatus::Conflicted,
                staged: false,
            }),
        }
    }

    Ok(view)
}
