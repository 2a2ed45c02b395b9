//! Fetch, push and update against the branch's remote.
//!
//! Every network operation is bracketed by the LFS transfer for the same
//! remote. Both transfers observe cancellation between output chunks; the
//! integration step after a fetch (merge or rebase) runs to completion.

use super::cli::{GitCliError, StreamOutcome};
use super::lfs::LfsTransfer;
use super::{run_transfer, GitCli, GitRepository};
use crate::error::VcsError;
use crate::progress::{Progress, ProgressPhase, ProgressUpdate};
use crate::traits::{VcsConflicts, VcsRemotes, VcsRepository};
use crate::types::{ChangeId, HistoryEntry, HistoryType, SyncResult};

const DEFAULT_REMOTE: &str = "origin";

fn canceled(progress: Option<&dyn Progress>) -> bool {
    progress.is_some_and(|p| p.is_canceled())
}

/// Fold the outcome of a transfer into the result reported to the caller
fn transfer_result(operation: &str, outcome: Result<StreamOutcome, GitCliError>) -> SyncResult {
    match outcome {
        Ok(StreamOutcome::Completed(_)) => SyncResult::Ok,
        Ok(StreamOutcome::Canceled) => {
            tracing::info!(operation, "transfer canceled");
            SyncResult::Canceled
        }
        Err(err) => {
            tracing::warn!(operation, %err, "transfer failed");
            SyncResult::Error(err.to_string())
        }
    }
}

impl GitRepository {
    /// Upstream configured for `branch` (`refs/remotes/<remote>/<branch>`)
    pub(crate) fn configured_upstream(&self, branch: &str) -> Option<String> {
        let buf = self
            .repo
            .branch_upstream_name(&format!("refs/heads/{branch}"))
            .ok()?;
        buf.as_str().map(str::to_string)
    }

    /// Remote-tracking ref the current branch integrates with: the configured
    /// upstream, else the same-named branch on the default remote. Only refs
    /// that exist locally are returned.
    pub(crate) fn tracking_ref(&self) -> Option<String> {
        let branch = self.head_branch_name()?;
        let candidate = match self.configured_upstream(&branch) {
            Some(upstream) => upstream,
            None => format!("refs/remotes/{}/{branch}", self.default_remote()?),
        };
        self.repo.refname_to_id(&candidate).ok().map(|_| candidate)
    }

    pub(crate) fn tracking_oid(&self) -> Option<git2::Oid> {
        let upstream = self.tracking_ref()?;
        self.repo.refname_to_id(&upstream).ok()
    }

    pub(crate) fn head_oid(&self) -> Option<git2::Oid> {
        self.repo.refname_to_id("HEAD").ok()
    }

    fn remote_or_default(&self) -> String {
        self.default_remote()
            .unwrap_or_else(|| DEFAULT_REMOTE.to_string())
    }
}

impl VcsRemotes for GitRepository {
    fn fetch(&self, progress: Option<&dyn Progress>) -> Result<SyncResult, VcsError> {
        let remote = self.remote_or_default();
        let cli = self.cli()?;
        tracing::debug!(remote, "fetching");

        if let Some(result) =
            self.lfs_pre_transfer(&cli, LfsTransfer::Fetch { remote: &remote }, progress)?
        {
            return Ok(result);
        }
        if canceled(progress) {
            return Ok(SyncResult::Canceled);
        }

        let result = transfer_result(
            "fetch",
            run_transfer(&cli, &self.path, ["fetch", "--progress", remote.as_str()], progress),
        );
        if result.is_ok() {
            tracing::info!(remote, "fetch complete");
        }
        Ok(result)
    }

    fn push(&self, progress: Option<&dyn Progress>) -> Result<SyncResult, VcsError> {
        let branch = self.current_branch_name()?;
        let remote = self.remote_or_default();
        let cli = self.cli()?;

        if let Some(result) = self.lfs_pre_transfer(
            &cli,
            LfsTransfer::Push {
                remote: &remote,
                branch: &branch,
            },
            progress,
        )? {
            return Ok(result);
        }
        if canceled(progress) {
            return Ok(SyncResult::Canceled);
        }

        let mut args = vec!["push", "--progress"];
        let first_push = self.configured_upstream(&branch).is_none();
        if first_push {
            tracing::debug!(branch, remote, "no upstream yet, setting it on push");
            args.push("--set-upstream");
        }
        args.extend([remote.as_str(), branch.as_str()]);

        let result = transfer_result("push", run_transfer(&cli, &self.path, args, progress));
        if result.is_ok() {
            tracing::info!(branch, remote, "push complete");
        }
        Ok(result)
    }

    fn update(
        &self,
        progress: Option<&dyn Progress>,
        rebase: bool,
    ) -> Result<SyncResult, VcsError> {
        if self.is_head_detached() {
            return Err(VcsError::DetachedHead);
        }
        let Some(remote) = self.default_remote() else {
            tracing::debug!("no remote configured");
            return Ok(SyncResult::NoRemote);
        };
        let cli = self.cli()?;

        if let Some(result) =
            self.lfs_pre_transfer(&cli, LfsTransfer::Fetch { remote: &remote }, progress)?
        {
            return Ok(result);
        }
        if canceled(progress) {
            return Ok(SyncResult::Canceled);
        }

        let fetched = transfer_result(
            "fetch",
            run_transfer(&cli, &self.path, ["fetch", "--progress", remote.as_str()], progress),
        );
        if !fetched.is_ok() {
            return Ok(fetched);
        }

        let Some(upstream) = self.tracking_ref() else {
            tracing::debug!(remote, "remote has no counterpart of this branch yet");
            return Ok(SyncResult::Ok);
        };

        if let Some(progress) = progress {
            progress.on_update(&ProgressUpdate::indeterminate(ProgressPhase::Updating));
        }
        self.integrate(&cli, &upstream, rebase)
    }

    fn has_remote(&self) -> bool {
        self.repo
            .remotes()
            .map(|remotes| !remotes.is_empty())
            .unwrap_or(false)
    }

    fn add_remote(&self, url: &str, name: &str) -> Result<(), VcsError> {
        self.git(["remote", "add", name, url])?;
        tracing::info!(name, url, "added remote");
        Ok(())
    }

    fn get_remote_url(&self) -> Result<Option<String>, VcsError> {
        Ok(self
            .default_remote()
            .and_then(|remote| self.remote_url(&remote)))
    }

    fn set_upstream(&self, branch: &str, remote: &str) -> Result<(), VcsError> {
        let remote_key = format!("branch.{branch}.remote");
        let merge_key = format!("branch.{branch}.merge");
        let merge = format!("refs/heads/{branch}");
        self.git(["config", remote_key.as_str(), remote])?;
        self.git(["config", merge_key.as_str(), merge.as_str()])?;
        tracing::debug!(branch, remote, "upstream configured");
        Ok(())
    }

    fn is_authenticated(&self, url: &str) -> bool {
        match GitCli::new(&self.environment, Some(url)) {
            Ok(cli) => cli.succeeds(&self.path, ["ls-remote", "--heads", url]),
            Err(_) => false,
        }
    }

    fn get_current_change_id(&self) -> Result<ChangeId, VcsError> {
        self.head_oid()
            .map(ChangeId::from)
            .ok_or(VcsError::UnbornBranch)
    }

    fn get_remote_change_id(&self) -> Result<ChangeId, VcsError> {
        match self.tracking_oid() {
            Some(oid) => Ok(ChangeId::from(oid)),
            None => Err(VcsError::BranchNotFound(format!(
                "upstream of {}",
                self.current_branch_name()?
            ))),
        }
    }

    fn is_pull_required(&self) -> bool {
        let Some(upstream) = self.tracking_oid() else {
            return false;
        };
        match self.head_oid() {
            Some(head) => self
                .repo
                .graph_ahead_behind(head, upstream)
                .map(|(_, behind)| behind > 0)
                .unwrap_or(false),
            None => true,
        }
    }

    fn is_push_required(&self) -> bool {
        let Some(head) = self.head_oid() else {
            return false;
        };
        match self.tracking_oid() {
            Some(upstream) => self
                .repo
                .graph_ahead_behind(head, upstream)
                .map(|(ahead, _)| ahead > 0)
                .unwrap_or(false),
            None => self.has_remote(),
        }
    }

    fn get_local_commits(&self) -> Result<Vec<HistoryEntry>, VcsError> {
        self.local_commit_ids()?
            .into_iter()
            .map(|oid| self.history_entry(oid, HistoryType::Local))
            .collect()
    }
}

impl GitRepository {
    fn integrate(&self, cli: &GitCli, upstream: &str, rebase: bool) -> Result<SyncResult, VcsError> {
        let args = if self.is_unborn() {
            vec!["merge", "--ff", upstream]
        } else if rebase {
            vec!["-c", "core.editor=true", "rebase", upstream]
        } else {
            vec!["merge", "--ff", "--no-commit", upstream]
        };

        let err = match cli.git(&self.path, args) {
            Ok(_) => {
                tracing::info!(upstream, rebase, "update complete");
                return Ok(SyncResult::Ok);
            }
            Err(err) => err,
        };

        if self.has_conflicts()? {
            tracing::info!(upstream, %err, "update stopped on conflicts");
            Ok(SyncResult::Conflict)
        } else {
            tracing::warn!(upstream, %err, "update failed");
            Ok(SyncResult::Error(err.to_string()))
        }
    }
}
