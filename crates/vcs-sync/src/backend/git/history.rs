use std::collections::HashSet;

use chrono::{DateTime, Utc};
use git2::{Commit, Oid};

use super::GitRepository;
use crate::error::VcsError;
use crate::traits::{VcsHistory, VcsRemotes, VcsRepository};
use crate::types::{ChangeId, HistoryEntry, HistoryType};

fn commit_time(commit: &Commit<'_>) -> Result<DateTime<Utc>, VcsError> {
    DateTime::from_timestamp(commit.author().when().seconds(), 0)
        .ok_or_else(|| VcsError::InvalidOperation("Invalid timestamp".into()))
}

/// Entry without parents
fn stub_entry(commit: &Commit<'_>, kind: HistoryType) -> Result<HistoryEntry, VcsError> {
    Ok(HistoryEntry {
        id: ChangeId::from(commit.id()),
        author: commit.author().email().unwrap_or_default().to_string(),
        message: commit.message().unwrap_or_default().to_string(),
        timestamp: commit_time(commit)?,
        kind,
        parents: Vec::new(),
    })
}

impl GitRepository {
    /// Walk `from` newest first, leaving out everything reachable from `hide`
    fn walk(
        &self,
        from: Oid,
        hide: Option<Oid>,
        skip: usize,
        max_count: Option<usize>,
    ) -> Result<Vec<Oid>, VcsError> {
        let mut revwalk = self.repo.revwalk().map_err(VcsError::backend)?;
        revwalk
            .set_sorting(git2::Sort::TOPOLOGICAL | git2::Sort::TIME)
            .map_err(VcsError::backend)?;
        revwalk.push(from).map_err(VcsError::backend)?;
        if let Some(hide) = hide {
            revwalk.hide(hide).map_err(VcsError::backend)?;
        }

        let oids = revwalk
            .skip(skip)
            .take(max_count.unwrap_or(usize::MAX))
            .collect::<Result<Vec<_>, _>>()
            .map_err(VcsError::backend)?;
        Ok(oids)
    }

    /// Commits reachable from HEAD but not from the upstream; all of HEAD
    /// when the branch has no upstream
    pub(crate) fn local_commit_ids(&self) -> Result<Vec<Oid>, VcsError> {
        let Some(head) = self.head_oid() else {
            return Ok(Vec::new());
        };
        self.walk(head, self.tracking_oid(), 0, None)
    }

    /// Commits on the upstream that HEAD does not contain yet
    fn remote_commit_ids(&self) -> Result<Vec<Oid>, VcsError> {
        let Some(upstream) = self.tracking_oid() else {
            return Ok(Vec::new());
        };
        self.walk(upstream, self.head_oid(), 0, None)
    }

    pub(crate) fn history_entry(&self, oid: Oid, kind: HistoryType) -> Result<HistoryEntry, VcsError> {
        let commit = self.repo.find_commit(oid).map_err(VcsError::backend)?;
        let mut entry = stub_entry(&commit, kind)?;
        entry.parents = commit
            .parents()
            .map(|parent| stub_entry(&parent, HistoryType::Remote))
            .collect::<Result<_, _>>()?;
        Ok(entry)
    }

    fn resolve_revision(&self, revision: &str) -> Result<Oid, VcsError> {
        let object = self
            .repo
            .revparse_single(revision)
            .map_err(|_| VcsError::InvalidChangeId(revision.to_string()))?;
        let commit = object
            .peel_to_commit()
            .map_err(|_| VcsError::InvalidChangeId(revision.to_string()))?;
        Ok(commit.id())
    }
}

impl VcsHistory for GitRepository {
    fn get_history(
        &self,
        max_count: Option<usize>,
        skip: Option<usize>,
        from_revision: Option<&str>,
    ) -> Result<Vec<HistoryEntry>, VcsError> {
        let start = match from_revision {
            Some(revision) => Some(self.resolve_revision(revision)?),
            None => self.head_oid(),
        };
        let base = match start {
            Some(start) => self.walk(start, None, skip.unwrap_or(0), max_count)?,
            None => Vec::new(),
        };

        let (local, remote) = if self.has_remote() {
            let local: HashSet<Oid> = self.local_commit_ids()?.into_iter().collect();
            (local, self.remote_commit_ids()?)
        } else {
            (HashSet::new(), Vec::new())
        };

        let detached = self.is_head_detached();
        let mut history = Vec::with_capacity(base.len() + remote.len());
        for oid in base {
            let kind = if !detached && local.contains(&oid) {
                HistoryType::Local
            } else {
                HistoryType::Synced
            };
            history.push(self.history_entry(oid, kind)?);
        }
        for oid in remote {
            history.push(self.history_entry(oid, HistoryType::Remote)?);
        }

        tracing::debug!(
            entries = history.len(),
            local = local.len(),
            "read history"
        );
        Ok(history)
    }

    fn get_new_commits_between(
        &self,
        base: &str,
        target: &str,
    ) -> Result<HashSet<ChangeId>, VcsError> {
        let hide = self.resolve_revision(target)?;
        let mut tips = vec![self.resolve_revision(base)?];

        let remote_base = self
            .configured_upstream(base)
            .or_else(|| {
                self.default_remote()
                    .map(|remote| format!("refs/remotes/{remote}/{base}"))
            })
            .and_then(|name| self.repo.refname_to_id(&name).ok());
        tips.extend(remote_base);

        let mut ids = HashSet::new();
        for tip in tips {
            ids.extend(
                self.walk(tip, Some(hide), 0, None)?
                    .into_iter()
                    .map(ChangeId::from),
            );
        }
        Ok(ids)
    }
}
