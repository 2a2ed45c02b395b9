use std::collections::HashSet;

use git2::BranchType;

use super::GitRepository;
use crate::error::VcsError;
use crate::traits::{VcsBranches, VcsRepository, VcsShelf};
use crate::types::{Branch, ChangeId};

impl GitRepository {
    fn remote_names(&self) -> Vec<String> {
        self.repo
            .remotes()
            .map(|remotes| remotes.iter().flatten().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// `origin/feature` names the local branch `feature` when `origin` is a remote
    fn local_branch_name<'a>(&self, name: &'a str) -> &'a str {
        let Some((prefix, rest)) = name.split_once('/') else {
            return name;
        };
        if self.remote_names().iter().any(|remote| remote == prefix) {
            rest
        } else {
            name
        }
    }

    fn branch_info(branch: &git2::Branch<'_>, is_local: bool) -> Result<Option<Branch>, VcsError> {
        let Some(name) = branch.name().map_err(VcsError::backend)? else {
            return Ok(None);
        };
        let commit = branch.get().peel_to_commit().map_err(VcsError::backend)?;
        let last_changed = chrono::DateTime::from_timestamp(commit.time().seconds(), 0)
            .ok_or_else(|| VcsError::InvalidOperation("Invalid timestamp".into()))?;

        Ok(Some(Branch {
            name: name.to_string(),
            latest_commit_id: ChangeId::from(commit.id()),
            last_changed,
            is_local,
        }))
    }
}

impl VcsBranches for GitRepository {
    fn get_branches(&self) -> Result<Vec<Branch>, VcsError> {
        let mut result = Vec::new();
        let mut local_names = HashSet::new();

        for entry in self
            .repo
            .branches(Some(BranchType::Local))
            .map_err(VcsError::backend)?
        {
            let (branch, _) = entry.map_err(VcsError::backend)?;
            if let Some(info) = Self::branch_info(&branch, true)? {
                local_names.insert(info.name.clone());
                result.push(info);
            }
        }

        let remotes = self.remote_names();
        for entry in self
            .repo
            .branches(Some(BranchType::Remote))
            .map_err(VcsError::backend)?
        {
            let (branch, _) = entry.map_err(VcsError::backend)?;
            let Some(info) = Self::branch_info(&branch, false)? else {
                continue;
            };
            if info.name.ends_with("/HEAD") {
                continue;
            }
            let shadowed = remotes.iter().any(|remote| {
                info.name
                    .strip_prefix(remote.as_str())
                    .and_then(|rest| rest.strip_prefix('/'))
                    .is_some_and(|short| local_names.contains(short))
            });
            if !shadowed {
                result.push(info);
            }
        }

        Ok(result)
    }

    fn create_branch(&self, name: &str) -> Result<(), VcsError> {
        self.git(["switch", "-c", name])?;
        tracing::info!(branch = name, "created branch");
        Ok(())
    }

    fn switch_branch(&self, name: &str) -> Result<(), VcsError> {
        let target = self.local_branch_name(name);
        let shelved = self.shelve(true)?;

        if let Err(err) = self.git(["switch", target]) {
            if shelved {
                if let Err(restore) = self.unshelve() {
                    tracing::warn!(%restore, "failed to restore shelf after failed switch");
                }
            }
            return Err(err);
        }

        if self.unshelve()?.is_some() {
            tracing::debug!(branch = target, "restored shelf of target branch");
        }
        tracing::info!(branch = target, shelved, "switched branch");
        Ok(())
    }

    fn branch_contains(&self, id: &ChangeId) -> Result<bool, VcsError> {
        if self.is_head_detached() {
            return Ok(false);
        }
        let Some(head) = self.head_oid() else {
            return Ok(false);
        };
        let oid = Self::change_id_to_oid(id)?;
        if head == oid {
            return Ok(true);
        }
        self.repo
            .graph_descendant_of(head, oid)
            .map_err(VcsError::backend)
    }
}
