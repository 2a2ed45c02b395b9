use super::porcelain::{collect_name_status_z, parse_stash_list_z, shelf_tag};
use super::GitRepository;
use crate::error::VcsError;
use crate::traits::{VcsChanges, VcsRepository, VcsShelf};
use crate::types::{ChangeSet, Stash};

impl VcsShelf for GitRepository {
    fn shelve(&self, include_untracked: bool) -> Result<bool, VcsError> {
        if !self.has_pending_changes(include_untracked)? {
            return Ok(false);
        }
        if self.is_unborn() {
            return Err(VcsError::UnbornBranch);
        }

        let branch = self.current_branch_name()?;
        let tag = shelf_tag(&branch);
        let mut args = vec!["stash", "push", "-m", tag.as_str()];
        if include_untracked {
            args.push("--include-untracked");
        }
        self.git(args)?;

        tracing::info!(branch, include_untracked, "shelved pending changes");
        Ok(true)
    }

    fn unshelve(&self) -> Result<Option<Stash>, VcsError> {
        let Some(stash) = self.get_branch_stash()? else {
            tracing::debug!("no shelf to restore");
            return Ok(None);
        };

        self.git(["stash", "pop", stash.reference().as_str()])?;
        tracing::info!(branch = ?stash.branch, index = stash.index, "restored shelf");
        Ok(Some(stash))
    }

    fn has_shelf_for_current_branch(&self) -> Result<bool, VcsError> {
        Ok(self.get_branch_stash()?.is_some())
    }

    fn get_branch_stash(&self) -> Result<Option<Stash>, VcsError> {
        let Some(branch) = self.head_branch_name() else {
            return Ok(None);
        };
        let stash = self
            .list_stashes()?
            .into_iter()
            .find(|stash| stash.branch.as_deref() == Some(branch.as_str()));
        Ok(stash)
    }

    fn list_stashes(&self) -> Result<Vec<Stash>, VcsError> {
        if self.is_unborn() {
            return Ok(Vec::new());
        }
        let out = self.git(["stash", "list", "-z"])?;
        Ok(parse_stash_list_z(&out))
    }

    fn list_stash_changes(&self, stash: &Stash) -> Result<ChangeSet, VcsError> {
        let out = self.git([
            "stash",
            "show",
            stash.reference().as_str(),
            "--include-untracked",
            "-z",
            "--name-status",
        ])?;
        let mut changes = ChangeSet::new();
        collect_name_status_z(&out, &mut changes);
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{commit_file, setup_test_repo};
    use super::*;
    use crate::traits::VcsBranches;
    use std::fs;

    #[test]
    fn test_shelve_nothing_is_noop() {
        let (_temp, repo) = setup_test_repo();
        commit_file(&repo, "a.txt", "a");

        assert!(!repo.shelve(true).unwrap());
        assert!(repo.list_stashes().unwrap().is_empty());
        assert!(repo.unshelve().unwrap().is_none());
    }

    #[test]
    fn test_shelve_tags_current_branch() {
        let (temp, repo) = setup_test_repo();
        commit_file(&repo, "a.txt", "a");
        fs::write(temp.path().join("a.txt"), "edited").unwrap();
        fs::write(temp.path().join("new.txt"), "new").unwrap();

        assert!(repo.shelve(true).unwrap());
        assert!(!repo.has_pending_changes(true).unwrap());

        let stash = repo.get_branch_stash().unwrap().unwrap();
        assert_eq!(stash.index, 0);
        assert_eq!(stash.branch.as_deref(), Some("main"));
        assert!(repo.has_shelf_for_current_branch().unwrap());

        let changes = repo.list_stash_changes(&stash).unwrap();
        assert!(changes.contains("a.txt"));
        assert!(changes.contains("new.txt"));
    }

    #[test]
    fn test_unshelve_only_pops_current_branch() {
        let (temp, repo) = setup_test_repo();
        commit_file(&repo, "a.txt", "a");

        fs::write(temp.path().join("a.txt"), "main work").unwrap();
        assert!(repo.shelve(true).unwrap());

        repo.create_branch("feature").unwrap();
        assert!(repo.unshelve().unwrap().is_none());

        fs::write(temp.path().join("a.txt"), "feature work").unwrap();
        assert!(repo.shelve(true).unwrap());
        assert_eq!(repo.list_stashes().unwrap().len(), 2);

        let popped = repo.unshelve().unwrap().unwrap();
        assert_eq!(popped.branch.as_deref(), Some("feature"));
        assert_eq!(
            fs::read_to_string(temp.path().join("a.txt")).unwrap(),
            "feature work"
        );

        let remaining = repo.list_stashes().unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_user_stashes_are_ignored() {
        let (temp, repo) = setup_test_repo();
        commit_file(&repo, "a.txt", "a");
        fs::write(temp.path().join("a.txt"), "user").unwrap();
        repo.git(["stash", "push", "-m", "my own stash"]).unwrap();

        let stashes = repo.list_stashes().unwrap();
        assert_eq!(stashes.len(), 1);
        assert_eq!(stashes[0].branch, None);
        assert!(repo.get_branch_stash().unwrap().is_none());
    }

    #[test]
    fn test_shelve_on_unborn_branch() {
        let (temp, repo) = setup_test_repo();
        fs::write(temp.path().join("a.txt"), "a").unwrap();
        assert!(matches!(repo.shelve(true), Err(VcsError::UnbornBranch)));
    }
}
