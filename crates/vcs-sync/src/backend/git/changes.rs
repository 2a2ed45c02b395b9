use std::ffi::OsString;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use utils::shell::command_exists;

use super::cli::{StreamOutcome, StreamSource};
use super::porcelain::{collect_name_status_z, parse_path_list, parse_status_z};
use super::{find_nested_repository, path_args, GitRepository};
use crate::error::VcsError;
use crate::traits::{VcsChanges, VcsRepository};
use crate::types::{Change, ChangeId, ChangeKind, ChangeSet};

impl GitRepository {
    /// Base revision for staged diffs: HEAD, or the empty tree before the first commit
    fn staged_base(&self) -> Result<String, VcsError> {
        if self.is_unborn() {
            Ok(self.empty_tree_id()?.to_string())
        } else {
            Ok("HEAD".to_string())
        }
    }

    fn staged_paths(&self) -> Result<Vec<String>, VcsError> {
        let base = self.staged_base()?;
        let out = self.git(["diff", "--cached", "--name-only", "-z", base.as_str()])?;
        Ok(parse_path_list(&out))
    }

    /// `git add --verbose` prints one line per staged file on stdout
    fn add_with_progress(
        &self,
        argv: Vec<OsString>,
        total: usize,
        on_staged: Option<&mut dyn FnMut(usize, usize)>,
        paths: &[String],
    ) -> Result<(), VcsError> {
        // git skips files inside a nested repository without failing
        if let Some(nested) = self.nested_repository_for(paths) {
            tracing::warn!(nested = %nested.display(), "refusing to stage over a nested repository");
            return Err(VcsError::NestedRepository(nested));
        }

        let cli = self.cli()?;
        let mut done = 0;
        let mut on_staged = on_staged;
        let mut on_line = |_: &str| {
            done += 1;
            if let Some(callback) = on_staged.as_deref_mut() {
                callback(done.min(total), total);
            }
        };

        match cli.git_streaming(&self.path, argv, StreamSource::Stdout, &mut on_line, &|| false) {
            Ok(StreamOutcome::Completed(output)) => match embedded_repository(&output.stderr) {
                Some(embedded) => Err(VcsError::NestedRepository(self.path.join(embedded))),
                None => Ok(()),
            },
            Ok(StreamOutcome::Canceled) => Ok(()),
            Err(err) => match self.nested_repository_for(paths) {
                Some(nested) => {
                    tracing::warn!(nested = %nested.display(), %err, "staging failed over a nested repository");
                    Err(VcsError::NestedRepository(nested))
                }
                None => Err(err.into()),
            },
        }
    }

    /// A directory inside the working tree that carries its own `.git`
    fn nested_repository_for(&self, paths: &[String]) -> Option<PathBuf> {
        for path in paths {
            if path == "." {
                return find_nested_repository(&self.path);
            }
            for ancestor in Path::new(path).ancestors() {
                if ancestor.as_os_str().is_empty() || ancestor == Path::new(".") {
                    continue;
                }
                let dir = self.path.join(ancestor);
                if dir.join(".git").exists() {
                    return Some(dir);
                }
            }
        }
        None
    }
}

/// Path named by git's "adding embedded git repository" warning
fn embedded_repository(stderr: &str) -> Option<&str> {
    stderr.lines().find_map(|line| {
        line.split_once("adding embedded git repository:")
            .map(|(_, path)| path.trim())
            .filter(|path| !path.is_empty())
    })
}

impl VcsChanges for GitRepository {
    fn get_pending_changes(&self, staged: bool) -> Result<ChangeSet, VcsError> {
        let mut changes = ChangeSet::new();

        if staged {
            let base = self.staged_base()?;
            let out = self.git(["diff", "--cached", "-M", "--name-status", "-z", base.as_str()])?;
            collect_name_status_z(&out, &mut changes);
        } else {
            let out = self.git(["diff", "--name-status", "-z"])?;
            collect_name_status_z(&out, &mut changes);

            // -uall lists every untracked file instead of collapsing directories
            let status = self.git([
                "--no-optional-locks",
                "status",
                "--porcelain",
                "-z",
                "-uall",
            ])?;
            for entry in parse_status_z(&status) {
                if entry.is_untracked() {
                    changes.insert(ChangeKind::New, Change::new(entry.path));
                }
            }
        }

        Ok(changes)
    }

    fn get_changes_for_changelist(&self, id: &ChangeId) -> Result<ChangeSet, VcsError> {
        let oid = Self::change_id_to_oid(id)?;
        let commit = self
            .repo
            .find_commit(oid)
            .map_err(|_| VcsError::InvalidChangeId(id.to_string()))?;

        let parent = match commit.parent_id(0) {
            Ok(parent) => parent.to_string(),
            Err(_) => self.empty_tree_id()?.to_string(),
        };

        let out = self.git(["diff", "-M", "--name-status", "-z", parent.as_str(), id.as_str()])?;
        let mut changes = ChangeSet::new();
        collect_name_status_z(&out, &mut changes);
        Ok(changes)
    }

    fn has_pending_changes(&self, include_untracked: bool) -> Result<bool, VcsError> {
        let untracked = if include_untracked { "-unormal" } else { "-uno" };
        let status = self.git(["--no-optional-locks", "status", "--porcelain", "-z", untracked])?;
        Ok(!status.is_empty())
    }

    fn stage_files(
        &self,
        paths: &[String],
        on_staged: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let (argv, _spec) = path_args(&["add", "--verbose"], paths, "stage_spec")?;
        self.add_with_progress(argv, paths.len(), on_staged, paths)
    }

    fn unstage_files(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        if self.is_unborn() {
            self.git_with_paths(&["rm", "--cached", "-r", "-q"], paths, "unstage_spec")?;
        } else {
            self.git_with_paths(&["restore", "--staged"], paths, "unstage_spec")?;
        }
        Ok(())
    }

    fn stage_all(&self) -> Result<(), VcsError> {
        let all = [".".to_string()];
        let (argv, _spec) = path_args(&["add", "--verbose"], &all, "stage_spec")?;
        self.add_with_progress(argv, 0, None, &all)
    }

    fn unstage_all(&self) -> Result<(), VcsError> {
        if self.is_unborn() {
            self.git(["rm", "--cached", "-r", "-q", "--ignore-unmatch", "--", "."])?;
        } else {
            self.git(["restore", "--staged", "--", "."])?;
        }
        Ok(())
    }

    fn sync_staged_files(
        &self,
        paths: &[String],
        add_all: bool,
        on_staged: Option<&mut dyn FnMut(usize, usize)>,
    ) -> Result<(), VcsError> {
        let staged = self.staged_paths()?;
        if !staged.is_empty() {
            self.unstage_files(&staged)?;
        }

        if add_all {
            let all = [".".to_string()];
            let (argv, _spec) = path_args(&["add", "--verbose"], &all, "stage_spec")?;
            self.add_with_progress(argv, paths.len(), on_staged, &all)
        } else {
            self.stage_files(paths, on_staged)
        }
    }

    fn remove_files(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.git_with_paths(&["rm"], paths, "rm_spec")?;
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<ChangeId, VcsError> {
        let mut args = Vec::new();
        if !command_exists("gpg") {
            args.extend(["-c", "commit.gpgsign=false"]);
        }
        args.extend(["commit", "-m", message]);
        self.git(args)?;

        let oid = self.repo.refname_to_id("HEAD").map_err(VcsError::backend)?;
        tracing::debug!(commit = %oid, "created commit");
        Ok(ChangeId::from(oid))
    }

    fn revert_changelist(&self, id: &ChangeId) -> Result<(), VcsError> {
        if let Err(err) = self.git(["revert", id.as_str(), "-Xtheirs", "-n"]) {
            if let Err(abort_err) = self.git(["revert", "--abort"]) {
                tracing::warn!(%abort_err, "failed to abort revert");
            }
            return Err(err);
        }

        // The top-level .gitattributes stays as it is
        if self.path.join(".gitattributes").exists() {
            let restored = self
                .git(["restore", "--staged", ".gitattributes"])
                .and_then(|_| self.git(["restore", ".gitattributes"]));
            if let Err(err) = restored {
                tracing::debug!(%err, "keeping reverted .gitattributes");
            }
        }

        self.git(["revert", "--quit"])?;
        Ok(())
    }

    fn restore_changelist(&self, id: &ChangeId) -> Result<(), VcsError> {
        self.git(["restore", "--overlay", "--source", id.as_str(), "--", "."])?;
        Ok(())
    }

    fn restore_files(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        self.git_with_paths(&["checkout"], paths, "restore_spec")?;
        Ok(())
    }

    fn restore_all_files(&self) -> Result<(), VcsError> {
        self.git(["checkout", "--", "."])?;
        Ok(())
    }

    fn clean(&self) -> Result<(), VcsError> {
        self.git(["clean", "-fd"])?;
        Ok(())
    }

    fn ignore(&self, pattern: &str, local_only: bool) -> Result<(), VcsError> {
        if !local_only {
            return Err(VcsError::InvalidOperation(
                "Only local ignore patterns are supported".into(),
            ));
        }

        let info = self.git_dir.join("info");
        std::fs::create_dir_all(&info)?;
        let mut exclude = OpenOptions::new()
            .create(true)
            .append(true)
            .open(info.join("exclude"))?;
        write!(exclude, "\n{pattern}")?;
        Ok(())
    }
}
