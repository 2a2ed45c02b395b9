//! git-lfs integration: the pre-transfer step that runs before fetch/pull
//! and push, plus tracking and pruning helpers.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

use super::cli::{GitCli, GitCliError, StreamOutcome, StreamSource};
use super::{run_transfer, GitRepository};
use crate::error::VcsError;
use crate::progress::Progress;
use crate::traits::VcsLfs;
use crate::types::SyncResult;

static PRUNED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Deleting objects: 100% \((\d+)/\d+\), done").expect("static regex")
});

/// Which LFS transfer precedes the git network operation
pub(crate) enum LfsTransfer<'a> {
    Fetch { remote: &'a str },
    Push { remote: &'a str, branch: &'a str },
}

/// `None` lets the git transfer run; cancellation and failures end the operation
fn lfs_outcome(outcome: Result<StreamOutcome, GitCliError>) -> Option<SyncResult> {
    match outcome {
        Ok(StreamOutcome::Completed(_)) => None,
        Ok(StreamOutcome::Canceled) => Some(SyncResult::Canceled),
        Err(err) => {
            tracing::warn!(%err, "LFS transfer failed");
            Some(SyncResult::Error(err.to_string()))
        }
    }
}

impl GitRepository {
    /// Run the LFS step for a network operation. `Ok(None)` means continue
    /// with the git transfer; any other value is the final result.
    pub(crate) fn lfs_pre_transfer(
        &self,
        cli: &GitCli,
        transfer: LfsTransfer<'_>,
        progress: Option<&dyn Progress>,
    ) -> Result<Option<SyncResult>, VcsError> {
        if !self.uses_lfs() {
            tracing::debug!("repository does not use LFS, skipping LFS transfer");
            return Ok(None);
        }

        let args = match transfer {
            LfsTransfer::Fetch { remote } => vec!["lfs", "fetch", remote],
            LfsTransfer::Push { remote, branch } => vec!["lfs", "push", remote, branch],
        };

        Ok(lfs_outcome(run_transfer(cli, &self.path, args, progress)))
    }

    fn relative_to_work_dir<'a>(&self, path: &'a str) -> &'a str {
        let candidate = Path::new(path);
        if !candidate.is_absolute() {
            return path;
        }
        candidate
            .strip_prefix(&self.path)
            .ok()
            .and_then(|p| p.to_str())
            .unwrap_or(path)
    }
}

/// Number of objects deleted according to `git lfs prune` output
fn pruned_count(output: &str) -> usize {
    PRUNED
        .captures(output)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(0)
}

fn lfs_pattern(extension: &str) -> String {
    if extension.starts_with('.') {
        format!("*{extension}")
    } else {
        format!("*.{extension}")
    }
}

impl VcsLfs for GitRepository {
    fn uses_lfs(&self) -> bool {
        if !self.environment.lfs {
            return false;
        }

        let attributes =
            std::fs::read_to_string(self.path.join(".gitattributes")).unwrap_or_default();
        if !attributes.contains("filter=lfs") {
            return false;
        }

        match self.cli() {
            Ok(cli) => cli.succeeds(&self.path, ["lfs", "version"]),
            Err(_) => false,
        }
    }

    fn track_lfs(&self, extensions: &[String]) -> Result<(), VcsError> {
        if extensions.is_empty() {
            return Ok(());
        }
        let mut args = vec!["lfs".to_string(), "track".to_string()];
        args.extend(extensions.iter().map(|ext| lfs_pattern(ext)));
        self.git(args)?;
        Ok(())
    }

    fn track_lfs_files(&self, paths: &[String]) -> Result<(), VcsError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["lfs", "track"];
        args.extend(paths.iter().map(|p| self.relative_to_work_dir(p)));
        self.git(args)?;
        Ok(())
    }

    fn prune_lfs(&self) -> Result<usize, VcsError> {
        let cli = self.cli()?;
        let outcome = cli.git_streaming(
            &self.path,
            ["lfs", "prune"],
            StreamSource::Stderr,
            &mut |_: &str| {},
            &|| false,
        )?;

        let count = match outcome {
            StreamOutcome::Completed(output) => {
                pruned_count(&format!("{}\n{}", output.stdout, output.stderr))
            }
            StreamOutcome::Canceled => 0,
        };
        tracing::info!(count, "pruned LFS objects");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::setup_test_repo;
    use super::*;
    use crate::config::{GitEnvironment, RepoConfig};
    use super::super::cli::StreamOutput;
    use crate::traits::{VcsRemotes, VcsRepository};

    #[test]
    fn test_pruned_count() {
        let output = "prune: 6 local objects, 3 retained, done.\nprune: Deleting objects: 100% (3/3), done.\n";
        assert_eq!(pruned_count(output), 3);
        assert_eq!(pruned_count("prune: 2 local objects, 2 retained, done."), 0);
    }

    #[test]
    fn test_lfs_outcome() {
        assert_eq!(
            lfs_outcome(Ok(StreamOutcome::Completed(StreamOutput::default()))),
            None
        );
        assert_eq!(
            lfs_outcome(Ok(StreamOutcome::Canceled)),
            Some(SyncResult::Canceled)
        );
        match lfs_outcome(Err(GitCliError::AuthFailed("bad credentials".into()))) {
            Some(SyncResult::Error(message)) => assert!(message.contains("bad credentials")),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    /// Cancels on the first poll, which happens inside the LFS transfer
    struct CancelAtOnce;

    impl Progress for CancelAtOnce {
        fn on_update(&self, _update: &crate::progress::ProgressUpdate) {}

        fn is_canceled(&self) -> bool {
            true
        }
    }

    #[test]
    fn test_canceled_lfs_transfer_ends_fetch() {
        let (temp, repo) = setup_test_repo();
        std::fs::write(
            temp.path().join(".gitattributes"),
            "*.psd filter=lfs diff=lfs merge=lfs -text\n",
        )
        .unwrap();
        if !repo.uses_lfs() {
            // git-lfs is not installed
            return;
        }
        repo.add_remote("/nonexistent/remote.git", "origin").unwrap();

        let cli = repo.cli().unwrap();
        let outcome = repo
            .lfs_pre_transfer(
                &cli,
                LfsTransfer::Fetch { remote: "origin" },
                Some(&CancelAtOnce),
            )
            .unwrap();
        assert_eq!(outcome, Some(SyncResult::Canceled));
        assert_eq!(repo.fetch(Some(&CancelAtOnce)).unwrap(), SyncResult::Canceled);
    }

    #[test]
    fn test_lfs_pattern() {
        assert_eq!(lfs_pattern(".psd"), "*.psd");
        assert_eq!(lfs_pattern("fbx"), "*.fbx");
    }

    #[test]
    fn test_uses_lfs_requires_filter_attribute() {
        let (temp, repo) = setup_test_repo();
        assert!(!repo.uses_lfs());

        std::fs::write(temp.path().join(".gitattributes"), "*.txt text\n").unwrap();
        assert!(!repo.uses_lfs());
    }

    #[test]
    fn test_uses_lfs_disabled_by_environment() {
        let temp = tempfile::TempDir::new().unwrap();
        let config = RepoConfig::new(temp.path()).with_environment(GitEnvironment {
            lfs: false,
            ..GitEnvironment::default()
        });
        let repo = GitRepository::create(&config).unwrap();
        std::fs::write(
            temp.path().join(".gitattributes"),
            "*.psd filter=lfs diff=lfs merge=lfs -text\n",
        )
        .unwrap();
        assert!(!repo.uses_lfs());
    }

    #[test]
    fn test_relative_to_work_dir() {
        let (_temp, repo) = setup_test_repo();
        let absolute = repo.work_dir().join("Assets/hero.psd");
        assert_eq!(
            repo.relative_to_work_dir(absolute.to_str().unwrap()),
            "Assets/hero.psd"
        );
        assert_eq!(repo.relative_to_work_dir("Assets/a.psd"), "Assets/a.psd");
    }
}
