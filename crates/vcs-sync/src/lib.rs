//! Git orchestration for projects with large binary assets
//!
//! This crate wraps a git working tree behind a trait-based interface:
//! classifying pending changes, shelving them per branch, synchronizing with
//! the remote (including git-lfs) with progress and cancellation, resolving
//! conflicts and reading a classified history.
//!
//! # Design Goals
//!
//! - **Clean trait interface**: Operations are grouped by concern
//! - **Results, not errors, for expected outcomes**: conflicts, a missing
//!   remote and cancellation are [`SyncResult`] values
//! - **Explicit environment**: every entry point takes a [`RepoConfig`];
//!   nothing is read from process-wide state
//!
//! # Example
//!
//! ```no_run
//! use vcs_sync::{workflow, RepoConfig, SyncResult, VcsConflicts, VcsFactory, VcsHistory};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RepoConfig::new("/path/to/project").with_identity("Ada", "ada@example.com");
//! let repo = VcsFactory::load(&config)?;
//!
//! let report = workflow::pull(&*repo, None)?;
//! if report.result == SyncResult::Conflict {
//!     println!("resolve conflicts in: {:?}", repo.get_conflicts()?);
//! }
//! for entry in repo.get_history(Some(20), None, None)? {
//!     println!("{:?} {} {}", entry.kind, entry.id, entry.message.trim());
//! }
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod error;
mod factory;
pub mod progress;
mod traits;
mod types;
pub mod workflow;

pub use config::{GitEnvironment, Identity, RepoConfig};
pub use error::VcsError;
pub use factory::{VcsBackendType, VcsFactory};
pub use progress::{NoProgress, Progress, ProgressPhase, ProgressUpdate};
pub use traits::{
    VcsBackend, VcsBranches, VcsChanges, VcsConflicts, VcsHistory, VcsLfs, VcsRemotes,
    VcsRepository, VcsShelf,
};
pub use types::{
    Branch, Change, ChangeId, ChangeKind, ChangeSet, ConflictOperation, ConflictStrategy,
    FileStatus, HeadInfo, HistoryEntry, HistoryType, PendingChange, Stash, SyncResult,
};

pub use backend::git::{
    GitCli, GitCliError, GitRepository, StreamOutcome, StreamOutput, StreamSource,
};
