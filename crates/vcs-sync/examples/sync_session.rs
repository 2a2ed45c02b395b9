//! Example: one sync session against an existing working tree
//!
//! Shows pending changes, pulls with console progress, and prints the
//! classified timeline.
//!
//! Run with: cargo run --example sync_session -- /path/to/project

use std::path::PathBuf;

use vcs_sync::{
    workflow, Progress, ProgressUpdate, RepoConfig, SyncResult, VcsConflicts, VcsFactory,
    VcsHistory,
};

/// Prints every progress update on its own line
struct ConsoleProgress;

impl Progress for ConsoleProgress {
    fn on_update(&self, update: &ProgressUpdate) {
        match update.fraction() {
            Some(fraction) => println!("{:>14}: {:5.1}%", update.phase, fraction * 100.0),
            None => println!("{:>14}: ...", update.phase),
        }
    }
}

fn main() -> anyhow::Result<()> {
    utils::log::init_tracing("info");

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    let repo = VcsFactory::load(&RepoConfig::new(path))?;
    println!("{}", repo.description());

    for change in workflow::pending_change_view(&*repo)? {
        let marker = if change.staged { "staged" } else { "" };
        println!("{:?} {} {marker}", change.status, change.path);
    }

    let progress: &dyn Progress = &ConsoleProgress;
    let report = workflow::pull(&*repo, Some(progress))?;
    match &report.result {
        SyncResult::Ok => println!("up to date"),
        SyncResult::Conflict => println!("conflicts: {:?}", repo.get_conflicts()?),
        SyncResult::NoRemote => println!("branch has no remote yet"),
        SyncResult::Canceled => println!("canceled"),
        SyncResult::Error(message) => println!("pull failed: {message}"),
    }

    for entry in repo.get_history(Some(15), None, None)? {
        println!(
            "{:<6} {} {:<24} {}",
            format!("{:?}", entry.kind),
            &entry.id.as_str()[..8],
            entry.author,
            entry.message.lines().next().unwrap_or_default()
        );
    }
    Ok(())
}
