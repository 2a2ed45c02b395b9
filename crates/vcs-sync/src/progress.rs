//! Progress reporting and cooperative cancellation for network operations.
//!
//! Git and git-lfs report transfer progress on stderr as lines such as
//! `Receiving objects:  45% (450/1000), 1.20 MiB | 600.00 KiB/s`. The runner
//! feeds every line through [`parse_progress_line`] and forwards the result
//! to the caller's [`Progress`] sink.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

static COUNTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\((\d+)/(\d+)\)").expect("static regex"));

/// Phase of a network operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressPhase {
    TalkingToServer,
    Counting,
    Compressing,
    Writing,
    Resolving,
    Downloading,
    Updating,
}

impl ProgressPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TalkingToServer => "talking to server",
            Self::Counting => "counting",
            Self::Compressing => "compressing",
            Self::Writing => "writing",
            Self::Resolving => "resolving",
            Self::Downloading => "downloading",
            Self::Updating => "updating",
        }
    }
}

impl std::fmt::Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub phase: ProgressPhase,
    pub current: u64,
    /// Zero means the amount of work is unknown
    pub total: u64,
    pub detail: Option<String>,
}

impl ProgressUpdate {
    pub fn indeterminate(phase: ProgressPhase) -> Self {
        Self {
            phase,
            current: 0,
            total: 0,
            detail: None,
        }
    }

    pub fn is_indeterminate(&self) -> bool {
        self.total == 0
    }

    /// Completed fraction in `0.0..=1.0`, `None` when indeterminate
    pub fn fraction(&self) -> Option<f64> {
        if self.total == 0 {
            return None;
        }
        Some((self.current.min(self.total)) as f64 / self.total as f64)
    }
}

/// Sink for progress updates of fetch, pull, push and clone.
///
/// `is_canceled` is polled between output chunks of the running transfer;
/// returning `true` terminates the child process.
pub trait Progress {
    fn on_update(&self, update: &ProgressUpdate);

    fn is_canceled(&self) -> bool {
        false
    }
}

/// Progress sink that ignores updates and never cancels
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn on_update(&self, _update: &ProgressUpdate) {}
}

/// Parse one line of git or git-lfs progress output
pub fn parse_progress_line(line: &str) -> Option<ProgressUpdate> {
    let line = line.trim();
    let line = line.strip_prefix("remote:").unwrap_or(line).trim_start();
    let (label, rest) = line.split_once(':')?;

    let phase = phase_for_label(label.trim())?;

    // Enumeration only ever reports a running count.
    if label.starts_with("Enumerating") {
        return Some(ProgressUpdate::indeterminate(phase));
    }

    let (current, total, detail) = match COUNTS.captures(rest) {
        Some(caps) => {
            let current = caps[1].parse().unwrap_or(0);
            let total = caps[2].parse().unwrap_or(0);
            let end = caps.get(0).map_or(rest.len(), |m| m.end());
            (current, total, clean_detail(&rest[end..]))
        }
        None => (0, 0, clean_detail(rest)),
    };

    Some(ProgressUpdate {
        phase,
        current,
        total,
        detail,
    })
}

fn phase_for_label(label: &str) -> Option<ProgressPhase> {
    let phase = if label.starts_with("Enumerating") || label.starts_with("Counting") {
        ProgressPhase::Counting
    } else if label.starts_with("Compressing") {
        ProgressPhase::Compressing
    } else if label.starts_with("Writing") || label.starts_with("Uploading LFS objects") {
        ProgressPhase::Writing
    } else if label.starts_with("Resolving") {
        ProgressPhase::Resolving
    } else if label.starts_with("Receiving")
        || label.starts_with("Unpacking")
        || label.starts_with("Downloading LFS objects")
        || label.starts_with("Filtering content")
    {
        ProgressPhase::Downloading
    } else if label.starts_with("Updating files") {
        ProgressPhase::Updating
    } else {
        return None;
    };
    Some(phase)
}

fn clean_detail(text: &str) -> Option<String> {
    let text = text.trim().trim_start_matches(',').trim();
    let text = text.strip_suffix("done.").unwrap_or(text);
    let text = text.trim().trim_end_matches(',').trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// True for git-lfs smudge failures, which are logged rather than reported
pub fn is_lfs_smudge_error(line: &str) -> bool {
    line.contains("Smudge error")
}

/// Keeps reported progress monotonic within each phase.
///
/// Git restarts counters when it retries a step and LFS interleaves file
/// counts with byte counts; updates that would move a determinate phase
/// backwards are dropped.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last: HashMap<ProgressPhase, (u64, u64)>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the update if it should be forwarded to the sink
    pub fn accept(&mut self, update: ProgressUpdate) -> Option<ProgressUpdate> {
        if update.is_indeterminate() {
            return Some(update);
        }

        match self.last.get(&update.phase) {
            Some(&(current, total)) if total == update.total && update.current < current => None,
            _ => {
                self.last
                    .insert(update.phase, (update.current, update.total));
                Some(update)
            }
        }
    }
}
