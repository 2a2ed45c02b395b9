//! Parsers for machine-readable git output.
//!
//! All parsers take NUL-separated (`-z`) output so paths are never quoted.

use regex::Regex;
use std::sync::LazyLock;

use crate::types::{Change, ChangeKind, ChangeSet, Stash};

static STASH_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{(\d+)\}").expect("static regex"));
// Shelves written by older desktop clients carry `!!Anchorpoint<BRANCH>`.
static SHELF_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!!(?:shelf|Anchorpoint)<(.*)>").expect("static regex"));

/// Marker placed in stash messages created by the shelf manager
pub(crate) fn shelf_tag(branch: &str) -> String {
    format!("!!shelf<{branch}>")
}

/// One record of `git status --porcelain -z`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StatusEntry {
    /// Two-letter `XY` code
    pub code: String,
    pub path: String,
    pub orig_path: Option<String>,
}

impl StatusEntry {
    pub fn is_untracked(&self) -> bool {
        self.code == "??"
    }

    pub fn is_conflicted(&self) -> bool {
        is_conflict_code(&self.code)
    }
}

/// Unmerged status pairs: anything with `U`, plus both-deleted and both-added
pub(crate) fn is_conflict_code(code: &str) -> bool {
    code.contains('U') || code == "DD" || code == "AA"
}

pub(crate) fn parse_status_z(output: &str) -> Vec<StatusEntry> {
    let mut entries = Vec::new();
    let mut fields = output.split('\0');

    while let Some(record) = fields.next() {
        if record.len() < 4 {
            continue;
        }
        let (code, path) = match (record.get(..2), record.get(3..)) {
            (Some(code), Some(path)) => (code, path),
            _ => continue,
        };

        // Renames and copies carry the source path as the next field
        let orig_path = if code.contains('R') || code.contains('C') {
            fields.next().map(str::to_string)
        } else {
            None
        };

        entries.push(StatusEntry {
            code: code.to_string(),
            path: path.to_string(),
            orig_path,
        });
    }

    entries
}

/// Parse `git diff --name-status -z` (also `git stash show --name-status -z`)
/// into `changes`. Unmerged (`U`) records are left to the conflict view.
pub(crate) fn collect_name_status_z(output: &str, changes: &mut ChangeSet) {
    let mut fields = output.split('\0').filter(|f| !f.is_empty());

    while let Some(status) = fields.next() {
        let Some(path) = fields.next() else {
            break;
        };

        match status.chars().next() {
            Some('R') => {
                if let Some(new_path) = fields.next() {
                    changes.insert(ChangeKind::Renamed, Change::renamed(path, new_path));
                }
            }
            Some('C') => {
                if let Some(new_path) = fields.next() {
                    changes.insert(ChangeKind::New, Change::new(new_path));
                }
            }
            Some('A') => {
                changes.insert(ChangeKind::New, Change::new(path));
            }
            Some('D') => {
                changes.insert(ChangeKind::Deleted, Change::new(path));
            }
            Some('M') | Some('T') => {
                changes.insert(ChangeKind::Modified, Change::new(path));
            }
            Some('U') => {}
            _ => {
                tracing::debug!(status, path, "unknown name-status code");
            }
        }
    }
}

/// Split NUL- or newline-separated path lists (`--name-only -z`, `ls-files -z`)
pub(crate) fn parse_path_list(output: &str) -> Vec<String> {
    output
        .split(['\0', '\n'])
        .map(|p| p.trim_end_matches('\r'))
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse `git stash list -z`; records look like `stash@{0}: On main: !!shelf<main>`.
pub(crate) fn parse_stash_list_z(output: &str) -> Vec<Stash> {
    output
        .split('\0')
        .filter(|record| !record.trim().is_empty())
        .filter_map(|record| {
            let index = STASH_INDEX.captures(record)?.get(1)?.as_str().parse().ok()?;
            let message = record
                .split_once(": ")
                .map(|(_, message)| message)
                .unwrap_or_default()
                .trim_end()
                .to_string();
            let branch = SHELF_TAG
                .captures(record)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string());

            Some(Stash {
                index,
                message,
                branch,
            })
        })
        .collect()
}

/// Lines of `.gitattributes` after merging both sides of a conflict: marker
/// lines are dropped and every distinct line is kept once, in first-seen order.
pub(crate) fn union_merge_lines(content: &str) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut merged = String::new();

    for line in content.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with("<<<<<<<")
            || line.starts_with("=======")
            || line.starts_with(">>>>>>>")
            || line.starts_with("|||||||")
        {
            continue;
        }
        if line.trim().is_empty() || !seen.insert(line.to_string()) {
            continue;
        }
        merged.push_str(line);
        merged.push('\n');
    }

    merged
}
