use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Represents a single commit ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeId(String);

impl ChangeId {
    pub fn new(id: String) -> Self {
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ChangeId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<git2::Oid> for ChangeId {
    fn from(oid: git2::Oid) -> Self {
        Self(oid.to_string())
    }
}

/// Information about the current HEAD
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadInfo {
    /// On a branch that has no commits yet
    Unborn { branch: String },
    /// On a branch
    Branch { branch: String, change_id: ChangeId },
    /// Checked out directly at a commit
    Detached { change_id: ChangeId },
}

impl HeadInfo {
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::Unborn { branch } | Self::Branch { branch, .. } => Some(branch),
            Self::Detached { .. } => None,
        }
    }

    pub fn change_id(&self) -> Option<&ChangeId> {
        match self {
            Self::Unborn { .. } => None,
            Self::Branch { change_id, .. } | Self::Detached { change_id } => Some(change_id),
        }
    }
}

/// Operation left half-finished in the working tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictOperation {
    Merge,
    Rebase,
    CherryPick,
    Revert,
}

/// A single file delta. Paths are relative to the working-tree root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub old_path: Option<String>,
}

impl Change {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: None,
        }
    }

    pub fn renamed(old_path: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            old_path: Some(old_path.into()),
        }
    }
}

/// Which sequence of a [`ChangeSet`] a change belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    New,
    Modified,
    Deleted,
    Renamed,
}

/// Pending or committed changes, split into four disjoint sequences.
///
/// A path is accepted at most once; later inserts for the same path are
/// ignored, which keeps the sequences disjoint even when the backend reports
/// a path twice.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ChangeSet {
    new_files: Vec<Change>,
    modified_files: Vec<Change>,
    deleted_files: Vec<Change>,
    renamed_files: Vec<Change>,
    #[serde(skip)]
    seen: HashSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a change. Returns false if the path is already present.
    pub fn insert(&mut self, kind: ChangeKind, change: Change) -> bool {
        if !self.seen.insert(change.path.clone()) {
            return false;
        }

        match kind {
            ChangeKind::New => self.new_files.push(change),
            ChangeKind::Modified => self.modified_files.push(change),
            ChangeKind::Deleted => self.deleted_files.push(change),
            ChangeKind::Renamed => self.renamed_files.push(change),
        }
        true
    }

    pub fn new_files(&self) -> &[Change] {
        &self.new_files
    }

    pub fn modified_files(&self) -> &[Change] {
        &self.modified_files
    }

    pub fn deleted_files(&self) -> &[Change] {
        &self.deleted_files
    }

    pub fn renamed_files(&self) -> &[Change] {
        &self.renamed_files
    }

    pub fn size(&self) -> usize {
        self.new_files.len()
            + self.modified_files.len()
            + self.deleted_files.len()
            + self.renamed_files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn contains(&self, path: &str) -> bool {
        self.seen.contains(path)
    }

    /// All changes tagged with their kind, in new/modified/deleted/renamed order
    pub fn iter(&self) -> impl Iterator<Item = (ChangeKind, &Change)> {
        self.new_files
            .iter()
            .map(|c| (ChangeKind::New, c))
            .chain(self.modified_files.iter().map(|c| (ChangeKind::Modified, c)))
            .chain(self.deleted_files.iter().map(|c| (ChangeKind::Deleted, c)))
            .chain(self.renamed_files.iter().map(|c| (ChangeKind::Renamed, c)))
    }
}

/// Status of a file in the merged pending-changes view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileStatus {
    New,
    Modified,
    Deleted,
    Renamed,
    Conflicted,
}

impl From<ChangeKind> for FileStatus {
    fn from(kind: ChangeKind) -> Self {
        match kind {
            ChangeKind::New => Self::New,
            ChangeKind::Modified => Self::Modified,
            ChangeKind::Deleted => Self::Deleted,
            ChangeKind::Renamed => Self::Renamed,
        }
    }
}

/// One row of the pending-changes list shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChange {
    pub path: String,
    pub old_path: Option<String>,
    pub status: FileStatus,
    /// Staged changes start out selected for the next commit
    pub staged: bool,
}

/// Information about a branch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Short name; remote-tracking branches keep their remote prefix (`origin/x`)
    pub name: String,
    pub latest_commit_id: ChangeId,
    pub last_changed: DateTime<Utc>,
    pub is_local: bool,
}

/// Where a commit lives relative to the upstream branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryType {
    /// Reachable from HEAD but not pushed yet
    Local,
    /// On the upstream branch but not merged into HEAD yet
    Remote,
    /// Present on both sides
    Synced,
}

/// One commit of the timeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: ChangeId,
    /// Author email
    pub author: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub kind: HistoryType,
    /// Direct parents as lightweight entries (always `Remote`, no grandparents)
    pub parents: Vec<HistoryEntry>,
}

impl HistoryEntry {
    pub fn parent_ids(&self) -> impl Iterator<Item = &ChangeId> {
        self.parents.iter().map(|p| &p.id)
    }
}

/// A stash entry. `index` 0 is the most recent and shifts as stashes come and go.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stash {
    pub index: usize,
    pub message: String,
    /// Branch tag embedded by the shelf manager, `None` for user stashes
    pub branch: Option<String>,
}

impl Stash {
    /// Revision name understood by `git stash`
    pub fn reference(&self) -> String {
        format!("stash@{{{}}}", self.index)
    }
}

/// Terminal outcome of fetch, pull and push
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncResult {
    Ok,
    /// Upstream changes overlap local ones; the repository is now conflicted
    Conflict,
    /// The branch has no remote to synchronize with
    NoRemote,
    Canceled,
    /// Backend or transport failure with a best-effort diagnostic
    Error(String),
}

impl SyncResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Which side wins when resolving conflicts in bulk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictStrategy {
    TakeOurs,
    TakeTheirs,
}

impl ConflictStrategy {
    pub(crate) fn checkout_flag(self) -> &'static str {
        match self {
            Self::TakeOurs => "--ours",
            Self::TakeTheirs => "--theirs",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_set_rejects_duplicate_paths() {
        let mut changes = ChangeSet::new();
        assert!(changes.insert(ChangeKind::Modified, Change::new("a.txt")));
        assert!(!changes.insert(ChangeKind::New, Change::new("a.txt")));
        assert!(changes.insert(ChangeKind::Renamed, Change::renamed("old.txt", "b.txt")));

        assert_eq!(changes.size(), 2);
        assert!(changes.new_files().is_empty());
        assert_eq!(changes.renamed_files()[0].old_path.as_deref(), Some("old.txt"));
        assert!(changes.contains("b.txt"));
        assert!(!changes.contains("old.txt"));
    }

    #[test]
    fn test_change_set_iter_order() {
        let mut changes = ChangeSet::new();
        changes.insert(ChangeKind::Deleted, Change::new("d"));
        changes.insert(ChangeKind::New, Change::new("n"));
        changes.insert(ChangeKind::Modified, Change::new("m"));
        changes.insert(ChangeKind::Renamed, Change::renamed("r0", "r"));

        let kinds: Vec<_> = changes.iter().map(|(k, c)| (k, c.path.as_str())).collect();
        assert_eq!(
            kinds,
            vec![
                (ChangeKind::New, "n"),
                (ChangeKind::Modified, "m"),
                (ChangeKind::Deleted, "d"),
                (ChangeKind::Renamed, "r"),
            ]
        );
    }

    #[test]
    fn test_stash_reference() {
        let stash = Stash {
            index: 3,
            message: "On main: wip".into(),
            branch: None,
        };
        assert_eq!(stash.reference(), "stash@{3}");
    }

    #[test]
    fn test_head_info_accessors() {
        let unborn = HeadInfo::Unborn {
            branch: "main".into(),
        };
        assert_eq!(unborn.branch(), Some("main"));
        assert!(unborn.change_id().is_none());

        let detached = HeadInfo::Detached {
            change_id: ChangeId::new("abc".into()),
        };
        assert!(detached.branch().is_none());
        assert_eq!(detached.change_id().map(ChangeId::as_str), Some("abc"));
    }

    #[test]
    fn test_history_type_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&HistoryType::Synced).unwrap(), "\"synced\"");
    }
}
