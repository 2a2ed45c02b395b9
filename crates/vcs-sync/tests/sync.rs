mod common;

use std::cell::{Cell, RefCell};

use common::{commit_file, init_repo, read_file, write_file, Sandbox};
use vcs_sync::{
    ConflictStrategy, HistoryType, Progress, ProgressPhase, ProgressUpdate, SyncResult,
    VcsBranches, VcsConflicts, VcsHistory, VcsRemotes, VcsRepository, VcsShelf,
};

/// Records updates and cancels once `is_canceled` has been polled `cancel_at`
/// times or `cancel_after_updates` updates have arrived
#[derive(Default)]
struct Recorder {
    updates: RefCell<Vec<ProgressUpdate>>,
    polls: Cell<usize>,
    cancel_at: Option<usize>,
    cancel_after_updates: Option<usize>,
}

impl Recorder {
    fn canceling_at(poll: usize) -> Self {
        Self {
            cancel_at: Some(poll),
            ..Self::default()
        }
    }

    fn canceling_after_updates(count: usize) -> Self {
        Self {
            cancel_after_updates: Some(count),
            ..Self::default()
        }
    }
}

impl Progress for Recorder {
    fn on_update(&self, update: &ProgressUpdate) {
        self.updates.borrow_mut().push(update.clone());
    }

    fn is_canceled(&self) -> bool {
        let polls = self.polls.get() + 1;
        self.polls.set(polls);
        self.cancel_at.is_some_and(|at| polls >= at)
            || self
                .cancel_after_updates
                .is_some_and(|count| self.updates.borrow().len() >= count)
    }
}

#[test]
fn update_without_remote() {
    let (_root, repo) = init_repo();
    commit_file(&repo, "a.txt", "a\n");

    assert!(!repo.has_remote());
    assert_eq!(repo.update(None, false).unwrap(), SyncResult::NoRemote);
    assert!(!repo.is_push_required());
    assert!(!repo.is_pull_required());
}

#[test]
fn first_push_sets_upstream() {
    let sandbox = Sandbox::new();
    let repo = sandbox.clone("first");
    let id = commit_file(&repo, "a.txt", "a\n");
    assert!(repo.is_push_required());

    let recorder = Recorder::default();
    assert_eq!(repo.push(Some(&recorder)).unwrap(), SyncResult::Ok);
    assert_eq!(
        recorder.updates.borrow()[0],
        ProgressUpdate::indeterminate(ProgressPhase::TalkingToServer)
    );

    assert!(!repo.is_push_required());
    assert_eq!(repo.get_remote_change_id().unwrap(), id);
    assert_eq!(repo.get_remote_url().unwrap().as_deref(), Some(sandbox.url()));
}

#[test]
fn concurrent_edits_conflict_and_resolve() {
    let sandbox = Sandbox::new();
    let first = sandbox.seeded_clone("first");
    let second = sandbox.clone("second");

    commit_file(&first, "a.txt", "from first\n");
    assert_eq!(first.push(None).unwrap(), SyncResult::Ok);

    commit_file(&second, "a.txt", "from second\n");
    assert!(second.is_push_required());
    assert!(!second.is_pull_required());
    assert_eq!(second.fetch(None).unwrap(), SyncResult::Ok);
    assert!(second.is_pull_required());

    assert_eq!(second.update(None, false).unwrap(), SyncResult::Conflict);
    assert!(second.is_merging());
    assert_eq!(second.get_conflicts().unwrap(), vec!["a.txt".to_string()]);

    second.resolve(None, ConflictStrategy::TakeOurs).unwrap();
    assert!(second.get_conflicts().unwrap().is_empty());
    second.continue_merge().unwrap();
    assert!(!second.is_merging());
    assert_eq!(read_file(second.work_dir(), "a.txt"), "from second\n");

    assert_eq!(second.push(None).unwrap(), SyncResult::Ok);
    assert_eq!(first.update(None, false).unwrap(), SyncResult::Ok);
    assert_eq!(read_file(first.work_dir(), "a.txt"), "from second\n");
}

#[test]
fn rebase_update_replays_local_commits() {
    let sandbox = Sandbox::new();
    let first = sandbox.seeded_clone("first");
    let second = sandbox.clone("second");

    commit_file(&first, "b.txt", "b\n");
    assert_eq!(first.push(None).unwrap(), SyncResult::Ok);
    let local = commit_file(&second, "c.txt", "c\n");

    assert_eq!(second.update(None, true).unwrap(), SyncResult::Ok);
    assert!(!second.is_rebasing());
    assert_eq!(read_file(second.work_dir(), "b.txt"), "b\n");

    let local_commits = second.get_local_commits().unwrap();
    assert_eq!(local_commits.len(), 1);
    assert_ne!(local_commits[0].id, local);
    assert_eq!(local_commits[0].message.trim(), "Update c.txt");
    assert_eq!(local_commits[0].kind, HistoryType::Local);
}

#[test]
fn history_marks_local_synced_and_remote() {
    let sandbox = Sandbox::new();
    let first = sandbox.seeded_clone("first");
    let second = sandbox.clone("second");

    let remote_only = commit_file(&first, "b.txt", "b\n");
    assert_eq!(first.push(None).unwrap(), SyncResult::Ok);
    let local_only = commit_file(&second, "c.txt", "c\n");
    assert_eq!(second.fetch(None).unwrap(), SyncResult::Ok);

    let history = second.get_history(None, None, None).unwrap();
    let summary: Vec<_> = history
        .iter()
        .map(|entry| (entry.message.trim(), entry.kind))
        .collect();
    assert_eq!(
        summary,
        vec![
            ("Update c.txt", HistoryType::Local),
            ("Update a.txt", HistoryType::Synced),
            ("Update b.txt", HistoryType::Remote),
        ]
    );
    assert_eq!(history[0].id, local_only);
    assert_eq!(history[2].id, remote_only);
}

#[test]
fn branches_hide_remote_copies_of_local_branches() {
    let sandbox = Sandbox::new();
    let first = sandbox.seeded_clone("first");
    first.create_branch("levels/forest").unwrap();
    assert_eq!(first.push(None).unwrap(), SyncResult::Ok);

    let second = sandbox.clone("second");
    let mut names: Vec<_> = second
        .get_branches()
        .unwrap()
        .into_iter()
        .map(|branch| (branch.name, branch.is_local))
        .collect();
    names.sort();
    assert_eq!(
        names,
        vec![
            ("main".to_string(), true),
            ("origin/levels/forest".to_string(), false),
        ]
    );

    second.switch_branch("origin/levels/forest").unwrap();
    let names: Vec<_> = second
        .get_branches()
        .unwrap()
        .into_iter()
        .map(|branch| branch.name)
        .collect();
    assert!(names.contains(&"levels/forest".to_string()));
    assert!(!names.iter().any(|name| name.starts_with("origin/")));
}

#[test]
fn canceled_update_leaves_shelved_work_restorable() {
    let sandbox = Sandbox::new();
    let first = sandbox.seeded_clone("first");
    let second = sandbox.clone("second");
    commit_file(&first, "b.txt", "b\n");
    assert_eq!(first.push(None).unwrap(), SyncResult::Ok);

    write_file(second.work_dir(), "a.txt", "local edit\n");
    write_file(second.work_dir(), "draft.txt", "draft\n");
    assert!(second.shelve(true).unwrap());
    let head = second.get_current_change_id().unwrap();

    let recorder = Recorder::canceling_at(2);
    assert_eq!(second.update(Some(&recorder), false).unwrap(), SyncResult::Canceled);
    assert_eq!(second.get_current_change_id().unwrap(), head);
    assert!(!second.is_merging());

    assert!(second.unshelve().unwrap().is_some());
    assert_eq!(read_file(second.work_dir(), "a.txt"), "local edit\n");
    assert_eq!(read_file(second.work_dir(), "draft.txt"), "draft\n");
    assert!(!second.work_dir().join("b.txt").exists());
}

#[test]
fn canceled_push_leaves_remote_untouched() {
    let sandbox = Sandbox::new();
    let repo = sandbox.seeded_clone("first");
    let remote_tip = repo.get_remote_change_id().unwrap();
    commit_file(&repo, "b.txt", "b\n");

    let recorder = Recorder::canceling_at(1);
    assert_eq!(repo.push(Some(&recorder)).unwrap(), SyncResult::Canceled);
    assert_eq!(repo.get_remote_change_id().unwrap(), remote_tip);
    assert!(repo.is_push_required());
}

#[test]
fn update_canceled_while_objects_arrive() {
    let sandbox = Sandbox::new();
    let first = sandbox.seeded_clone("first");
    let second = sandbox.clone("second");
    for i in 0..20 {
        commit_file(&first, &format!("level{i}.txt"), &format!("level {i}\n").repeat(200));
    }
    assert_eq!(first.push(None).unwrap(), SyncResult::Ok);

    write_file(second.work_dir(), "a.txt", "local edit\n");
    assert!(second.shelve(true).unwrap());
    let head = second.get_current_change_id().unwrap();

    // the first update announces the connection, the second comes from git's output
    let recorder = Recorder::canceling_after_updates(2);
    assert_eq!(second.update(Some(&recorder), false).unwrap(), SyncResult::Canceled);

    let updates = recorder.updates.borrow();
    assert_eq!(updates[0].phase, ProgressPhase::TalkingToServer);
    assert!(updates[1..]
        .iter()
        .any(|update| update.phase != ProgressPhase::TalkingToServer));
    assert!(updates
        .iter()
        .all(|update| update.phase != ProgressPhase::Updating));

    assert_eq!(second.get_current_change_id().unwrap(), head);
    assert!(!second.is_merging());
    assert!(!second.work_dir().join("level0.txt").exists());
    assert!(second.unshelve().unwrap().is_some());
    assert_eq!(read_file(second.work_dir(), "a.txt"), "local edit\n");
}
