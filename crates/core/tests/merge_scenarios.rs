//! End-to-end merge scenarios.
//!
//! These tests run the real `TreeMerger` against:
//! - the in-memory page store, wrapped in a recorder that logs every store
//!   call and can inject failures
//! - an in-memory SQLite database with the real schema
//!
//! No filesystem or network I/O.

use std::sync::Mutex;

use sitemerge_core::config::{CollisionPolicy, MergeConfig, MergeDefaults};
use sitemerge_core::db::Database;
use sitemerge_core::errors::{MergeError, StoreError};
use sitemerge_core::merge::{Phase, ProgressSink, RunStatus, SkipReason, TreeIndex, TreeMerger};
use sitemerge_core::models::{CloneOptions, ListScope, NewPage, PageNode, VersionHandle};
use sitemerge_core::store::{InMemoryPageStore, PageStore};

// ===========================================================================
// Helpers
// ===========================================================================

/// Page store wrapper that records each call as a short string such as
/// `"move /about/history -> /company"`, and fails the first mutation whose
/// record starts with `fail_on`.
struct Recorder {
    inner: InMemoryPageStore,
    calls: Mutex<Vec<String>>,
    fail_on: Option<&'static str>,
}

impl Recorder {
    fn new(inner: InMemoryPageStore) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
            fail_on: None,
        }
    }

    fn failing_on(inner: InMemoryPageStore, prefix: &'static str) -> Self {
        Self {
            fail_on: Some(prefix),
            ..Self::new(inner)
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls of one kind, with the kind prefix stripped.
    fn calls_of(&self, kind: &str) -> Vec<String> {
        let prefix = format!("{} ", kind);
        self.calls()
            .into_iter()
            .filter_map(|c| c.strip_prefix(&prefix).map(str::to_string))
            .collect()
    }

    fn mutation(&self, record: String) -> Result<(), StoreError> {
        let fail = self.fail_on.is_some_and(|p| record.starts_with(p));
        self.calls.lock().unwrap().push(record.clone());
        if fail {
            Err(StoreError::InvalidOperation(format!("injected failure: {}", record)))
        } else {
            Ok(())
        }
    }

    fn read(&self, record: String) {
        self.calls.lock().unwrap().push(record);
    }
}

impl PageStore for Recorder {
    fn resolve_by_path(&self, path: &str) -> Result<Option<PageNode>, StoreError> {
        self.read(format!("resolve {}", path));
        self.inner.resolve_by_path(path)
    }

    fn resolve_home_node(&self) -> Result<PageNode, StoreError> {
        self.read("home".to_string());
        self.inner.resolve_home_node()
    }

    fn list_nodes(&self, scope: &ListScope) -> Result<Vec<PageNode>, StoreError> {
        self.read(format!("list {}", scope.root));
        self.inner.list_nodes(scope)
    }

    fn current_version(&self, node: &PageNode) -> Result<VersionHandle, StoreError> {
        self.read(format!("version {}", node.path));
        self.inner.current_version(node)
    }

    fn clone_version(
        &self,
        version: &VersionHandle,
        destination: &PageNode,
        options: &CloneOptions,
    ) -> Result<(), StoreError> {
        self.mutation(format!("clone {}", destination.path))?;
        self.inner.clone_version(version, destination, options)
    }

    fn move_node(&self, node: &PageNode, new_parent: &PageNode) -> Result<(), StoreError> {
        self.mutation(format!("move {} -> {}", node.path, new_parent.path))?;
        self.inner.move_node(node, new_parent)
    }

    fn trash_node(&self, node: &PageNode) -> Result<(), StoreError> {
        self.mutation(format!("trash {}", node.path))?;
        self.inner.trash_node(node)
    }

    fn child_count(&self, node: &PageNode) -> Result<usize, StoreError> {
        self.read(format!("children {}", node.path));
        self.inner.child_count(node)
    }
}

/// Progress sink that keeps every event.
#[derive(Default)]
struct ProgressLog {
    events: Mutex<Vec<(Phase, usize, usize)>>,
}

impl ProgressSink for ProgressLog {
    fn advance(&self, phase: Phase, completed: usize, total: usize) {
        self.events.lock().unwrap().push((phase, completed, total));
    }
}

impl ProgressLog {
    fn phase(&self, phase: Phase) -> Vec<(usize, usize)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| *p == phase)
            .map(|(_, done, total)| (*done, *total))
            .collect()
    }
}

fn config(source: &str, target: &str, policy: CollisionPolicy) -> MergeConfig {
    MergeDefaults {
        include_descendants: true,
        collision_policy: policy,
        ..Default::default()
    }
    .for_roots(source, target)
}

fn store_with(paths: &[&str]) -> InMemoryPageStore {
    let store = InMemoryPageStore::new();
    for path in paths {
        store.add(path, &format!("content of {}", path)).unwrap();
    }
    store
}

fn about_company() -> InMemoryPageStore {
    store_with(&[
        "/about",
        "/about/team",
        "/about/history",
        "/company",
        "/company/team",
    ])
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[test]
fn replace_merges_relocates_and_cleans_up() {
    let store = about_company();
    let history = store.resolve_by_path("/about/history").unwrap().unwrap();
    let about_team = store.resolve_by_path("/about/team").unwrap().unwrap();
    let company_team = store.resolve_by_path("/company/team").unwrap().unwrap();

    let report = TreeMerger::new(&store)
        .run_merge(&config("/about", "/company", CollisionPolicy::Replace))
        .unwrap();

    assert!(report.is_completed(), "{}", report.summary());
    assert_eq!(report.merged, 1);
    assert_eq!(report.relocated, 1);
    assert_eq!(report.trashed, 1);
    assert_eq!(report.skipped(), 0);

    // The target page keeps its identity and gains the copied content.
    let after = store.resolve_by_path("/company/team").unwrap().unwrap();
    assert_eq!(after.id, company_team.id);
    let latest = store.versions(after.id).last().cloned().unwrap();
    assert_eq!(latest.content, "content of /about/team");
    assert_eq!(latest.comment, "Copied from /about/team");

    // The relocated page is the same page, now under the target.
    let moved = store.resolve_by_path("/company/history").unwrap().unwrap();
    assert_eq!(moved.id, history.id);

    assert!(store.is_trashed(about_team.id));
    assert!(store.resolve_by_path("/about").unwrap().is_some());
}

#[test]
fn nested_merge_trashes_children_before_parents() {
    let store = Recorder::new(store_with(&[
        "/old", "/old/a", "/old/a/b", "/new", "/new/a", "/new/a/b",
    ]));

    let report = TreeMerger::new(&store)
        .run_merge(&config("/old", "/new", CollisionPolicy::Replace))
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.merged, 2);
    assert_eq!(report.trashed, 2);
    assert_eq!(store.calls_of("clone"), vec!["/new/a", "/new/a/b"]);
    assert_eq!(store.calls_of("trash"), vec!["/old/a/b", "/old/a"]);
    assert_eq!(
        store.inner.live_paths(),
        vec!["/", "/new", "/new/a", "/new/a/b", "/old"]
    );
}

#[test]
fn identical_roots_make_no_store_calls() {
    let store = Recorder::new(store_with(&["/a"]));

    let err = TreeMerger::new(&store)
        .run_merge(&config("/a", "a/", CollisionPolicy::Replace))
        .unwrap_err();

    assert!(matches!(err, MergeError::IdenticalRoots(ref p) if p == "/a"));
    assert!(store.calls().is_empty());
}

#[test]
fn missing_root_fails_before_any_mutation() {
    let store = Recorder::new(store_with(&["/a", "/a/x"]));

    let err = TreeMerger::new(&store)
        .run_merge(&config("/a", "/nowhere", CollisionPolicy::Replace))
        .unwrap_err();

    assert!(matches!(err, MergeError::InvalidTreeRoot(ref p) if p == "/nowhere"));
    assert!(store.calls_of("move").is_empty());
    assert!(store.calls_of("clone").is_empty());
}

#[test]
fn nested_roots_are_rejected_in_both_directions() {
    let cases = [
        ("/about", "/about/archive"),
        ("/about/archive", "/about"),
        ("/", "/company"),
        ("/company", "/"),
    ];
    for (source, target) in cases {
        let store = Recorder::new(store_with(&[
            "/about",
            "/about/team",
            "/about/archive",
            "/about/archive/team",
            "/company",
            "/company/team",
        ]));
        let before = store.inner.live_paths();

        let err = TreeMerger::new(&store)
            .run_merge(&config(source, target, CollisionPolicy::Replace))
            .unwrap_err();

        assert!(
            matches!(err, MergeError::OverlappingRoots { .. }),
            "{} -> {}: {}",
            source,
            target,
            err
        );
        assert!(err.is_validation());
        for kind in ["clone", "move", "trash"] {
            assert!(store.calls_of(kind).is_empty(), "{} -> {}", source, target);
        }
        assert_eq!(store.inner.live_paths(), before);
    }
}

#[test]
fn children_only_scope_still_sees_nested_target() {
    // Without descendants the source scope holds /about/archive itself.
    let store = store_with(&["/about", "/about/archive", "/about/team"]);
    let mut cfg = config("/about", "/about/archive", CollisionPolicy::Skip);
    cfg.include_descendants = false;

    let err = TreeMerger::new(&store).plan(&cfg).unwrap_err();
    assert!(matches!(err, MergeError::OverlappingRoots { .. }));
}

#[test]
fn missing_relocation_parent_is_left_in_place() {
    let store = store_with(&["/src", "/dst"]);
    // An error page is never indexed, so its child has no parent to land in.
    store
        .add_page(
            "/src/broken",
            NewPage {
                without_version: true,
                ..Default::default()
            },
        )
        .unwrap();
    store.add("/src/broken/leaf", "leaf").unwrap();
    store.add("/src/ok", "ok").unwrap();

    let report = TreeMerger::new(&store)
        .run_merge(&config("/src", "/dst", CollisionPolicy::Replace))
        .unwrap();

    assert!(report.is_completed());
    assert_eq!(report.relocated, 1);
    assert_eq!(report.skipped_for(SkipReason::ParentMissing), 1);
    assert!(store.resolve_by_path("/src/broken/leaf").unwrap().is_some());
    assert!(store.resolve_by_path("/dst/ok").unwrap().is_some());
}

#[test]
fn stop_aborts_at_first_collision_without_sweep() {
    let store = Recorder::new(store_with(&[
        "/about",
        "/about/x",
        "/about/team",
        "/about/zzzzzz",
        "/company",
        "/company/team",
    ]));

    let report = TreeMerger::new(&store)
        .run_merge(&config("/about", "/company", CollisionPolicy::Stop))
        .unwrap();

    match &report.status {
        RunStatus::Aborted {
            reason:
                MergeError::CollisionAbort {
                    source_path,
                    target_path,
                },
        } => {
            assert_eq!(source_path, "/about/team");
            assert_eq!(target_path, "/company/team");
        }
        other => panic!("expected collision abort, got {}", other),
    }

    // "/x" sorts before the collision and stays applied; "/zzzzzz" after it
    // is never reached.
    assert_eq!(report.relocated, 1);
    assert_eq!(store.calls_of("move"), vec!["/about/x -> /company"]);
    assert!(store.calls_of("trash").is_empty());
    assert!(store.calls_of("children").is_empty());
    assert!(store.inner.resolve_by_path("/about/zzzzzz").unwrap().is_some());
}

#[test]
fn skip_after_replace_changes_nothing() {
    let store = store_with(&[
        "/about",
        "/about/team",
        "/about/team/alice",
        "/company",
        "/company/team",
    ]);
    let children_only = |policy| MergeConfig {
        include_descendants: false,
        ..config("/about", "/company", policy)
    };

    let first = TreeMerger::new(&store)
        .run_merge(&children_only(CollisionPolicy::Replace))
        .unwrap();
    assert_eq!(first.merged, 1);
    // /about/team still has a child, so it survives the sweep.
    assert_eq!(first.retained, 1);
    assert_eq!(first.trashed, 0);

    let recorder = Recorder::new(store);
    let second = TreeMerger::new(&recorder)
        .run_merge(&children_only(CollisionPolicy::Skip))
        .unwrap();

    assert!(second.is_completed());
    assert_eq!(second.mutations(), 0);
    assert_eq!(second.skipped_for(SkipReason::Collision), 1);
    assert!(recorder.calls_of("clone").is_empty());
    assert!(recorder.calls_of("move").is_empty());
    assert!(recorder.calls_of("trash").is_empty());
}

#[test]
fn cleanup_keeps_tree_roots_and_pages_with_children() {
    let store = InMemoryPageStore::new();
    store.add("/about", "about").unwrap();
    let ja = store.add_tree("/ja").unwrap();
    store.add("/ja/about", "ja about").unwrap();
    store.add("/ja/about/keep", "keep").unwrap();

    // Children-only merge of the Japanese tree into the default tree: the
    // keep page is not indexed, so /ja/about keeps a child.
    let mut cfg = config("/ja", "/", CollisionPolicy::Replace);
    cfg.include_descendants = false;
    let report = TreeMerger::new(&store).run_merge(&cfg).unwrap();

    assert!(report.is_completed());
    assert_eq!(report.merged, 1);
    assert_eq!(report.retained, 1);
    assert_eq!(report.trashed, 0);
    assert!(!store.is_trashed(ja.id));
    assert!(store.resolve_by_path("/ja/about/keep").unwrap().is_some());
}

#[test]
fn processing_order_and_progress() {
    let store = Recorder::new(store_with(&[
        "/src",
        "/src/a",
        "/src/a/deep",
        "/src/bb",
        "/src/ccc",
        "/src/ccc/x",
        "/dst",
        "/dst/a",
        "/dst/a/deep",
        "/dst/ccc",
        "/dst/ccc/x",
    ]));
    let progress = ProgressLog::default();

    let report = TreeMerger::new(&store)
        .run_merge_with_progress(
            &config("/src", "/dst", CollisionPolicy::Replace),
            &progress,
        )
        .unwrap();
    assert!(report.is_completed());

    // Reconciliation: non-decreasing relative path length.
    let reconciled: Vec<String> = store
        .calls()
        .into_iter()
        .filter_map(|c| {
            c.strip_prefix("clone /dst")
                .or_else(|| c.strip_prefix("move /src"))
                .map(|rest| rest.split(" -> ").next().unwrap_or(rest).to_string())
        })
        .collect();
    assert_eq!(reconciled, vec!["/a", "/bb", "/ccc", "/ccc/x", "/a/deep"]);
    assert!(reconciled.windows(2).all(|w| w[0].len() <= w[1].len()));

    // Cleanup: non-increasing absolute path length.
    let trashed = store.calls_of("trash");
    assert_eq!(trashed.len(), 4);
    assert!(trashed.windows(2).all(|w| w[0].len() >= w[1].len()));

    assert_eq!(
        progress.phase(Phase::Reconcile),
        (1..=5).map(|i| (i, 5)).collect::<Vec<_>>()
    );
    assert_eq!(
        progress.phase(Phase::Cleanup),
        (1..=4).map(|i| (i, 4)).collect::<Vec<_>>()
    );
}

#[test]
fn store_failures_abort_and_keep_earlier_work() {
    // Clone failure.
    let store = Recorder::failing_on(about_company(), "clone");
    let report = TreeMerger::new(&store)
        .run_merge(&config("/about", "/company", CollisionPolicy::Replace))
        .unwrap();
    assert!(matches!(
        report.status,
        RunStatus::Aborted {
            reason: MergeError::CloneFailed { ref source_path, ref target_path, .. }
        } if source_path == "/about/team" && target_path == "/company/team"
    ));
    assert_eq!(report.merged, 0);
    assert!(store.calls_of("move").is_empty());

    // Move failure after the merge succeeded.
    let store = Recorder::failing_on(about_company(), "move");
    let report = TreeMerger::new(&store)
        .run_merge(&config("/about", "/company", CollisionPolicy::Replace))
        .unwrap();
    assert!(matches!(
        report.status,
        RunStatus::Aborted {
            reason: MergeError::MoveFailed { ref destination_path, .. }
        } if destination_path == "/company/history"
    ));
    assert_eq!(report.merged, 1);
    assert!(store.calls_of("trash").is_empty());

    // Trash failure during cleanup.
    let store = Recorder::failing_on(about_company(), "trash");
    let report = TreeMerger::new(&store)
        .run_merge(&config("/about", "/company", CollisionPolicy::Replace))
        .unwrap();
    assert!(matches!(
        report.status,
        RunStatus::Aborted {
            reason: MergeError::TrashFailed { ref path, .. }
        } if path == "/about/team"
    ));
    assert_eq!(report.merged, 1);
    assert_eq!(report.relocated, 1);
    assert_eq!(report.trashed, 0);
    assert!(report.finished_at.is_some());
}

// ===========================================================================
// SQLite backend
// ===========================================================================

fn sqlite_store(paths: &[&str]) -> Database {
    let db = Database::in_memory().unwrap();
    db.initialize().unwrap();
    for path in paths {
        db.create_page(path, NewPage::with_content(&format!("content of {}", path)))
            .unwrap();
    }
    db
}

#[test]
fn sqlite_backend_runs_the_same_merge() {
    let db = sqlite_store(&[
        "/about",
        "/about/team",
        "/about/history",
        "/about/history/1999",
        "/company",
        "/company/team",
    ]);
    let about_team = db.resolve_by_path("/about/team").unwrap().unwrap();

    let report = TreeMerger::new(&db)
        .run_merge(&config("/about", "/company", CollisionPolicy::Replace))
        .unwrap();

    assert!(report.is_completed(), "{}", report.summary());
    assert_eq!(report.merged, 1);
    assert_eq!(report.relocated, 1);
    assert_eq!(report.skipped_for(SkipReason::MovedWithParent), 1);
    assert_eq!(report.trashed, 1);

    assert!(db.is_trashed(about_team.id).unwrap());
    assert!(db.resolve_by_path("/company/history/1999").unwrap().is_some());

    let team = db.resolve_by_path("/company/team").unwrap().unwrap();
    let versions = db.list_versions(team.id).unwrap();
    assert_eq!(versions.last().unwrap().comment, "Copied from /about/team");

    db.insert_audit_entry(&report.audit_entry()).unwrap();
    let log = db.list_audit_log(10).unwrap();
    assert_eq!(log.len(), 1);
    assert!(log[0].success);
}

#[test]
fn sqlite_keep_unapproved() {
    let db = sqlite_store(&["/a", "/a/x", "/b", "/b/x"]);
    let mut cfg = config("/a", "/b", CollisionPolicy::Replace);
    cfg.keep_unapproved = true;

    let report = TreeMerger::new(&db).run_merge(&cfg).unwrap();
    assert!(report.is_completed());

    let target = db.resolve_by_path("/b/x").unwrap().unwrap();
    let versions = db.list_versions(target.id).unwrap();
    assert_eq!(versions.len(), 2);
    assert!(!versions[1].approved);
}

// ===========================================================================
// Across site trees
// ===========================================================================

/// Children of `/ja/archive` (second tree) merged into the top level of the
/// whole site.
fn archive_into_site_root() -> MergeConfig {
    MergeDefaults {
        include_descendants: false,
        include_all_trees: true,
        collision_policy: CollisionPolicy::Replace,
        ..Default::default()
    }
    .for_roots("/ja/archive", "/")
}

#[test]
fn all_trees_merge_into_site_root() {
    let store = InMemoryPageStore::new();
    store.add("/about", "about").unwrap();
    store.add_tree("/ja").unwrap();
    store.add("/ja/news", "news").unwrap();
    store.add("/ja/archive", "archive").unwrap();
    let archived_about = store.add("/ja/archive/about", "old about").unwrap();
    let press = store.add("/ja/archive/press", "press").unwrap();

    // The site root's children include the top-level pages of every tree.
    let target = TreeIndex::build(&store, "/", false, true).unwrap();
    let keys: Vec<&str> = target.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["/about", "/ja/archive", "/ja/news"]);

    let report = TreeMerger::new(&store)
        .run_merge(&archive_into_site_root())
        .unwrap();

    assert!(report.is_completed(), "{}", report.summary());
    assert_eq!(report.merged, 1);
    assert_eq!(report.relocated, 1);
    assert_eq!(report.trashed, 1);

    let about = store.resolve_by_path("/about").unwrap().unwrap();
    let latest = store.versions(about.id).last().cloned().unwrap();
    assert_eq!(latest.comment, "Copied from /ja/archive/about");
    assert!(store.is_trashed(archived_about.id));

    let moved = store.resolve_by_path("/press").unwrap().unwrap();
    assert_eq!(moved.id, press.id);
    assert_eq!(moved.tree_id, 1);
    assert_eq!(
        store.live_paths(),
        vec!["/", "/about", "/ja", "/ja/archive", "/ja/news", "/press"]
    );
}

#[test]
fn sqlite_all_trees_merge_into_site_root() {
    let db = sqlite_store(&["/about"]);
    db.create_tree("/ja").unwrap();
    for path in ["/ja/news", "/ja/archive", "/ja/archive/about", "/ja/archive/press"] {
        db.create_page(path, NewPage::with_content(path)).unwrap();
    }
    let archived_about = db.resolve_by_path("/ja/archive/about").unwrap().unwrap();

    let report = TreeMerger::new(&db)
        .run_merge(&archive_into_site_root())
        .unwrap();

    assert!(report.is_completed(), "{}", report.summary());
    assert_eq!(report.merged, 1);
    assert_eq!(report.relocated, 1);
    assert_eq!(report.trashed, 1);
    assert!(db.is_trashed(archived_about.id).unwrap());

    let moved = db.resolve_by_path("/press").unwrap().unwrap();
    assert_eq!(moved.tree_id, 1);
    assert!(db.resolve_by_path("/ja/news").unwrap().is_some());
}
