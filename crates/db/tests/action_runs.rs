//! Integration tests for the actions_runs / actions_run_hooks repository.
//!
//! Exercise [`PgRunStore`] against a real database:
//! - atomic insert of a run with its hooks, rollback on a failing row
//! - point lookups returning `None` for missing rows
//! - commit id linking
//! - paginated listing with branch filter and cursor
//!
//! `#[sqlx::test]` creates a fresh database per test on the server named by
//! `DATABASE_URL` and applies `./migrations` to it.

use chrono::{Duration, Utc};
use sqlx::PgPool;
use strata_core::event::EventType;
use strata_core::results::{RunResult, TaskResult};
use strata_core::store::RunStore;
use strata_db::PgRunStore;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_run(run_id: &str, branch: &str, passed: bool) -> RunResult {
    let now = Utc::now();
    RunResult {
        run_id: run_id.to_string(),
        branch_id: branch.to_string(),
        source_ref: branch.to_string(),
        event_type: EventType::PreCommit,
        start_time: now,
        end_time: now + Duration::seconds(1),
        passed,
        commit_id: String::new(),
    }
}

fn new_task(run_id: &str, hook_run_id: &str, hook_id: &str, passed: bool) -> TaskResult {
    let now = Utc::now();
    TaskResult {
        run_id: run_id.to_string(),
        hook_run_id: hook_run_id.to_string(),
        hook_id: hook_id.to_string(),
        action_name: "check".to_string(),
        start_time: now,
        end_time: now,
        passed,
    }
}

async fn count(pool: &PgPool, table: &str) -> i64 {
    let row: (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .unwrap_or_else(|e| panic!("{table} count failed: {e}"));
    row.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "./migrations")]
async fn test_insert_and_get(pool: PgPool) {
    let store = PgRunStore::new(pool.clone());
    let run = new_run("r1", "main", false);
    let tasks = [
        new_task("r1", "t1", "h1", true),
        new_task("r1", "t2", "h2", false),
    ];
    store.insert_run("repo", &run, &tasks).await.unwrap();

    let found = store.get_run("repo", "r1").await.unwrap().expect("run exists");
    assert_eq!(found.branch_id, "main");
    assert_eq!(found.event_type, EventType::PreCommit);
    assert!(!found.passed);
    assert_eq!(found.commit_id, "");

    let t1 = store.get_task("repo", "r1", "t1").await.unwrap().expect("task exists");
    assert!(t1.passed);
    assert_eq!(t1.hook_id, "h1");
    let t2 = store.get_task("repo", "r1", "t2").await.unwrap().expect("task exists");
    assert!(!t2.passed);

    assert_eq!(count(&pool, "actions_run_hooks").await, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_missing_rows_return_none(pool: PgPool) {
    let store = PgRunStore::new(pool);
    assert!(store.get_run("repo", "nope").await.unwrap().is_none());
    assert!(store.get_task("repo", "nope", "nope").await.unwrap().is_none());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_failed_hook_insert_rolls_back_run(pool: PgPool) {
    let store = PgRunStore::new(pool.clone());
    let run = new_run("r1", "main", true);
    // Duplicate hook run id violates the primary key on the second row.
    let tasks = [
        new_task("r1", "t1", "h1", true),
        new_task("r1", "t1", "h2", true),
    ];
    let err = store.insert_run("repo", &run, &tasks).await.unwrap_err();
    assert!(
        err.to_string().contains("insert run hook information (check h2)"),
        "unexpected error: {err}"
    );

    assert_eq!(count(&pool, "actions_runs").await, 0);
    assert_eq!(count(&pool, "actions_run_hooks").await, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn test_update_commit_id_overwrites(pool: PgPool) {
    let store = PgRunStore::new(pool);
    store
        .insert_run("repo", &new_run("r1", "main", true), &[new_task("r1", "t1", "h1", true)])
        .await
        .unwrap();

    assert!(store.update_commit_id("repo", "r1", "c1").await.unwrap());
    assert!(store.update_commit_id("repo", "r1", "c2").await.unwrap());
    let found = store.get_run("repo", "r1").await.unwrap().unwrap();
    assert_eq!(found.commit_id, "c2");

    assert!(!store.update_commit_id("repo", "missing", "c1").await.unwrap());
}

#[sqlx::test(migrations = "./migrations")]
async fn test_list_runs_by_branch_with_cursor(pool: PgPool) {
    let store = PgRunStore::new(pool);
    for (id, branch) in [("r1", "main"), ("r2", "dev"), ("r3", "main"), ("r4", "main")] {
        store
            .insert_run("repo", &new_run(id, branch, true), &[new_task(id, "t1", "h1", true)])
            .await
            .unwrap();
    }

    let page = store.list_runs("repo", Some("main"), "", 2).await.unwrap();
    let ids: Vec<&str> = page.iter().map(|r| r.run_id.as_str()).collect();
    assert_eq!(ids, vec!["r1", "r3"]);

    let page = store.list_runs("repo", Some("main"), "r3", 10).await.unwrap();
    let ids: Vec<&str> = page.iter().map(|r| r.run_id.as_str()).collect();
    assert_eq!(ids, vec!["r4"]);

    let all = store.list_runs("repo", None, "", 10).await.unwrap();
    assert_eq!(all.len(), 4);

    let tasks = store.list_tasks("repo", "r2", "", 10).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].run_id, "r2");
}
