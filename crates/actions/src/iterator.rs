//! Paginated, resumable iterators over persisted results.
//!
//! Pages of `fetch_size` rows are fetched on demand with a `key > cursor`
//! predicate, so the only state needed to resume is the last key seen. Each
//! page is read in its own short read-only transaction; nothing is held open
//! between calls to `next`.
//!
//! Usage:
//!
//! ```ignore
//! let mut runs = service.list_runs("repo", Some("main"), "", &cancel);
//! while runs.next().await {
//!     let run = runs.value().unwrap();
//!     // ...
//! }
//! if let Some(err) = runs.err() { /* ... */ }
//! runs.close();
//! ```

use std::collections::VecDeque;
use std::sync::Arc;

use strata_core::results::{RunResult, TaskResult};
use strata_core::store::{RunStore, StoreResult};
use tokio_util::sync::CancellationToken;

use crate::error::ActionsError;
use crate::service::with_cancel;

// ---------------------------------------------------------------------------
// Pager
// ---------------------------------------------------------------------------

/// Buffering and cursor state shared by both iterators.
#[derive(Debug)]
struct Pager<T> {
    cursor: String,
    fetch_size: usize,
    buffer: VecDeque<T>,
    value: Option<T>,
    err: Option<ActionsError>,
    exhausted: bool,
    closed: bool,
}

impl<T> Pager<T> {
    fn new(after: &str, fetch_size: usize) -> Self {
        Self {
            cursor: after.to_string(),
            fetch_size: fetch_size.max(1),
            buffer: VecDeque::new(),
            value: None,
            err: None,
            exhausted: false,
            closed: false,
        }
    }

    /// Whether iteration may continue at all.
    fn active(&mut self) -> bool {
        if self.closed || self.err.is_some() {
            self.value = None;
            return false;
        }
        true
    }

    fn needs_page(&self) -> bool {
        self.buffer.is_empty() && !self.exhausted
    }

    /// Buffer a fetched page. Returns `false` if the fetch failed.
    fn fill(&mut self, page: StoreResult<Vec<T>>, context: &str) -> bool {
        match page {
            Ok(rows) => {
                if rows.len() < self.fetch_size {
                    self.exhausted = true;
                }
                self.buffer.extend(rows);
                true
            }
            Err(e) => {
                self.err = Some(ActionsError::store(context, e));
                self.value = None;
                false
            }
        }
    }

    /// Move the next buffered row into `value` and advance the cursor.
    fn advance(&mut self, key: impl Fn(&T) -> &str) -> bool {
        match self.buffer.pop_front() {
            Some(row) => {
                self.cursor = key(&row).to_string();
                self.value = Some(row);
                true
            }
            None => {
                self.value = None;
                false
            }
        }
    }

    /// Restart iteration strictly after `key`.
    fn reposition(&mut self, key: &str) {
        self.cursor = key.to_string();
        self.buffer.clear();
        self.value = None;
        self.exhausted = false;
    }

    fn close(&mut self) {
        self.closed = true;
        self.buffer.clear();
        self.value = None;
    }
}

// ---------------------------------------------------------------------------
// RunResultIterator
// ---------------------------------------------------------------------------

/// Runs of a repository ordered by run id, optionally limited to a branch.
pub struct RunResultIterator {
    store: Arc<dyn RunStore>,
    repository_id: String,
    branch_id: Option<String>,
    cancel: CancellationToken,
    pager: Pager<RunResult>,
}

impl RunResultIterator {
    pub(crate) fn new(
        store: Arc<dyn RunStore>,
        repository_id: &str,
        branch_id: Option<&str>,
        after: &str,
        fetch_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            repository_id: repository_id.to_string(),
            branch_id: branch_id.map(str::to_string),
            cancel,
            pager: Pager::new(after, fetch_size),
        }
    }

    /// Advance to the next run. Returns `false` at the end, after an error,
    /// or once closed.
    pub async fn next(&mut self) -> bool {
        if !self.pager.active() {
            return false;
        }
        if self.pager.needs_page() {
            let page = with_cancel(
                &self.cancel,
                self.store.list_runs(
                    &self.repository_id,
                    self.branch_id.as_deref(),
                    &self.pager.cursor,
                    self.pager.fetch_size,
                ),
            )
            .await;
            if !self.pager.fill(page, "list run results") {
                return false;
            }
        }
        self.pager.advance(|run| run.run_id.as_str())
    }

    /// The current run, if `next` returned `true`.
    pub fn value(&self) -> Option<&RunResult> {
        self.pager.value.as_ref()
    }

    /// Resume iteration strictly after `run_id`.
    pub fn seek(&mut self, run_id: &str) {
        self.pager.reposition(run_id);
    }

    /// The error that ended iteration, if any.
    pub fn err(&self) -> Option<&ActionsError> {
        self.pager.err.as_ref()
    }

    /// Release buffered rows. `next` returns `false` afterwards.
    pub fn close(&mut self) {
        self.pager.close();
    }
}

// ---------------------------------------------------------------------------
// TaskResultIterator
// ---------------------------------------------------------------------------

/// Hook outcomes of one run ordered by hook run id.
pub struct TaskResultIterator {
    store: Arc<dyn RunStore>,
    repository_id: String,
    run_id: String,
    cancel: CancellationToken,
    pager: Pager<TaskResult>,
}

impl TaskResultIterator {
    pub(crate) fn new(
        store: Arc<dyn RunStore>,
        repository_id: &str,
        run_id: &str,
        after: &str,
        fetch_size: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            repository_id: repository_id.to_string(),
            run_id: run_id.to_string(),
            cancel,
            pager: Pager::new(after, fetch_size),
        }
    }

    pub async fn next(&mut self) -> bool {
        if !self.pager.active() {
            return false;
        }
        if self.pager.needs_page() {
            let page = with_cancel(
                &self.cancel,
                self.store.list_tasks(
                    &self.repository_id,
                    &self.run_id,
                    &self.pager.cursor,
                    self.pager.fetch_size,
                ),
            )
            .await;
            if !self.pager.fill(page, "list task results") {
                return false;
            }
        }
        self.pager.advance(|task| task.hook_run_id.as_str())
    }

    pub fn value(&self) -> Option<&TaskResult> {
        self.pager.value.as_ref()
    }

    pub fn err(&self) -> Option<&ActionsError> {
        self.pager.err.as_ref()
    }

    pub fn close(&mut self) {
        self.pager.close();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
