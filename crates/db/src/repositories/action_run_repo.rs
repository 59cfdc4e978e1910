//! Repository for the `actions_runs` and `actions_run_hooks` tables.

use sqlx::{PgPool, Postgres, Transaction};
use strata_core::results::{RunResult, TaskResult};
use strata_core::store::StoreError;

use crate::models::action_run::{ActionRunHookRow, ActionRunRow};

/// Column list for actions_runs queries.
const RUN_COLUMNS: &str = "run_id, event_type, start_time, end_time, branch_id, source_ref, \
    commit_id, passed";

/// Column list for actions_run_hooks queries.
const HOOK_COLUMNS: &str = "run_id, hook_run_id, hook_id, action_name, start_time, end_time, \
    passed";

/// Provides data-access methods for action run outcomes.
pub struct ActionRunRepo;

impl ActionRunRepo {
    /// Insert a run and all its hook rows in one transaction.
    ///
    /// Any failed insert rolls back the whole transaction. The returned error
    /// names the failing row.
    pub async fn create_with_hooks(
        pool: &PgPool,
        repository_id: &str,
        run: &RunResult,
        tasks: &[TaskResult],
    ) -> Result<(), StoreError> {
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| StoreError::backend("begin transaction", e))?;

        Self::insert_run_inner(&mut tx, repository_id, run)
            .await
            .map_err(|e| StoreError::backend("insert run information", e))?;

        for task in tasks {
            Self::insert_hook_inner(&mut tx, repository_id, run, task)
                .await
                .map_err(|e| {
                    StoreError::backend(
                        format!(
                            "insert run hook information ({} {})",
                            task.action_name, task.hook_id
                        ),
                        e,
                    )
                })?;
        }

        tx.commit()
            .await
            .map_err(|e| StoreError::backend("commit run information", e))
    }

    /// Set the commit id of a run. Returns `false` if no run matched.
    pub async fn update_commit_id(
        pool: &PgPool,
        repository_id: &str,
        run_id: &str,
        commit_id: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE actions_runs SET commit_id = $3 \
             WHERE repository_id = $1 AND run_id = $2",
        )
        .bind(repository_id)
        .bind(run_id)
        .bind(commit_id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Find a run by its id.
    pub async fn find_run(
        pool: &PgPool,
        repository_id: &str,
        run_id: &str,
    ) -> Result<Option<ActionRunRow>, sqlx::Error> {
        let mut tx = Self::begin_read_only(pool).await?;
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM actions_runs \
             WHERE repository_id = $1 AND run_id = $2"
        );
        let row = sqlx::query_as::<_, ActionRunRow>(&query)
            .bind(repository_id)
            .bind(run_id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Find a single hook outcome of a run.
    pub async fn find_hook(
        pool: &PgPool,
        repository_id: &str,
        run_id: &str,
        hook_run_id: &str,
    ) -> Result<Option<ActionRunHookRow>, sqlx::Error> {
        let mut tx = Self::begin_read_only(pool).await?;
        let query = format!(
            "SELECT {HOOK_COLUMNS} FROM actions_run_hooks \
             WHERE repository_id = $1 AND run_id = $2 AND hook_run_id = $3"
        );
        let row = sqlx::query_as::<_, ActionRunHookRow>(&query)
            .bind(repository_id)
            .bind(run_id)
            .bind(hook_run_id)
            .fetch_optional(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(row)
    }

    /// List runs after the `after` cursor, ordered by run id.
    ///
    /// `branch_id = None` lists every branch.
    pub async fn list_runs(
        pool: &PgPool,
        repository_id: &str,
        branch_id: Option<&str>,
        after: &str,
        limit: i64,
    ) -> Result<Vec<ActionRunRow>, sqlx::Error> {
        let mut tx = Self::begin_read_only(pool).await?;
        let query = format!(
            "SELECT {RUN_COLUMNS} FROM actions_runs \
             WHERE repository_id = $1 \
               AND run_id > $2 \
               AND ($3::text IS NULL OR branch_id = $3) \
             ORDER BY run_id ASC \
             LIMIT $4"
        );
        let rows = sqlx::query_as::<_, ActionRunRow>(&query)
            .bind(repository_id)
            .bind(after)
            .bind(branch_id)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(rows)
    }

    /// List the hook outcomes of a run after the `after` cursor, ordered by
    /// hook run id.
    pub async fn list_hooks(
        pool: &PgPool,
        repository_id: &str,
        run_id: &str,
        after: &str,
        limit: i64,
    ) -> Result<Vec<ActionRunHookRow>, sqlx::Error> {
        let mut tx = Self::begin_read_only(pool).await?;
        let query = format!(
            "SELECT {HOOK_COLUMNS} FROM actions_run_hooks \
             WHERE repository_id = $1 AND run_id = $2 AND hook_run_id > $3 \
             ORDER BY hook_run_id ASC \
             LIMIT $4"
        );
        let rows = sqlx::query_as::<_, ActionRunHookRow>(&query)
            .bind(repository_id)
            .bind(run_id)
            .bind(after)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(rows)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Open a transaction that rejects writes.
    async fn begin_read_only(pool: &PgPool) -> Result<Transaction<'static, Postgres>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;
        Ok(tx)
    }

    async fn insert_run_inner(
        tx: &mut Transaction<'_, Postgres>,
        repository_id: &str,
        run: &RunResult,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO actions_runs \
                (repository_id, run_id, event_type, start_time, end_time, \
                 branch_id, source_ref, commit_id, passed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, '', $8)",
        )
        .bind(repository_id)
        .bind(&run.run_id)
        .bind(run.event_type.as_str())
        .bind(run.start_time)
        .bind(run.end_time)
        .bind(&run.branch_id)
        .bind(&run.source_ref)
        .bind(run.passed)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    async fn insert_hook_inner(
        tx: &mut Transaction<'_, Postgres>,
        repository_id: &str,
        run: &RunResult,
        task: &TaskResult,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO actions_run_hooks \
                (repository_id, run_id, hook_run_id, event_type, action_name, \
                 hook_id, start_time, end_time, passed) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(repository_id)
        .bind(&run.run_id)
        .bind(&task.hook_run_id)
        .bind(run.event_type.as_str())
        .bind(&task.action_name)
        .bind(&task.hook_id)
        .bind(task.start_time)
        .bind(task.end_time)
        .bind(task.passed)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}
