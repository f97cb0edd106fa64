//! Repository for the `builds` table.
//!
//! All mutations are single guarded UPDATEs so the row is durable before
//! the launcher proceeds to its next phase, and so replayed calls cannot
//! regress the lifecycle: `mark_running` only applies to a pending build,
//! `finalize` only to a build that is not already terminal.

use runforge_core::build_state::terminal_status_for_exit;
use runforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::build::{Build, CreateBuild};

/// Column list for `builds` SELECT queries.
const COLUMNS: &str = "\
    id, script_id, status, triggered_by, log_file, \
    started_at, finished_at, exit_code, webhook_payload, created_at";

/// Provides lifecycle operations for build records.
pub struct BuildRepo;

impl BuildRepo {
    /// Create a new build record with status `pending`.
    pub async fn create(pool: &PgPool, dto: &CreateBuild) -> Result<Build, sqlx::Error> {
        let id: DbId = sqlx::query_scalar(
            "INSERT INTO builds (script_id, triggered_by, webhook_payload) \
             VALUES ($1, $2, $3) \
             RETURNING id",
        )
        .bind(dto.script_id)
        .bind(dto.triggered_by)
        .bind(&dto.webhook_payload)
        .fetch_one(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Transition a pending build to `running`, recording the log path and
    /// start time.
    ///
    /// Returns `false` when the build is not in `pending` (already started
    /// or already finished) — the update is then a no-op.
    pub async fn mark_running(
        pool: &PgPool,
        id: DbId,
        log_file: &str,
    ) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query(
            "UPDATE builds \
             SET status = 'running', log_file = $2, started_at = now() \
             WHERE id = $1 AND status = 'pending'",
        )
        .bind(id)
        .bind(log_file)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    /// Finalize a build with its exit code.
    ///
    /// Status becomes `success` for exit code 0, `failure` otherwise. The
    /// guard makes this idempotent: a second call finds no non-terminal row
    /// and returns `false` without touching the stored outcome.
    pub async fn finalize(pool: &PgPool, id: DbId, exit_code: i32) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query(
            "UPDATE builds \
             SET status = $2, exit_code = $3, finished_at = now() \
             WHERE id = $1 AND status IN ('pending', 'running')",
        )
        .bind(id)
        .bind(terminal_status_for_exit(exit_code))
        .bind(exit_code)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    /// Find a build by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Build>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM builds WHERE id = $1");
        sqlx::query_as::<_, Build>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// List builds for a script, most recently started first.
    ///
    /// Builds that never started (no `started_at`) sort last.
    pub async fn list_by_script(
        pool: &PgPool,
        script_id: DbId,
    ) -> Result<Vec<Build>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM builds \
             WHERE script_id = $1 \
             ORDER BY started_at DESC NULLS LAST, id DESC"
        );
        sqlx::query_as::<_, Build>(&query)
            .bind(script_id)
            .fetch_all(pool)
            .await
    }

    /// Count builds for a script with the given origin that are still in a
    /// non-terminal state. Used by tests to assert scheduler coalescing.
    pub async fn count_active_by_origin(
        pool: &PgPool,
        script_id: DbId,
        origin: &str,
    ) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "SELECT COUNT(*) FROM builds \
             WHERE script_id = $1 AND triggered_by = $2 \
               AND status IN ('pending', 'running')",
        )
        .bind(script_id)
        .bind(origin)
        .fetch_one(pool)
        .await
    }
}
