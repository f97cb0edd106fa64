//! Repository for the `scripts` table.

use runforge_core::types::DbId;
use sqlx::PgPool;

use crate::models::script::{CreateScript, Script};

/// Column list for `scripts` SELECT queries.
const COLUMNS: &str = "\
    id, name, filename, description, webhook_token, \
    schedule_cron, schedule_enabled, created_at, updated_at";

/// Provides CRUD operations for stored scripts.
pub struct ScriptRepo;

impl ScriptRepo {
    /// Insert a new script row.
    pub async fn create(pool: &PgPool, dto: &CreateScript) -> Result<Script, sqlx::Error> {
        let id: DbId = sqlx::query_scalar(
            "INSERT INTO scripts (name, filename, description, webhook_token) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id",
        )
        .bind(&dto.name)
        .bind(&dto.filename)
        .bind(&dto.description)
        .bind(&dto.webhook_token)
        .fetch_one(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// Find a script by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Script>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scripts WHERE id = $1");
        sqlx::query_as::<_, Script>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a script by its on-disk filename.
    pub async fn find_by_filename(
        pool: &PgPool,
        filename: &str,
    ) -> Result<Option<Script>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scripts WHERE filename = $1");
        sqlx::query_as::<_, Script>(&query)
            .bind(filename)
            .fetch_optional(pool)
            .await
    }

    /// Find the script that owns a webhook token.
    pub async fn find_by_webhook_token(
        pool: &PgPool,
        token: &str,
    ) -> Result<Option<Script>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scripts WHERE webhook_token = $1");
        sqlx::query_as::<_, Script>(&query)
            .bind(token)
            .fetch_optional(pool)
            .await
    }

    /// List all scripts, ordered by name.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Script>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM scripts ORDER BY name");
        sqlx::query_as::<_, Script>(&query).fetch_all(pool).await
    }

    /// Update a script's description.
    pub async fn update_description(
        pool: &PgPool,
        id: DbId,
        description: &str,
    ) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query(
            "UPDATE scripts SET description = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(description)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    /// Persist a script's schedule fields.
    ///
    /// The in-memory timer table is a projection of these two columns; the
    /// caller is responsible for re-registering with the scheduler after a
    /// successful update.
    pub async fn update_schedule(
        pool: &PgPool,
        id: DbId,
        cron: Option<&str>,
        enabled: bool,
    ) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query(
            "UPDATE scripts SET schedule_cron = $2, schedule_enabled = $3, updated_at = now() \
             WHERE id = $1",
        )
        .bind(id)
        .bind(cron)
        .bind(enabled)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    /// Replace a script's webhook token, invalidating the old one.
    pub async fn update_webhook_token(
        pool: &PgPool,
        id: DbId,
        token: &str,
    ) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query(
            "UPDATE scripts SET webhook_token = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(token)
        .execute(pool)
        .await?
        .rows_affected();

        Ok(rows > 0)
    }

    /// Delete a script. Its build history cascades at the database level.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let rows = sqlx::query("DELETE FROM scripts WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();

        Ok(rows > 0)
    }

    /// List scripts that should have a timer installed on boot.
    pub async fn list_scheduled(pool: &PgPool) -> Result<Vec<Script>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM scripts \
             WHERE schedule_enabled = TRUE AND schedule_cron IS NOT NULL \
             ORDER BY id"
        );
        sqlx::query_as::<_, Script>(&query).fetch_all(pool).await
    }
}
