//! Build (execution record) entity model and DTOs.

use runforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// One run attempt of a script.
///
/// Lifecycle: `pending` -> `running` -> `success` | `failure`, driven
/// exclusively by the job launcher through `BuildRepo`. Readers (stream
/// endpoint, history endpoints) never mutate a build.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Build {
    pub id: DbId,
    pub script_id: DbId,
    pub status: String,
    pub triggered_by: String,
    /// Absolute path of the persisted log, set when the build starts.
    pub log_file: Option<String>,
    pub started_at: Option<Timestamp>,
    pub finished_at: Option<Timestamp>,
    pub exit_code: Option<i32>,
    /// JSON-encoded webhook body for webhook-originated builds.
    pub webhook_payload: Option<String>,
    pub created_at: Timestamp,
}

/// DTO for creating a new build record.
#[derive(Debug, Clone)]
pub struct CreateBuild {
    pub script_id: DbId,
    /// One of the `ORIGIN_*` constants in `runforge_core::build_state`.
    pub triggered_by: &'static str,
    pub webhook_payload: Option<String>,
}
