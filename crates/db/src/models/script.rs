//! Script entity model and DTOs.

use runforge_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A stored operator script.
///
/// The script body lives on disk under the configured scripts directory as
/// `filename`; this row carries the metadata, the optional cron schedule,
/// and the opaque webhook trigger token.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Script {
    pub id: DbId,
    pub name: String,
    pub filename: String,
    pub description: String,
    pub webhook_token: Option<String>,
    /// Five-field crontab expression, if a schedule has ever been set.
    pub schedule_cron: Option<String>,
    pub schedule_enabled: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for inserting a new script row.
#[derive(Debug, Clone)]
pub struct CreateScript {
    pub name: String,
    pub filename: String,
    pub description: String,
    /// Issued at creation so the trigger URL works out of the box.
    pub webhook_token: Option<String>,
}

/// DTO for the script save endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SaveScript {
    pub name: String,
    /// Full script body written to disk.
    pub content: String,
    #[serde(default)]
    pub description: Option<String>,
}
