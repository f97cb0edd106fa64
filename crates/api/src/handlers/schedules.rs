//! Schedule management handlers.
//!
//! The database columns are the source of truth; the scheduler's timer
//! table is re-registered after every successful persist so the two can
//! never drift for longer than one request.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use runforge_core::error::CoreError;
use runforge_core::schedule::CronSchedule;
use runforge_core::types::{DbId, Timestamp};
use runforge_db::repositories::ScriptRepo;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Request body for PUT /scripts/{id}/schedule.
#[derive(Debug, Deserialize)]
pub struct SetScheduleRequest {
    /// Five-field crontab expression. Empty or absent clears the schedule.
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

/// Current schedule state for a script.
#[derive(Debug, Serialize)]
pub struct ScheduleResponse {
    pub schedule_cron: Option<String>,
    pub schedule_enabled: bool,
    /// Next fire instant, when a timer is installed.
    pub next_fire_time: Option<Timestamp>,
}

/// GET /scripts/{id}/schedule
pub async fn get_schedule(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ScheduleResponse>>> {
    let script = ScriptRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "script",
            id,
        }))?;

    Ok(Json(DataResponse {
        data: ScheduleResponse {
            schedule_cron: script.schedule_cron,
            schedule_enabled: script.schedule_enabled,
            next_fire_time: state.scheduler.next_fire_time(id).await,
        },
    }))
}

/// PUT /scripts/{id}/schedule
///
/// Validate, persist, and (re-)register the timer. Invalid cron syntax is
/// rejected here with a descriptive 400 and never reaches the timer table.
pub async fn set_schedule(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<SetScheduleRequest>,
) -> AppResult<Json<DataResponse<ScheduleResponse>>> {
    let cron = input.cron.unwrap_or_default().trim().to_string();

    if input.enabled && cron.is_empty() {
        return Err(AppError::Core(CoreError::Validation(
            "cron expression required when enabled".to_string(),
        )));
    }

    // Validate before persisting anything.
    if !cron.is_empty() {
        CronSchedule::parse(&cron)?;
    }

    let cron_opt = (!cron.is_empty()).then_some(cron.as_str());
    let updated = ScriptRepo::update_schedule(&state.pool, id, cron_opt, input.enabled).await?;
    if !updated {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "script",
            id,
        }));
    }

    let next_fire_time = state
        .scheduler
        .set_schedule(id, cron_opt, input.enabled)
        .await?;

    Ok(Json(DataResponse {
        data: ScheduleResponse {
            schedule_cron: cron_opt.map(str::to_string),
            schedule_enabled: input.enabled,
            next_fire_time,
        },
    }))
}

/// DELETE /scripts/{id}/schedule
///
/// Disable and clear the schedule; the timer is removed so no further
/// fires can occur.
pub async fn delete_schedule(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let updated = ScriptRepo::update_schedule(&state.pool, id, None, false).await?;
    if !updated {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "script",
            id,
        }));
    }

    state.scheduler.remove_schedule(id).await;
    Ok(StatusCode::NO_CONTENT)
}
