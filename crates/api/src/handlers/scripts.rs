//! Handlers for script management and manual run triggering.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use rand::distr::Alphanumeric;
use rand::Rng;
use runforge_core::build_state::ORIGIN_MANUAL;
use runforge_core::error::CoreError;
use runforge_core::exec_env::{ENV_BUILD_ID, ENV_SCRIPT_ID};
use runforge_core::types::DbId;
use runforge_db::models::build::CreateBuild;
use runforge_db::models::script::{CreateScript, SaveScript, Script};
use runforge_db::repositories::{BuildRepo, ScriptRepo};
use runforge_engine::launcher::LaunchRequest;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Script metadata plus the on-disk body.
#[derive(Debug, Serialize)]
pub struct ScriptWithContent {
    #[serde(flatten)]
    pub script: Script,
    pub content: String,
}

/// Response for the manual run trigger.
///
/// The run executes in the background; the caller is expected to open the
/// stream endpoint with the returned build ID.
#[derive(Debug, Serialize)]
pub struct RunStarted {
    pub build_id: DbId,
    pub status: &'static str,
}

/// Response for webhook token regeneration.
#[derive(Debug, Serialize)]
pub struct WebhookToken {
    pub webhook_token: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Length of generated webhook tokens.
const WEBHOOK_TOKEN_LEN: usize = 43;

/// Generate a fresh URL-safe webhook token.
pub fn generate_webhook_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(WEBHOOK_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Derive the on-disk filename for a script name: the name itself, with
/// `.sh` appended when it carries no extension. Rejects path traversal.
fn script_filename(name: &str) -> Result<String, CoreError> {
    if name.contains('/') || name.contains('\\') || name.contains("..") {
        return Err(CoreError::Validation(format!(
            "script name '{name}' must not contain path separators"
        )));
    }
    if name.contains('.') {
        Ok(name.to_string())
    } else {
        Ok(format!("{name}.sh"))
    }
}

/// Write the script body and mark it executable so the launcher can spawn
/// it directly (the shebang decides the runtime).
async fn write_script_file(
    state: &AppState,
    filename: &str,
    content: &str,
) -> Result<(), std::io::Error> {
    let dir = &state.config.scripts_dir;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(filename);
    tokio::fs::write(&path, content).await?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = tokio::fs::metadata(&path).await?.permissions();
        perms.set_mode(0o755);
        tokio::fs::set_permissions(&path, perms).await?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// CRUD handlers
// ---------------------------------------------------------------------------

/// GET /scripts
///
/// List all scripts, ordered by name.
pub async fn list_scripts(
    State(state): State<AppState>,
) -> AppResult<Json<DataResponse<Vec<Script>>>> {
    let scripts = ScriptRepo::list_all(&state.pool).await?;
    Ok(Json(DataResponse { data: scripts }))
}

/// POST /scripts
///
/// Save a script: write the body to disk and upsert the registry row,
/// keyed by filename. Returns 201 for a new script, 200 for an update.
pub async fn save_script(
    State(state): State<AppState>,
    Json(input): Json<SaveScript>,
) -> AppResult<(StatusCode, Json<DataResponse<Script>>)> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    let filename = script_filename(name)?;

    write_script_file(&state, &filename, &input.content)
        .await
        .map_err(|e| AppError::InternalError(format!("failed to write script file: {e}")))?;

    match ScriptRepo::find_by_filename(&state.pool, &filename).await? {
        Some(existing) => {
            if let Some(ref description) = input.description {
                ScriptRepo::update_description(&state.pool, existing.id, description).await?;
            }
            let script = ScriptRepo::find_by_id(&state.pool, existing.id)
                .await?
                .ok_or(AppError::Core(CoreError::NotFound {
                    entity: "script",
                    id: existing.id,
                }))?;
            Ok((StatusCode::OK, Json(DataResponse { data: script })))
        }
        None => {
            let script = ScriptRepo::create(
                &state.pool,
                &CreateScript {
                    name: name.to_string(),
                    filename,
                    description: input.description.unwrap_or_default(),
                    webhook_token: Some(generate_webhook_token()),
                },
            )
            .await?;
            Ok((StatusCode::CREATED, Json(DataResponse { data: script })))
        }
    }
}

/// GET /scripts/{id}
///
/// Script metadata plus the file content.
pub async fn get_script(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<ScriptWithContent>>> {
    let script = ScriptRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "script",
            id,
        }))?;

    let path = state.config.scripts_dir.join(&script.filename);
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|_| AppError::NotFound("script file not found on disk".to_string()))?;

    Ok(Json(DataResponse {
        data: ScriptWithContent { script, content },
    }))
}

/// DELETE /scripts/{id}
///
/// Remove the script, its timer, and (best-effort) its backing file.
/// Build history cascades at the database level.
pub async fn delete_script(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<StatusCode> {
    let script = ScriptRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "script",
            id,
        }))?;

    state.scheduler.remove_schedule(id).await;
    ScriptRepo::delete(&state.pool, id).await?;

    let path = state.config.scripts_dir.join(&script.filename);
    let _ = tokio::fs::remove_file(&path).await;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Trigger handlers
// ---------------------------------------------------------------------------

/// POST /scripts/{id}/run
///
/// Start an asynchronous run and return immediately with the build ID.
/// The client should then open `/builds/{build_id}/stream`.
pub async fn run_script(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<RunStarted>>> {
    let script = ScriptRepo::find_by_id(&state.pool, id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "script",
            id,
        }))?;

    let script_path = state.config.scripts_dir.join(&script.filename);
    if !script_path.exists() {
        return Err(AppError::NotFound(
            "script file not found on disk".to_string(),
        ));
    }

    let build = BuildRepo::create(
        &state.pool,
        &CreateBuild {
            script_id: id,
            triggered_by: ORIGIN_MANUAL,
            webhook_payload: None,
        },
    )
    .await?;

    state
        .launcher
        .launch(LaunchRequest {
            build_id: build.id,
            script_path,
            log_dir: state.config.builds_dir.join(&script.filename),
            env: vec![
                (ENV_BUILD_ID.to_string(), build.id.to_string()),
                (ENV_SCRIPT_ID.to_string(), id.to_string()),
            ],
        })
        .await;

    Ok(Json(DataResponse {
        data: RunStarted {
            build_id: build.id,
            status: "started",
        },
    }))
}

/// POST /scripts/{id}/webhook/regenerate
///
/// Issue a new webhook token, invalidating the old one.
pub async fn regenerate_webhook(
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<Json<DataResponse<WebhookToken>>> {
    let token = generate_webhook_token();
    let updated = ScriptRepo::update_webhook_token(&state.pool, id, &token).await?;
    if !updated {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "script",
            id,
        }));
    }

    Ok(Json(DataResponse {
        data: WebhookToken {
            webhook_token: token,
        },
    }))
}
