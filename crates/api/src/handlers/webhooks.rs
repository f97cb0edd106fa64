//! Inbound webhook trigger handler.
//!
//! `POST /webhooks/{token}` starts a run of the script that owns the
//! token. Authentication is the opaque per-script token baked into the
//! URL — deliberately separate from any other auth mechanism, so a token
//! can be handed to an external system and revoked by regeneration.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use runforge_core::build_state::ORIGIN_WEBHOOK;
use runforge_core::exec_env::{ENV_BUILD_ID, ENV_SCRIPT_ID, ENV_WEBHOOK_PAYLOAD};
use runforge_core::types::DbId;
use runforge_db::models::build::CreateBuild;
use runforge_db::repositories::{BuildRepo, ScriptRepo};
use runforge_engine::launcher::LaunchRequest;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Response for an accepted webhook trigger.
#[derive(Debug, Serialize)]
pub struct WebhookTriggered {
    pub build_id: DbId,
    pub script: String,
    pub stream_url: String,
}

/// POST /webhooks/{token}
///
/// Returns 202 immediately; the JSON body (when present and parseable) is
/// stored on the build and exposed to the script as `WEBHOOK_PAYLOAD`.
pub async fn trigger_webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
    body: Bytes,
) -> AppResult<(StatusCode, Json<DataResponse<WebhookTriggered>>)> {
    let script = ScriptRepo::find_by_webhook_token(&state.pool, &token)
        .await?
        .ok_or_else(|| AppError::NotFound("invalid webhook token".to_string()))?;

    // Non-JSON or empty bodies degrade to an empty object rather than
    // rejecting the trigger.
    let payload: serde_json::Value =
        serde_json::from_slice(&body).unwrap_or_else(|_| serde_json::json!({}));
    let payload_json = payload.to_string();

    let build = BuildRepo::create(
        &state.pool,
        &CreateBuild {
            script_id: script.id,
            triggered_by: ORIGIN_WEBHOOK,
            webhook_payload: Some(payload_json.clone()),
        },
    )
    .await?;

    tracing::info!(
        script_id = script.id,
        build_id = build.id,
        script = %script.name,
        "webhook trigger"
    );

    state
        .launcher
        .launch(LaunchRequest {
            build_id: build.id,
            script_path: state.config.scripts_dir.join(&script.filename),
            log_dir: state.config.builds_dir.join(&script.filename),
            env: vec![
                (ENV_WEBHOOK_PAYLOAD.to_string(), payload_json),
                (ENV_BUILD_ID.to_string(), build.id.to_string()),
                (ENV_SCRIPT_ID.to_string(), script.id.to_string()),
            ],
        })
        .await;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: WebhookTriggered {
                build_id: build.id,
                script: script.name,
                stream_url: format!("/api/v1/builds/{}/stream", build.id),
            },
        }),
    ))
}
