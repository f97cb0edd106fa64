pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /scripts                             list, save (GET, POST)
/// /scripts/{id}                        get with content, delete
/// /scripts/{id}/run                    manual trigger (POST)
/// /scripts/{id}/webhook/regenerate     new webhook token (POST)
/// /scripts/{id}/schedule               get, set, clear (GET, PUT, DELETE)
/// /scripts/{id}/builds                 build history (GET)
///
/// /builds/{id}                         build detail (GET)
/// /builds/{id}/output                  persisted log (GET)
/// /builds/{id}/stream                  live SSE output (GET)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/scripts",
            get(handlers::scripts::list_scripts).post(handlers::scripts::save_script),
        )
        .route(
            "/scripts/{id}",
            get(handlers::scripts::get_script).delete(handlers::scripts::delete_script),
        )
        .route("/scripts/{id}/run", post(handlers::scripts::run_script))
        .route(
            "/scripts/{id}/webhook/regenerate",
            post(handlers::scripts::regenerate_webhook),
        )
        .route(
            "/scripts/{id}/schedule",
            get(handlers::schedules::get_schedule)
                .put(handlers::schedules::set_schedule)
                .delete(handlers::schedules::delete_schedule),
        )
        .route("/scripts/{id}/builds", get(handlers::builds::list_builds))
        .route("/builds/{id}", get(handlers::builds::get_build))
        .route("/builds/{id}/output", get(handlers::builds::get_build_output))
        .route("/builds/{id}/stream", get(handlers::builds::stream_build))
}

/// Root-level webhook trigger route (token-authenticated, outside `/api/v1`).
pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhooks/{token}", post(handlers::webhooks::trigger_webhook))
}
