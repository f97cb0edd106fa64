use std::sync::Arc;

use runforge_engine::launcher::JobLauncher;
use runforge_engine::registry::OutputRegistry;
use runforge_engine::scheduler::CronScheduler;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: runforge_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Live output channel registry, shared with the launcher.
    pub registry: Arc<OutputRegistry>,
    /// Script process launcher.
    pub launcher: Arc<JobLauncher>,
    /// Cron timer table + dispatch loop.
    pub scheduler: Arc<CronScheduler>,
}
