//! Cron-driven scheduled execution.
//!
//! [`CronScheduler`] owns an in-memory timer table — a rebuildable
//! projection of the `schedule_cron` / `schedule_enabled` columns — and a
//! single dispatch loop that checks for due fires once per second. Each
//! fire creates a build with origin `scheduler` and hands it to the
//! [`JobLauncher`], exactly like a manual trigger.
//!
//! Scheduler-originated runs get three guarantees that manual and webhook
//! runs deliberately do not:
//! 1. at most one concurrent scheduled run per script — an overlapping
//!    fire is skipped, not queued;
//! 2. fires missed while the loop was not running collapse into at most
//!    one run (the next fire is always recomputed from "now");
//! 3. a fire observed more than [`MISFIRE_GRACE_SECS`] late is dropped.
//!
//! Tightening the same throttle onto manual/webhook runs would be a
//! one-line change in the launcher path; it is left loose on purpose to
//! match the source system's behavior.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use runforge_core::build_state::ORIGIN_SCHEDULER;
use runforge_core::error::CoreError;
use runforge_core::exec_env::{ENV_BUILD_ID, ENV_SCRIPT_ID};
use runforge_core::schedule::CronSchedule;
use runforge_core::types::DbId;
use runforge_db::models::build::CreateBuild;
use runforge_db::models::script::Script;
use runforge_db::repositories::{BuildRepo, ScriptRepo};
use sqlx::PgPool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::launcher::{JobLauncher, LaunchRequest};

/// How far past its instant a fire may still execute. Anything later is
/// treated as missed and dropped.
pub const MISFIRE_GRACE_SECS: i64 = 60;

/// Dispatch loop tick.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// One installed timer.
struct ScheduleEntry {
    schedule: CronSchedule,
    next_fire: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Fire decision
// ---------------------------------------------------------------------------

/// What the dispatch loop should do with an entry at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    /// The fire instant is still in the future.
    NotDue,
    /// Due, and within the grace window: execute.
    Fire,
    /// Due, but observed too late: drop and advance.
    Missed,
}

/// Pure decision function for the dispatch loop.
pub fn fire_decision(
    now: DateTime<Utc>,
    next_fire: DateTime<Utc>,
    grace_secs: i64,
) -> FireDecision {
    if next_fire > now {
        FireDecision::NotDue
    } else if now - next_fire > chrono::Duration::seconds(grace_secs) {
        FireDecision::Missed
    } else {
        FireDecision::Fire
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Timer table plus dispatch loop for scripts with an enabled schedule.
pub struct CronScheduler {
    pool: PgPool,
    launcher: Arc<JobLauncher>,
    scripts_dir: PathBuf,
    builds_dir: PathBuf,
    entries: Mutex<HashMap<DbId, ScheduleEntry>>,
    /// Script IDs with a scheduler-originated run currently executing.
    in_flight: Arc<Mutex<HashSet<DbId>>>,
}

impl CronScheduler {
    pub fn new(
        pool: PgPool,
        launcher: Arc<JobLauncher>,
        scripts_dir: PathBuf,
        builds_dir: PathBuf,
    ) -> Self {
        Self {
            pool,
            launcher,
            scripts_dir,
            builds_dir,
            entries: Mutex::new(HashMap::new()),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Install a timer for every script with an enabled, non-empty cron
    /// expression. Invalid expressions are skipped with a warning — a bad
    /// row must not keep the service from starting.
    ///
    /// Next-fire times are computed from "now", so fires missed while the
    /// process was down produce no catch-up storm.
    pub async fn load_all(&self) -> Result<usize, sqlx::Error> {
        let scripts = ScriptRepo::list_scheduled(&self.pool).await?;
        let now = Utc::now();
        let mut entries = self.entries.lock().await;
        let mut installed = 0;

        for script in &scripts {
            let Some(expr) = script.schedule_cron.as_deref() else {
                continue;
            };
            match CronSchedule::parse(expr) {
                Ok(schedule) => {
                    if let Some(next_fire) = schedule.next_after(now) {
                        entries.insert(
                            script.id,
                            ScheduleEntry {
                                schedule,
                                next_fire,
                            },
                        );
                        installed += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        script_id = script.id,
                        script = %script.name,
                        error = %e,
                        "skipping invalid stored schedule"
                    );
                }
            }
        }

        tracing::info!(installed, "schedules loaded");
        Ok(installed)
    }

    /// Install, replace, or remove the timer for a script.
    ///
    /// Any existing timer is cancelled first, so re-registering is
    /// idempotent and can never leave duplicate fires behind. With
    /// `enabled = false` or an empty expression no timer is installed.
    /// Returns the next fire time of the installed timer, if any.
    pub async fn set_schedule(
        &self,
        script_id: DbId,
        cron: Option<&str>,
        enabled: bool,
    ) -> Result<Option<DateTime<Utc>>, CoreError> {
        let mut entries = self.entries.lock().await;
        entries.remove(&script_id);

        let expr = match cron {
            Some(expr) if !expr.trim().is_empty() => expr,
            _ => return Ok(None),
        };

        let schedule = CronSchedule::parse(expr)?;
        if !enabled {
            return Ok(None);
        }

        let Some(next_fire) = schedule.next_after(Utc::now()) else {
            return Ok(None);
        };
        entries.insert(
            script_id,
            ScheduleEntry {
                schedule,
                next_fire,
            },
        );
        Ok(Some(next_fire))
    }

    /// Cancel a script's timer. Safe to call when none exists.
    pub async fn remove_schedule(&self, script_id: DbId) {
        self.entries.lock().await.remove(&script_id);
    }

    /// The next scheduled fire instant, or `None` when unscheduled.
    pub async fn next_fire_time(&self, script_id: DbId) -> Option<DateTime<Utc>> {
        self.entries
            .lock()
            .await
            .get(&script_id)
            .map(|e| e.next_fire)
    }

    /// Run the dispatch loop until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        tracing::info!("cron dispatch loop started");
        let mut interval = tokio::time::interval(TICK_INTERVAL);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("cron dispatch loop stopping");
                    break;
                }
                _ = interval.tick() => {
                    self.tick(Utc::now()).await;
                }
            }
        }
    }

    /// One pass over the timer table: advance due entries and fire them.
    async fn tick(&self, now: DateTime<Utc>) {
        let due = {
            let mut entries = self.entries.lock().await;
            let mut due = Vec::new();
            let mut exhausted = Vec::new();

            for (id, entry) in entries.iter_mut() {
                let decision = fire_decision(now, entry.next_fire, MISFIRE_GRACE_SECS);
                if decision == FireDecision::NotDue {
                    continue;
                }

                if decision == FireDecision::Missed {
                    tracing::warn!(
                        script_id = *id,
                        scheduled = %entry.next_fire,
                        "fire detected past the grace window; dropping"
                    );
                } else {
                    due.push(*id);
                }

                // Recompute from "now", never from the missed instant:
                // this is what coalesces a backlog into a single run.
                match entry.schedule.next_after(now) {
                    Some(next) => entry.next_fire = next,
                    None => exhausted.push(*id),
                }
            }

            for id in exhausted {
                entries.remove(&id);
            }
            due
        };

        for script_id in due {
            self.fire_now(script_id).await;
        }
    }

    /// Execute one scheduled fire for a script.
    ///
    /// Skipped when a previous scheduler-originated run of the same script
    /// is still executing. Manual and webhook runs are invisible to this
    /// check.
    pub async fn fire_now(&self, script_id: DbId) {
        {
            let mut in_flight = self.in_flight.lock().await;
            if !in_flight.insert(script_id) {
                tracing::debug!(
                    script_id,
                    "previous scheduled run still executing; skipping fire"
                );
                return;
            }
        }

        match self.start_scheduled_build(script_id).await {
            Ok(true) => {}
            Ok(false) => {
                self.in_flight.lock().await.remove(&script_id);
            }
            Err(e) => {
                tracing::warn!(script_id, error = %e, "scheduled fire failed");
                self.in_flight.lock().await.remove(&script_id);
            }
        }
    }

    /// Create the build record and launch. Returns `Ok(false)` when the
    /// fire is a no-op (script row or file gone underneath the timer).
    async fn start_scheduled_build(&self, script_id: DbId) -> Result<bool, sqlx::Error> {
        let Some(script) = ScriptRepo::find_by_id(&self.pool, script_id).await? else {
            tracing::warn!(script_id, "script deleted underneath its timer; removing");
            self.entries.lock().await.remove(&script_id);
            return Ok(false);
        };

        let script_path = self.scripts_dir.join(&script.filename);
        if !script_path.exists() {
            tracing::warn!(
                script_id,
                script = %script.name,
                path = %script_path.display(),
                "script file missing on disk; skipping fire"
            );
            return Ok(false);
        }

        let build = BuildRepo::create(
            &self.pool,
            &CreateBuild {
                script_id,
                triggered_by: ORIGIN_SCHEDULER,
                webhook_payload: None,
            },
        )
        .await?;

        tracing::info!(script_id, build_id = build.id, script = %script.name, "cron fire");

        let handle = self
            .launcher
            .launch(LaunchRequest {
                build_id: build.id,
                script_path,
                log_dir: self.build_log_dir(&script),
                env: vec![
                    (ENV_BUILD_ID.to_string(), build.id.to_string()),
                    (ENV_SCRIPT_ID.to_string(), script_id.to_string()),
                ],
            })
            .await;

        // Release the overlap guard only once the run has fully finished.
        let in_flight = Arc::clone(&self.in_flight);
        tokio::spawn(async move {
            let _ = handle.await;
            in_flight.lock().await.remove(&script_id);
        });

        Ok(true)
    }

    /// Per-script log directory, namespaced by filename.
    fn build_log_dir(&self, script: &Script) -> PathBuf {
        self.builds_dir.join(&script.filename)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
