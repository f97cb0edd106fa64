//! Asynchronous script execution.
//!
//! [`JobLauncher::launch`] registers a live output channel, spawns the
//! script as a child process, and returns immediately with a join handle.
//! The spawned task pipes the child's combined stdout/stderr line-by-line
//! to the persisted log (flushed per line) and to the output channel, then
//! finalizes the build record with the exit code.
//!
//! There is deliberately no per-script mutual exclusion here: any number of
//! runs of the same script may execute concurrently. Scheduled runs are the
//! exception, throttled by [`crate::scheduler::CronScheduler`] alone.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use runforge_core::types::DbId;
use runforge_db::repositories::BuildRepo;
use sqlx::PgPool;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::registry::{BuildEvent, OutputRegistry};

/// Exit code recorded when the process could not be spawned or its output
/// could not be read.
pub const EXIT_CODE_LAUNCH_FAILED: i32 = -1;

/// Capacity of the internal funnel between the stream pumps and the single
/// log/channel writer.
const LINE_BUFFER: usize = 256;

/// Everything needed to start one build.
#[derive(Debug)]
pub struct LaunchRequest {
    /// Build record, already created in `pending` state by a trigger source.
    pub build_id: DbId,
    /// Absolute path of the executable script file.
    pub script_path: PathBuf,
    /// Directory the log file is written into; created if absent.
    pub log_dir: PathBuf,
    /// Extra environment variables merged over the inherited environment.
    pub env: Vec<(String, String)>,
}

/// Errors inside the execution path. These never propagate to the trigger
/// caller — they are captured into the log and the build record.
#[derive(Debug, thiserror::Error)]
enum LaunchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Spawns script processes and drives build record transitions.
pub struct JobLauncher {
    pool: PgPool,
    registry: Arc<OutputRegistry>,
}

impl JobLauncher {
    pub fn new(pool: PgPool, registry: Arc<OutputRegistry>) -> Self {
        Self { pool, registry }
    }

    /// The registry this launcher publishes live output to.
    pub fn registry(&self) -> &Arc<OutputRegistry> {
        &self.registry
    }

    /// Start a build and return immediately.
    ///
    /// The output channel is registered before this function returns, so a
    /// client that opens the stream endpoint right after the trigger call
    /// can attach to the live channel. The returned handle resolves once
    /// the record is finalized and the channel torn down; callers other
    /// than tests typically drop it.
    pub async fn launch(&self, req: LaunchRequest) -> JoinHandle<()> {
        let sender = self.registry.register(req.build_id).await;
        let pool = self.pool.clone();
        let registry = Arc::clone(&self.registry);
        tokio::spawn(run(pool, registry, sender, req))
    }
}

/// Full lifecycle of one build, from `running` to finalized.
async fn run(
    pool: PgPool,
    registry: Arc<OutputRegistry>,
    sender: broadcast::Sender<BuildEvent>,
    req: LaunchRequest,
) {
    let build_id = req.build_id;
    let log_path = req.log_dir.join(format!("{build_id}.log"));

    let exit_code = match run_to_completion(&pool, &sender, &req, &log_path).await {
        Ok(code) => code,
        Err(e) => {
            tracing::warn!(build_id, error = %e, "build execution failed");
            let line = format!("ERROR: {e}\n");
            append_line_best_effort(&log_path, &line).await;
            let _ = sender.send(BuildEvent::Line(line.trim_end().to_string()));
            EXIT_CODE_LAUNCH_FAILED
        }
    };

    // The marker is always the last event on the channel, and goes out even
    // when finalization below fails, so readers never hang on a dead build.
    let _ = sender.send(BuildEvent::Done);

    if let Err(e) = BuildRepo::finalize(&pool, build_id, exit_code).await {
        // Known-acceptable inconsistency: the record stays `running` until
        // manually reconciled. Surfaced in logs, never hidden.
        tracing::error!(build_id, error = %e, "failed to finalize build record");
    }

    registry.unregister(build_id).await;
}

/// Happy path: mark running, spawn, pump output, wait for exit.
///
/// Each phase's database write completes before the next phase starts, so
/// a crash leaves the record reflecting the last finished phase.
async fn run_to_completion(
    pool: &PgPool,
    sender: &broadcast::Sender<BuildEvent>,
    req: &LaunchRequest,
    log_path: &Path,
) -> Result<i32, LaunchError> {
    tokio::fs::create_dir_all(&req.log_dir).await?;
    BuildRepo::mark_running(pool, req.build_id, &log_path.to_string_lossy()).await?;

    let mut log = tokio::fs::File::create(log_path).await?;

    let mut cmd = Command::new(&req.script_path);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    for (key, value) in &req.env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn()?;

    // Funnel both streams through one channel so a single writer owns the
    // log file and the fan-out order.
    let (line_tx, mut line_rx) = mpsc::channel::<String>(LINE_BUFFER);
    let stdout_pump = spawn_line_pump(child.stdout.take(), line_tx.clone());
    let stderr_pump = spawn_line_pump(child.stderr.take(), line_tx);

    while let Some(raw) = line_rx.recv().await {
        // Flush per line so the log survives a crash mid-run.
        log.write_all(raw.as_bytes()).await?;
        log.flush().await?;
        let _ = sender.send(BuildEvent::Line(
            raw.trim_end_matches(['\r', '\n']).to_string(),
        ));
    }

    let _ = stdout_pump.await;
    let _ = stderr_pump.await;

    let status = child.wait().await?;
    Ok(status.code().unwrap_or(EXIT_CODE_LAUNCH_FAILED))
}

/// Read one output stream line-by-line into the funnel.
///
/// Non-UTF-8 bytes are replaced rather than failing the run.
fn spawn_line_pump<R>(stream: Option<R>, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(stream) = stream else {
            return;
        };
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(line).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(error = %e, "output stream read ended");
                    break;
                }
            }
        }
    })
}

/// Append an error line to the log, creating the file if the run failed
/// before it existed. Failures here are swallowed: the record and the
/// channel still carry the outcome.
async fn append_line_best_effort(log_path: &Path, line: &str) {
    if let Some(parent) = log_path.parent() {
        let _ = tokio::fs::create_dir_all(parent).await;
    }
    let open = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .await;
    if let Ok(mut file) = open {
        let _ = file.write_all(line.as_bytes()).await;
        let _ = file.flush().await;
    }
}
