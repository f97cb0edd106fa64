//! Build lifecycle states, trigger origins, and the transition rules.
//!
//! These string constants must match the CHECK constraints in
//! `crates/db/migrations`. The state machine is pure so it can be used by
//! the repository layer, the engine, and tests without pulling in I/O.

// ---------------------------------------------------------------------------
// Build statuses
// ---------------------------------------------------------------------------

/// Build created, process not yet started.
pub const STATUS_PENDING: &str = "pending";

/// Child process spawned and producing output.
pub const STATUS_RUNNING: &str = "running";

/// Process exited with code 0.
pub const STATUS_SUCCESS: &str = "success";

/// Process exited non-zero, or could not be started at all.
pub const STATUS_FAILURE: &str = "failure";

// ---------------------------------------------------------------------------
// Trigger origins
// ---------------------------------------------------------------------------

/// Started by an operator from the dashboard.
pub const ORIGIN_MANUAL: &str = "manual";

/// Started by a token-authenticated webhook call.
pub const ORIGIN_WEBHOOK: &str = "webhook";

/// Started by a cron timer fire.
pub const ORIGIN_SCHEDULER: &str = "scheduler";

/// Started through the public API.
pub const ORIGIN_API: &str = "api";

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// True for states no build ever leaves.
pub fn is_terminal(status: &str) -> bool {
    matches!(status, STATUS_SUCCESS | STATUS_FAILURE)
}

/// Returns the set of valid target statuses reachable from `from`.
///
/// Transitions are strictly forward: a build never regresses. `pending`
/// may jump straight to a terminal state — that is the path taken when
/// the process cannot be started at all.
pub fn valid_transitions(from: &str) -> &'static [&'static str] {
    match from {
        STATUS_PENDING => &[STATUS_RUNNING, STATUS_SUCCESS, STATUS_FAILURE],
        STATUS_RUNNING => &[STATUS_SUCCESS, STATUS_FAILURE],
        // Terminal states and unknown input: nothing is reachable.
        _ => &[],
    }
}

/// Check whether a transition from `from` to `to` is valid.
pub fn can_transition(from: &str, to: &str) -> bool {
    valid_transitions(from).contains(&to)
}

/// Map a process exit code to the terminal status it implies.
pub fn terminal_status_for_exit(exit_code: i32) -> &'static str {
    if exit_code == 0 {
        STATUS_SUCCESS
    } else {
        STATUS_FAILURE
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
