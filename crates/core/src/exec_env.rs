//! Environment contract between runforge and the scripts it runs.
//!
//! Every run receives the build and script IDs; webhook-triggered runs
//! additionally receive the raw request body as a JSON-encoded string.

/// ID of the build this process belongs to.
pub const ENV_BUILD_ID: &str = "BUILD_ID";

/// ID of the script being executed.
pub const ENV_SCRIPT_ID: &str = "SCRIPT_ID";

/// JSON-encoded body of the webhook call that triggered this run.
/// Only set for webhook-originated builds.
pub const ENV_WEBHOOK_PAYLOAD: &str = "WEBHOOK_PAYLOAD";
