//! Domain error type shared across crates.

use crate::types::DbId;

/// Domain-level error, independent of any transport or storage concern.
///
/// The API layer maps each variant onto an HTTP status code; see
/// `runforge-api`'s `AppError`.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// An entity lookup by ID found nothing.
    #[error("{entity} with id {id} not found")]
    NotFound {
        /// Human-readable entity kind, e.g. `"script"`.
        entity: &'static str,
        id: DbId,
    },

    /// Input failed validation. The message is safe to show to clients.
    #[error("{0}")]
    Validation(String),

    /// The operation conflicts with existing state (e.g. a duplicate name).
    #[error("{0}")]
    Conflict(String),

    /// An unexpected internal failure. The message is logged, not exposed.
    #[error("{0}")]
    Internal(String),
}
