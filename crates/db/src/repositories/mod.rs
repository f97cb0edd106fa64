//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async query methods
//! that accept `&PgPool` as the first argument.

pub mod build_repo;
pub mod script_repo;

pub use build_repo::BuildRepo;
pub use script_repo::ScriptRepo;
