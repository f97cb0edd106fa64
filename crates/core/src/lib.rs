//! Domain logic shared by every runforge crate.
//!
//! This crate has no internal dependencies and no I/O: ID/timestamp types,
//! the domain error type, the build lifecycle state machine, trigger origin
//! constants, the child-process environment contract, and cron schedule
//! parsing.

pub mod build_state;
pub mod error;
pub mod exec_env;
pub mod schedule;
pub mod types;
