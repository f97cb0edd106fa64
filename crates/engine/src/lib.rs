//! The execution core: output channel registry, job launcher, and cron
//! scheduler.
//!
//! The [`launcher::JobLauncher`] runs scripts as child processes, feeding
//! each output line to a persisted log and to a live
//! [`registry::OutputRegistry`] channel. The [`scheduler::CronScheduler`]
//! owns the timer table and fires scheduled runs through the same launcher
//! path as manual and webhook triggers.

pub mod launcher;
pub mod registry;
pub mod scheduler;
