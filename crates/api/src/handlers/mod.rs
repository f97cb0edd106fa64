pub mod builds;
pub mod schedules;
pub mod scripts;
pub mod webhooks;
