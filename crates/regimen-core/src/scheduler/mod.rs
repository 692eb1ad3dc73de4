//! Periodic jobs that drive plan progression and surfacing.
//!
//! - [`run_due_week_trigger`] dispatches the next week of every request
//!   whose due date has arrived.
//! - [`rotate_visibility`] promotes upcoming weeks and archives elapsed ones.
//! - [`start_cron_jobs`] runs both on their wall-clock schedules.

pub mod cron;
pub mod rotator;
pub mod trigger;

pub use cron::start_cron_jobs;
pub use rotator::{RotationSummary, rotate_visibility};
pub use trigger::{TriggerSummary, due_after_dispatch, run_due_week_trigger};
