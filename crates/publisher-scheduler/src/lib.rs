//! Scheduling engine (C8) and stuck-job recovery (C9): evaluates per-user
//! automation rules, selects and locks eligible drafts, applies default
//! field values, and enqueues delayed publish jobs with jitter through the
//! job queue adapter (C7); separately, reconciles drafts abandoned mid-flight
//! by a crashed or lost worker.

mod defaults;
mod engine;
mod recovery;
mod rules;
mod selection;
mod task;

pub use engine::{SchedulingEngine, DEFAULT_LEASE_STALE_AFTER};
pub use recovery::{StuckJobRecovery, DEFAULT_ALERT_THRESHOLD, DEFAULT_STUCK_AFTER};
pub use task::{
    spawn_scheduler_tick_task, spawn_stuck_job_recovery_task, DEFAULT_RECOVERY_INTERVAL,
    DEFAULT_STARTUP_DELAY, DEFAULT_TICK_INTERVAL,
};
