/// Lifecycle of one queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    /// `fire_at` has passed; eligible for `claim_ready`.
    Waiting,
    /// `fire_at` is in the future.
    Delayed,
    /// Claimed by a worker; not eligible for another claim until it
    /// completes, fails, or is re-queued.
    Active,
    Completed,
    Failed,
    /// No job with this id exists in the queue.
    Absent,
}
