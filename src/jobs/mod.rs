//! Observation of long-running backend jobs.
//!
//! - [`JobTracker`] polls a job's status until it reaches a terminal state
//! - [`RetryCoordinator`] retries a single side-effecting call with a fixed delay

mod retry;
mod status;
mod tracker;

pub use retry::{RetryCoordinator, RetryEvent, RetryFailure, RetryPolicy};
pub use status::{Job, JobStatus, TIMEOUT_MESSAGE};
pub use tracker::{JobStatusSource, JobTracker, PollOptions};
