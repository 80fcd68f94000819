//! Status polling for backend jobs.
//!
//! A [`JobTracker`] owns at most one polling loop per subject id. Each loop
//! fetches the job status at a fixed interval, hands every snapshot to the
//! subscriber, and stops on a terminal status, on [`JobTracker::stop`], or
//! when the attempt budget runs out (in which case a synthetic `timeout`
//! failure is delivered instead of a backend state).
//!
//! Cancellation aborts the loop's task, which drops the pending timer
//! immediately. Every loop also carries a generation token; a response that
//! arrives for an outdated generation is discarded before delivery.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::status::{Job, JobStatus};
use crate::error::SyncResult;

/// Capability to fetch the current status of the job attached to a subject.
pub trait JobStatusSource: Send + Sync + 'static {
  /// Fails with `SyncError::NotFound` while the backend has not created the job yet.
  fn fetch_job_status(&self, subject_id: &str) -> BoxFuture<'static, SyncResult<Job>>;
}

/// Polling cadence and budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOptions {
  pub interval: Duration,
  /// Total fetches allowed before giving up with a timeout.
  pub max_attempts: u32,
}

impl Default for PollOptions {
  fn default() -> Self {
    Self {
      interval: Duration::from_millis(2000),
      max_attempts: 150,
    }
  }
}

struct PollSlot {
  generation: u64,
  handle: JoinHandle<()>,
}

#[derive(Default)]
struct TrackerState {
  next_generation: u64,
  slots: HashMap<String, PollSlot>,
}

impl TrackerState {
  fn is_current(&self, subject_id: &str, generation: u64) -> bool {
    self
      .slots
      .get(subject_id)
      .is_some_and(|slot| slot.generation == generation)
  }
}

type SharedState = Arc<Mutex<TrackerState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, TrackerState> {
  state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Drives status polling for any number of subjects.
pub struct JobTracker<S: JobStatusSource> {
  source: Arc<S>,
  state: SharedState,
  defaults: PollOptions,
}

impl<S: JobStatusSource> JobTracker<S> {
  pub fn new(source: Arc<S>) -> Self {
    Self {
      source,
      state: SharedState::default(),
      defaults: PollOptions::default(),
    }
  }

  /// Set the options used by [`JobTracker::start`].
  pub fn with_options(mut self, options: PollOptions) -> Self {
    self.defaults = options;
    self
  }

  pub fn options(&self) -> PollOptions {
    self.defaults
  }

  /// Start polling `subject_id` with the default options.
  pub fn start<F>(&self, subject_id: &str, on_update: F)
  where
    F: FnMut(&Job) + Send + 'static,
  {
    self.start_with(subject_id, on_update, self.defaults);
  }

  /// Start polling `subject_id`, replacing any loop already running for it.
  ///
  /// `on_update` is called once per successful fetch, including the first,
  /// in fetch order. It runs while the tracker's lock is held and must not
  /// call back into this tracker. Must be called from within a tokio runtime.
  pub fn start_with<F>(&self, subject_id: &str, on_update: F, options: PollOptions)
  where
    F: FnMut(&Job) + Send + 'static,
  {
    let mut state = lock(&self.state);

    if let Some(previous) = state.slots.remove(subject_id) {
      debug!(subject_id, generation = previous.generation, "Replacing active poll loop");
      previous.handle.abort();
    }

    state.next_generation += 1;
    let generation = state.next_generation;

    // The slot is inserted before the lock is released, so the loop can never
    // observe itself as outdated on its first check.
    let handle = tokio::spawn(poll_loop(
      Arc::clone(&self.source),
      Arc::clone(&self.state),
      subject_id.to_string(),
      generation,
      on_update,
      options,
    ));

    state
      .slots
      .insert(subject_id.to_string(), PollSlot { generation, handle });
    info!(subject_id, generation, "Started job polling");
  }

  /// Start polling and receive snapshots over a channel instead of a callback.
  ///
  /// The channel closes after the terminal snapshot (or the timeout
  /// notification), or when the loop is stopped.
  pub fn subscribe(&self, subject_id: &str) -> mpsc::UnboundedReceiver<Job> {
    let (tx, rx) = mpsc::unbounded_channel();
    self.start(subject_id, move |job| {
      // Receiver may have been dropped
      let _ = tx.send(job.clone());
    });
    rx
  }

  /// Stop polling `subject_id`. Returns whether a loop was active.
  ///
  /// Safe to call repeatedly and after the loop ended on its own.
  pub fn stop(&self, subject_id: &str) -> bool {
    let mut state = lock(&self.state);
    match state.slots.remove(subject_id) {
      Some(slot) => {
        slot.handle.abort();
        debug!(subject_id, generation = slot.generation, "Stopped job polling");
        true
      }
      None => false,
    }
  }

  /// Stop every active loop, e.g. when the observing view is torn down.
  pub fn stop_all(&self) {
    let mut state = lock(&self.state);
    for (subject_id, slot) in state.slots.drain() {
      slot.handle.abort();
      debug!(subject_id = %subject_id, "Stopped job polling");
    }
  }

  pub fn is_active(&self, subject_id: &str) -> bool {
    lock(&self.state).slots.contains_key(subject_id)
  }

  pub fn active_count(&self) -> usize {
    lock(&self.state).slots.len()
  }
}

impl<S: JobStatusSource> Drop for JobTracker<S> {
  fn drop(&mut self) {
    self.stop_all();
  }
}

async fn poll_loop<S, F>(
  source: Arc<S>,
  state: SharedState,
  subject_id: String,
  generation: u64,
  mut on_update: F,
  options: PollOptions,
) where
  S: JobStatusSource,
  F: FnMut(&Job) + Send + 'static,
{
  let mut last_status: Option<JobStatus> = None;

  for attempt in 1..=options.max_attempts {
    let result = source.fetch_job_status(&subject_id).await;

    match result {
      Ok(job) => {
        debug!(
          subject_id = %subject_id,
          attempt,
          status = %job.status,
          progress = job.raw_progress(),
          "Polled job"
        );
        if let Some(previous) = last_status {
          if !previous.can_advance_to(job.status) {
            debug!(
              subject_id = %subject_id,
              from = %previous,
              to = %job.status,
              "Job status moved backwards"
            );
          }
        }
        last_status = Some(job.status);

        if !deliver(&state, &subject_id, generation, &mut on_update, &job) {
          debug!(subject_id = %subject_id, generation, "Discarding stale poll response");
          return;
        }
        if job.is_terminal() {
          info!(subject_id = %subject_id, status = %job.status, "Job reached terminal state");
          return;
        }
      }
      Err(e) => {
        if !lock(&state).is_current(&subject_id, generation) {
          return;
        }
        if e.is_not_found() {
          debug!(subject_id = %subject_id, attempt, "Job not created yet");
        } else {
          warn!(subject_id = %subject_id, attempt, error = %e, "Job status fetch failed");
        }
      }
    }

    if attempt < options.max_attempts {
      tokio::time::sleep(options.interval).await;
    }
  }

  let timed_out = Job::timed_out(&subject_id);
  if deliver(&state, &subject_id, generation, &mut on_update, &timed_out) {
    warn!(subject_id = %subject_id, attempts = options.max_attempts, "Job polling timed out");
  }
}

/// Hand `job` to the subscriber if the loop is still current.
///
/// The check and the callback run under one lock acquisition, so once
/// `stop` returns the stopped loop delivers nothing more. A terminal
/// snapshot also releases the slot. Returns false for an outdated loop.
fn deliver<F>(
  state: &SharedState,
  subject_id: &str,
  generation: u64,
  on_update: &mut F,
  job: &Job,
) -> bool
where
  F: FnMut(&Job),
{
  let mut state = lock(state);
  if !state.is_current(subject_id, generation) {
    return false;
  }
  on_update(job);
  if job.is_terminal() {
    state.slots.remove(subject_id);
  }
  true
}
