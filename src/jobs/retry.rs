//! Bounded retries for side-effecting calls such as document indexing.

use std::collections::HashSet;
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn};

use crate::error::{SyncError, SyncResult};

/// How many times to try and how long to wait in between.
///
/// The delay is fixed; there is no exponential growth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  pub max_attempts: u32,
  pub delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      delay: Duration::from_millis(2000),
    }
  }
}

/// Terminal outcome of a sequence where every attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryFailure {
  pub subject: String,
  pub attempts: u32,
  /// Error of the final attempt, unmodified.
  pub last_error: String,
  /// Whether the user may start a fresh sequence. Always true for now.
  pub retryable: bool,
}

impl Display for RetryFailure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "failed after {} attempts: {}",
      self.attempts, self.last_error
    )
  }
}

/// Progress notifications emitted while a sequence runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent {
  /// Emitted before every attempt, the first one included.
  Attempt { attempt: u32, max_attempts: u32 },
  Succeeded { attempt: u32 },
  Exhausted(RetryFailure),
}

impl RetryEvent {
  /// True for attempts after the first.
  pub fn is_retry(&self) -> bool {
    matches!(self, RetryEvent::Attempt { attempt, .. } if *attempt > 1)
  }
}

impl Display for RetryEvent {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      RetryEvent::Attempt {
        attempt: 1,
        max_attempts,
      } => write!(f, "attempt 1 of {}", max_attempts),
      RetryEvent::Attempt {
        attempt,
        max_attempts,
      } => write!(f, "attempt {} of {} (retry)", attempt, max_attempts),
      RetryEvent::Succeeded { attempt } => write!(f, "succeeded on attempt {}", attempt),
      RetryEvent::Exhausted(failure) => Display::fmt(failure, f),
    }
  }
}

/// Per-sequence bookkeeping. Lives only as long as one call to `run`.
#[derive(Debug)]
struct RetryState {
  attempt: u32,
  next_delay: Duration,
  last_error: Option<String>,
}

/// Marks a subject as busy until dropped, including on cancellation.
struct InFlightGuard {
  subjects: Arc<Mutex<HashSet<String>>>,
  subject: String,
}

impl Drop for InFlightGuard {
  fn drop(&mut self) {
    self
      .subjects
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .remove(&self.subject);
  }
}

/// Runs fallible operations with a bounded number of attempts.
///
/// At most one sequence runs per subject; clones share that bookkeeping.
#[derive(Clone, Default)]
pub struct RetryCoordinator {
  policy: RetryPolicy,
  in_flight: Arc<Mutex<HashSet<String>>>,
}

impl RetryCoordinator {
  pub fn new(policy: RetryPolicy) -> Self {
    Self {
      policy,
      in_flight: Arc::default(),
    }
  }

  pub fn policy(&self) -> RetryPolicy {
    self.policy
  }

  pub fn is_running(&self, subject: &str) -> bool {
    self
      .in_flight
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .contains(subject)
  }

  fn acquire(&self, subject: &str) -> SyncResult<InFlightGuard> {
    let mut subjects = self
      .in_flight
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    if !subjects.insert(subject.to_string()) {
      return Err(SyncError::AlreadyRunning(subject.to_string()));
    }
    Ok(InFlightGuard {
      subjects: Arc::clone(&self.in_flight),
      subject: subject.to_string(),
    })
  }

  /// Attempt `operation` up to `max_attempts` times, sleeping `delay` between
  /// failures.
  ///
  /// Returns `SyncError::RetriesExhausted` once every attempt failed and
  /// `SyncError::AlreadyRunning` if a sequence for `subject` is in flight.
  pub async fn run<T, E, F, Fut, N>(
    &self,
    subject: &str,
    mut operation: F,
    mut on_event: N,
  ) -> SyncResult<T>
  where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(&RetryEvent),
  {
    let _guard = self.acquire(subject)?;
    let max_attempts = self.policy.max_attempts.max(1);
    let mut state = RetryState {
      attempt: 0,
      next_delay: self.policy.delay,
      last_error: None,
    };

    while state.attempt < max_attempts {
      if state.attempt > 0 {
        tokio::time::sleep(state.next_delay).await;
      }
      state.attempt += 1;
      on_event(&RetryEvent::Attempt {
        attempt: state.attempt,
        max_attempts,
      });

      match operation().await {
        Ok(value) => {
          info!(subject, attempt = state.attempt, "Operation succeeded");
          on_event(&RetryEvent::Succeeded {
            attempt: state.attempt,
          });
          return Ok(value);
        }
        Err(e) => {
          warn!(subject, attempt = state.attempt, max_attempts, error = %e, "Attempt failed");
          state.last_error = Some(e.to_string());
        }
      }
    }

    let failure = RetryFailure {
      subject: subject.to_string(),
      attempts: state.attempt,
      last_error: state.last_error.unwrap_or_default(),
      retryable: true,
    };
    warn!(subject, attempts = failure.attempts, "Retries exhausted");
    on_event(&RetryEvent::Exhausted(failure.clone()));
    Err(SyncError::RetriesExhausted(failure))
  }

  /// Start over after exhaustion with the full attempt budget.
  pub async fn retry_again<T, E, F, Fut, N>(
    &self,
    failure: &RetryFailure,
    operation: F,
    on_event: N,
  ) -> SyncResult<T>
  where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    N: FnMut(&RetryEvent),
  {
    self.run(&failure.subject, operation, on_event).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  /// Operation that fails `failures` times, then succeeds.
  fn flaky(
    failures: u32,
  ) -> (
    Arc<AtomicU32>,
    impl FnMut() -> futures::future::Ready<Result<(), String>>,
  ) {
    let calls = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&calls);
    let op = move || {
      let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
      futures::future::ready(if n <= failures {
        Err(format!("indexing failed ({})", n))
      } else {
        Ok(())
      })
    };
    (calls, op)
  }

  #[tokio::test(start_paused = true)]
  async fn test_succeeds_on_third_attempt() {
    let retry = RetryCoordinator::new(RetryPolicy::default());
    let (calls, op) = flaky(2);
    let mut events = Vec::new();

    let started = tokio::time::Instant::now();
    let result = retry.run("file-1", op, |e| events.push(e.clone())).await;

    assert!(result.is_ok());
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(
      events,
      vec![
        RetryEvent::Attempt { attempt: 1, max_attempts: 3 },
        RetryEvent::Attempt { attempt: 2, max_attempts: 3 },
        RetryEvent::Attempt { attempt: 3, max_attempts: 3 },
        RetryEvent::Succeeded { attempt: 3 },
      ]
    );
    assert!(!events[0].is_retry());
    assert!(events[1].is_retry());
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(4000) && elapsed < Duration::from_millis(4100));
  }

  #[tokio::test(start_paused = true)]
  async fn test_first_attempt_success_has_no_delay() {
    let retry = RetryCoordinator::new(RetryPolicy::default());
    let (_calls, op) = flaky(0);

    let started = tokio::time::Instant::now();
    retry.run("file-1", op, |_| {}).await.unwrap();

    assert_eq!(started.elapsed(), Duration::ZERO);
  }

  #[tokio::test(start_paused = true)]
  async fn test_exhaustion_reports_last_error() {
    let retry = RetryCoordinator::new(RetryPolicy::default());
    let (calls, op) = flaky(u32::MAX);
    let mut events = Vec::new();

    let err = retry
      .run("file-1", op, |e| events.push(e.clone()))
      .await
      .unwrap_err();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let failure = match err {
      SyncError::RetriesExhausted(failure) => failure,
      other => panic!("unexpected error: {other:?}"),
    };
    assert_eq!(failure.last_error, "indexing failed (3)");
    assert_eq!(failure.attempts, 3);
    assert!(failure.retryable);
    assert_eq!(events.last(), Some(&RetryEvent::Exhausted(failure.clone())));
    assert!(!retry.is_running("file-1"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_retry_again_restarts_budget() {
    let retry = RetryCoordinator::new(RetryPolicy::default());
    let (calls, mut op) = flaky(4);

    let failure = match retry.run("file-1", &mut op, |_| {}).await {
      Err(SyncError::RetriesExhausted(failure)) => failure,
      other => panic!("unexpected result: {other:?}"),
    };

    let mut events = Vec::new();
    retry
      .retry_again(&failure, &mut op, |e| events.push(e.clone()))
      .await
      .unwrap();

    // Fresh budget: attempts 1 and 2 of the new sequence
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    assert_eq!(events[0], RetryEvent::Attempt { attempt: 1, max_attempts: 3 });
    assert_eq!(events.last(), Some(&RetryEvent::Succeeded { attempt: 2 }));
  }

  #[tokio::test(start_paused = true)]
  async fn test_rejects_concurrent_sequence_for_same_subject() {
    let retry = RetryCoordinator::new(RetryPolicy::default());

    let slow = retry.run(
      "file-1",
      || async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok::<_, String>(())
      },
      |_| {},
    );
    let second = async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      retry
        .run("file-1", || async { Ok::<_, String>(()) }, |_| {})
        .await
    };
    let other = async {
      tokio::time::sleep(Duration::from_millis(10)).await;
      retry
        .run("file-2", || async { Ok::<_, String>(()) }, |_| {})
        .await
    };

    let (first, second, other) = tokio::join!(slow, second, other);
    assert!(first.is_ok());
    assert!(matches!(second, Err(SyncError::AlreadyRunning(s)) if s == "file-1"));
    assert!(other.is_ok());
  }

  #[test]
  fn test_event_display() {
    let first = RetryEvent::Attempt { attempt: 1, max_attempts: 3 };
    let retry = RetryEvent::Attempt { attempt: 2, max_attempts: 3 };
    assert_eq!(first.to_string(), "attempt 1 of 3");
    assert_eq!(retry.to_string(), "attempt 2 of 3 (retry)");
  }
}
