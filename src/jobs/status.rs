//! Typed representation of a backend job's lifecycle.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{SyncError, SyncResult};

/// Error message carried by the synthetic notification emitted when the
/// polling budget runs out.
pub const TIMEOUT_MESSAGE: &str = "timeout";

/// Lifecycle state of a backend job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
  Queued,
  Processing,
  Done,
  Failed,
}

impl JobStatus {
  /// `done` and `failed` end polling.
  pub fn is_terminal(self) -> bool {
    matches!(self, JobStatus::Done | JobStatus::Failed)
  }

  fn rank(self) -> u8 {
    match self {
      JobStatus::Queued => 0,
      JobStatus::Processing => 1,
      JobStatus::Done | JobStatus::Failed => 2,
    }
  }

  /// Whether `next` is a forward move along `queued -> processing -> {done|failed}`.
  ///
  /// `processing -> processing` is allowed (progress updates); nothing leaves a
  /// terminal state.
  pub fn can_advance_to(self, next: JobStatus) -> bool {
    if self.is_terminal() {
      return false;
    }
    match (self, next) {
      (JobStatus::Processing, JobStatus::Processing) => true,
      _ => next.rank() > self.rank() || self == next,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      JobStatus::Queued => "queued",
      JobStatus::Processing => "processing",
      JobStatus::Done => "done",
      JobStatus::Failed => "failed",
    }
  }
}

impl std::fmt::Display for JobStatus {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Latest known snapshot of one backend job.
///
/// Snapshots are replaced wholesale on every successful fetch, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
  pub id: String,
  #[serde(default)]
  pub project_id: Option<String>,
  /// The subject being processed, usually the uploaded file.
  pub file_id: String,
  pub status: JobStatus,
  #[serde(default, deserialize_with = "deserialize_progress")]
  progress: u8,
  #[serde(default)]
  error_message: Option<String>,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
}

fn deserialize_progress<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
  D: Deserializer<'de>,
{
  let raw: Option<i64> = Option::deserialize(deserializer)?;
  Ok(raw.unwrap_or(0).clamp(0, 100) as u8)
}

impl Job {
  pub fn new(id: impl Into<String>, file_id: impl Into<String>, status: JobStatus) -> Self {
    Self {
      id: id.into(),
      project_id: None,
      file_id: file_id.into(),
      status,
      progress: 0,
      error_message: None,
      created_at: None,
      updated_at: None,
    }
  }

  pub fn with_progress(mut self, progress: u8) -> Self {
    self.progress = progress.min(100);
    self
  }

  pub fn with_error(mut self, message: impl Into<String>) -> Self {
    self.error_message = Some(message.into());
    self
  }

  /// Synthetic failure for a subject whose polling budget ran out.
  ///
  /// The job id is unknown at this point, so the subject id stands in for it.
  pub fn timed_out(subject_id: &str) -> Self {
    Job::new(subject_id, subject_id, JobStatus::Failed).with_error(TIMEOUT_MESSAGE)
  }

  pub fn is_terminal(&self) -> bool {
    self.status.is_terminal()
  }

  /// Progress percentage, only meaningful while processing.
  pub fn progress(&self) -> Option<u8> {
    match self.status {
      JobStatus::Processing => Some(self.progress),
      _ => None,
    }
  }

  /// Raw progress as reported by the backend.
  pub fn raw_progress(&self) -> u8 {
    self.progress
  }

  /// Failure message, present only once the job has failed.
  pub fn error_message(&self) -> Option<&str> {
    match self.status {
      JobStatus::Failed => self.error_message.as_deref(),
      _ => None,
    }
  }

  pub fn is_timeout(&self) -> bool {
    self.error_message() == Some(TIMEOUT_MESSAGE)
  }

  /// Turn a settled snapshot into an error when the job did not succeed.
  ///
  /// `attempts` is the polling budget that produced a timeout notification.
  pub fn outcome(&self, attempts: u32) -> SyncResult<()> {
    match self.status {
      JobStatus::Failed if self.is_timeout() => Err(SyncError::Timeout { attempts }),
      JobStatus::Failed => Err(SyncError::OperationFailed(
        self
          .error_message()
          .unwrap_or("job failed without a message")
          .to_string(),
      )),
      _ => Ok(()),
    }
  }
}
