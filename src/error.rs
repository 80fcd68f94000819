//! Error taxonomy shared by the job tracker, retry coordinator and transport.

use crate::jobs::RetryFailure;

/// Result alias for library operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum SyncError {
  /// Network or HTTP failure reported by the transport.
  #[error("transport error: {0}")]
  Transport(String),

  /// The resource has not been materialized server-side yet.
  #[error("not found: {0}")]
  NotFound(String),

  /// An attempt budget ran out without reaching a terminal state.
  #[error("timeout after {attempts} attempts")]
  Timeout { attempts: u32 },

  /// The tracked job reported failure itself.
  #[error("{0}")]
  OperationFailed(String),

  /// Every attempt of a retried operation failed.
  #[error("{0}")]
  RetriesExhausted(RetryFailure),

  /// A retry sequence for this subject is already in flight.
  #[error("operation already running for {0}")]
  AlreadyRunning(String),

  /// Response body did not match the expected shape.
  #[error("failed to decode response: {0}")]
  Decode(String),
}

impl SyncError {
  /// Polling treats this as "keep going" rather than a failed attempt worth logging.
  pub fn is_not_found(&self) -> bool {
    matches!(self, SyncError::NotFound(_))
  }
}

impl From<reqwest::Error> for SyncError {
  fn from(e: reqwest::Error) -> Self {
    if e.is_decode() {
      SyncError::Decode(e.to_string())
    } else if e.status() == Some(reqwest::StatusCode::NOT_FOUND) {
      SyncError::NotFound(e.to_string())
    } else {
      SyncError::Transport(e.to_string())
    }
  }
}

impl From<url::ParseError> for SyncError {
  fn from(e: url::ParseError) -> Self {
    SyncError::Transport(format!("invalid url: {}", e))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_not_found_classification() {
    assert!(SyncError::NotFound("job".into()).is_not_found());
    assert!(!SyncError::Transport("502".into()).is_not_found());
    assert!(!SyncError::Timeout { attempts: 3 }.is_not_found());
  }

  #[test]
  fn test_operation_failed_message_is_verbatim() {
    let err = SyncError::OperationFailed("Gemini quota exceeded".into());
    assert_eq!(err.to_string(), "Gemini quota exceeded");
  }
}
