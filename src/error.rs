//! Error taxonomy for the tutoring core.
//!
//! Nothing here ever propagates to the student as an unhandled fault: every
//! external-call site converts failures into one of these kinds before control
//! returns to the session controller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TutorError {
  /// Catalog malformed or missing. Diagnostic-only; the app keeps running
  /// with an empty catalog.
  #[error("content error: {0}")]
  Content(String),

  /// Model call or email send failed (including rate-limit/quota exhaustion).
  /// The conversation stays usable; the user is asked to retry.
  #[error("transport error: {0}")]
  Transport(String),

  /// Bad user input (empty name, empty category). Re-prompt, no state change.
  #[error("validation error: {0}")]
  Validation(String),

  /// Numeric extraction failed. Treated as "no match" upstream.
  #[error("parse error: {0}")]
  Parse(String),
}

impl TutorError {
  pub fn is_retryable(&self) -> bool {
    matches!(self, TutorError::Transport(_))
  }

  /// Student-facing phrasing. Transport failures are always presented as
  /// transient, since the dominant real failure mode is upstream rate limiting.
  pub fn user_message(&self) -> String {
    match self {
      TutorError::Transport(_) => {
        "The tutor is temporarily unavailable. Please wait a moment and try again.".into()
      }
      TutorError::Validation(m) => m.clone(),
      TutorError::Content(m) => format!("Problem content unavailable: {m}"),
      TutorError::Parse(m) => m.clone(),
    }
  }
}
