//! Domain models: problem records, conversation turns, and assessment reports.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Marker prefix for model-facing directive turns that must never be rendered
/// to the student. The marker stays in the stored text so both transcript
/// filtering and the grading pipeline can see which turns were injected.
pub const HIDDEN_PREFIX: &str = "[internal-directive] ";

/// Who authored a conversation turn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
  Tutor,
  Student,
}

/// One message in a conversation. A single tagged type with fixed fields;
/// history entries are never shape-shifted or edited after append.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Turn {
  pub role: Role,
  pub text: String,
}

impl Turn {
  pub fn tutor(text: impl Into<String>) -> Self {
    Self { role: Role::Tutor, text: text.into() }
  }

  /// Student input. Any directive marker the student typed (or pasted) is
  /// stripped: only `hidden_directive` may produce marked turns.
  pub fn student(text: impl Into<String>) -> Self {
    let mut text = text.into();
    while let Some(rest) = text.strip_prefix(HIDDEN_PREFIX) {
      text = rest.to_string();
    }
    Self { role: Role::Student, text }
  }

  /// A directive turn: sent to the model on the student channel, excluded
  /// from the student-visible transcript.
  pub fn hidden_directive(text: &str) -> Self {
    Self { role: Role::Student, text: format!("{HIDDEN_PREFIX}{text}") }
  }

  pub fn is_hidden(&self) -> bool {
    self.text.starts_with(HIDDEN_PREFIX)
  }

  /// Text as sent to the model: marker stripped, content kept.
  pub fn model_text(&self) -> &str {
    self.text.strip_prefix(HIDDEN_PREFIX).unwrap_or(&self.text)
  }
}

/// One problem from the hand-authored catalog. Immutable after load.
///
/// `targets` maps checkpoint names to expected numeric values; a student input
/// matching ANY target counts as correct (intermediate and final answers).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProblemRecord {
  pub id: String,
  pub category: String,
  pub statement: String,
  pub targets: HashMap<String, f64>,
}

impl ProblemRecord {
  /// Category prefix encoded in the id ("CAL_1_03" -> "CAL_1").
  pub fn category_prefix(&self) -> &str {
    self.id.rsplit_once('_').map(|(p, _)| p).unwrap_or(&self.id)
  }
}

/// Outcome of the assessment pipeline. Built once per terminal event
/// (solve or explicit skip); never stored or retried.
#[derive(Clone, Debug, Serialize)]
pub struct AssessmentReport {
  pub score: u8,
  pub narrative: String,
  pub recipient: String,
}
