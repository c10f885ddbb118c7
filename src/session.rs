//! Conversation sessions: a turn-based dialogue with the model, one per
//! active problem or lecture topic.
//!
//! Invariant: `history` is append-only for the lifetime of the session. A
//! failed model call leaves the just-appended student turn in place and adds
//! no tutor turn; the session stays usable. Sessions are discarded by the
//! controller (menu return, problem switch), never transitioned to a
//! terminal state.

use tracing::{error, instrument};

use crate::domain::{Role, Turn};
use crate::error::TutorError;
use crate::openai::OpenAI;

/// Section header under which terminal student feedback is appended to the
/// graded transcript. The report prompt instructs the evaluator to quote
/// this section verbatim for the instructor.
pub const FEEDBACK_HEADER: &str = "--- STUDENT FEEDBACK ---";

/// What this session is about. Carried for framing and reporting.
#[derive(Clone, Debug)]
pub enum SessionTopic {
  Problem { id: String, category: String },
  Lecture { topic: String },
}

impl SessionTopic {
  /// Display title used in report subjects and logs.
  pub fn title(&self) -> String {
    match self {
      SessionTopic::Problem { id, category } => format!("{category} ({id})"),
      SessionTopic::Lecture { topic } => topic.clone(),
    }
  }
}

#[derive(Clone, Debug)]
pub struct ConversationSession {
  pub topic: SessionTopic,
  /// Fixed directive conditioning all model replies; not itself a turn.
  pub framing: String,
  pub history: Vec<Turn>,
}

impl ConversationSession {
  /// Create a session seeded with one deterministic tutor-authored opening
  /// turn, so the first screen paint never needs a network round trip.
  pub fn start(topic: SessionTopic, framing: String, opening: String) -> Self {
    Self { topic, framing, history: vec![Turn::tutor(opening)] }
  }

  /// Append a student turn and ask the model for the tutor's reply.
  #[instrument(level = "info", skip(self, openai, student_text), fields(turns = self.history.len(), text_len = student_text.len()))]
  pub async fn send(
    &mut self,
    openai: Option<&OpenAI>,
    student_text: &str,
  ) -> Result<String, TutorError> {
    self.history.push(Turn::student(student_text));
    self.complete_tutor_turn(openai).await
  }

  /// Like `send`, but the turn carries the hidden-directive marker: part of
  /// the model context and of the graded transcript, never rendered to the
  /// student.
  #[instrument(level = "info", skip(self, openai, directive), fields(turns = self.history.len()))]
  pub async fn send_hidden(
    &mut self,
    openai: Option<&OpenAI>,
    directive: &str,
  ) -> Result<String, TutorError> {
    self.history.push(Turn::hidden_directive(directive));
    self.complete_tutor_turn(openai).await
  }

  async fn complete_tutor_turn(&mut self, openai: Option<&OpenAI>) -> Result<String, TutorError> {
    let Some(oa) = openai else {
      error!(target: "session", "Model not configured; tutor turn unavailable");
      return Err(TutorError::Transport("model not configured".into()));
    };
    match oa.chat_turns(&oa.fast_model, &self.framing, &self.history, 0.7).await {
      Ok(reply) => {
        self.history.push(Turn::tutor(reply.clone()));
        Ok(reply)
      }
      Err(e) => {
        error!(target: "session", error = %e, "Tutor turn failed; history keeps the student turn");
        Err(TutorError::Transport(e))
      }
    }
  }

  /// Student-visible turns: hidden directives filtered out.
  pub fn visible_turns(&self) -> impl Iterator<Item = &Turn> {
    self.history.iter().filter(|t| !t.is_hidden())
  }

  /// The full transcript handed to the assessment pipeline. Hidden directives
  /// are INCLUDED (marker and all): the grader needs to see what was asked,
  /// even though the student never does.
  pub fn full_transcript(&self) -> String {
    let mut out = String::new();
    for turn in &self.history {
      let who = match turn.role {
        Role::Tutor => "Tutor",
        Role::Student => "Student",
      };
      out.push_str(who);
      out.push_str(": ");
      out.push_str(&turn.text);
      out.push('\n');
    }
    out
  }

  /// Transcript handed to the assessment pipeline: the full transcript plus
  /// the tagged feedback section, present whether or not the student left
  /// feedback so the evaluator always has a section to quote.
  pub fn graded_transcript(&self, feedback: Option<&str>) -> String {
    let mut out = self.full_transcript();
    out.push('\n');
    out.push_str(FEEDBACK_HEADER);
    out.push('\n');
    out.push_str(feedback.unwrap_or("(none provided)"));
    out.push('\n');
    out
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::HIDDEN_PREFIX;

  fn practice_session() -> ConversationSession {
    ConversationSession::start(
      SessionTopic::Problem { id: "CAL_1_01".into(), category: "Limits".into() },
      "framing".into(),
      "Let's begin.".into(),
    )
  }

  #[test]
  fn start_seeds_exactly_one_tutor_opening() {
    let s = practice_session();
    assert_eq!(s.history.len(), 1);
    assert_eq!(s.history[0].role, Role::Tutor);
    assert!(!s.history[0].is_hidden());
  }

  #[tokio::test]
  async fn failed_send_keeps_student_turn_and_no_tutor_turn() {
    let mut s = practice_session();
    // No client configured: the call fails, but history must still contain
    // the appended student turn and nothing else new.
    let err = s.send(None, "my answer is 6").await.unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(s.history.len(), 2);
    assert_eq!(s.history[1].role, Role::Student);
    assert_eq!(s.history[1].text, "my answer is 6");
  }

  #[tokio::test]
  async fn hidden_sends_never_reach_the_visible_transcript() {
    let mut s = practice_session();
    let _ = s.send_hidden(None, "congratulate the student").await;
    let _ = s.send_hidden(None, "another directive").await;
    assert_eq!(s.history.len(), 3);
    assert!(s.visible_turns().all(|t| !t.text.contains(HIDDEN_PREFIX)));
    assert_eq!(s.visible_turns().count(), 1);
  }

  #[tokio::test]
  async fn full_transcript_includes_hidden_directives() {
    let mut s = practice_session();
    let _ = s.send_hidden(None, "congratulate the student").await;
    let transcript = s.full_transcript();
    assert!(transcript.contains(HIDDEN_PREFIX));
    assert!(transcript.contains("congratulate the student"));
    assert!(transcript.starts_with("Tutor: Let's begin."));
  }

  #[test]
  fn graded_transcript_always_carries_the_feedback_section() {
    let mut s = practice_session();
    s.history.push(Turn::student("is it 6?"));

    let with = s.graded_transcript(Some("the hints were too vague"));
    assert!(with.contains(FEEDBACK_HEADER));
    assert!(with.ends_with("the hints were too vague\n"));

    let without = s.graded_transcript(None);
    assert!(without.contains(FEEDBACK_HEADER));
    assert!(without.contains("(none provided)"));
  }

  // Serves one canned chat-completions reply so the success path can be
  // exercised without the real upstream.
  async fn canned_model_server() -> String {
    use axum::{routing::post, Json, Router};

    let app = Router::new().route(
      "/v1/chat/completions",
      post(|| async {
        Json(serde_json::json!({
          "choices": [
            { "message": { "role": "assistant", "content": "Try factoring the numerator." } }
          ]
        }))
      }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/v1")
  }

  #[tokio::test]
  async fn successful_send_appends_one_student_and_one_tutor_turn() {
    let base_url = canned_model_server().await;
    let oa = OpenAI {
      client: reqwest::Client::new(),
      api_key: "test-key".into(),
      base_url,
      fast_model: "fast".into(),
      strong_model: "strong".into(),
    };

    let mut s = practice_session();
    // A failed exchange first: only the student turn lands.
    let _ = s.send(None, "first try").await.unwrap_err();
    assert_eq!(s.history.len(), 2);

    let reply = s.send(Some(&oa), "second try").await.unwrap();
    assert_eq!(reply, "Try factoring the numerator.");
    assert_eq!(s.history.len(), 4);
    assert_eq!(s.history[2].role, Role::Student);
    assert_eq!(s.history[2].text, "second try");
    assert_eq!(s.history[3].role, Role::Tutor);
    assert_eq!(s.history[3].text, "Try factoring the numerator.");
  }
}
