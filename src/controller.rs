//! Per-student session controller: the screen state machine.
//!
//! Screens: login -> menu -> practice/lecture -> back to menu. One
//! `StudentSession` is owned by exactly one WebSocket task, which processes
//! one user action to completion before the next is read, so no locking is
//! needed here.
//!
//! A conversation is graded when it ends: next-problem, exit-to-menu, or a
//! dropped socket. The transcript (plus any terminal feedback the student
//! left) goes to the assessment pipeline on a spawned task, so the
//! student-facing reply never waits on it.

use std::sync::Arc;

use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::domain::ProblemRecord;
use crate::error::TutorError;
use crate::matcher::{self, DEFAULT_TOLERANCE};
use crate::report::spawn_report;
use crate::session::{ConversationSession, SessionTopic};
use crate::state::AppState;
use crate::util::fill_template;

/// Which screen the student is on, with the state threaded through it.
/// Conversation sessions live inside their screen: leaving the screen
/// discards them.
#[derive(Debug)]
pub enum Screen {
  Login,
  Menu,
  Practice { problem: ProblemRecord, convo: ConversationSession, solved: bool },
  Lecture { topic: String, convo: ConversationSession },
}

/// Explicit, strongly-typed per-student state. Passed to every transition
/// handler; never looked up ambiently.
#[derive(Debug)]
pub struct StudentSession {
  /// Correlation id for logs only.
  pub id: String,
  pub name: String,
  pub screen: Screen,
  /// True while a model call is in flight. User-facing indication only.
  pub awaiting_model: bool,
}

impl StudentSession {
  pub fn new() -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      name: String::new(),
      screen: Screen::Login,
      awaiting_model: false,
    }
  }
}

/// Result of a student message on the practice or lecture screen.
#[derive(Debug)]
pub enum AnswerOutcome {
  /// The input matched a target. The reply, if the congratulation call
  /// succeeded, is the tutor's summary; its absence is not an error.
  Solved { problem_id: String, checkpoint: String, tutor_reply: Option<String> },
  /// Forwarded as a normal turn; the tutor replied.
  Continued { tutor_reply: String },
}

/// LOGIN -> MENU. Empty names are rejected with the state unchanged.
#[instrument(level = "info", skip(sess), fields(session = %sess.id))]
pub fn submit_login(sess: &mut StudentSession, name: &str) -> Result<(), TutorError> {
  let name = name.trim();
  if name.is_empty() {
    return Err(TutorError::Validation("Please enter your name to begin.".into()));
  }
  sess.name = name.to_string();
  sess.screen = Screen::Menu;
  info!(target: "session", session = %sess.id, student = %sess.name, "Student logged in");
  Ok(())
}

/// MENU -> PRACTICE. Draws one problem uniformly at random from the chosen
/// category prefix; an empty category leaves the menu untouched.
#[instrument(level = "info", skip(sess, state), fields(session = %sess.id, %category))]
pub fn select_category(
  sess: &mut StudentSession,
  state: &AppState,
  category: &str,
) -> Result<(), TutorError> {
  if !matches!(sess.screen, Screen::Menu) {
    return Err(TutorError::Validation("Return to the menu first.".into()));
  }
  let Some(problem) = state.choose_problem(category, None) else {
    if state.problems.is_empty() {
      return Err(TutorError::Content(
        "the problem catalog is empty; check /api/v1/catalog".into(),
      ));
    }
    return Err(TutorError::Validation(format!("No problems available for '{category}'.")));
  };
  let convo = start_practice_session(state, &sess.name, &problem);
  info!(target: "session", session = %sess.id, problem = %problem.id, "Practice session started");
  sess.screen = Screen::Practice { problem, convo, solved: false };
  Ok(())
}

/// MENU -> LECTURE. Lecture entries have no problem record, only a topic.
#[instrument(level = "info", skip(sess, state), fields(session = %sess.id, %topic))]
pub fn select_lecture(
  sess: &mut StudentSession,
  state: &AppState,
  topic: &str,
) -> Result<(), TutorError> {
  if !matches!(sess.screen, Screen::Menu) {
    return Err(TutorError::Validation("Return to the menu first.".into()));
  }
  let topic = topic.trim();
  if topic.is_empty() {
    return Err(TutorError::Validation("Pick a lecture topic.".into()));
  }
  let framing = fill_template(
    &state.prompts.lecture_framing_template,
    &[("student", &sess.name), ("topic", topic)],
  );
  let opening = fill_template(&state.prompts.lecture_opening_template, &[("topic", topic)]);
  let convo =
    ConversationSession::start(SessionTopic::Lecture { topic: topic.to_string() }, framing, opening);
  info!(target: "session", session = %sess.id, %topic, "Lecture session started");
  sess.screen = Screen::Lecture { topic: topic.to_string(), convo };
  Ok(())
}

/// PRACTICE/LECTURE self-loop on a student message.
///
/// In practice mode the input is first run through the answer matcher against
/// all targets: a match appends the student's answer and injects the hidden
/// congratulation directive; anything else is forwarded to the tutor as a
/// normal turn. Grading waits until the conversation ends.
#[instrument(level = "info", skip(sess, state, text), fields(session = %sess.id, text_len = text.len()))]
pub async fn student_message(
  sess: &mut StudentSession,
  state: &Arc<AppState>,
  text: &str,
) -> Result<AnswerOutcome, TutorError> {
  if text.trim().is_empty() {
    return Err(TutorError::Validation("Type a message first.".into()));
  }
  match &mut sess.screen {
    Screen::Practice { problem, convo, solved } => {
      let checkpoint = if *solved {
        None
      } else {
        matcher::matches_any(text, &problem.targets, DEFAULT_TOLERANCE)
          .map(str::to_string)
      };
      match checkpoint {
        Some(checkpoint) => {
          *solved = true;
          convo.history.push(crate::domain::Turn::student(text));
          info!(target: "session", session = %sess.id, problem = %problem.id, %checkpoint, "Answer matched; solving");

          sess.awaiting_model = true;
          let congrats = convo
            .send_hidden(state.openai.as_ref(), &state.prompts.congratulation_directive)
            .await;
          sess.awaiting_model = false;

          let tutor_reply = match congrats {
            Ok(reply) => Some(reply),
            Err(e) => {
              // The answer is accepted either way; the missing summary is a
              // cosmetic loss, not a failed transition.
              error!(target: "session", session = %sess.id, error = %e, "Congratulation turn failed");
              None
            }
          };
          Ok(AnswerOutcome::Solved {
            problem_id: problem.id.clone(),
            checkpoint,
            tutor_reply,
          })
        }
        None => {
          sess.awaiting_model = true;
          let reply = convo.send(state.openai.as_ref(), text).await;
          sess.awaiting_model = false;
          reply.map(|tutor_reply| AnswerOutcome::Continued { tutor_reply })
        }
      }
    }
    Screen::Lecture { convo, .. } => {
      sess.awaiting_model = true;
      let reply = convo.send(state.openai.as_ref(), text).await;
      sess.awaiting_model = false;
      reply.map(|tutor_reply| AnswerOutcome::Continued { tutor_reply })
    }
    _ => Err(TutorError::Validation("Pick a problem or lecture first.".into())),
  }
}

/// PRACTICE -> PRACTICE on "next problem": grade the conversation being left
/// behind, then draw a fresh problem excluding the one just shown.
#[instrument(level = "info", skip(sess, state, feedback), fields(session = %sess.id))]
pub fn next_problem(
  sess: &mut StudentSession,
  state: &Arc<AppState>,
  feedback: Option<&str>,
) -> Result<(), TutorError> {
  let Screen::Practice { problem, convo, solved } = &sess.screen else {
    return Err(TutorError::Validation("Not in practice mode.".into()));
  };
  let category = problem.category_prefix().to_string();
  let exclude = problem.id.clone();
  // Draw first: if there is nothing to move on to, the conversation is not
  // over and must not be graded yet.
  let Some(next) = state.choose_problem(&category, Some(&exclude)) else {
    return Err(TutorError::Validation(format!("No problems available for '{category}'.")));
  };
  if let Some(transcript) = terminal_report(convo, *solved, feedback) {
    spawn_report(state.clone(), sess.name.clone(), convo.topic.title(), transcript);
  }
  let convo = start_practice_session(state, &sess.name, &next);
  info!(target: "session", session = %sess.id, problem = %next.id, excluded = %exclude, "Next problem drawn");
  sess.screen = Screen::Practice { problem: next, convo, solved: false };
  Ok(())
}

/// PRACTICE/LECTURE -> MENU. Grades the conversation being left behind, then
/// discards it.
#[instrument(level = "info", skip(sess, state, feedback), fields(session = %sess.id))]
pub fn exit_to_menu(
  sess: &mut StudentSession,
  state: &Arc<AppState>,
  feedback: Option<&str>,
) -> Result<(), TutorError> {
  if matches!(sess.screen, Screen::Login) {
    return Err(TutorError::Validation("Log in first.".into()));
  }
  match &sess.screen {
    Screen::Practice { convo, solved, .. } => {
      if let Some(transcript) = terminal_report(convo, *solved, feedback) {
        spawn_report(state.clone(), sess.name.clone(), convo.topic.title(), transcript);
      }
    }
    Screen::Lecture { convo, .. } => {
      if let Some(transcript) = terminal_report(convo, false, feedback) {
        spawn_report(state.clone(), sess.name.clone(), convo.topic.title(), transcript);
      }
    }
    _ => {}
  }
  sess.screen = Screen::Menu;
  sess.awaiting_model = false;
  Ok(())
}

/// Socket closed: whatever conversation was active ends the same way an
/// explicit exit does (no feedback to attach).
pub fn abandon(sess: &mut StudentSession, state: &Arc<AppState>) {
  if !matches!(sess.screen, Screen::Login) {
    let _ = exit_to_menu(sess, state, None);
  }
}

/// Decide whether a conversation that is ending gets graded, and build the
/// transcript if so. Graded when the problem was solved, the student wrote at
/// least one turn, or they left terminal feedback.
fn terminal_report(
  convo: &ConversationSession,
  solved: bool,
  feedback: Option<&str>,
) -> Option<String> {
  let feedback = feedback.map(str::trim).filter(|f| !f.is_empty());
  let engaged = convo.history.iter().any(|t| t.role == crate::domain::Role::Student);
  if solved || engaged || feedback.is_some() {
    Some(convo.graded_transcript(feedback))
  } else {
    None
  }
}

fn start_practice_session(
  state: &AppState,
  student: &str,
  problem: &ProblemRecord,
) -> ConversationSession {
  let framing = fill_template(
    &state.prompts.practice_framing_template,
    &[("student", student), ("statement", &problem.statement)],
  );
  let opening =
    fill_template(&state.prompts.practice_opening_template, &[("statement", &problem.statement)]);
  ConversationSession::start(
    SessionTopic::Problem { id: problem.id.clone(), category: problem.category.clone() },
    framing,
    opening,
  )
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{default_lectures, Prompts};
  use crate::domain::{Role, HIDDEN_PREFIX};
  use crate::report::analyze_and_report;
  use crate::session::FEEDBACK_HEADER;

  fn problem(id: &str, category: &str, targets: &[(&str, f64)]) -> ProblemRecord {
    ProblemRecord {
      id: id.into(),
      category: category.into(),
      statement: format!("Statement for {id}"),
      targets: targets.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
    }
  }

  fn test_state() -> Arc<AppState> {
    Arc::new(AppState {
      problems: vec![
        problem("CAL_1_01", "Limits", &[("limit", 6.0)]),
        problem("CAL_2_01", "Derivatives", &[("inner_value", 3.0), ("derivative_at_2", 8.0)]),
      ],
      catalog_diagnostic: None,
      prompts: Prompts::default(),
      lectures: default_lectures(),
      instructor_email: "instructor@example.edu".into(),
      openai: None,
      mailer: None,
    })
  }

  #[test]
  fn empty_name_is_rejected_and_state_unchanged() {
    let mut sess = StudentSession::new();
    let err = submit_login(&mut sess, "   ").unwrap_err();
    assert!(matches!(err, TutorError::Validation(_)));
    assert!(matches!(sess.screen, Screen::Login));

    submit_login(&mut sess, "Ada").unwrap();
    assert!(matches!(sess.screen, Screen::Menu));
    assert_eq!(sess.name, "Ada");
  }

  #[test]
  fn empty_category_selection_is_a_noop() {
    let state = test_state();
    let mut sess = StudentSession::new();
    submit_login(&mut sess, "Ada").unwrap();
    let err = select_category(&mut sess, &state, "CAL_9").unwrap_err();
    assert!(matches!(err, TutorError::Validation(_)));
    assert!(matches!(sess.screen, Screen::Menu));
  }

  #[tokio::test]
  async fn wrong_answer_is_forwarded_as_a_normal_turn() {
    let state = test_state();
    let mut sess = StudentSession::new();
    submit_login(&mut sess, "Ada").unwrap();
    select_category(&mut sess, &state, "CAL_1").unwrap();

    // Offline: the forwarded turn fails transport-wise, but the student turn
    // must be appended and the session must stay on the practice screen.
    let err = student_message(&mut sess, &state, "maybe 42?").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(!sess.awaiting_model);
    let Screen::Practice { convo, solved, .. } = &sess.screen else {
      panic!("expected practice screen");
    };
    assert!(!solved);
    assert_eq!(convo.history.len(), 2);
    assert_eq!(convo.history[1].role, Role::Student);
  }

  #[tokio::test]
  async fn matching_answer_solves_appends_hidden_directive_and_reports() {
    let state = test_state();
    let mut sess = StudentSession::new();
    submit_login(&mut sess, "Ada").unwrap();
    select_category(&mut sess, &state, "CAL_2").unwrap();

    let outcome = student_message(&mut sess, &state, "I think it's 8").await.unwrap();
    let AnswerOutcome::Solved { problem_id, checkpoint, tutor_reply } = outcome else {
      panic!("expected solved outcome");
    };
    assert_eq!(problem_id, "CAL_2_01");
    assert_eq!(checkpoint, "derivative_at_2");
    assert!(tutor_reply.is_none()); // offline: congratulation call failed soft

    let Screen::Practice { convo, solved, .. } = &sess.screen else {
      panic!("expected practice screen");
    };
    assert!(*solved);
    // Hidden congratulation turn appended, excluded from the visible
    // transcript, included in the graded one.
    assert!(convo.history.iter().any(|t| t.is_hidden()));
    assert!(convo.visible_turns().all(|t| !t.text.contains(HIDDEN_PREFIX)));
    assert!(convo.full_transcript().contains(HIDDEN_PREFIX));

    // A solved conversation is graded when it ends, feedback or not.
    assert!(terminal_report(convo, *solved, None).is_some());

    // The pipeline, run against the same transcript, stays in range offline.
    let report =
      analyze_and_report(&state, &sess.name, &convo.topic.title(), &convo.graded_transcript(None))
        .await;
    assert!(report.score <= 10);
    assert_eq!(report.recipient, "instructor@example.edu");
  }

  #[tokio::test]
  async fn intermediate_checkpoint_also_counts() {
    let state = test_state();
    let mut sess = StudentSession::new();
    submit_login(&mut sess, "Ada").unwrap();
    select_category(&mut sess, &state, "CAL_2").unwrap();
    let outcome = student_message(&mut sess, &state, "the inner value is 3").await.unwrap();
    assert!(matches!(outcome, AnswerOutcome::Solved { checkpoint, .. } if checkpoint == "inner_value"));
  }

  #[tokio::test]
  async fn next_problem_discards_session_and_excludes_previous() {
    let state = Arc::new(AppState {
      problems: vec![
        problem("CAL_1_01", "Limits", &[("limit", 6.0)]),
        problem("CAL_1_02", "Limits", &[("limit", 2.0)]),
      ],
      catalog_diagnostic: None,
      prompts: Prompts::default(),
      lectures: default_lectures(),
      instructor_email: "instructor@example.edu".into(),
      openai: None,
      mailer: None,
    });
    let mut sess = StudentSession::new();
    submit_login(&mut sess, "Ada").unwrap();
    select_category(&mut sess, &state, "CAL_1").unwrap();
    let first_id = match &sess.screen {
      Screen::Practice { problem, .. } => problem.id.clone(),
      _ => panic!("expected practice screen"),
    };
    next_problem(&mut sess, &state, None).unwrap();
    let Screen::Practice { problem, convo, solved } = &sess.screen else {
      panic!("expected practice screen");
    };
    assert_ne!(problem.id, first_id);
    assert!(!solved);
    assert_eq!(convo.history.len(), 1); // fresh session, opening turn only
  }

  #[tokio::test]
  async fn lecture_flow_enters_chats_and_exits() {
    let state = test_state();
    let mut sess = StudentSession::new();
    submit_login(&mut sess, "Ada").unwrap();
    select_lecture(&mut sess, &state, "The Chain Rule").unwrap();
    assert!(matches!(sess.screen, Screen::Lecture { .. }));

    let err = student_message(&mut sess, &state, "what is it?").await.unwrap_err();
    assert!(err.is_retryable());

    exit_to_menu(&mut sess, &state, Some("please slow down")).unwrap();
    assert!(matches!(sess.screen, Screen::Menu));
  }

  #[tokio::test]
  async fn ending_a_conversation_decides_whether_it_is_graded() {
    let state = test_state();
    let mut sess = StudentSession::new();
    submit_login(&mut sess, "Ada").unwrap();
    select_category(&mut sess, &state, "CAL_1").unwrap();

    // Untouched conversation: nothing to grade, and blank feedback does not
    // change that.
    let Screen::Practice { convo, solved, .. } = &sess.screen else {
      panic!("expected practice screen");
    };
    assert!(terminal_report(convo, *solved, None).is_none());
    assert!(terminal_report(convo, *solved, Some("   ")).is_none());

    // Feedback alone is worth a report, quoted under its section header.
    let t = terminal_report(convo, *solved, Some("  too hard  ")).unwrap();
    assert!(t.contains(FEEDBACK_HEADER));
    assert!(t.contains("too hard"));

    // One exchange counts as engagement even when the tutor call failed.
    let _ = student_message(&mut sess, &state, "maybe 5?").await;
    let Screen::Practice { convo, solved, .. } = &sess.screen else {
      panic!("expected practice screen");
    };
    let t = terminal_report(convo, *solved, None).unwrap();
    assert!(t.contains("maybe 5?"));
    assert!(t.contains("(none provided)"));
  }

  #[tokio::test]
  async fn exit_to_menu_grades_an_engaged_practice_session() {
    let state = test_state();
    let mut sess = StudentSession::new();
    submit_login(&mut sess, "Ada").unwrap();
    select_category(&mut sess, &state, "CAL_1").unwrap();
    let _ = student_message(&mut sess, &state, "no idea").await;

    exit_to_menu(&mut sess, &state, Some("please add easier problems")).unwrap();
    assert!(matches!(sess.screen, Screen::Menu));
    assert!(!sess.awaiting_model);
  }
}
