//! Assessment & reporting pipeline.
//!
//! Two sequential model calls (the report depends on the score), then one
//! SMTP delivery. The whole pipeline is an academic side-channel: it runs in
//! a spawned task after the student-facing reply is ready, never raises past
//! this module, and delivery failures are logged only.
//!
//! The rubric's "do not exceed 6 without LaTeX" rule is enforced by prompt
//! wording only; code enforces just the [0, 10] clamp. See DESIGN.md.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{error, info, instrument};

use crate::config::Prompts;
use crate::domain::AssessmentReport;
use crate::mailer::Mailer;
use crate::openai::OpenAI;
use crate::state::AppState;
use crate::util::{fill_template, trunc_for_log};

static FIRST_INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").expect("integer pattern"));

/// First integer in the grader's reply, clamped to [0, 10]. No integer (or an
/// unparseable one) defaults to 0; overflow-sized numbers clamp high.
pub fn parse_score(reply: &str) -> u8 {
  match FIRST_INT_RE.find(reply) {
    Some(m) => match m.as_str().parse::<u64>() {
      Ok(n) => n.min(10) as u8,
      Err(_) => 10,
    },
    None => 0,
  }
}

/// Step 1: grade the transcript against the fixed rubric. Any failure
/// (no client, transport, digit-free reply) yields 0.
#[instrument(level = "info", skip_all, fields(transcript_len = transcript.len()))]
pub async fn score_transcript(
  openai: Option<&OpenAI>,
  prompts: &Prompts,
  transcript: &str,
) -> u8 {
  let Some(oa) = openai else {
    error!(target: "report", "Model not configured; assigning score 0");
    return 0;
  };
  let user = format!("Chat history to evaluate:\n{transcript}");
  match oa.chat_plain(&oa.strong_model, &prompts.scoring_system, &user, 0.0).await {
    Ok(reply) => {
      let score = parse_score(&reply);
      info!(target: "report", score, reply = %trunc_for_log(&reply, 80), "Transcript scored");
      score
    }
    Err(e) => {
      error!(target: "report", error = %e, "Scoring call failed; assigning score 0");
      0
    }
  }
}

/// Step 2: compose the narrative report body. Failures produce a placeholder
/// narrative with the error inlined; this step never raises.
#[instrument(level = "info", skip_all, fields(%student, %topic, score = score))]
pub async fn compose_narrative(
  openai: Option<&OpenAI>,
  prompts: &Prompts,
  student: &str,
  topic: &str,
  score: u8,
  transcript: &str,
) -> String {
  let Some(oa) = openai else {
    return "AI analysis unavailable: model is not configured.".into();
  };
  let score_str = score.to_string();
  let system = fill_template(&prompts.report_system_template, &[("score", score_str.as_str())]);
  let user = fill_template(
    &prompts.report_user_template,
    &[
      ("student", student),
      ("topic", topic),
      ("score", score_str.as_str()),
      ("transcript", transcript),
    ],
  );
  match oa.chat_plain(&oa.strong_model, &system, &user, 0.3).await {
    Ok(narrative) => narrative,
    Err(e) => format!("Analysis failed: {e}"),
  }
}

/// Step 3: single delivery attempt. Failure is operator-visible only.
async fn deliver(mailer: Option<&Mailer>, report: &AssessmentReport, student: &str, topic: &str) {
  let subject =
    format!("Calculus Tutor ({student}): {topic} [Score: {}/10]", report.score);
  match mailer {
    Some(m) => {
      if let Err(e) = m.send_plain(&report.recipient, &subject, &report.narrative).await {
        error!(target: "report", to = %report.recipient, error = %e, "Report delivery failed (not retried)");
      }
    }
    None => {
      error!(target: "report", "Email not configured; report not delivered");
    }
  }
}

/// Full pipeline: score, compose, deliver once. Returns the report (with the
/// narrative) regardless of delivery outcome.
#[instrument(level = "info", skip(state, transcript), fields(%student, %topic, transcript_len = transcript.len()))]
pub async fn analyze_and_report(
  state: &AppState,
  student: &str,
  topic: &str,
  transcript: &str,
) -> AssessmentReport {
  let score = score_transcript(state.openai.as_ref(), &state.prompts, transcript).await;
  let narrative =
    compose_narrative(state.openai.as_ref(), &state.prompts, student, topic, score, transcript)
      .await;
  let report =
    AssessmentReport { score, narrative, recipient: state.instructor_email.clone() };
  deliver(state.mailer.as_ref(), &report, student, topic).await;
  info!(target: "report", score = report.score, "Assessment pipeline finished");
  report
}

/// Hand the pipeline off to its own task so a slow or failing report can
/// never block or fail the student's turn.
pub fn spawn_report(state: Arc<AppState>, student: String, topic: String, transcript: String) {
  tokio::spawn(async move {
    let _ = analyze_and_report(&state, &student, &topic, &transcript).await;
  });
}
