//! Loading tutor configuration (prompts + lecture topics) from TOML.
//!
//! See `TutorConfig` and `Prompts` for the expected schema. Everything has a
//! built-in default, so the TOML file is optional tuning, not a requirement.

use serde::Deserialize;
use tracing::{error, info};

/// Fixed instructor address reports are delivered to, unless overridden.
pub const DEFAULT_INSTRUCTOR_EMAIL: &str = "dugan.um@gmail.com";

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TutorConfig {
  #[serde(default)]
  pub prompts: Prompts,
  /// Lecture topics offered on the menu (no problem record attached).
  #[serde(default)]
  pub lectures: Vec<String>,
  /// Override the report recipient (content/ops tuning, not a student knob).
  #[serde(default)]
  pub instructor_email: Option<String>,
}

impl TutorConfig {
  pub fn lectures_or_default(&self) -> Vec<String> {
    if self.lectures.is_empty() { default_lectures() } else { self.lectures.clone() }
  }
}

pub fn default_lectures() -> Vec<String> {
  vec![
    "Limits and Continuity".into(),
    "The Chain Rule".into(),
    "Integration by Parts".into(),
    "Partial Derivatives".into(),
  ]
}

/// Prompts used by the model client. Defaults carry the production wording;
/// override in TOML only to tune tone/structure.
///
/// Template placeholders: {student}, {statement}, {topic}, {score},
/// {transcript} — filled via `util::fill_template`.
#[derive(Clone, Debug, Deserialize)]
pub struct Prompts {
  // Conversation framing (the per-session system instruction)
  pub practice_framing_template: String,
  pub lecture_framing_template: String,
  // Deterministic opening turns (no network needed for the first paint)
  pub practice_opening_template: String,
  pub lecture_opening_template: String,
  // One-shot directive injected when the student solves a problem
  pub congratulation_directive: String,
  // Assessment pipeline
  pub scoring_system: String,
  pub report_system_template: String,
  pub report_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      practice_framing_template: "You are a Socratic calculus tutor working with {student}. \
        Guide the student toward the solution of the assigned problem with short questions; \
        never hand over the final numeric answer. Encourage proper LaTeX notation for every \
        derivative and integral. Assigned problem: {statement}".into(),
      lecture_framing_template: "You are a Socratic calculus tutor working with {student}. \
        Teach the topic '{topic}' interactively: one concept per reply, each reply ending \
        with a question that checks understanding. Use LaTeX for all mathematics.".into(),
      practice_opening_template: "Let's work through this together:\n\n{statement}\n\n\
        What would be your first step? Type your reasoning, or a numeric answer when you \
        have one.".into(),
      lecture_opening_template: "Welcome! Today's topic is {topic}. Before we start: \
        what do you already know about it?".into(),
      congratulation_directive: "The student just gave a correct final answer. Congratulate \
        them warmly, summarize the solution path in two or three sentences using LaTeX \
        notation, and suggest what to study next. Do not ask a new question.".into(),
      scoring_system: "You are a strict Engineering Professor. Evaluate the student's \
        mastery of Calculus (0-10) based ONLY on the chat history.\n\n\
        STRICT SCORING RUBRIC:\n\
        0-3: Purely non-technical chat or complete misunderstanding of limits/derivatives.\n\
        4-5: Good conceptual understanding but fails to state formal derivative or integral rules.\n\
        6-8: Correctly identifies and uses LaTeX for calculus notations (e.g., $\\frac{dy}{dx}$, \
        $\\int f(x)dx$, $\\nabla f$).\n\
        9-10: Flawless logic. Correctly applies Chain Rule, Integration by Parts, or Partial \
        Differentiation with perfect LaTeX.\n\n\
        CRITICAL RULES:\n\
        1. If the student does not use LaTeX for mathematical expressions, do NOT exceed 6.\n\
        2. If the student fails to explain the logic (e.g., why L'Hopital's rule applies), \
        penalize the score.\n\
        3. Output ONLY the integer.".into(),
      report_system_template: "You are an academic evaluator analyzing a Calculus tutoring \
        session for the course instructor.\n\
        Your report must include:\n\
        1. Session Overview\n\
        2. Numerical Understanding Score: {score}/10\n\
        3. Mathematical Rigor: Did the student use proper LaTeX for derivatives/integrals?\n\
        4. Logic Analysis: Did the student correctly identify steps (e.g., $u$-substitution, \
        partial derivative steps)?\n\
        5. Engagement Level\n\
        6. CRITICAL: Quote the section '--- STUDENT FEEDBACK ---' exactly.".into(),
      report_user_template: "Student Name: {student}\nTopic: {topic}\n\
        Assigned Score: {score}/10\n\nDATA:\n{transcript}\n\n\
        Format for the instructor. Ensure all calculus notations in the report use LaTeX.".into(),
    }
  }
}

/// Attempt to load `TutorConfig` from TUTOR_CONFIG_PATH. On any parsing/IO
/// error, returns None (defaults apply).
pub fn load_tutor_config_from_env() -> Option<TutorConfig> {
  let path = std::env::var("TUTOR_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<TutorConfig>(&s) {
      Ok(cfg) => {
        info!(target: "tutor_backend", %path, "Loaded tutor config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "tutor_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "tutor_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
