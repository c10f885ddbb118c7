//! Minimal client for an OpenAI-compatible chat-completions API.
//!
//! We only call chat.completions with plain-text replies: one-shot calls for
//! grading/report composition, and full-history calls for the tutoring
//! conversation. Calls are instrumented and log model names, latencies, and
//! token usage (not contents).
//!
//! NOTE: We never log the API key and we keep payload truncations short to
//! avoid leaking student text into logs.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::domain::{Role, Turn};

#[derive(Clone)]
pub struct OpenAI {
  pub client: reqwest::Client,
  pub api_key: String,
  pub base_url: String,
  pub fast_model: String,
  pub strong_model: String,
}

impl OpenAI {
  /// Construct the client if we find OPENAI_API_KEY; otherwise return None.
  /// Absence of the key disables model-backed operations only, never the app.
  pub fn from_env() -> Option<Self> {
    let api_key = std::env::var("OPENAI_API_KEY").ok()?;
    let base_url =
      std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let fast_model =
      std::env::var("OPENAI_FAST_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
    let strong_model =
      std::env::var("OPENAI_STRONG_MODEL").unwrap_or_else(|_| "gpt-4o".into());

    // The upstream service sets its own deadlines; this one guards against
    // hangs and turns overshoot into a retryable transport failure.
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(20))
      .build()
      .ok()?;

    Some(Self { client, api_key, base_url, fast_model, strong_model })
  }

  /// Shared POST + error extraction + usage logging.
  async fn chat(
    &self,
    model: &str,
    messages: Vec<ChatMessageReq>,
    temperature: f32,
  ) -> Result<String, String> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest { model: model.to_string(), messages, temperature };

    let res = self.client.post(&url)
      .header(USER_AGENT, "calculus-tutor-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req).send().await.map_err(|e| e.to_string())?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      return Err(format!("model HTTP {}: {}", status, msg));
    }

    let body: ChatCompletionResponse = res.json().await.map_err(|e| e.to_string())?;
    if let Some(usage) = &body.usage {
      info!(prompt_tokens = ?usage.prompt_tokens, completion_tokens = ?usage.completion_tokens, total_tokens = ?usage.total_tokens, "model usage");
    }
    let text = body.choices.first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default().trim().to_string();

    Ok(text)
  }

  /// One-shot system+user completion. Used by the assessment pipeline.
  #[instrument(level = "info", skip(self, system, user), fields(model = %model, user_len = user.len()))]
  pub async fn chat_plain(
    &self,
    model: &str,
    system: &str,
    user: &str,
    temperature: f32,
  ) -> Result<String, String> {
    let messages = vec![
      ChatMessageReq { role: "system".into(), content: system.into() },
      ChatMessageReq { role: "user".into(), content: user.into() },
    ];
    let start = std::time::Instant::now();
    let out = self.chat(model, messages, temperature).await;
    info!(elapsed = ?start.elapsed(), ok = out.is_ok(), "chat_plain finished");
    out
  }

  /// Full-history completion: framing as the system message, then the ordered
  /// turn history (hidden-directive markers stripped before transmission).
  #[instrument(level = "info", skip(self, framing, history), fields(model = %model, turns = history.len()))]
  pub async fn chat_turns(
    &self,
    model: &str,
    framing: &str,
    history: &[Turn],
    temperature: f32,
  ) -> Result<String, String> {
    let mut messages = Vec::with_capacity(history.len() + 1);
    messages.push(ChatMessageReq { role: "system".into(), content: framing.into() });
    for turn in history {
      let role = match turn.role {
        Role::Tutor => "assistant",
        Role::Student => "user",
      };
      messages.push(ChatMessageReq { role: role.into(), content: turn.model_text().into() });
    }
    let start = std::time::Instant::now();
    let out = self.chat(model, messages, temperature).await;
    info!(elapsed = ?start.elapsed(), ok = out.is_ok(), "chat_turns finished");
    out
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from the provider's error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  match serde_json::from_str::<EWrap>(body) {
    Ok(w) => Some(w.error.message),
    Err(_) => None,
  }
}
