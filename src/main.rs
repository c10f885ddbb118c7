//! Calculus Tutor · Socratic Tutoring Backend
//!
//! - Axum HTTP + WebSocket API (one student session per socket)
//! - Optional OpenAI-compatible model integration (via environment variables)
//! - Instructor reports over SMTP after each solved/skipped problem
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT              : u16 (default 3000)
//!   CATALOG_PATH      : problem catalog JSON (default ./calculus_problems.json)
//!   OPENAI_API_KEY    : enables model integration if present
//!   OPENAI_BASE_URL   : default "https://api.openai.com/v1"
//!   OPENAI_FAST_MODEL : default "gpt-4o-mini"
//!   OPENAI_STRONG_MODEL : default "gpt-4o"
//!   EMAIL_SENDER      : SMTP account; enables report delivery if present
//!   EMAIL_PASSWORD    : SMTP password
//!   SMTP_HOST         : default "smtp.gmail.com"
//!   TUTOR_CONFIG_PATH : path to TOML config (prompts + lecture topics)
//!   LOG_LEVEL         : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT        : "pretty" (default) or "json"

mod telemetry;
mod util;
mod error;
mod domain;
mod catalog;
mod matcher;
mod config;
mod state;
mod protocol;
mod session;
mod openai;
mod mailer;
mod report;
mod controller;
mod routes;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (cached catalog, prompts, model + mail clients).
  let state = Arc::new(AppState::new());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "tutor_backend", %addr, "HTTP server listening");
  axum::serve(listener, app).await?;
  Ok(())
}
