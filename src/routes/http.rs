//! HTTP endpoint handlers. The tutoring flow itself is WebSocket-only; HTTP
//! carries health checks and the catalog diagnostics for content authors.

use std::sync::Arc;

use axum::{extract::State, response::IntoResponse, Json};
use tracing::instrument;

use crate::protocol::{CatalogOut, CategoryOut, HealthOut};
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse {
  Json(HealthOut { ok: true })
}

/// Catalog summary: problem/category counts plus the load diagnostic (with
/// line/column and the offending line) when the source failed to parse.
#[instrument(level = "info", skip(state))]
pub async fn http_get_catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(CatalogOut {
    problems: state.problems.len(),
    categories: state
      .categories()
      .into_iter()
      .map(|(prefix, label, problems)| CategoryOut { prefix, label, problems })
      .collect(),
    diagnostic: state.catalog_diagnostic.clone(),
  })
}
