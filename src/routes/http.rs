//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented and logs its parameters and basic result info.
//! Unknown session ids answer 404 with `{ "message": ... }`.

use std::sync::Arc;
use axum::{
  extract::{Path, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use tracing::{info, instrument, warn};

use crate::protocol::*;
use crate::state::AppState;
use crate::logic::*;

fn session_not_found(id: &str) -> Response {
  warn!(target: "session", %id, "HTTP request for unknown session");
  (
    StatusCode::NOT_FOUND,
    Json(ErrorOut { message: format!("Unknown session: {}", id) }),
  )
    .into_response()
}

fn found_or_404<T: serde::Serialize>(id: &str, value: Option<T>) -> Response {
  match value {
    Some(v) => Json(v).into_response(),
    None => session_not_found(id),
  }
}

#[instrument(level = "info")]
pub async fn http_health() -> impl IntoResponse { Json(HealthOut { ok: true }) }

#[instrument(level = "info", skip(state, body))]
pub async fn http_create_session(
  State(state): State<Arc<AppState>>,
  body: Option<Json<DifficultyIn>>,
) -> impl IntoResponse {
  let Json(body) = body.unwrap_or_default();
  let round = open_session(&state, body.difficulty.as_deref()).await;
  info!(target: "challenge", session = %round.session_id, id = round.challenge_id.key(), "HTTP session opened");
  (StatusCode::CREATED, Json(round))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Response {
  found_or_404(&id, current_round(&state, &id).await)
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Response {
  if close_session(&state, &id).await {
    info!(target: "session", session = %id, "HTTP session closed");
    StatusCode::NO_CONTENT.into_response()
  } else {
    session_not_found(&id)
  }
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_new_round(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  body: Option<Json<DifficultyIn>>,
) -> Response {
  let Json(body) = body.unwrap_or_default();
  found_or_404(&id, new_round(&state, &id, body.difficulty.as_deref()).await)
}

#[instrument(level = "info", skip(state, body), fields(locator_len = body.locator.len(), learning_mode = body.learning_mode))]
pub async fn http_submit_locator(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<LocatorIn>,
) -> Response {
  let outcome = submit_locator(&state, &id, &body.locator, body.learning_mode).await;
  if let Some(o) = &outcome {
    info!(target: "challenge", session = %id, verdict = ?o.verdict, score = o.score, "HTTP locator evaluated");
  }
  found_or_404(&id, outcome)
}

#[instrument(level = "info", skip(state))]
pub async fn http_reset_score(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Response {
  found_or_404(&id, reset_score(&state, &id).await.map(|score| ScoreOut { score }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_hint(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Response {
  found_or_404(&id, reveal_hint(&state, &id).await.map(|text| HintOut { text }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_toggle_theme(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Response {
  found_or_404(&id, toggle_theme(&state, &id).await.map(|theme| ThemeOut { theme }))
}
