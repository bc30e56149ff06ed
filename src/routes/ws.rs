//! WebSocket upgrade + message loop. Each connection owns one session, opened
//! on connect and dropped on disconnect. Each client message is parsed as
//! JSON and forwarded to core logic; we reply with a single JSON message per
//! request.

use std::sync::Arc;
use axum::{
  extract::{
    ws::{Message, WebSocket},
    Query, State, WebSocketUpgrade,
  },
  response::IntoResponse,
};
use tracing::{info, error, instrument, debug};

use crate::protocol::{ClientWsMessage, DifficultyIn, ServerWsMessage};
use crate::logic::*;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn ws_upgrade(
  ws: WebSocketUpgrade,
  State(state): State<Arc<AppState>>,
  Query(q): Query<DifficultyIn>,
) -> impl IntoResponse {
  info!(target: "locator_trainer", "WebSocket upgrade requested");
  ws.on_upgrade(move |socket| handle_ws(socket, state, q.difficulty))
}

fn encode(msg: &ServerWsMessage) -> String {
  serde_json::to_string(msg).unwrap_or_else(|e| {
    serde_json::json!({ "type": "error", "message": format!("Serialization error: {}", e) }).to_string()
  })
}

#[instrument(level = "info", skip(socket, state))]
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>, difficulty: Option<String>) {
  let round = open_session(&state, difficulty.as_deref()).await;
  let session_id = round.session_id.clone();
  info!(target: "locator_trainer", session = %session_id, "WebSocket connected");

  if socket.send(Message::Text(encode(&ServerWsMessage::Round { round }))).await.is_ok() {
    while let Some(Ok(msg)) = socket.recv().await {
      match msg {
        Message::Text(txt) => {
          let reply_msg = match serde_json::from_str::<ClientWsMessage>(&txt) {
            Ok(incoming) => {
              debug!(target: "session", session = %session_id, "WS received: {:?}", &incoming);
              handle_client_ws(incoming, &state, &session_id).await
            }
            Err(e) => ServerWsMessage::Error { message: format!("Invalid JSON: {}", e) },
          };

          if let Err(e) = socket.send(Message::Text(encode(&reply_msg))).await {
            error!(target: "locator_trainer", error = %e, "WS send error");
            break;
          }
        }
        Message::Ping(payload) => { let _ = socket.send(Message::Pong(payload)).await; }
        Message::Close(_) => break,
        _ => {}
      }
    }
  }

  state.remove_session(&session_id).await;
  let live = state.session_count().await;
  info!(target: "locator_trainer", session = %session_id, live = live, "WebSocket disconnected");
}

fn gone(session_id: &str) -> ServerWsMessage {
  ServerWsMessage::Error { message: format!("Unknown session: {}", session_id) }
}

#[instrument(level = "info", skip(state))]
async fn handle_client_ws(msg: ClientWsMessage, state: &AppState, session_id: &str) -> ServerWsMessage {
  match msg {
    ClientWsMessage::Ping => ServerWsMessage::Pong,

    ClientWsMessage::StartRound { difficulty } => match new_round(state, session_id, difficulty.as_deref()).await {
      Some(round) => {
        info!(target: "challenge", session = %session_id, id = round.challenge_id.key(), "WS start_round served");
        ServerWsMessage::Round { round }
      }
      None => gone(session_id),
    },

    ClientWsMessage::SubmitLocator { locator, learning_mode } => {
      match submit_locator(state, session_id, &locator, learning_mode).await {
        Some(outcome) => {
          info!(target: "challenge", session = %session_id, verdict = ?outcome.verdict, score = outcome.score, "WS submit_locator evaluated");
          ServerWsMessage::Verdict(outcome)
        }
        None => gone(session_id),
      }
    }

    ClientWsMessage::ResetScore => reset_score(state, session_id)
      .await
      .map(|score| ServerWsMessage::Score { score })
      .unwrap_or_else(|| gone(session_id)),

    ClientWsMessage::RevealHint => reveal_hint(state, session_id)
      .await
      .map(|text| ServerWsMessage::Hint { text })
      .unwrap_or_else(|| gone(session_id)),

    ClientWsMessage::ToggleTheme => toggle_theme(state, session_id)
      .await
      .map(|theme| ServerWsMessage::Theme { theme })
      .unwrap_or_else(|| gone(session_id)),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::{json, Value};

  async fn reply(state: &AppState, session_id: &str, msg: Value) -> Value {
    let incoming: ClientWsMessage = serde_json::from_value(msg).unwrap();
    serde_json::from_str(&encode(&handle_client_ws(incoming, state, session_id).await)).unwrap()
  }

  #[tokio::test]
  async fn messages_dispatch_to_the_connection_session() {
    let state = AppState::default();
    let id = open_session(&state, None).await.session_id;

    assert_eq!(reply(&state, &id, json!({"type": "ping"})).await, json!({"type": "pong"}));

    let round = reply(&state, &id, json!({"type": "start_round", "difficulty": "medium"})).await;
    assert_eq!(round["type"], "round");
    assert_eq!(round["round"]["difficulty"], "medium");

    let verdict = reply(&state, &id, json!({"type": "submit_locator", "locator": "((", "learningMode": true})).await;
    assert_eq!(verdict["type"], "verdict");
    assert_eq!(verdict["verdict"], "invalid");
    assert_eq!(verdict["score"], 0);

    assert_eq!(reply(&state, &id, json!({"type": "reset_score"})).await, json!({"type": "score", "score": 0}));
    assert_eq!(reply(&state, &id, json!({"type": "toggle_theme"})).await, json!({"type": "theme", "theme": "dark"}));
    assert_eq!(reply(&state, &id, json!({"type": "reveal_hint"})).await["type"], "hint");
  }

  #[tokio::test]
  async fn closed_sessions_report_errors() {
    let state = AppState::default();
    let id = open_session(&state, None).await.session_id;
    state.remove_session(&id).await;
    let out = reply(&state, &id, json!({"type": "reveal_hint"})).await;
    assert_eq!(out["type"], "error");
  }
}
