//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! Each function resolves the session, runs one session operation under
//! that session's lock and returns the DTO to send. `None` means the
//! session id is unknown.

use tracing::{info, instrument};

use crate::domain::{Difficulty, Theme};
use crate::protocol::{to_round_out, RoundOut};
use crate::session::SubmitOutcome;
use crate::state::AppState;

fn difficulty_or_default(raw: Option<&str>) -> Difficulty {
  raw.map(Difficulty::parse_or_default).unwrap_or_default()
}

#[instrument(level = "info", skip(state))]
pub async fn open_session(state: &AppState, difficulty: Option<&str>) -> RoundOut {
  let difficulty = difficulty_or_default(difficulty);
  state.create_session(difficulty, to_round_out).await
}

/// Ends a session. `false` when it was already gone.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn close_session(state: &AppState, session_id: &str) -> bool {
  state.remove_session(session_id).await
}

#[instrument(level = "debug", skip(state), fields(%session_id))]
pub async fn current_round(state: &AppState, session_id: &str) -> Option<RoundOut> {
  state.read_session(session_id, to_round_out).await
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn new_round(state: &AppState, session_id: &str, difficulty: Option<&str>) -> Option<RoundOut> {
  state
    .with_session(session_id, |s| {
      let difficulty = difficulty.map(Difficulty::parse_or_default).unwrap_or(s.difficulty);
      s.start_round(difficulty, &state.bank);
      info!(target: "challenge", session = %session_id, id = s.challenge.id.key(), difficulty = difficulty.as_str(), "Round served");
      to_round_out(s)
    })
    .await
}

#[instrument(level = "info", skip(state, locator), fields(%session_id, locator_len = locator.len(), %learning_mode))]
pub async fn submit_locator(state: &AppState, session_id: &str, locator: &str, learning_mode: bool) -> Option<SubmitOutcome> {
  state
    .with_session(session_id, |s| s.submit_locator(locator, learning_mode, &state.messages))
    .await
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn reset_score(state: &AppState, session_id: &str) -> Option<u32> {
  state.with_session(session_id, |s| s.reset_score()).await
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn reveal_hint(state: &AppState, session_id: &str) -> Option<String> {
  state
    .with_session(session_id, |s| {
      let text = s.reveal_hint(&state.messages);
      info!(target: "challenge", session = %session_id, id = s.challenge.id.key(), "Hint revealed");
      text
    })
    .await
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn toggle_theme(state: &AppState, session_id: &str) -> Option<Theme> {
  state.with_session(session_id, |s| s.toggle_theme()).await
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::ChallengeId;
  use crate::locator::Verdict;

  #[tokio::test]
  async fn unrecognized_difficulty_opens_an_easy_round() {
    let state = AppState::default();
    let round = open_session(&state, Some("impossible")).await;
    assert_eq!(round.difficulty, Difficulty::Easy);
    assert_eq!(round.score, 0);
    assert!(round.scene_html.contains("class="));
  }

  #[tokio::test]
  async fn score_flows_through_submit_and_reset() {
    let state = AppState::default();
    let round = open_session(&state, None).await;
    let id = round.session_id;
    let challenge = state.bank.get(ChallengeId::TargetElement).unwrap().clone();
    state.with_session(&id, |s| s.start_round_with(challenge)).await.unwrap();

    let out = submit_locator(&state, &id, ".target-element", false).await.unwrap();
    assert_eq!(out.verdict, Verdict::Correct);
    assert_eq!(out.score, 1);
    assert_eq!(current_round(&state, &id).await.unwrap().score, 1);
    assert_eq!(reset_score(&state, &id).await, Some(0));
  }

  #[tokio::test]
  async fn new_round_keeps_difficulty_unless_given() {
    let state = AppState::default();
    let id = open_session(&state, Some("hard")).await.session_id;
    assert_eq!(new_round(&state, &id, None).await.unwrap().difficulty, Difficulty::Hard);
    assert_eq!(new_round(&state, &id, Some("medium")).await.unwrap().difficulty, Difficulty::Medium);
  }

  #[tokio::test]
  async fn unknown_sessions_are_reported_as_none() {
    let state = AppState::default();
    assert!(current_round(&state, "nope").await.is_none());
    assert!(submit_locator(&state, "nope", "div", true).await.is_none());
    assert!(reveal_hint(&state, "nope").await.is_none());
    assert!(toggle_theme(&state, "nope").await.is_none());
    assert!(!close_session(&state, "nope").await);
  }

  #[tokio::test]
  async fn closed_sessions_stop_answering() {
    let state = AppState::default();
    let id = open_session(&state, None).await.session_id;
    assert!(close_session(&state, &id).await);
    assert!(current_round(&state, &id).await.is_none());
    assert!(reset_score(&state, &id).await.is_none());
  }
}
