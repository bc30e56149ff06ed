//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};

use crate::domain::{ChallengeId, Difficulty, Theme};
use crate::session::{Phase, Session, SubmitOutcome};

/// Messages the client can send over WebSocket.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    StartRound {
        #[serde(default)]
        difficulty: Option<String>,
    },
    SubmitLocator {
        locator: String,
        #[serde(rename = "learningMode", default)]
        learning_mode: bool,
    },
    ResetScore,
    RevealHint,
    ToggleTheme,
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Round {
        round: RoundOut,
    },
    Verdict(SubmitOutcome),
    Score {
        score: u32,
    },
    Hint {
        text: String,
    },
    Theme {
        theme: Theme,
    },
    Error {
        message: String,
    },
}

/// DTO used by both WS and HTTP for round delivery.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOut {
    pub session_id: String,
    pub challenge_id: ChallengeId,
    pub difficulty: Difficulty,
    pub prompt: String,
    pub scene_html: String,
    pub score: u32,
    pub theme: Theme,
    pub phase: Phase,
    pub feedback: String,
}

/// Snapshot of the session's current round.
pub fn to_round_out(s: &Session) -> RoundOut {
    RoundOut {
        session_id: s.id.clone(),
        challenge_id: s.challenge.id,
        difficulty: s.difficulty,
        prompt: s.challenge.text.clone(),
        scene_html: s.scene_html(),
        score: s.score,
        theme: s.theme,
        phase: s.phase,
        feedback: s.feedback.clone(),
    }
}

//
// HTTP request/response DTOs
//

#[derive(Debug, Default, Deserialize)]
pub struct DifficultyIn {
    #[serde(default)]
    pub difficulty: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LocatorIn {
    pub locator: String,
    #[serde(rename = "learningMode", default)]
    pub learning_mode: bool,
}

#[derive(Serialize)]
pub struct ScoreOut {
    pub score: u32,
}

#[derive(Serialize)]
pub struct HintOut {
    pub text: String,
}

#[derive(Serialize)]
pub struct ThemeOut {
    pub theme: Theme,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_messages_use_snake_case_tags() {
        let m: ClientWsMessage =
            serde_json::from_value(json!({"type": "submit_locator", "locator": "//a", "learningMode": true})).unwrap();
        assert!(matches!(m, ClientWsMessage::SubmitLocator { ref locator, learning_mode: true } if locator == "//a"));

        let m: ClientWsMessage = serde_json::from_value(json!({"type": "start_round"})).unwrap();
        assert!(matches!(m, ClientWsMessage::StartRound { difficulty: None }));

        assert!(serde_json::from_value::<ClientWsMessage>(json!({"type": "next_challenge"})).is_err());
    }

    #[test]
    fn server_messages_are_tagged() {
        let v = serde_json::to_value(ServerWsMessage::Score { score: 3 }).unwrap();
        assert_eq!(v, json!({"type": "score", "score": 3}));
        let v = serde_json::to_value(ServerWsMessage::Theme { theme: Theme::Dark }).unwrap();
        assert_eq!(v, json!({"type": "theme", "theme": "dark"}));
    }
}
