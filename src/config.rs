//! Loading trainer configuration (scene tuning, feedback messages, hint
//! overrides) from TOML.
//!
//! See `TrainerConfig` and `Messages` for expected schema.

use std::collections::HashMap;

use serde::Deserialize;
use tracing::{error, info};

use crate::domain::ChallengeId;
use crate::scene::DEFAULT_DISTRACTORS;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct TrainerConfig {
  #[serde(default)]
  pub scene: SceneCfg,
  #[serde(default)]
  pub messages: Messages,
  #[serde(default)]
  pub sessions: SessionsCfg,
  /// Replacement static hints keyed by challenge id (`second-button = "..."`).
  #[serde(default)]
  pub hints: HashMap<ChallengeId, String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SceneCfg {
  #[serde(default = "default_distractors")]
  pub distractors: usize,
  /// Fixed RNG seed; every session then replays the same sequence of scenes.
  #[serde(default)]
  pub seed: Option<u64>,
}

fn default_distractors() -> usize {
  DEFAULT_DISTRACTORS
}

impl Default for SceneCfg {
  fn default() -> Self {
    Self { distractors: DEFAULT_DISTRACTORS, seed: None }
  }
}

/// Session lifetime. Sessions untouched for `idle_timeout_secs` are dropped
/// by a sweep every `sweep_interval_secs`; a timeout of 0 keeps them forever.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct SessionsCfg {
  pub idle_timeout_secs: u64,
  pub sweep_interval_secs: u64,
}

impl Default for SessionsCfg {
  fn default() -> Self {
    Self { idle_timeout_secs: 30 * 60, sweep_interval_secs: 60 }
  }
}

/// User-facing feedback strings. `hint` takes `{hint}`; `learning` takes
/// `{tag}`, `{css}`, `{absolute}` and `{relative}` (already HTML-escaped).
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Messages {
  pub correct: String,
  pub incorrect: String,
  pub invalid: String,
  pub hint: String,
  pub no_hint: String,
  pub learning: String,
}

impl Default for Messages {
  fn default() -> Self {
    Self {
      correct: "✅ Correct!".into(),
      incorrect: "❌ Incorrect.".into(),
      invalid: "Invalid locator.".into(),
      hint: "💡 Hint: {hint}".into(),
      no_hint: "No hint available for this challenge.".into(),
      learning: "🧠 <strong>Learning Mode:</strong><br/>\
        ✔️ Correct element found: <code>&lt;{tag}&gt;</code><br/>\
        🔍 Example CSS: <code>{css}</code><br/>\
        🔍 Absolute XPath: <code>{absolute}</code><br/>\
        🔍 Relative XPath: <code>{relative}</code>"
        .into(),
    }
  }
}

/// Parses a TOML document into `TrainerConfig`.
pub fn parse_trainer_config(src: &str) -> Result<TrainerConfig, toml::de::Error> {
  toml::from_str::<TrainerConfig>(src)
}

/// Attempt to load `TrainerConfig` from TRAINER_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_trainer_config_from_env() -> Option<TrainerConfig> {
  let path = std::env::var("TRAINER_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_trainer_config(&s) {
      Ok(cfg) => {
        info!(target: "locator_trainer", %path, hints = cfg.hints.len(), "Loaded trainer config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "locator_trainer", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "locator_trainer", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn empty_document_yields_defaults() {
    let cfg = parse_trainer_config("").unwrap();
    assert_eq!(cfg.scene.distractors, DEFAULT_DISTRACTORS);
    assert_eq!(cfg.scene.seed, None);
    assert_eq!(cfg.messages.invalid, "Invalid locator.");
    assert_eq!(cfg.sessions.idle_timeout_secs, 1800);
    assert!(cfg.hints.is_empty());
  }

  #[test]
  fn partial_sections_keep_remaining_defaults() {
    let cfg = parse_trainer_config(
      r#"
        [scene]
        seed = 42

        [messages]
        correct = "Nice!"

        [sessions]
        idle_timeout_secs = 0

        [hints]
        second-button = "Count buttons from the top."
      "#,
    )
    .unwrap();
    assert_eq!(cfg.scene.distractors, DEFAULT_DISTRACTORS);
    assert_eq!(cfg.scene.seed, Some(42));
    assert_eq!(cfg.messages.correct, "Nice!");
    assert_eq!(cfg.sessions.idle_timeout_secs, 0);
    assert_eq!(cfg.sessions.sweep_interval_secs, 60);
    assert_eq!(cfg.messages.incorrect, "❌ Incorrect.");
    assert_eq!(cfg.hints.get(&ChallengeId::SecondButton).map(String::as_str), Some("Count buttons from the top."));
  }

  #[test]
  fn unknown_hint_ids_are_rejected() {
    assert!(parse_trainer_config("[hints]\nthird-button = \"nope\"\n").is_err());
  }

  #[test]
  fn learning_template_names_every_placeholder() {
    let tpl = Messages::default().learning;
    for key in ["{tag}", "{css}", "{absolute}", "{relative}"] {
      assert!(tpl.contains(key), "{key}");
    }
  }
}
