//! Per-player session: the active challenge, its page, the running score
//! and the feedback of the last action. Every operation takes `&mut self`;
//! nothing here is shared or global.

use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use serde::Serialize;
use tracing::{debug, info};

use crate::bank::ChallengeBank;
use crate::config::Messages;
use crate::domain::{Challenge, Difficulty, Theme};
use crate::hint::{generate_learning_hint, LearningHint};
use crate::locator::{self, LocatorKind, Verdict};
use crate::scene::{build_scene, Page};
use crate::util::{fill_template, trunc_for_log};

/// Where the session stands within the current round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
  ChallengeActive,
  Correct,
  Incorrect,
  HintShown,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitOutcome {
  pub verdict: Verdict,
  pub kind: LocatorKind,
  pub feedback: String,
  pub score: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub learning: Option<LearningHint>,
  /// Container markup after this submission, highlight included.
  pub scene_html: String,
}

#[derive(Debug)]
pub struct Session {
  pub id: String,
  pub difficulty: Difficulty,
  pub challenge: Challenge,
  pub score: u32,
  pub theme: Theme,
  pub phase: Phase,
  pub page: Page,
  pub feedback: String,
  pub hint_text: Option<String>,
  pub learning: Option<LearningHint>,
  distractors: usize,
  rng: StdRng,
  last_active: Instant,
}

impl Session {
  /// Creates the session and plays its first round.
  pub fn start(id: String, difficulty: Difficulty, bank: &ChallengeBank, distractors: usize, mut rng: StdRng) -> Self {
    let challenge = bank.select(difficulty, &mut rng);
    let mut session = Self {
      id,
      difficulty,
      challenge: challenge.clone(),
      score: 0,
      theme: Theme::default(),
      phase: Phase::ChallengeActive,
      page: Page::new(),
      feedback: String::new(),
      hint_text: None,
      learning: None,
      distractors,
      rng,
      last_active: Instant::now(),
    };
    session.begin(challenge);
    session
  }

  /// Picks a fresh challenge at `difficulty` and rebuilds the scene.
  pub fn start_round(&mut self, difficulty: Difficulty, bank: &ChallengeBank) -> &Challenge {
    self.difficulty = difficulty;
    let challenge = bank.select(difficulty, &mut self.rng);
    self.begin(challenge);
    &self.challenge
  }

  /// Same as `start_round` with the challenge chosen by the caller.
  pub fn start_round_with(&mut self, challenge: Challenge) {
    self.difficulty = challenge.difficulty;
    self.begin(challenge);
  }

  // Each round gets a fresh page so the arena never outgrows one scene.
  fn begin(&mut self, challenge: Challenge) {
    self.page = Page::new();
    let outcome = build_scene(&mut self.page, challenge.id, &mut self.rng, self.distractors);
    info!(
      target: "session",
      session = %self.id,
      challenge = challenge.id.key(),
      difficulty = challenge.difficulty.as_str(),
      target_node = outcome.target.0,
      arena = self.page.dom.arena_len(),
      "Round started"
    );
    self.challenge = challenge;
    self.phase = Phase::ChallengeActive;
    self.feedback.clear();
    self.hint_text = None;
    self.learning = None;
  }

  /// Judges `locator` against the active challenge. Invalid locators leave
  /// score and phase untouched.
  pub fn submit_locator(&mut self, locator: &str, learning_mode: bool, messages: &Messages) -> SubmitOutcome {
    let eval = locator::evaluate(&self.page.dom, &self.challenge, locator);
    let mut learning = None;

    match eval.verdict {
      Verdict::Correct => {
        self.score += 1;
        self.phase = Phase::Correct;
        self.feedback = messages.correct.clone();
      }
      Verdict::Incorrect => {
        self.phase = Phase::Incorrect;
        self.feedback = messages.incorrect.clone();
        if learning_mode {
          learning = generate_learning_hint(&mut self.page.dom, &self.challenge, &messages.learning);
          if learning.is_some() {
            self.phase = Phase::HintShown;
          }
        }
      }
      Verdict::Invalid => {
        self.feedback = messages.invalid.clone();
      }
    }
    self.learning = learning.clone();

    info!(
      target: "session",
      session = %self.id,
      challenge = self.challenge.id.key(),
      locator = %trunc_for_log(locator, 120),
      kind = ?eval.kind,
      verdict = ?eval.verdict,
      score = self.score,
      "Locator judged"
    );
    if let Some(e) = &eval.error {
      debug!(target: "session", session = %self.id, error = %e, "Locator rejected");
    }

    SubmitOutcome {
      verdict: eval.verdict,
      kind: eval.kind,
      feedback: self.feedback.clone(),
      score: self.score,
      error: eval.error.map(|e| e.to_string()),
      learning,
      scene_html: self.page.scene_html(),
    }
  }

  pub fn reset_score(&mut self) -> u32 {
    self.score = 0;
    self.feedback.clear();
    self.learning = None;
    debug!(target: "session", session = %self.id, "Score reset");
    self.score
  }

  /// Static hint text of the active challenge.
  pub fn reveal_hint(&mut self, messages: &Messages) -> String {
    let text = if self.challenge.hint.trim().is_empty() {
      messages.no_hint.clone()
    } else {
      fill_template(&messages.hint, &[("hint", &self.challenge.hint)])
    };
    self.hint_text = Some(text.clone());
    text
  }

  pub fn toggle_theme(&mut self) -> Theme {
    self.theme = self.theme.toggled();
    self.theme
  }

  pub fn scene_html(&self) -> String {
    self.page.scene_html()
  }

  /// Marks the session as used now.
  pub fn touch(&mut self) {
    self.last_active = Instant::now();
  }

  pub fn idle_for(&self) -> Duration {
    self.last_active.elapsed()
  }
}
