//! Built-in challenge bank and the random challenge selector.

use std::collections::HashMap;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, info};

use crate::domain::{Challenge, ChallengeId, Difficulty};

fn entry(id: ChallengeId, difficulty: Difficulty, text: &str, hint: &str) -> Challenge {
  Challenge { id, difficulty, text: text.into(), hint: hint.into() }
}

/// The static table, grouped by difficulty in presentation order.
pub fn builtin_challenges() -> Vec<Challenge> {
  use ChallengeId::*;
  use Difficulty::*;
  vec![
    entry(TargetElement, Easy,
      "Find the element with class 'target-element'",
      "Use a CSS selector like .target-element or //*[@class='target-element'] in XPath."),
    entry(ClickMeButton, Easy,
      "Find the button with text 'Click Me'",
      "Use XPath like //button[normalize-space()='Click Me'] or CSS like button."),
    entry(UsernameLabel, Easy,
      "Find the label with text 'Username'",
      "Try //label[text()='Username']"),
    entry(HelpfulSpan, Easy,
      "Find a span containing the word 'span'",
      "Try //span[contains(text(),'span')]"),
    entry(EmailInput, Easy,
      "Find an input with placeholder 'Email'",
      "Try //input[@placeholder='Email'] or input[placeholder='Email']"),
    entry(AnchorClick, Easy,
      "Find a link (anchor) with the text 'Click here'",
      "Try //a[text()='Click here'] or CSS a:text('Click here') if supported"),
    entry(DescriptionParagraph, Easy,
      "Find a paragraph with the word 'Description'",
      "Try //p[contains(text(),'Description')]"),
    entry(LoginBox, Easy,
      "Find a div with data-test-id='login-box'",
      "Try //*[@data-test-id='login-box'] or [data-test-id='login-box']"),
    entry(SecondButton, Medium,
      "Find the second button on the page",
      "Use (//button)[2] in XPath"),
    entry(ClassPrefixBtn, Medium,
      "Find an element with class starting with 'btn-'",
      "Try XPath //*[starts-with(@class, 'btn-')]"),
    entry(ContainsItem, Medium,
      "Find an element that contains the word 'Item'",
      "Try //*[contains(text(),'Item')]"),
    entry(LastDiv, Hard,
      "Find the last <div> on the page",
      "Try (//div)[last()]"),
    entry(ButtonInWrapper, Hard,
      "Find a button inside a div with class 'wrapper'",
      "Try //div[contains(@class,'wrapper')]//button"),
    entry(BtnActive, Hard,
      "Find an element that has both 'btn' and 'active' classes",
      "Use CSS .btn.active or XPath //*[@class='btn active']"),
  ]
}

/// Challenges indexed by difficulty, with configured hint overrides applied.
#[derive(Clone, Debug)]
pub struct ChallengeBank {
  by_diff: HashMap<Difficulty, Vec<Challenge>>,
}

impl ChallengeBank {
  pub fn new(hint_overrides: &HashMap<ChallengeId, String>) -> Self {
    let mut by_diff: HashMap<Difficulty, Vec<Challenge>> = HashMap::new();
    for mut c in builtin_challenges() {
      if let Some(hint) = hint_overrides.get(&c.id) {
        debug!(target: "challenge", id = c.id.key(), "Hint overridden by config");
        c.hint = hint.clone();
      }
      by_diff.entry(c.difficulty).or_default().push(c);
    }
    for diff in Difficulty::ALL {
      let count = by_diff.get(&diff).map(Vec::len).unwrap_or(0);
      info!(target: "challenge", difficulty = diff.as_str(), count, "Challenge bank inventory");
    }
    Self { by_diff }
  }

  pub fn challenges(&self, difficulty: Difficulty) -> &[Challenge] {
    self.by_diff.get(&difficulty).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn get(&self, id: ChallengeId) -> Option<&Challenge> {
    self.by_diff.values().flatten().find(|c| c.id == id)
  }

  /// Uniform pick within the difficulty's list. Every difficulty has
  /// entries; an empty list would be a bug in `builtin_challenges`.
  pub fn select<R: Rng + ?Sized>(&self, difficulty: Difficulty, rng: &mut R) -> Challenge {
    let list = self.challenges(difficulty);
    list
      .choose(rng)
      .or_else(|| self.challenges(Difficulty::Easy).first())
      .cloned()
      .unwrap_or_else(|| builtin_challenges().remove(0))
  }
}

impl Default for ChallengeBank {
  fn default() -> Self {
    Self::new(&HashMap::new())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::rngs::StdRng;
  use rand::SeedableRng;
  use std::collections::HashSet;

  #[test]
  fn every_difficulty_has_entries_and_ids_are_unique() {
    let bank = ChallengeBank::default();
    assert_eq!(bank.challenges(Difficulty::Easy).len(), 8);
    assert_eq!(bank.challenges(Difficulty::Medium).len(), 3);
    assert_eq!(bank.challenges(Difficulty::Hard).len(), 3);
    let ids: HashSet<_> = builtin_challenges().iter().map(|c| c.id).collect();
    assert_eq!(ids.len(), ChallengeId::ALL.len());
  }

  #[test]
  fn selection_stays_within_difficulty_and_covers_it() {
    let bank = ChallengeBank::default();
    let mut rng = StdRng::seed_from_u64(7);
    let mut seen = HashSet::new();
    for _ in 0..200 {
      let c = bank.select(Difficulty::Hard, &mut rng);
      assert_eq!(c.difficulty, Difficulty::Hard);
      seen.insert(c.id);
    }
    assert_eq!(seen.len(), 3);
  }

  #[test]
  fn hint_overrides_replace_builtin_text() {
    let mut overrides = HashMap::new();
    overrides.insert(ChallengeId::LastDiv, "Count from the end.".to_string());
    let bank = ChallengeBank::new(&overrides);
    assert_eq!(bank.get(ChallengeId::LastDiv).unwrap().hint, "Count from the end.");
    assert_eq!(bank.get(ChallengeId::SecondButton).unwrap().hint, "Use (//button)[2] in XPath");
  }
}
