//! Domain models: difficulty levels, challenge kinds with their predicates,
//! and the challenge itself.

use serde::{Deserialize, Serialize};

use crate::dom::{Dom, NodeId};

/// Attribute the scene builder uses to tag most challenge targets.
pub const MARKER_ATTR: &str = "data-challenge-id";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
  #[default]
  Easy,
  Medium,
  Hard,
}

impl Difficulty {
  pub const ALL: [Difficulty; 3] = [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard];

  /// Unrecognized input falls back to `Easy`.
  pub fn parse_or_default(s: &str) -> Self {
    match s.trim().to_ascii_lowercase().as_str() {
      "medium" => Difficulty::Medium,
      "hard" => Difficulty::Hard,
      _ => Difficulty::Easy,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

/// One variant per bank entry. The predicate of each challenge is `matches`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChallengeId {
  TargetElement,
  ClickMeButton,
  UsernameLabel,
  HelpfulSpan,
  EmailInput,
  AnchorClick,
  DescriptionParagraph,
  LoginBox,
  SecondButton,
  ClassPrefixBtn,
  ContainsItem,
  LastDiv,
  ButtonInWrapper,
  BtnActive,
}

impl ChallengeId {
  pub const ALL: [ChallengeId; 14] = [
    ChallengeId::TargetElement,
    ChallengeId::ClickMeButton,
    ChallengeId::UsernameLabel,
    ChallengeId::HelpfulSpan,
    ChallengeId::EmailInput,
    ChallengeId::AnchorClick,
    ChallengeId::DescriptionParagraph,
    ChallengeId::LoginBox,
    ChallengeId::SecondButton,
    ChallengeId::ClassPrefixBtn,
    ChallengeId::ContainsItem,
    ChallengeId::LastDiv,
    ChallengeId::ButtonInWrapper,
    ChallengeId::BtnActive,
  ];

  /// Kebab-case key, identical to the serde form and the marker value.
  pub fn key(&self) -> &'static str {
    match self {
      ChallengeId::TargetElement => "target-element",
      ChallengeId::ClickMeButton => "click-me-button",
      ChallengeId::UsernameLabel => "username-label",
      ChallengeId::HelpfulSpan => "helpful-span",
      ChallengeId::EmailInput => "email-input",
      ChallengeId::AnchorClick => "anchor-click",
      ChallengeId::DescriptionParagraph => "description-paragraph",
      ChallengeId::LoginBox => "login-box",
      ChallengeId::SecondButton => "second-button",
      ChallengeId::ClassPrefixBtn => "class-prefix-btn",
      ChallengeId::ContainsItem => "contains-item",
      ChallengeId::LastDiv => "last-div",
      ChallengeId::ButtonInWrapper => "button-in-wrapper",
      ChallengeId::BtnActive => "btn-active",
    }
  }

  /// Does `node` satisfy this challenge? Positional variants look at the
  /// whole document, the rest only at the node and its ancestors.
  pub fn matches(&self, dom: &Dom, node: NodeId) -> bool {
    let Some(element) = dom.element(node) else {
      return false;
    };
    let tag = element.tag_name.as_str();
    let marker = element.attr(MARKER_ATTR);

    match self {
      ChallengeId::TargetElement => {
        element.has_class("target-element") && marker == Some("target-element")
      }
      ChallengeId::ClickMeButton => tag == "button" && marker == Some("click-me-button"),
      ChallengeId::UsernameLabel => tag == "label" && marker == Some("username-label"),
      ChallengeId::HelpfulSpan => tag == "span" && marker == Some("helpful-span"),
      ChallengeId::EmailInput => tag == "input" && marker == Some("email-input"),
      ChallengeId::AnchorClick => tag == "a" && marker == Some("anchor-click"),
      ChallengeId::DescriptionParagraph => tag == "p" && marker == Some("description-paragraph"),
      ChallengeId::LoginBox => tag == "div" && element.attr("data-test-id") == Some("login-box"),
      ChallengeId::SecondButton => {
        tag == "button" && dom.elements_by_tag("button").get(1) == Some(&node)
      }
      ChallengeId::ClassPrefixBtn => element
        .attr("class")
        .map(|c| c.starts_with("btn-"))
        .unwrap_or(false),
      // Own text only; ancestors inherit descendant text and would all match.
      ChallengeId::ContainsItem => dom.own_text(node).contains("Item"),
      ChallengeId::LastDiv => tag == "div" && dom.elements_by_tag("div").last() == Some(&node),
      ChallengeId::ButtonInWrapper => {
        tag == "button" && dom.closest(node, |e| e.has_class("wrapper")).is_some()
      }
      ChallengeId::BtnActive => element.has_class("btn") && element.has_class("active"),
    }
  }
}

/// A bank entry: prompt shown to the user plus the static hint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
  pub id: ChallengeId,
  pub difficulty: Difficulty,
  pub text: String,
  pub hint: String,
}

impl Challenge {
  pub fn matches(&self, dom: &Dom, node: NodeId) -> bool {
    self.id.matches(dom, node)
  }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Theme {
  #[default]
  Light,
  Dark,
}

impl Theme {
  pub fn toggled(self) -> Self {
    match self {
      Theme::Light => Theme::Dark,
      Theme::Dark => Theme::Light,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn unknown_difficulty_defaults_to_easy() {
    assert_eq!(Difficulty::parse_or_default("hard"), Difficulty::Hard);
    assert_eq!(Difficulty::parse_or_default(" Medium "), Difficulty::Medium);
    assert_eq!(Difficulty::parse_or_default("nightmare"), Difficulty::Easy);
    assert_eq!(Difficulty::parse_or_default(""), Difficulty::Easy);
  }

  #[test]
  fn challenge_keys_match_serde_form() {
    for id in ChallengeId::ALL {
      let json = serde_json::to_string(&id).unwrap();
      assert_eq!(json, format!("\"{}\"", id.key()));
    }
  }

  #[test]
  fn contains_item_ignores_inherited_text() {
    let mut dom = Dom::new();
    let root = dom.root();
    let outer = dom.create_element("div");
    let inner = dom.create_element("span");
    dom.set_text_content(inner, "Item #7");
    dom.append_child(root, outer);
    dom.append_child(outer, inner);
    assert!(!ChallengeId::ContainsItem.matches(&dom, outer));
    assert!(ChallengeId::ContainsItem.matches(&dom, inner));
  }

  #[test]
  fn button_in_wrapper_checks_ancestors() {
    let mut dom = Dom::new();
    let root = dom.root();
    let wrapper = dom.create_element("div");
    dom.set_attr(wrapper, "class", "wrapper box");
    let inside = dom.create_element("button");
    let outside = dom.create_element("button");
    dom.append_child(root, wrapper);
    dom.append_child(wrapper, inside);
    dom.append_child(root, outside);
    assert!(ChallengeId::ButtonInWrapper.matches(&dom, inside));
    assert!(!ChallengeId::ButtonInWrapper.matches(&dom, outside));
    assert!(!ChallengeId::ButtonInWrapper.matches(&dom, wrapper));
  }

  #[test]
  fn theme_toggles_back_and_forth() {
    assert_eq!(Theme::Light.toggled(), Theme::Dark);
    assert_eq!(Theme::Light.toggled().toggled(), Theme::Light);
  }
}
