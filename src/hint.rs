//! Learning mode: locate the element the active challenge wants and derive
//! example CSS / XPath locators for it.

use serde::Serialize;
use tracing::debug;

use crate::dom::{escape_html_text, Dom, NodeId};
use crate::domain::{Challenge, MARKER_ATTR};
use crate::util::{fill_template, normalize_space};

pub const HIGHLIGHT_STYLE: &str = "outline: 3px dashed orange";

/// Relative-XPath text candidates must be shorter than this (in chars).
const MAX_TEXT_LEN: usize = 50;

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningHint {
  #[serde(skip)]
  pub node: NodeId,
  pub tag: String,
  pub css: String,
  pub absolute_xpath: String,
  pub relative_xpath: String,
  /// The UI should bring the highlighted element into view.
  pub scroll_into_view: bool,
  pub html: String,
}

/// Finds the first element (document order) satisfying the challenge,
/// highlights it and renders the suggestion fragment with `template`.
/// Returns `None` when nothing on the page matches.
pub fn generate_learning_hint(dom: &mut Dom, challenge: &Challenge, template: &str) -> Option<LearningHint> {
  let node = {
    let view: &Dom = dom;
    view.all_elements().into_iter().find(|n| challenge.matches(view, *n))?
  };
  dom.set_attr(node, "style", HIGHLIGHT_STYLE);

  let tag = dom.tag_name(node)?.to_string();
  let css = css_suggestion(dom, node);
  let absolute = absolute_xpath(dom, node);
  let relative = relative_xpath(dom, node);
  let html = fill_template(
    template,
    &[
      ("tag", &escape_html_text(&tag)),
      ("css", &escape_html_text(&css)),
      ("absolute", &escape_html_text(&absolute)),
      ("relative", &escape_html_text(&relative)),
    ],
  );
  debug!(target: "challenge", id = challenge.id.key(), %css, %relative, "Learning hint generated");

  Some(LearningHint {
    node,
    tag,
    css,
    absolute_xpath: absolute,
    relative_xpath: relative,
    scroll_into_view: true,
    html,
  })
}

/// `#id`, else every class joined as `.a.b`, else the tag name.
pub fn css_suggestion(dom: &Dom, node: NodeId) -> String {
  let Some(el) = dom.element(node) else {
    return String::new();
  };
  if let Some(id) = el.id().filter(|id| !id.is_empty()) {
    return format!("#{id}");
  }
  let classes = el.classes();
  if classes.is_empty() {
    el.tag_name.clone()
  } else {
    format!(".{}", classes.join("."))
  }
}

/// `/html[1]/body[1]/...` with 1-based positions among same-tag siblings.
/// An element carrying an id short-circuits to `//*[@id="..."]`.
pub fn absolute_xpath(dom: &Dom, node: NodeId) -> String {
  if let Some(id) = dom.element(node).and_then(|e| e.id()).filter(|id| !id.is_empty()) {
    return format!("//*[@id={}]", xpath_literal_prefer_double(id));
  }

  let mut parts = Vec::new();
  let mut current = Some(node);
  while let Some(id) = current {
    let Some(tag) = dom.tag_name(id) else {
      break;
    };
    let mut index = 1;
    let mut sibling = dom.previous_element_sibling(id);
    while let Some(prev) = sibling {
      if dom.tag_name(prev) == Some(tag) {
        index += 1;
      }
      sibling = dom.previous_element_sibling(prev);
    }
    parts.push(format!("{tag}[{index}]"));
    current = dom.parent_element(id);
  }
  parts.reverse();
  format!("/{}", parts.join("/"))
}

/// Shortest readable XPath, tried in order: id, marker attribute, short
/// text, class list, name, then document-wide position.
pub fn relative_xpath(dom: &Dom, node: NodeId) -> String {
  let Some(el) = dom.element(node) else {
    return String::new();
  };
  let tag = el.tag_name.as_str();

  if let Some(id) = el.id().filter(|id| !id.is_empty()) {
    return format!("//*[@id={}]", xpath_literal(id));
  }
  if let Some(marker) = el.attr(MARKER_ATTR) {
    return format!("//*[@{MARKER_ATTR}={}]", xpath_literal(marker));
  }
  let text = normalize_space(&dom.text_content(node));
  if !text.is_empty() && text.chars().count() < MAX_TEXT_LEN {
    return format!("//{tag}[normalize-space(text())={}]", xpath_literal(&text));
  }
  let classes = el.classes();
  if !classes.is_empty() {
    return format!("//{tag}[contains(@class, {})]", xpath_literal(&classes.join(" ")));
  }
  if let Some(name) = el.attr("name").filter(|n| !n.is_empty()) {
    return format!("//{tag}[@name={}]", xpath_literal(name));
  }

  let index = dom
    .elements_by_tag(tag)
    .iter()
    .position(|n| *n == node)
    .map(|i| i + 1)
    .unwrap_or(1);
  format!("(//{tag})[{index}]")
}

/// Quotes `value` as an XPath 1.0 string literal, single quotes first.
/// Values holding both quote kinds become a `concat(...)` call.
pub fn xpath_literal(value: &str) -> String {
  if !value.contains('\'') {
    format!("'{value}'")
  } else if !value.contains('"') {
    format!("\"{value}\"")
  } else {
    concat_literal(value)
  }
}

fn xpath_literal_prefer_double(value: &str) -> String {
  if !value.contains('"') {
    format!("\"{value}\"")
  } else {
    xpath_literal(value)
  }
}

fn concat_literal(value: &str) -> String {
  let parts: Vec<String> = value
    .split('\'')
    .map(|chunk| format!("'{chunk}'"))
    .collect();
  format!("concat({})", parts.join(", \"'\", "))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::bank::ChallengeBank;
  use crate::domain::ChallengeId;
  use crate::locator::{self, Verdict};
  use crate::scene::{build_scene, Page, DEFAULT_DISTRACTORS};
  use crate::xpath::{self, XNode};
  use rand::rngs::StdRng;
  use rand::SeedableRng;

  const TEMPLATE: &str = "<code>&lt;{tag}&gt;</code> {css} | {absolute} | {relative}";

  fn element(dom: &mut Dom, parent: NodeId, tag: &str, attrs: &[(&str, &str)], text: Option<&str>) -> NodeId {
    let el = dom.create_element(tag);
    for (k, v) in attrs {
      dom.set_attr(el, k, v);
    }
    if let Some(t) = text {
      dom.set_text_content(el, t);
    }
    dom.append_child(parent, el);
    el
  }

  fn resolves_to(dom: &Dom, expr: &str, node: NodeId) {
    assert_eq!(xpath::select_first(dom, expr).unwrap(), Some(XNode::Node(node)), "{expr}");
  }

  #[test]
  fn id_wins_over_class_everywhere() {
    let mut dom = Dom::new();
    let root = dom.root();
    let el = element(&mut dom, root, "div", &[("id", "main"), ("class", "a b")], Some("Hi"));
    assert_eq!(css_suggestion(&dom, el), "#main");
    assert_eq!(relative_xpath(&dom, el), "//*[@id='main']");
    assert_eq!(absolute_xpath(&dom, el), "//*[@id=\"main\"]");
  }

  #[test]
  fn short_text_wins_over_class() {
    let mut dom = Dom::new();
    let root = dom.root();
    let el = element(&mut dom, root, "button", &[("class", "btn active")], Some("  Go   now "));
    assert_eq!(relative_xpath(&dom, el), "//button[normalize-space(text())='Go now']");
    assert_eq!(css_suggestion(&dom, el), ".btn.active");
    resolves_to(&dom, &relative_xpath(&dom, el), el);
  }

  #[test]
  fn long_text_falls_back_to_class_then_name_then_position() {
    let long = "x".repeat(60);
    let mut dom = Dom::new();
    let root = dom.root();
    let body = element(&mut dom, root, "body", &[], None);
    let classed = element(&mut dom, body, "p", &[("class", "lead wide")], Some(&long));
    let named = element(&mut dom, body, "input", &[("name", "q")], None);
    let _first = element(&mut dom, body, "input", &[], None);
    let bare = element(&mut dom, body, "input", &[], None);

    assert_eq!(relative_xpath(&dom, classed), "//p[contains(@class, 'lead wide')]");
    assert_eq!(relative_xpath(&dom, named), "//input[@name='q']");
    assert_eq!(relative_xpath(&dom, bare), "(//input)[3]");
    for n in [classed, named, bare] {
      resolves_to(&dom, &relative_xpath(&dom, n), n);
    }
  }

  #[test]
  fn absolute_path_counts_same_tag_siblings() {
    let mut dom = Dom::new();
    let root = dom.root();
    let html = element(&mut dom, root, "html", &[], None);
    let body = element(&mut dom, html, "body", &[], None);
    element(&mut dom, body, "div", &[], None);
    element(&mut dom, body, "p", &[], None);
    element(&mut dom, body, "div", &[], None);
    let third = element(&mut dom, body, "div", &[], None);
    assert_eq!(absolute_xpath(&dom, third), "/html[1]/body[1]/div[3]");
    resolves_to(&dom, &absolute_xpath(&dom, third), third);

    element(&mut dom, third, "span", &[], None);
    element(&mut dom, third, "div", &[], None);
    element(&mut dom, third, "div", &[], None);
    let nested = element(&mut dom, third, "div", &[], Some("deep"));
    assert_eq!(absolute_xpath(&dom, nested), "/html[1]/body[1]/div[3]/div[3]");
    resolves_to(&dom, &absolute_xpath(&dom, nested), nested);

    let leaf = element(&mut dom, nested, "span", &[], None);
    assert_eq!(absolute_xpath(&dom, leaf), "/html[1]/body[1]/div[3]/div[3]/span[1]");
  }

  #[test]
  fn literals_survive_both_quote_kinds() {
    assert_eq!(xpath_literal("plain"), "'plain'");
    assert_eq!(xpath_literal("it's"), "\"it's\"");
    assert_eq!(xpath_literal("say \"it's\""), "concat('say \"it', \"'\", 's\"')");

    let mut dom = Dom::new();
    let root = dom.root();
    let el = element(&mut dom, root, "span", &[], Some("say \"it's\""));
    resolves_to(&dom, &relative_xpath(&dom, el), el);
  }

  #[test]
  fn generated_locators_round_trip_for_every_challenge() {
    let bank = ChallengeBank::default();
    for seed in 0..8 {
      for id in ChallengeId::ALL {
        let challenge = bank.get(id).unwrap().clone();
        let mut page = Page::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let target = build_scene(&mut page, id, &mut rng, DEFAULT_DISTRACTORS).target;

        let hint = generate_learning_hint(&mut page.dom, &challenge, TEMPLATE).unwrap();
        assert_eq!(hint.node, target);
        assert_eq!(page.dom.attr(target, "style"), Some(HIGHLIGHT_STYLE));
        resolves_to(&page.dom, &hint.absolute_xpath, target);
        resolves_to(&page.dom, &hint.relative_xpath, target);
        let eval = locator::evaluate(&page.dom, &challenge, &hint.relative_xpath);
        assert_eq!(eval.verdict, Verdict::Correct, "{id:?}");
      }
    }
  }

  #[test]
  fn rendered_fragment_is_escaped() {
    let bank = ChallengeBank::default();
    let challenge = bank.get(ChallengeId::EmailInput).unwrap().clone();
    let mut page = Page::new();
    let mut rng = StdRng::seed_from_u64(3);
    build_scene(&mut page, ChallengeId::EmailInput, &mut rng, 2);
    let hint = generate_learning_hint(&mut page.dom, &challenge, TEMPLATE).unwrap();
    assert_eq!(hint.tag, "input");
    assert_eq!(hint.css, ".box.challenge-target");
    assert_eq!(hint.relative_xpath, "//*[@data-challenge-id='email-input']");
    assert!(hint.html.starts_with("<code>&lt;input&gt;</code> .box.challenge-target | /html[1]/body[1]/div[1]/input["));
    assert!(hint.html.ends_with("| //*[@data-challenge-id='email-input']"));
  }

  #[test]
  fn no_match_means_no_hint() {
    let bank = ChallengeBank::default();
    let challenge = bank.get(ChallengeId::LastDiv).unwrap().clone();
    let mut dom = Dom::new();
    let root = dom.root();
    element(&mut dom, root, "span", &[], Some("alone"));
    assert!(generate_learning_hint(&mut dom, &challenge, TEMPLATE).is_none());
  }
}
