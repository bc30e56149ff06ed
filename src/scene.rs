//! Practice page and the scene builder that fills its container with one
//! target element plus distractors.

use rand::Rng;
use tracing::debug;

use crate::dom::{Dom, NodeId};
use crate::domain::{ChallengeId, MARKER_ATTR};

pub const CONTAINER_ID: &str = "random-elements";
pub const DEFAULT_DISTRACTORS: usize = 5;

/// The synthetic page a session plays on:
/// `html > (head > title, body > (h1, div#random-elements))`.
/// The container is the last element of the body so nothing rendered after
/// it can steal document-order positions from the scene.
#[derive(Debug, Clone)]
pub struct Page {
  pub dom: Dom,
  pub container: NodeId,
}

impl Default for Page {
  fn default() -> Self {
    Self::new()
  }
}

impl Page {
  pub fn new() -> Self {
    let mut dom = Dom::new();
    let root = dom.root();
    let html = dom.create_element("html");
    let head = dom.create_element("head");
    let title = dom.create_element("title");
    dom.set_text_content(title, "Locator Practice");
    let body = dom.create_element("body");
    let heading = dom.create_element("h1");
    dom.set_text_content(heading, "Locator Practice");
    let container = dom.create_element("div");
    dom.set_attr(container, "id", CONTAINER_ID);

    dom.append_child(root, html);
    dom.append_child(html, head);
    dom.append_child(head, title);
    dom.append_child(html, body);
    dom.append_child(body, heading);
    dom.append_child(body, container);
    Self { dom, container }
  }

  /// Markup of the practice region only.
  pub fn scene_html(&self) -> String {
    self.dom.inner_html(self.container)
  }
}

struct Template {
  tag: &'static str,
  text: Option<&'static str>,
  placeholder: Option<&'static str>,
}

const DISTRACTORS: [Template; 7] = [
  Template { tag: "div", text: Some("Box One"), placeholder: None },
  Template { tag: "span", text: Some("Unrelated info"), placeholder: None },
  Template { tag: "label", text: Some("Other label"), placeholder: None },
  Template { tag: "input", text: None, placeholder: Some("Not email") },
  Template { tag: "button", text: Some("Press me"), placeholder: None },
  Template { tag: "a", text: Some("Visit here"), placeholder: None },
  Template { tag: "p", text: Some("Paragraph about nothing"), placeholder: None },
];

/// Where a constructed element goes relative to the distractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
  Random,
  Append,
}

struct Construction {
  elements: Vec<(NodeId, Placement)>,
  target: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneOutcome {
  pub target: NodeId,
}

fn make(dom: &mut Dom, tag: &str, class: &str, text: Option<&str>, attrs: &[(&str, &str)]) -> NodeId {
  let el = dom.create_element(tag);
  if !class.is_empty() {
    dom.set_attr(el, "class", class);
  }
  for (k, v) in attrs {
    dom.set_attr(el, k, v);
  }
  if let Some(text) = text {
    dom.set_text_content(el, text);
  }
  el
}

fn make_distractor(dom: &mut Dom, template: &Template) -> NodeId {
  let el = make(dom, template.tag, "box", template.text, &[]);
  if let Some(placeholder) = template.placeholder {
    dom.set_attr(el, "placeholder", placeholder);
    dom.set_attr(el, "type", "text");
  }
  el
}

fn marked(dom: &mut Dom, tag: &str, id: ChallengeId, text: Option<&str>, extra: &[(&str, &str)]) -> NodeId {
  let mut attrs = vec![(MARKER_ATTR, id.key())];
  attrs.extend_from_slice(extra);
  make(dom, tag, "box challenge-target", text, &attrs)
}

/// One construction rule per challenge.
fn construct(dom: &mut Dom, id: ChallengeId) -> Construction {
  use ChallengeId::*;
  use Placement::*;

  let single = |target: NodeId, placement: Placement| Construction {
    elements: vec![(target, placement)],
    target,
  };

  match id {
    TargetElement => {
      let el = make(dom, "div", "target-element box challenge-target", None, &[(MARKER_ATTR, id.key())]);
      single(el, Random)
    }
    ClickMeButton => single(marked(dom, "button", id, Some("Click Me"), &[]), Random),
    UsernameLabel => single(marked(dom, "label", id, Some("Username"), &[]), Random),
    HelpfulSpan => single(marked(dom, "span", id, Some("a helpful span of text"), &[]), Random),
    EmailInput => single(
      marked(dom, "input", id, None, &[("placeholder", "Email"), ("type", "text")]),
      Random,
    ),
    AnchorClick => single(marked(dom, "a", id, Some("Click here"), &[("href", "#")]), Random),
    DescriptionParagraph => single(
      marked(dom, "p", id, Some("This is a Description paragraph."), &[]),
      Random,
    ),
    LoginBox => single(
      make(dom, "div", "box challenge-target", Some("Login"), &[("data-test-id", "login-box")]),
      Random,
    ),
    SecondButton => {
      let first = make(dom, "button", "box", Some("First button"), &[]);
      let second = make(dom, "button", "box challenge-target", Some("Second button"), &[]);
      Construction { elements: vec![(first, Append), (second, Append)], target: second }
    }
    ClassPrefixBtn => single(make(dom, "div", "btn-primary box challenge-target", Some("Styled"), &[]), Append),
    ContainsItem => single(make(dom, "span", "box challenge-target", Some("Inventory Item #7"), &[]), Random),
    LastDiv => single(make(dom, "div", "box challenge-target", Some("Last box"), &[]), Append),
    ButtonInWrapper => {
      let wrapper = make(dom, "div", "wrapper box", None, &[]);
      let button = make(dom, "button", "challenge-target", Some("Wrapped"), &[]);
      dom.append_child(wrapper, button);
      Construction { elements: vec![(wrapper, Random)], target: button }
    }
    BtnActive => {
      let decoy = make(dom, "button", "btn box", Some("Inactive"), &[]);
      let target = make(dom, "button", "btn active", Some("Active"), &[]);
      Construction { elements: vec![(decoy, Random), (target, Random)], target }
    }
  }
}

/// Clears the container and mounts a fresh scene for `id`.
///
/// `second-button` draws no button distractors so the page holds exactly
/// two buttons.
pub fn build_scene<R: Rng + ?Sized>(page: &mut Page, id: ChallengeId, rng: &mut R, distractors: usize) -> SceneOutcome {
  let dom = &mut page.dom;
  dom.remove_children(page.container);

  let palette: Vec<&Template> = DISTRACTORS
    .iter()
    .filter(|t| !(id == ChallengeId::SecondButton && t.tag == "button"))
    .collect();

  let mut elements: Vec<NodeId> = (0..distractors)
    .map(|_| {
      let template = palette[rng.gen_range(0..palette.len())];
      make_distractor(dom, template)
    })
    .collect();

  let construction = construct(dom, id);
  for (el, placement) in &construction.elements {
    match placement {
      Placement::Random => {
        let at = rng.gen_range(0..=elements.len());
        elements.insert(at, *el);
      }
      Placement::Append => elements.push(*el),
    }
  }

  for el in &elements {
    dom.append_child(page.container, *el);
  }
  debug!(target: "challenge", id = id.key(), elements = elements.len(), "Scene built");
  SceneOutcome { target: construction.target }
}
