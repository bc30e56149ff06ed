//! Locator evaluation: classify a user string as CSS or XPath, resolve it
//! against the page and judge the resolved element against a challenge.

use std::error::Error as StdError;
use std::fmt;

use serde::Serialize;

use crate::css;
use crate::dom::{Dom, NodeId};
use crate::domain::Challenge;
use crate::xpath::{self, XNode};

/// The one recognized failure kind: the locator could not be parsed or
/// evaluated by its engine.
#[derive(Debug, Clone, PartialEq)]
pub enum LocatorError {
    Css(String),
    XPath(String),
}

impl fmt::Display for LocatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(msg) => write!(f, "invalid css selector: {msg}"),
            Self::XPath(msg) => write!(f, "invalid xpath expression: {msg}"),
        }
    }
}

impl StdError for LocatorError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocatorKind {
    Css,
    XPath,
}

/// Strings starting with `/` or `(` are XPath, everything else is CSS.
pub fn classify(locator: &str) -> LocatorKind {
    let trimmed = locator.trim_start();
    if trimmed.starts_with('/') || trimmed.starts_with('(') {
        LocatorKind::XPath
    } else {
        LocatorKind::Css
    }
}

/// Longest locator, in bytes after trimming, that either engine will parse.
pub const MAX_LOCATOR_LEN: usize = 2048;

/// Resolves `locator` to the first matching element in document order.
///
/// XPath results whose first node is not an element (text or attribute
/// nodes) resolve to `None` rather than an error.
pub fn resolve(dom: &Dom, locator: &str) -> Result<Option<NodeId>, LocatorError> {
    let locator = locator.trim();
    let kind = classify(locator);
    if locator.len() > MAX_LOCATOR_LEN {
        let msg = format!("locator longer than {MAX_LOCATOR_LEN} bytes");
        return Err(match kind {
            LocatorKind::Css => LocatorError::Css(msg),
            LocatorKind::XPath => LocatorError::XPath(msg),
        });
    }
    match kind {
        LocatorKind::XPath => Ok(match xpath::select_first(dom, locator)? {
            Some(XNode::Node(id)) if dom.is_element(id) => Some(id),
            _ => None,
        }),
        LocatorKind::Css => css::query_selector(dom, locator),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Correct,
    Incorrect,
    Invalid,
}

/// Resolution plus verdict for one submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub kind: LocatorKind,
    pub verdict: Verdict,
    pub resolved: Option<NodeId>,
    pub error: Option<LocatorError>,
}

pub fn evaluate(dom: &Dom, challenge: &Challenge, locator: &str) -> Evaluation {
    let kind = classify(locator);
    match resolve(dom, locator) {
        Ok(Some(node)) if challenge.matches(dom, node) => Evaluation {
            kind,
            verdict: Verdict::Correct,
            resolved: Some(node),
            error: None,
        },
        Ok(resolved) => Evaluation {
            kind,
            verdict: Verdict::Incorrect,
            resolved,
            error: None,
        },
        Err(e) => Evaluation {
            kind,
            verdict: Verdict::Invalid,
            resolved: None,
            error: Some(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bank::ChallengeBank;
    use crate::domain::{ChallengeId, Difficulty};
    use crate::scene::{build_scene, Page, DEFAULT_DISTRACTORS};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn scene_for(id: ChallengeId, seed: u64) -> (Page, Challenge, NodeId) {
        let bank = ChallengeBank::default();
        let challenge = bank.get(id).unwrap().clone();
        let mut page = Page::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let outcome = build_scene(&mut page, id, &mut rng, DEFAULT_DISTRACTORS);
        (page, challenge, outcome.target)
    }

    #[test]
    fn classification_by_leading_character() {
        assert_eq!(classify("//div"), LocatorKind::XPath);
        assert_eq!(classify("(//button)[2]"), LocatorKind::XPath);
        assert_eq!(classify("  /html"), LocatorKind::XPath);
        assert_eq!(classify(".target-element"), LocatorKind::Css);
        assert_eq!(classify("button"), LocatorKind::Css);
    }

    #[test]
    fn locators_taught_by_the_bank_hit_the_target() {
        let cases: &[(ChallengeId, &[&str])] = &[
            (
                ChallengeId::TargetElement,
                &[".target-element", "[data-challenge-id='target-element']", ":is(.target-element)", "*:where(.nope, .target-element)"],
            ),
            (ChallengeId::ClickMeButton, &["//button[normalize-space()='Click Me']"]),
            (ChallengeId::UsernameLabel, &["//label[text()='Username']"]),
            (ChallengeId::HelpfulSpan, &["//span[contains(text(),'span')]"]),
            (ChallengeId::EmailInput, &["//input[@placeholder='Email']", "input[placeholder='Email']"]),
            (ChallengeId::AnchorClick, &["//a[text()='Click here']"]),
            (ChallengeId::DescriptionParagraph, &["//p[contains(text(),'Description')]"]),
            (ChallengeId::LoginBox, &["//*[@data-test-id='login-box']", "[data-test-id='login-box']"]),
            (ChallengeId::SecondButton, &["(//button)[2]", "button ~ button"]),
            (
                ChallengeId::ClassPrefixBtn,
                &["//*[starts-with(@class, 'btn-')]", "[class^='btn-']", "//*[substring(@class,1,4)='btn-']"],
            ),
            (ChallengeId::ContainsItem, &["//*[contains(text(),'Item')]"]),
            (ChallengeId::LastDiv, &["(//div)[last()]"]),
            (
                ChallengeId::ButtonInWrapper,
                &["//div[contains(@class,'wrapper')]//button", ".wrapper button", "div:has(> button).wrapper > button"],
            ),
            (ChallengeId::BtnActive, &[".btn.active", "//*[@class='btn active']"]),
        ];
        for seed in 0..10 {
            for (id, locators) in cases {
                let (page, challenge, target) = scene_for(*id, seed);
                for locator in *locators {
                    let eval = evaluate(&page.dom, &challenge, locator);
                    assert_eq!(eval.verdict, Verdict::Correct, "{id:?} {locator}");
                    assert_eq!(eval.resolved, Some(target), "{id:?} {locator}");
                }
            }
        }
    }

    #[test]
    fn wrong_or_missing_elements_are_incorrect_not_errors() {
        let (page, challenge, _) = scene_for(ChallengeId::EmailInput, 4);
        let miss = evaluate(&page.dom, &challenge, "//input[@placeholder='Nope']");
        assert_eq!(miss.verdict, Verdict::Incorrect);
        assert_eq!(miss.resolved, None);
        let wrong = evaluate(&page.dom, &challenge, "h1");
        assert_eq!(wrong.verdict, Verdict::Incorrect);
        assert!(wrong.resolved.is_some());
    }

    #[test]
    fn malformed_locators_are_invalid_for_both_engines() {
        let (page, challenge, _) = scene_for(ChallengeId::AnchorClick, 2);
        let css = evaluate(&page.dom, &challenge, "a:text('Click here')");
        assert_eq!(css.verdict, Verdict::Invalid);
        assert!(matches!(css.error, Some(LocatorError::Css(_))));
        let xp = evaluate(&page.dom, &challenge, "//a[text()='Click here'");
        assert_eq!(xp.verdict, Verdict::Invalid);
        assert_eq!(xp.kind, LocatorKind::XPath);
    }

    #[test]
    fn oversized_and_deeply_nested_locators_are_invalid() {
        let (page, challenge, _) = scene_for(ChallengeId::TargetElement, 3);
        let nested = format!("{}//div{}", "(".repeat(20_000), ")".repeat(20_000));
        let eval = evaluate(&page.dom, &challenge, &nested);
        assert_eq!(eval.verdict, Verdict::Invalid);
        assert!(matches!(eval.error, Some(LocatorError::XPath(_))));

        let long_css = format!("div{}", " div".repeat(MAX_LOCATOR_LEN));
        let eval = evaluate(&page.dom, &challenge, &long_css);
        assert_eq!(eval.verdict, Verdict::Invalid);
        assert!(matches!(eval.error, Some(LocatorError::Css(_))));

        let not_chain = format!("{}div{}", ":not(".repeat(100), ")".repeat(100));
        assert_eq!(evaluate(&page.dom, &challenge, &not_chain).verdict, Verdict::Invalid);

        let padded = format!("{}.target-element", " ".repeat(MAX_LOCATOR_LEN));
        assert_eq!(evaluate(&page.dom, &challenge, &padded).verdict, Verdict::Correct);
    }

    #[test]
    fn text_node_results_do_not_count_as_elements() {
        let (page, challenge, _) = scene_for(ChallengeId::UsernameLabel, 0);
        let eval = evaluate(&page.dom, &challenge, "//label[text()='Username']/text()");
        assert_eq!(eval.verdict, Verdict::Incorrect);
        assert_eq!(eval.resolved, None);
    }

    #[test]
    fn every_easy_challenge_is_reachable_through_the_marker() {
        let bank = ChallengeBank::default();
        for c in bank.challenges(Difficulty::Easy) {
            if c.id == ChallengeId::LoginBox {
                continue;
            }
            let (page, challenge, target) = scene_for(c.id, 9);
            let locator = format!("//*[@data-challenge-id='{}']", c.id.key());
            let eval = evaluate(&page.dom, &challenge, &locator);
            assert_eq!(eval.resolved, Some(target));
            assert_eq!(eval.verdict, Verdict::Correct);
        }
    }
}
