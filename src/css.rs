//! CSS selector engine over the synthetic document.
//!
//! Supports selector lists, the four combinators, type/universal/id/class
//! selectors, attribute selectors with every standard operator and the
//! structural pseudo-classes a locator exercise needs, plus the logical
//! `:not()`, `:is()`, `:where()` and `:has()`. Anything else is a parse
//! error, which callers surface as an invalid locator.

use std::collections::HashSet;

use crate::dom::{Dom, Element, NodeId};
use crate::locator::LocatorError;

type Result<T> = std::result::Result<T, LocatorError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrCondition {
    Exists { key: String },
    Eq { key: String, value: String },
    StartsWith { key: String, value: String },
    EndsWith { key: String, value: String },
    Contains { key: String, value: String },
    Includes { key: String, value: String },
    DashMatch { key: String, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PseudoClass {
    FirstChild,
    LastChild,
    OnlyChild,
    FirstOfType,
    LastOfType,
    OnlyOfType,
    Root,
    Empty,
    NthChild(Nth),
    NthLastChild(Nth),
    NthOfType(Nth),
    NthLastOfType(Nth),
    Not(Vec<Vec<SelectorPart>>),
    /// `:is()` and `:where()`; specificity plays no part in matching.
    Is(Vec<Vec<SelectorPart>>),
    /// Relative selectors; the subject is the element carrying `:has()`.
    Has(Vec<RelativeSelector>),
}

/// One argument of `:has()`: a chain anchored at the subject element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelativeSelector {
    pub anchor: Combinator,
    pub parts: Vec<SelectorPart>,
}

/// Deepest allowed nesting of `:not()`, `:is()`, `:where()` and `:has()`.
pub const MAX_NESTING: usize = 32;

/// `an+b`; `odd`, `even` and plain integers are normalized into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nth {
    pub a: i64,
    pub b: i64,
}

impl Nth {
    // Widened so that any `a` and `b` that parse as i64 stay exact.
    fn matches(&self, index: usize) -> bool {
        let (a, b, index) = (i128::from(self.a), i128::from(self.b), index as i128);
        if a == 0 {
            return index == b;
        }
        let diff = index - b;
        diff % a == 0 && diff / a >= 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectorStep {
    pub tag: Option<String>,
    pub universal: bool,
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrCondition>,
    pub pseudo_classes: Vec<PseudoClass>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
    AdjacentSibling,
    GeneralSibling,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorPart {
    pub step: SelectorStep,
    // Relation to the previous (left) part.
    pub combinator: Option<Combinator>,
}

fn unsupported(selector: &str) -> LocatorError {
    LocatorError::Css(format!("unsupported selector: {selector}"))
}

/// First element in document order matching `selector`.
pub fn query_selector(dom: &Dom, selector: &str) -> Result<Option<NodeId>> {
    Ok(query_selector_all(dom, selector)?.into_iter().next())
}

pub fn query_selector_all(dom: &Dom, selector: &str) -> Result<Vec<NodeId>> {
    let groups = parse_selector_groups(selector)?;
    let mut seen = HashSet::new();
    let mut matched = Vec::new();
    for candidate in dom.all_elements() {
        if groups
            .iter()
            .any(|steps| matches_selector_chain(dom, candidate, steps))
            && seen.insert(candidate)
        {
            matched.push(candidate);
        }
    }
    Ok(matched)
}

pub fn matches_selector(dom: &Dom, node_id: NodeId, selector: &str) -> Result<bool> {
    if !dom.is_element(node_id) {
        return Ok(false);
    }
    let groups = parse_selector_groups(selector)?;
    Ok(groups
        .iter()
        .any(|steps| matches_selector_chain(dom, node_id, steps)))
}

pub fn parse_selector_groups(selector: &str) -> Result<Vec<Vec<SelectorPart>>> {
    parse_groups_at(selector, 0)
}

fn parse_groups_at(selector: &str, depth: usize) -> Result<Vec<Vec<SelectorPart>>> {
    split_selector_groups(selector)?
        .iter()
        .map(|group| parse_selector_chain(group, depth))
        .collect()
}

fn parse_selector_chain(selector: &str, depth: usize) -> Result<Vec<SelectorPart>> {
    parse_chain_tokens(selector, tokenize_selector(selector.trim())?, depth)
}

/// `:has()` arguments may open with a combinator; a bare chain means
/// descendant.
fn parse_relative_selector(selector: &str, depth: usize) -> Result<RelativeSelector> {
    let mut tokens = tokenize_selector(selector.trim())?;
    let anchor = match tokens.first().map(String::as_str) {
        Some(">") => Some(Combinator::Child),
        Some("+") => Some(Combinator::AdjacentSibling),
        Some("~") => Some(Combinator::GeneralSibling),
        _ => None,
    };
    if anchor.is_some() {
        tokens.remove(0);
    }
    Ok(RelativeSelector {
        anchor: anchor.unwrap_or(Combinator::Descendant),
        parts: parse_chain_tokens(selector, tokens, depth)?,
    })
}

fn parse_chain_tokens(selector: &str, tokens: Vec<String>, depth: usize) -> Result<Vec<SelectorPart>> {
    let selector = selector.trim();
    if tokens.is_empty() {
        return Err(unsupported(selector));
    }

    let mut steps = Vec::new();
    let mut pending: Option<Combinator> = None;

    for token in tokens {
        let combinator = match token.as_str() {
            ">" => Some(Combinator::Child),
            "+" => Some(Combinator::AdjacentSibling),
            "~" => Some(Combinator::GeneralSibling),
            _ => None,
        };
        if let Some(combinator) = combinator {
            if pending.is_some() || steps.is_empty() {
                return Err(unsupported(selector));
            }
            pending = Some(combinator);
            continue;
        }

        let step = parse_selector_step(&token, depth)?;
        let combinator = if steps.is_empty() {
            None
        } else {
            Some(pending.take().unwrap_or(Combinator::Descendant))
        };
        steps.push(SelectorPart { step, combinator });
    }

    if steps.is_empty() || pending.is_some() {
        return Err(unsupported(selector));
    }
    Ok(steps)
}

/// Tracks bracket/paren depth and quotes while scanning a selector.
#[derive(Default)]
struct Nesting {
    bracket: usize,
    paren: usize,
    quote: Option<char>,
}

impl Nesting {
    /// Feeds one char; returns false on an unbalanced closer.
    fn feed(&mut self, ch: char) -> bool {
        if let Some(q) = self.quote {
            if ch == q {
                self.quote = None;
            }
            return true;
        }
        match ch {
            '\'' | '"' if self.bracket > 0 || self.paren > 0 => self.quote = Some(ch),
            '[' => self.bracket += 1,
            ']' => {
                if self.bracket == 0 {
                    return false;
                }
                self.bracket -= 1;
            }
            '(' => self.paren += 1,
            ')' => {
                if self.paren == 0 {
                    return false;
                }
                self.paren -= 1;
            }
            _ => {}
        }
        true
    }

    fn top_level(&self) -> bool {
        self.bracket == 0 && self.paren == 0 && self.quote.is_none()
    }

    fn balanced(&self) -> bool {
        self.top_level()
    }
}

fn split_selector_groups(selector: &str) -> Result<Vec<String>> {
    let mut groups = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();

    for ch in selector.chars() {
        if ch == ',' && nesting.top_level() {
            let trimmed = current.trim();
            if trimmed.is_empty() {
                return Err(unsupported(selector));
            }
            groups.push(trimmed.to_string());
            current.clear();
            continue;
        }
        if !nesting.feed(ch) {
            return Err(unsupported(selector));
        }
        current.push(ch);
    }

    if !nesting.balanced() {
        return Err(unsupported(selector));
    }
    let trimmed = current.trim();
    if trimmed.is_empty() {
        return Err(unsupported(selector));
    }
    groups.push(trimmed.to_string());
    Ok(groups)
}

fn tokenize_selector(selector: &str) -> Result<Vec<String>> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut nesting = Nesting::default();

    for ch in selector.chars() {
        let top = nesting.top_level();
        if top && matches!(ch, '>' | '+' | '~') {
            if !current.trim().is_empty() {
                tokens.push(current.trim().to_string());
            }
            current.clear();
            tokens.push(ch.to_string());
            continue;
        }
        if top && ch.is_whitespace() {
            if !current.trim().is_empty() {
                tokens.push(current.trim().to_string());
            }
            current.clear();
            continue;
        }
        if !nesting.feed(ch) {
            return Err(unsupported(selector));
        }
        current.push(ch);
    }

    if !nesting.balanced() {
        return Err(unsupported(selector));
    }
    if !current.trim().is_empty() {
        tokens.push(current.trim().to_string());
    }
    Ok(tokens)
}

fn parse_selector_step(part: &str, depth: usize) -> Result<SelectorStep> {
    let bytes = part.as_bytes();
    let mut i = 0usize;
    let mut step = SelectorStep::default();

    while i < bytes.len() {
        match bytes[i] {
            b'*' => {
                if step.universal || step.tag.is_some() || i != 0 {
                    return Err(unsupported(part));
                }
                step.universal = true;
                i += 1;
            }
            b'#' => {
                let Some((id, next)) = parse_ident(part, i + 1) else {
                    return Err(unsupported(part));
                };
                if step.id.replace(id).is_some() {
                    return Err(unsupported(part));
                }
                i = next;
            }
            b'.' => {
                let Some((class_name, next)) = parse_ident(part, i + 1) else {
                    return Err(unsupported(part));
                };
                step.classes.push(class_name);
                i = next;
            }
            b'[' => {
                let (attr, next) = parse_attr_condition(part, i)?;
                step.attrs.push(attr);
                i = next;
            }
            b':' => {
                let (pseudo, next) = parse_pseudo(part, i, depth)?;
                step.pseudo_classes.push(pseudo);
                i = next;
            }
            _ => {
                if i != 0 {
                    return Err(unsupported(part));
                }
                let Some((tag, next)) = parse_ident(part, i) else {
                    return Err(unsupported(part));
                };
                step.tag = Some(tag.to_ascii_lowercase());
                i = next;
            }
        }
    }
    Ok(step)
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'-' || b >= 0x80
}

fn parse_ident(src: &str, start: usize) -> Option<(String, usize)> {
    let bytes = src.as_bytes();
    if start >= bytes.len() || !is_ident_byte(bytes[start]) || bytes[start].is_ascii_digit() {
        return None;
    }
    let mut end = start + 1;
    while end < bytes.len() && is_ident_byte(bytes[end]) {
        end += 1;
    }
    Some((src.get(start..end)?.to_string(), end))
}

fn skip_ws(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && bytes[i].is_ascii_whitespace() {
        i += 1;
    }
    i
}

fn parse_attr_condition(src: &str, open_bracket: usize) -> Result<(AttrCondition, usize)> {
    let bytes = src.as_bytes();
    let mut i = skip_ws(bytes, open_bracket + 1);

    let key_start = i;
    while i < bytes.len() && (is_ident_byte(bytes[i]) || bytes[i] == b':') {
        i += 1;
    }
    if key_start == i {
        return Err(unsupported(src));
    }
    let key = src[key_start..i].to_ascii_lowercase();

    i = skip_ws(bytes, i);
    match bytes.get(i) {
        Some(b']') => return Ok((AttrCondition::Exists { key }, i + 1)),
        None => return Err(unsupported(src)),
        _ => {}
    }

    let (op, after_op) = match (bytes.get(i), bytes.get(i + 1)) {
        (Some(b'='), _) => ("=", i + 1),
        (Some(b'^'), Some(b'=')) => ("^=", i + 2),
        (Some(b'$'), Some(b'=')) => ("$=", i + 2),
        (Some(b'*'), Some(b'=')) => ("*=", i + 2),
        (Some(b'~'), Some(b'=')) => ("~=", i + 2),
        (Some(b'|'), Some(b'=')) => ("|=", i + 2),
        _ => return Err(unsupported(src)),
    };

    i = skip_ws(bytes, after_op);
    let (value, after_value) = parse_attr_value(src, i)?;
    i = skip_ws(bytes, after_value);
    if bytes.get(i) != Some(&b']') {
        return Err(unsupported(src));
    }

    let cond = match op {
        "=" => AttrCondition::Eq { key, value },
        "^=" => AttrCondition::StartsWith { key, value },
        "$=" => AttrCondition::EndsWith { key, value },
        "*=" => AttrCondition::Contains { key, value },
        "~=" => AttrCondition::Includes { key, value },
        _ => AttrCondition::DashMatch { key, value },
    };
    Ok((cond, i + 1))
}

fn parse_attr_value(src: &str, start: usize) -> Result<(String, usize)> {
    let bytes = src.as_bytes();
    match bytes.get(start) {
        Some(&quote) if quote == b'"' || quote == b'\'' => {
            let close = bytes[start + 1..]
                .iter()
                .position(|b| *b == quote)
                .ok_or_else(|| unsupported(src))?;
            let end = start + 1 + close;
            Ok((src[start + 1..end].to_string(), end + 1))
        }
        Some(_) => {
            let Some((value, next)) = parse_ident(src, start) else {
                return Err(unsupported(src));
            };
            Ok((value, next))
        }
        None => Err(unsupported(src)),
    }
}

fn parse_pseudo(src: &str, colon: usize, depth: usize) -> Result<(PseudoClass, usize)> {
    let bytes = src.as_bytes();
    let Some((name, next)) = parse_ident(src, colon + 1) else {
        return Err(unsupported(src));
    };
    let name = name.to_ascii_lowercase();

    let simple = match name.as_str() {
        "first-child" => Some(PseudoClass::FirstChild),
        "last-child" => Some(PseudoClass::LastChild),
        "only-child" => Some(PseudoClass::OnlyChild),
        "first-of-type" => Some(PseudoClass::FirstOfType),
        "last-of-type" => Some(PseudoClass::LastOfType),
        "only-of-type" => Some(PseudoClass::OnlyOfType),
        "root" => Some(PseudoClass::Root),
        "empty" => Some(PseudoClass::Empty),
        _ => None,
    };
    if let Some(pseudo) = simple {
        return Ok((pseudo, next));
    }

    if bytes.get(next) != Some(&b'(') {
        return Err(unsupported(src));
    }
    let close = matching_paren(bytes, next).ok_or_else(|| unsupported(src))?;
    let arg = src[next + 1..close].trim();

    let nested = || -> Result<usize> {
        if depth >= MAX_NESTING {
            return Err(LocatorError::Css(format!(
                "selector nested deeper than {MAX_NESTING} levels"
            )));
        }
        Ok(depth + 1)
    };
    let nth = || parse_nth(arg).ok_or_else(|| unsupported(src));

    let pseudo = match name.as_str() {
        "nth-child" => PseudoClass::NthChild(nth()?),
        "nth-last-child" => PseudoClass::NthLastChild(nth()?),
        "nth-of-type" => PseudoClass::NthOfType(nth()?),
        "nth-last-of-type" => PseudoClass::NthLastOfType(nth()?),
        "not" => PseudoClass::Not(parse_groups_at(arg, nested()?)?),
        "is" | "where" => PseudoClass::Is(parse_groups_at(arg, nested()?)?),
        "has" => {
            let depth = nested()?;
            PseudoClass::Has(
                split_selector_groups(arg)?
                    .iter()
                    .map(|group| parse_relative_selector(group, depth))
                    .collect::<Result<_>>()?,
            )
        }
        _ => return Err(unsupported(src)),
    };
    Ok((pseudo, close + 1))
}

/// Index of the `)` closing the paren at `open`; parens inside quoted
/// strings do not count.
fn matching_paren(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (offset, &b) in bytes[open..].iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        match b {
            b'\'' | b'"' => quote = Some(b),
            b'(' => depth += 1,
            b')' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_nth(arg: &str) -> Option<Nth> {
    let compact: String = arg
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    match compact.as_str() {
        "odd" => return Some(Nth { a: 2, b: 1 }),
        "even" => return Some(Nth { a: 2, b: 0 }),
        _ => {}
    }
    let Some(n_pos) = compact.find('n') else {
        let b = compact.parse::<i64>().ok()?;
        return Some(Nth { a: 0, b });
    };
    let a = match &compact[..n_pos] {
        "" | "+" => 1,
        "-" => -1,
        other => other.parse::<i64>().ok()?,
    };
    let rest = &compact[n_pos + 1..];
    let b = if rest.is_empty() {
        0
    } else {
        if !rest.starts_with('+') && !rest.starts_with('-') {
            return None;
        }
        rest.trim_start_matches('+').parse::<i64>().ok()?
    };
    Some(Nth { a, b })
}

fn matches_selector_chain(dom: &Dom, node_id: NodeId, steps: &[SelectorPart]) -> bool {
    let Some((last, rest)) = steps.split_last() else {
        return false;
    };
    if !matches_step(dom, node_id, &last.step) {
        return false;
    }
    let Some(combinator) = last.combinator else {
        return true;
    };

    // Backtracks over every candidate ancestor/sibling, not just the nearest.
    match combinator {
        Combinator::Child => dom
            .parent_element(node_id)
            .map(|p| matches_selector_chain(dom, p, rest))
            .unwrap_or(false),
        Combinator::Descendant => {
            let mut cursor = dom.parent_element(node_id);
            while let Some(parent) = cursor {
                if matches_selector_chain(dom, parent, rest) {
                    return true;
                }
                cursor = dom.parent_element(parent);
            }
            false
        }
        Combinator::AdjacentSibling => dom
            .previous_element_sibling(node_id)
            .map(|s| matches_selector_chain(dom, s, rest))
            .unwrap_or(false),
        Combinator::GeneralSibling => {
            let mut cursor = dom.previous_element_sibling(node_id);
            while let Some(sibling) = cursor {
                if matches_selector_chain(dom, sibling, rest) {
                    return true;
                }
                cursor = dom.previous_element_sibling(sibling);
            }
            false
        }
    }
}

fn attr_matches(element: &Element, cond: &AttrCondition) -> bool {
    match cond {
        AttrCondition::Exists { key } => element.attr(key).is_some(),
        AttrCondition::Eq { key, value } => element.attr(key) == Some(value.as_str()),
        AttrCondition::StartsWith { key, value } => element
            .attr(key)
            .map(|v| !value.is_empty() && v.starts_with(value.as_str()))
            .unwrap_or(false),
        AttrCondition::EndsWith { key, value } => element
            .attr(key)
            .map(|v| !value.is_empty() && v.ends_with(value.as_str()))
            .unwrap_or(false),
        AttrCondition::Contains { key, value } => element
            .attr(key)
            .map(|v| !value.is_empty() && v.contains(value.as_str()))
            .unwrap_or(false),
        AttrCondition::Includes { key, value } => element
            .attr(key)
            .map(|v| v.split_whitespace().any(|token| token == value))
            .unwrap_or(false),
        AttrCondition::DashMatch { key, value } => element
            .attr(key)
            .map(|v| v == value || v.starts_with(&format!("{value}-")))
            .unwrap_or(false),
    }
}

fn matches_step(dom: &Dom, node_id: NodeId, step: &SelectorStep) -> bool {
    let Some(element) = dom.element(node_id) else {
        return false;
    };

    if let Some(tag) = &step.tag {
        if !element.tag_name.eq_ignore_ascii_case(tag) {
            return false;
        }
    }
    if let Some(id) = &step.id {
        if element.attr("id") != Some(id.as_str()) {
            return false;
        }
    }
    if step.classes.iter().any(|c| !element.has_class(c)) {
        return false;
    }
    if !step.attrs.iter().all(|cond| attr_matches(element, cond)) {
        return false;
    }
    step.pseudo_classes
        .iter()
        .all(|pseudo| matches_pseudo(dom, node_id, element, pseudo))
}

fn matches_pseudo(dom: &Dom, node_id: NodeId, element: &Element, pseudo: &PseudoClass) -> bool {
    let siblings = dom
        .parent(node_id)
        .map(|p| dom.element_children(p))
        .unwrap_or_else(|| vec![node_id]);
    let same_type: Vec<NodeId> = siblings
        .iter()
        .copied()
        .filter(|s| dom.tag_name(*s) == Some(element.tag_name.as_str()))
        .collect();
    let index_in = |list: &[NodeId]| list.iter().position(|s| *s == node_id).map(|i| i + 1);

    match pseudo {
        PseudoClass::FirstChild => siblings.first() == Some(&node_id),
        PseudoClass::LastChild => siblings.last() == Some(&node_id),
        PseudoClass::OnlyChild => siblings.len() == 1,
        PseudoClass::FirstOfType => same_type.first() == Some(&node_id),
        PseudoClass::LastOfType => same_type.last() == Some(&node_id),
        PseudoClass::OnlyOfType => same_type.len() == 1,
        PseudoClass::Root => dom.parent(node_id) == Some(dom.root()),
        PseudoClass::Empty => dom.children(node_id).is_empty(),
        PseudoClass::NthChild(nth) => index_in(&siblings).map(|i| nth.matches(i)).unwrap_or(false),
        PseudoClass::NthLastChild(nth) => index_in(&siblings)
            .map(|i| nth.matches(siblings.len() + 1 - i))
            .unwrap_or(false),
        PseudoClass::NthOfType(nth) => index_in(&same_type).map(|i| nth.matches(i)).unwrap_or(false),
        PseudoClass::NthLastOfType(nth) => index_in(&same_type)
            .map(|i| nth.matches(same_type.len() + 1 - i))
            .unwrap_or(false),
        PseudoClass::Not(groups) => !groups
            .iter()
            .any(|steps| matches_selector_chain(dom, node_id, steps)),
        PseudoClass::Is(groups) => groups
            .iter()
            .any(|steps| matches_selector_chain(dom, node_id, steps)),
        PseudoClass::Has(relatives) => relatives
            .iter()
            .any(|relative| matches_relative(dom, node_id, relative)),
    }
}

/// Candidates for the first part of a relative selector, seen from `anchor`.
fn relative_candidates(dom: &Dom, anchor: NodeId, combinator: Combinator) -> Vec<NodeId> {
    match combinator {
        Combinator::Child => dom.element_children(anchor),
        Combinator::Descendant => dom
            .all_elements()
            .into_iter()
            .filter(|n| *n != anchor && dom.is_descendant_of(*n, anchor))
            .collect(),
        Combinator::AdjacentSibling => dom.next_element_sibling(anchor).into_iter().collect(),
        Combinator::GeneralSibling => {
            let mut out = Vec::new();
            let mut cursor = dom.next_element_sibling(anchor);
            while let Some(sibling) = cursor {
                out.push(sibling);
                cursor = dom.next_element_sibling(sibling);
            }
            out
        }
    }
}

/// True when some element matches `relative.parts` with its leftmost part
/// reached from `subject` through `relative.anchor`.
fn matches_relative(dom: &Dom, subject: NodeId, relative: &RelativeSelector) -> bool {
    let Some((first, _)) = relative.parts.split_first() else {
        return false;
    };
    let mut reachable: Vec<NodeId> = relative_candidates(dom, subject, relative.anchor)
        .into_iter()
        .filter(|n| matches_step(dom, *n, &first.step))
        .collect();
    for part in &relative.parts[1..] {
        let mut next = Vec::new();
        for from in &reachable {
            for candidate in relative_candidates(dom, *from, part.combinator.unwrap_or(Combinator::Descendant)) {
                if matches_step(dom, candidate, &part.step) && !next.contains(&candidate) {
                    next.push(candidate);
                }
            }
        }
        reachable = next;
    }
    !reachable.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::tests::sample;

    #[test]
    fn resolves_type_id_and_descendant_selectors() {
        let (dom, div, s1, s2, p) = sample();
        assert_eq!(query_selector(&dom, "#a").unwrap(), Some(div));
        assert_eq!(query_selector(&dom, "span").unwrap(), Some(s1));
        assert_eq!(query_selector_all(&dom, "div span").unwrap(), vec![s1, s2]);
        assert_eq!(query_selector(&dom, "body > p").unwrap(), Some(p));
        assert_eq!(query_selector(&dom, "body > span").unwrap(), None);
    }

    #[test]
    fn sibling_combinators_and_structural_pseudos() {
        let (dom, div, s1, s2, p) = sample();
        assert_eq!(query_selector(&dom, "span + span").unwrap(), Some(s2));
        assert_eq!(query_selector(&dom, "div ~ p").unwrap(), Some(p));
        assert_eq!(query_selector(&dom, "span:last-child").unwrap(), Some(s2));
        assert_eq!(query_selector(&dom, "span:nth-of-type(1)").unwrap(), Some(s1));
        assert_eq!(query_selector(&dom, "span:nth-child(2n)").unwrap(), Some(s2));
        assert_eq!(query_selector(&dom, "body > :first-child").unwrap(), Some(div));
        assert_eq!(query_selector(&dom, "span:not(:first-child)").unwrap(), Some(s2));
    }

    #[test]
    fn attribute_operators() {
        let mut dom = Dom::new();
        let root = dom.root();
        let el = dom.create_element("div");
        dom.set_attr(el, "class", "btn-primary box");
        dom.set_attr(el, "data-test-id", "login-box");
        dom.append_child(root, el);

        for sel in [
            "[data-test-id='login-box']",
            "[data-test-id=\"login-box\"]",
            "[data-test-id=login-box]",
            "div[class^='btn-']",
            "[class$=box]",
            "[class*='primary']",
            "[class~=box]",
            "[data-test-id|=login]",
            "[data-test-id]",
            ".btn-primary.box",
        ] {
            assert_eq!(query_selector(&dom, sel).unwrap(), Some(el), "{sel}");
        }
        assert_eq!(query_selector(&dom, "[class~=btn]").unwrap(), None);
    }

    #[test]
    fn selector_lists_follow_document_order() {
        let (dom, div, _, _, p) = sample();
        assert_eq!(query_selector_all(&dom, "p, #a").unwrap(), vec![div, p]);
    }

    #[test]
    fn malformed_selectors_are_rejected() {
        let (dom, _, _, _, _) = sample();
        for sel in [
            "",
            "div >",
            "> div",
            "[id=",
            ".",
            "#",
            "a:text('Click here')",
            "div,",
            "p)",
            "span:nth-child(x)",
            "div:has()",
            "div:is(>)",
            "div:has(> )",
        ] {
            assert!(
                matches!(query_selector(&dom, sel), Err(LocatorError::Css(_))),
                "{sel:?} should be invalid"
            );
        }
    }

    #[test]
    fn of_type_and_root_pseudos() {
        let (dom, div, s1, _, p) = sample();
        let body = dom.parent_element(div).unwrap();
        let html = dom.parent_element(body).unwrap();
        assert_eq!(query_selector(&dom, "div:nth-last-of-type(1)").unwrap(), Some(div));
        assert_eq!(query_selector(&dom, "span:nth-last-of-type(2)").unwrap(), Some(s1));
        assert_eq!(query_selector(&dom, "div:only-of-type").unwrap(), Some(div));
        assert_eq!(query_selector(&dom, "span:only-of-type").unwrap(), None);
        assert_eq!(query_selector_all(&dom, ":only-of-type").unwrap(), vec![html, body, div, p]);
        assert_eq!(query_selector(&dom, ":root").unwrap(), Some(html));
        assert_eq!(query_selector(&dom, ":root > body > p").unwrap(), Some(p));
    }

    #[test]
    fn logical_pseudos() {
        let (dom, div, s1, s2, p) = sample();
        let body = dom.parent_element(div).unwrap();
        assert_eq!(query_selector(&dom, "span:is(:last-child, #zzz)").unwrap(), Some(s2));
        assert_eq!(query_selector_all(&dom, ":where(p, #a)").unwrap(), vec![div, p]);
        assert_eq!(query_selector(&dom, "div:is(p)").unwrap(), None);
        assert_eq!(query_selector(&dom, "div:has(> span)").unwrap(), Some(div));
        assert_eq!(query_selector(&dom, "body:has(span + span)").unwrap(), Some(body));
        assert_eq!(query_selector(&dom, "body:has(> span)").unwrap(), None);
        assert_eq!(query_selector(&dom, "span:has(~ span)").unwrap(), Some(s1));
        assert_eq!(query_selector(&dom, "div:has(+ p)").unwrap(), Some(div));
        assert_eq!(query_selector(&dom, "p:has(span)").unwrap(), None);
        assert_eq!(query_selector(&dom, "span:not(:not(:first-child))").unwrap(), Some(s1));
    }

    #[test]
    fn quoted_parens_inside_pseudo_arguments() {
        let (mut dom, div, _, _, p) = sample();
        dom.set_attr(p, "title", ")");
        assert_eq!(query_selector(&dom, "body > :not([title=')'])").unwrap(), Some(div));
        assert_eq!(query_selector(&dom, "body > :is([title=')'])").unwrap(), Some(p));
        assert_eq!(query_selector(&dom, "body > :not([title=\"(\"])").unwrap(), Some(div));
    }

    #[test]
    fn extreme_nth_offsets_do_not_overflow() {
        let (dom, div, s1, s2, _) = sample();
        assert_eq!(query_selector(&dom, "div:nth-child(n-9223372036854775808)").unwrap(), Some(div));
        assert_eq!(query_selector(&dom, "span:nth-child(-n+9223372036854775807)").unwrap(), Some(s1));
        assert_eq!(query_selector(&dom, "span:nth-child(-1n-9223372036854775808)").unwrap(), None);
        assert_eq!(query_selector(&dom, "span:nth-child(9223372036854775807n+2)").unwrap(), Some(s2));
    }

    #[test]
    fn deep_logical_nesting_is_rejected() {
        let (dom, _, s1, _, _) = sample();
        for pseudo in [":not(", ":is(", ":has("] {
            let deep = format!("span{}span{}", pseudo.repeat(20_000), ")".repeat(20_000));
            assert!(matches!(query_selector(&dom, &deep), Err(LocatorError::Css(_))), "{pseudo}");
        }
        let shallow = format!("span{}:first-child{}", ":is(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(query_selector(&dom, &shallow).unwrap(), Some(s1));
    }

    #[test]
    fn matches_selector_on_single_node() {
        let (dom, div, s1, _, _) = sample();
        assert!(matches_selector(&dom, s1, "#a > span").unwrap());
        assert!(!matches_selector(&dom, div, "span").unwrap());
    }
}
