//! Arena-backed document model the locator engines run against.
//!
//! Nodes live in a flat `Vec` and refer to each other by `NodeId`. Detached
//! nodes stay in the arena; everything that walks the document starts at the
//! root, so they are simply unreachable.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone)]
pub enum NodeType {
    Document,
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub node_type: NodeType,
}

/// Element data. Tag names are stored lowercase; attributes keep insertion
/// order so serialization is stable.
#[derive(Debug, Clone)]
pub struct Element {
    pub tag_name: String,
    pub attrs: Vec<(String, String)>,
}

impl Element {
    pub fn new(tag_name: &str) -> Self {
        Self {
            tag_name: tag_name.to_ascii_lowercase(),
            attrs: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn set_attr(&mut self, name: &str, value: &str) {
        let name = name.to_ascii_lowercase();
        match self.attrs.iter_mut().find(|(key, _)| *key == name) {
            Some((_, existing)) => *existing = value.to_string(),
            None => self.attrs.push((name, value.to_string())),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.attr("id").filter(|id| !id.is_empty())
    }

    pub fn classes(&self) -> Vec<&str> {
        class_tokens(self.attr("class"))
    }

    pub fn has_class(&self, class_name: &str) -> bool {
        self.attr("class")
            .map(|classes| classes.split_whitespace().any(|c| c == class_name))
            .unwrap_or(false)
    }
}

pub fn class_tokens(class_attr: Option<&str>) -> Vec<&str> {
    class_attr
        .map(|value| value.split_whitespace().collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct Dom {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Dom {
    fn default() -> Self {
        Self::new()
    }
}

impl Dom {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                parent: None,
                children: Vec::new(),
                node_type: NodeType::Document,
            }],
            root: NodeId(0),
        }
    }

    /// Arena slots in use, attached or not.
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(node_id.0)
    }

    pub fn create_element(&mut self, tag_name: &str) -> NodeId {
        self.push_node(NodeType::Element(Element::new(tag_name)))
    }

    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeType::Text(text.to_string()))
    }

    fn push_node(&mut self, node_type: NodeType) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            parent: None,
            children: Vec::new(),
            node_type,
        });
        id
    }

    /// Moves `child` under `parent`, detaching it from any previous parent.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old_parent) = self.nodes[child.0].parent {
            self.nodes[old_parent.0].children.retain(|c| *c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn remove_children(&mut self, parent: NodeId) {
        let children = std::mem::take(&mut self.nodes[parent.0].children);
        for child in children {
            self.nodes[child.0].parent = None;
        }
    }

    /// Replaces all children with a single text node.
    pub fn set_text_content(&mut self, node_id: NodeId, text: &str) {
        self.remove_children(node_id);
        if !text.is_empty() {
            let text_node = self.create_text(text);
            self.append_child(node_id, text_node);
        }
    }

    pub fn element(&self, node_id: NodeId) -> Option<&Element> {
        match &self.nodes.get(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn element_mut(&mut self, node_id: NodeId) -> Option<&mut Element> {
        match &mut self.nodes.get_mut(node_id.0)?.node_type {
            NodeType::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_element(&self, node_id: NodeId) -> bool {
        self.element(node_id).is_some()
    }

    pub fn tag_name(&self, node_id: NodeId) -> Option<&str> {
        self.element(node_id).map(|e| e.tag_name.as_str())
    }

    pub fn attr(&self, node_id: NodeId, name: &str) -> Option<&str> {
        self.element(node_id)?.attr(name)
    }

    pub fn set_attr(&mut self, node_id: NodeId, name: &str, value: &str) {
        if let Some(element) = self.element_mut(node_id) {
            element.set_attr(name, value);
        }
    }

    pub fn has_class(&self, node_id: NodeId, class_name: &str) -> bool {
        self.element(node_id)
            .map(|e| e.has_class(class_name))
            .unwrap_or(false)
    }

    pub fn parent(&self, node_id: NodeId) -> Option<NodeId> {
        self.nodes.get(node_id.0)?.parent
    }

    pub fn parent_element(&self, node_id: NodeId) -> Option<NodeId> {
        self.parent(node_id).filter(|p| self.is_element(*p))
    }

    pub fn children(&self, node_id: NodeId) -> &[NodeId] {
        self.nodes
            .get(node_id.0)
            .map(|n| n.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn element_children(&self, node_id: NodeId) -> Vec<NodeId> {
        self.children(node_id)
            .iter()
            .copied()
            .filter(|c| self.is_element(*c))
            .collect()
    }

    pub fn previous_element_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == node_id)?;
        siblings[..pos]
            .iter()
            .rev()
            .copied()
            .find(|c| self.is_element(*c))
    }

    pub fn next_element_sibling(&self, node_id: NodeId) -> Option<NodeId> {
        let parent = self.parent(node_id)?;
        let siblings = self.children(parent);
        let pos = siblings.iter().position(|c| *c == node_id)?;
        siblings[pos + 1..]
            .iter()
            .copied()
            .find(|c| self.is_element(*c))
    }

    /// Concatenated text of every descendant text node.
    pub fn text_content(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node_id, &mut out);
        out
    }

    fn collect_text(&self, node_id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(node_id.0) else {
            return;
        };
        if let NodeType::Text(text) = &node.node_type {
            out.push_str(text);
        }
        for child in &node.children {
            self.collect_text(*child, out);
        }
    }

    /// Text of the direct text-node children only.
    pub fn own_text(&self, node_id: NodeId) -> String {
        self.children(node_id)
            .iter()
            .filter_map(|c| match &self.nodes[c.0].node_type {
                NodeType::Text(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every connected node (document, elements, text) in document order.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root];
        while let Some(node) = stack.pop() {
            out.push(node);
            for child in self.nodes[node.0].children.iter().rev() {
                stack.push(*child);
            }
        }
        out
    }

    /// Position of every connected node in document order.
    pub fn document_order(&self) -> HashMap<NodeId, usize> {
        self.preorder()
            .into_iter()
            .enumerate()
            .map(|(i, id)| (id, i))
            .collect()
    }

    pub fn all_elements(&self) -> Vec<NodeId> {
        self.preorder()
            .into_iter()
            .filter(|id| self.is_element(*id))
            .collect()
    }

    pub fn elements_by_tag(&self, tag_name: &str) -> Vec<NodeId> {
        self.all_elements()
            .into_iter()
            .filter(|id| {
                self.tag_name(*id)
                    .map(|t| t.eq_ignore_ascii_case(tag_name))
                    .unwrap_or(false)
            })
            .collect()
    }

    /// Nearest inclusive ancestor element satisfying `pred`.
    pub fn closest(&self, node_id: NodeId, pred: impl Fn(&Element) -> bool) -> Option<NodeId> {
        let mut cursor = Some(node_id);
        while let Some(current) = cursor {
            match self.element(current) {
                Some(element) if pred(element) => return Some(current),
                Some(_) => cursor = self.parent(current),
                None => return None,
            }
        }
        None
    }

    pub fn is_descendant_of(&self, node_id: NodeId, ancestor: NodeId) -> bool {
        let mut cursor = self.parent(node_id);
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.parent(current);
        }
        false
    }

    pub fn outer_html(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        self.serialize(node_id, &mut out);
        out
    }

    pub fn inner_html(&self, node_id: NodeId) -> String {
        let mut out = String::new();
        for child in self.children(node_id) {
            self.serialize(*child, &mut out);
        }
        out
    }

    fn serialize(&self, node_id: NodeId, out: &mut String) {
        let Some(node) = self.nodes.get(node_id.0) else {
            return;
        };
        match &node.node_type {
            NodeType::Document => {
                for child in &node.children {
                    self.serialize(*child, out);
                }
            }
            NodeType::Text(text) => out.push_str(&escape_html_text(text)),
            NodeType::Element(element) => {
                out.push('<');
                out.push_str(&element.tag_name);
                for (key, value) in &element.attrs {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape_html_attr(value));
                    out.push('"');
                }
                out.push('>');
                if is_void_element(&element.tag_name) {
                    return;
                }
                for child in &node.children {
                    self.serialize(*child, out);
                }
                out.push_str("</");
                out.push_str(&element.tag_name);
                out.push('>');
            }
        }
    }
}

pub fn is_void_element(tag_name: &str) -> bool {
    matches!(
        tag_name,
        "area" | "base" | "br" | "col" | "embed" | "hr" | "img" | "input" | "link" | "meta" | "source" | "track" | "wbr"
    )
}

pub fn escape_html_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn escape_html_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// html > body > [div#a > (span "one", span "two"), p "tail"]
    pub(crate) fn sample() -> (Dom, NodeId, NodeId, NodeId, NodeId) {
        let mut dom = Dom::new();
        let html = dom.create_element("html");
        let body = dom.create_element("body");
        let div = dom.create_element("DIV");
        dom.set_attr(div, "id", "a");
        let s1 = dom.create_element("span");
        dom.set_text_content(s1, "one");
        let s2 = dom.create_element("span");
        dom.set_text_content(s2, "two");
        let p = dom.create_element("p");
        dom.set_text_content(p, "tail");
        let root = dom.root();
        dom.append_child(root, html);
        dom.append_child(html, body);
        dom.append_child(body, div);
        dom.append_child(div, s1);
        dom.append_child(div, s2);
        dom.append_child(body, p);
        (dom, div, s1, s2, p)
    }

    #[test]
    fn tags_are_lowercased_and_text_collects_descendants() {
        let (dom, div, _, _, _) = sample();
        assert_eq!(dom.tag_name(div), Some("div"));
        assert_eq!(dom.text_content(div), "onetwo");
        assert_eq!(dom.own_text(div), "");
    }

    #[test]
    fn sibling_navigation_skips_text_nodes() {
        let (mut dom, div, s1, s2, _) = sample();
        let gap = dom.create_text("  ");
        dom.remove_children(div);
        dom.append_child(div, s1);
        dom.append_child(div, gap);
        dom.append_child(div, s2);
        assert_eq!(dom.previous_element_sibling(s2), Some(s1));
        assert_eq!(dom.next_element_sibling(s1), Some(s2));
        assert_eq!(dom.previous_element_sibling(s1), None);
    }

    #[test]
    fn elements_by_tag_follows_document_order() {
        let (dom, _, s1, s2, p) = sample();
        assert_eq!(dom.elements_by_tag("span"), vec![s1, s2]);
        assert_eq!(dom.elements_by_tag("P"), vec![p]);
        let order = dom.document_order();
        assert!(order[&s1] < order[&s2] && order[&s2] < order[&p]);
    }

    #[test]
    fn remove_children_disconnects_subtree() {
        let (mut dom, div, s1, _, _) = sample();
        dom.remove_children(div);
        assert!(!dom.all_elements().contains(&s1));
        assert_eq!(dom.parent(s1), None);
    }

    #[test]
    fn closest_walks_inclusive_ancestors() {
        let (dom, div, s1, _, p) = sample();
        assert_eq!(dom.closest(s1, |e| e.id() == Some("a")), Some(div));
        assert_eq!(dom.closest(p, |e| e.id() == Some("a")), None);
    }

    #[test]
    fn serializes_with_escaping_and_void_elements() {
        let mut dom = Dom::new();
        let div = dom.create_element("div");
        dom.set_attr(div, "title", "a\"b");
        let input = dom.create_element("input");
        dom.set_attr(input, "placeholder", "Email");
        let text = dom.create_text("1 < 2");
        dom.append_child(div, input);
        dom.append_child(div, text);
        assert_eq!(
            dom.outer_html(div),
            "<div title=\"a&quot;b\"><input placeholder=\"Email\">1 &lt; 2</div>"
        );
    }

    #[test]
    fn class_helpers_split_on_whitespace() {
        let mut element = Element::new("div");
        element.set_attr("class", " btn  active ");
        assert_eq!(element.classes(), vec!["btn", "active"]);
        assert!(element.has_class("active"));
        assert!(!element.has_class("btn-"));
    }
}
