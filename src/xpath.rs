//! XPath 1.0 subset evaluated against the synthetic document.
//!
//! Covers location paths with every axis except `namespace`, abbreviated
//! steps (`.`, `..`, `@`, `//`), predicates, filter expressions such as
//! `(//button)[2]`, unions, the boolean/relational/arithmetic operators and
//! the core string, number, boolean and node-set functions.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::dom::{Dom, NodeId, NodeType};
use crate::locator::LocatorError;
use crate::util::normalize_space;

type Result<T> = std::result::Result<T, LocatorError>;

fn xpath_error(msg: impl Into<String>) -> LocatorError {
    LocatorError::XPath(msg.into())
}

// ---------------------------------------------------------------------------
// Tokens

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    ColonColon,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Literal(String),
    Number(f64),
    Name(String),
}

fn is_name_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_'
}

fn is_name_char(ch: char) -> bool {
    ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.')
}

fn tokenize(src: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match ch {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
                continue;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
                continue;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::ColonColon);
                i += 2;
                continue;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Neq);
                i += 2;
                continue;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Le);
                i += 2;
                continue;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Ge);
                i += 2;
                continue;
            }
            '"' | '\'' => {
                let close = chars[i + 1..]
                    .iter()
                    .position(|c| *c == ch)
                    .ok_or_else(|| xpath_error("unterminated string literal"))?;
                let literal: String = chars[i + 1..i + 1 + close].iter().collect();
                tokens.push(Token::Literal(literal));
                i += close + 2;
                continue;
            }
            c if c.is_ascii_digit() || (c == '.' && next.map(|n| n.is_ascii_digit()).unwrap_or(false)) => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| xpath_error(format!("bad number literal: {text}")))?;
                tokens.push(Token::Number(value));
                continue;
            }
            c if is_name_start(c) => {
                let start = i;
                while i < chars.len() && is_name_char(chars[i]) {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
                continue;
            }
            _ => {}
        }

        let token = match ch {
            '/' => Token::Slash,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '@' => Token::At,
            ',' => Token::Comma,
            '|' => Token::Pipe,
            '.' => Token::Dot,
            '=' => Token::Eq,
            '<' => Token::Lt,
            '>' => Token::Gt,
            '+' => Token::Plus,
            '-' => Token::Minus,
            '*' => Token::Star,
            other => return Err(xpath_error(format!("unexpected character '{other}'"))),
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Syntax tree

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    FollowingSibling,
    PrecedingSibling,
    Following,
    Preceding,
    Attribute,
    SelfAxis,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Self::Child,
            "descendant" => Self::Descendant,
            "descendant-or-self" => Self::DescendantOrSelf,
            "parent" => Self::Parent,
            "ancestor" => Self::Ancestor,
            "ancestor-or-self" => Self::AncestorOrSelf,
            "following-sibling" => Self::FollowingSibling,
            "preceding-sibling" => Self::PrecedingSibling,
            "following" => Self::Following,
            "preceding" => Self::Preceding,
            "attribute" => Self::Attribute,
            "self" => Self::SelfAxis,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
enum NodeTest {
    Name(String),
    Any,
    Text,
    Node,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

impl Step {
    fn descendant_or_self() -> Self {
        Self {
            axis: Axis::DescendantOrSelf,
            test: NodeTest::Node,
            predicates: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
    Union(Box<Expr>, Box<Expr>),
    Path { absolute: bool, steps: Vec<Step> },
    Filter {
        primary: Box<Expr>,
        predicates: Vec<Expr>,
        steps: Vec<Step>,
    },
    Literal(String),
    Number(f64),
    Call(String, Vec<Expr>),
}

// ---------------------------------------------------------------------------
// Parser

/// Deepest allowed nesting of parenthesized expressions, predicates and
/// function arguments.
pub const MAX_NESTING: usize = 64;

/// Most binary operators and unary minus signs one expression may hold.
/// Operator chains build left-deep trees, so this bounds their height.
pub const MAX_OPERATORS: usize = 256;

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, token: Token) -> Result<()> {
        match self.advance() {
            Some(t) if t == token => Ok(()),
            Some(t) => Err(xpath_error(format!("expected {token:?}, found {t:?}"))),
            None => Err(xpath_error(format!("expected {token:?}, found end of expression"))),
        }
    }

    fn peek_operator_name(&self, name: &str) -> bool {
        matches!(self.peek(), Some(Token::Name(n)) if n == name)
    }

    fn parse_expr(&mut self) -> Result<Expr> {
        if self.depth >= MAX_NESTING {
            return Err(xpath_error(format!("expression nested deeper than {MAX_NESTING} levels")));
        }
        self.depth += 1;
        let expr = self.parse_or()?;
        self.depth -= 1;
        Ok(expr)
    }

    fn count_operator(&mut self) -> Result<()> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(xpath_error(format!("expression has more than {MAX_OPERATORS} operators")));
        }
        Ok(())
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.peek_operator_name("or") {
            self.advance();
            self.count_operator()?;
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_equality()?;
        while self.peek_operator_name("and") {
            self.advance();
            self.count_operator()?;
            let right = self.parse_equality()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek() {
                Some(Token::Eq) => CmpOp::Eq,
                Some(Token::Neq) => CmpOp::Neq,
                _ => return Ok(left),
            };
            self.advance();
            self.count_operator()?;
            let right = self.parse_relational()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_relational(&mut self) -> Result<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek() {
                Some(Token::Lt) => CmpOp::Lt,
                Some(Token::Le) => CmpOp::Le,
                Some(Token::Gt) => CmpOp::Gt,
                Some(Token::Ge) => CmpOp::Ge,
                _ => return Ok(left),
            };
            self.advance();
            self.count_operator()?;
            let right = self.parse_additive()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => ArithOp::Add,
                Some(Token::Minus) => ArithOp::Sub,
                _ => return Ok(left),
            };
            self.advance();
            self.count_operator()?;
            let right = self.parse_multiplicative()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    // In operator position `*` is multiplication; elsewhere it is a name test.
    fn parse_multiplicative(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => ArithOp::Mul,
                Some(Token::Name(n)) if n == "div" => ArithOp::Div,
                Some(Token::Name(n)) if n == "mod" => ArithOp::Mod,
                _ => return Ok(left),
            };
            self.advance();
            self.count_operator()?;
            let right = self.parse_unary()?;
            left = Expr::Arith(op, Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        let mut negations = 0usize;
        while self.peek() == Some(&Token::Minus) {
            self.advance();
            self.count_operator()?;
            negations += 1;
        }
        let mut expr = self.parse_union()?;
        for _ in 0..negations {
            expr = Expr::Negate(Box::new(expr));
        }
        Ok(expr)
    }

    fn parse_union(&mut self) -> Result<Expr> {
        let mut left = self.parse_path_expr()?;
        while self.peek() == Some(&Token::Pipe) {
            self.advance();
            self.count_operator()?;
            let right = self.parse_path_expr()?;
            left = Expr::Union(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn starts_function_call(&self) -> bool {
        match (self.peek(), self.peek_at(1)) {
            (Some(Token::Name(name)), Some(Token::LParen)) => !is_node_type_name(name),
            _ => false,
        }
    }

    fn parse_path_expr(&mut self) -> Result<Expr> {
        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                let steps = if self.starts_step() {
                    self.parse_relative_steps()?
                } else {
                    Vec::new()
                };
                Ok(Expr::Path { absolute: true, steps })
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                let mut steps = vec![Step::descendant_or_self()];
                steps.extend(self.parse_relative_steps()?);
                Ok(Expr::Path { absolute: true, steps })
            }
            Some(Token::LParen | Token::Literal(_) | Token::Number(_)) => self.parse_filter_expr(),
            Some(_) if self.starts_function_call() => self.parse_filter_expr(),
            Some(_) => Ok(Expr::Path {
                absolute: false,
                steps: self.parse_relative_steps()?,
            }),
            None => Err(xpath_error("unexpected end of expression")),
        }
    }

    fn parse_filter_expr(&mut self) -> Result<Expr> {
        let primary = self.parse_primary()?;
        let predicates = self.parse_predicates()?;
        let mut steps = Vec::new();
        match self.peek() {
            Some(Token::Slash) => {
                self.advance();
                steps = self.parse_relative_steps()?;
            }
            Some(Token::DoubleSlash) => {
                self.advance();
                steps.push(Step::descendant_or_self());
                steps.extend(self.parse_relative_steps()?);
            }
            _ => {}
        }
        if predicates.is_empty() && steps.is_empty() {
            return Ok(primary);
        }
        Ok(Expr::Filter {
            primary: Box::new(primary),
            predicates,
            steps,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.advance() {
            Some(Token::LParen) => {
                let inner = self.parse_expr()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Literal(s)) => Ok(Expr::Literal(s)),
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Name(name)) => {
                self.expect(Token::LParen)?;
                let mut args = Vec::new();
                if self.peek() != Some(&Token::RParen) {
                    args.push(self.parse_expr()?);
                    while self.peek() == Some(&Token::Comma) {
                        self.advance();
                        args.push(self.parse_expr()?);
                    }
                }
                self.expect(Token::RParen)?;
                check_function(&name, args.len())?;
                Ok(Expr::Call(name, args))
            }
            other => Err(xpath_error(format!("unexpected token {other:?}"))),
        }
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>> {
        let mut predicates = Vec::new();
        while self.peek() == Some(&Token::LBracket) {
            self.advance();
            predicates.push(self.parse_expr()?);
            self.expect(Token::RBracket)?;
        }
        Ok(predicates)
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::At | Token::Dot | Token::DotDot)
        )
    }

    fn parse_relative_steps(&mut self) -> Result<Vec<Step>> {
        let mut steps = vec![self.parse_step()?];
        loop {
            match self.peek() {
                Some(Token::Slash) => {
                    self.advance();
                    steps.push(self.parse_step()?);
                }
                Some(Token::DoubleSlash) => {
                    self.advance();
                    steps.push(Step::descendant_or_self());
                    steps.push(self.parse_step()?);
                }
                _ => return Ok(steps),
            }
        }
    }

    fn parse_step(&mut self) -> Result<Step> {
        match self.peek() {
            Some(Token::Dot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::SelfAxis,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            Some(Token::DotDot) => {
                self.advance();
                return Ok(Step {
                    axis: Axis::Parent,
                    test: NodeTest::Node,
                    predicates: Vec::new(),
                });
            }
            _ => {}
        }

        let axis = match (self.peek(), self.peek_at(1)) {
            (Some(Token::At), _) => {
                self.advance();
                Axis::Attribute
            }
            (Some(Token::Name(name)), Some(Token::ColonColon)) => {
                let axis = Axis::from_name(name)
                    .ok_or_else(|| xpath_error(format!("unknown axis: {name}")))?;
                self.advance();
                self.advance();
                axis
            }
            _ => Axis::Child,
        };

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) if is_node_type_name(&name) => {
                self.expect(Token::LParen)?;
                self.expect(Token::RParen)?;
                match name.as_str() {
                    "text" => NodeTest::Text,
                    "node" => NodeTest::Node,
                    other => return Err(xpath_error(format!("unsupported node type test: {other}()"))),
                }
            }
            Some(Token::Name(name)) => NodeTest::Name(name),
            other => return Err(xpath_error(format!("expected node test, found {other:?}"))),
        };

        let predicates = self.parse_predicates()?;
        Ok(Step { axis, test, predicates })
    }
}

/// Rejects unknown functions and bad arities at parse time.
fn check_function(name: &str, argc: usize) -> Result<()> {
    let (min, max) = match name {
        "last" | "position" | "true" | "false" => (0, 0),
        "count" | "not" | "boolean" => (1, 1),
        "string" | "normalize-space" | "string-length" | "number" | "name" | "local-name" => (0, 1),
        "contains" | "starts-with" | "substring-before" | "substring-after" => (2, 2),
        "translate" => (3, 3),
        "substring" => (2, 3),
        "sum" | "floor" | "ceiling" | "round" | "id" | "lang" => (1, 1),
        "concat" => (2, usize::MAX),
        other => return Err(xpath_error(format!("unknown function: {other}()"))),
    };
    if argc < min || argc > max {
        return Err(xpath_error(format!("wrong number of arguments to {name}()")));
    }
    Ok(())
}

fn is_node_type_name(name: &str) -> bool {
    matches!(name, "text" | "node" | "comment" | "processing-instruction")
}

fn parse(src: &str) -> Result<Expr> {
    let tokens = tokenize(src)?;
    if tokens.is_empty() {
        return Err(xpath_error("empty expression"));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
    };
    let expr = parser.parse_expr()?;
    if let Some(extra) = parser.peek() {
        return Err(xpath_error(format!("unexpected trailing token {extra:?}")));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluation

/// A node in the XPath data model: a document node or an attribute of an
/// element (owner plus index into its attribute list).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XNode {
    Node(NodeId),
    Attr(NodeId, usize),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nodes(Vec<XNode>),
    Str(String),
    Num(f64),
    Bool(bool),
}

struct Focus {
    node: XNode,
    position: usize,
    size: usize,
}

struct Evaluator<'a> {
    dom: &'a Dom,
    order: HashMap<NodeId, usize>,
}

impl<'a> Evaluator<'a> {
    fn new(dom: &'a Dom) -> Self {
        Self {
            dom,
            order: dom.document_order(),
        }
    }

    fn order_key(&self, node: &XNode) -> (usize, usize) {
        match node {
            XNode::Node(id) => (self.order.get(id).copied().unwrap_or(usize::MAX), 0),
            XNode::Attr(id, idx) => (self.order.get(id).copied().unwrap_or(usize::MAX), idx + 1),
        }
    }

    fn sort_document_order(&self, nodes: &mut Vec<XNode>) {
        nodes.sort_by_key(|n| self.order_key(n));
        nodes.dedup();
    }

    fn string_value(&self, node: &XNode) -> String {
        match node {
            XNode::Node(id) => match self.dom.node(*id).map(|n| &n.node_type) {
                Some(NodeType::Text(text)) => text.clone(),
                Some(_) => self.dom.text_content(*id),
                None => String::new(),
            },
            XNode::Attr(id, idx) => self
                .dom
                .element(*id)
                .and_then(|e| e.attrs.get(*idx))
                .map(|(_, v)| v.clone())
                .unwrap_or_default(),
        }
    }

    fn to_string(&self, value: &Value) -> String {
        match value {
            Value::Nodes(nodes) => nodes.first().map(|n| self.string_value(n)).unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => number_to_string(*n),
            Value::Bool(b) => b.to_string(),
        }
    }

    fn to_number(&self, value: &Value) -> f64 {
        match value {
            Value::Num(n) => *n,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            other => string_to_number(&self.to_string(other)),
        }
    }

    fn to_bool(value: &Value) -> bool {
        match value {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn eval(&self, expr: &Expr, focus: &Focus) -> Result<Value> {
        match expr {
            Expr::Or(l, r) => Ok(Value::Bool(
                Self::to_bool(&self.eval(l, focus)?) || Self::to_bool(&self.eval(r, focus)?),
            )),
            Expr::And(l, r) => Ok(Value::Bool(
                Self::to_bool(&self.eval(l, focus)?) && Self::to_bool(&self.eval(r, focus)?),
            )),
            Expr::Compare(op, l, r) => {
                let left = self.eval(l, focus)?;
                let right = self.eval(r, focus)?;
                Ok(Value::Bool(self.compare(*op, &left, &right)))
            }
            Expr::Arith(op, l, r) => {
                let a = self.to_number(&self.eval(l, focus)?);
                let b = self.to_number(&self.eval(r, focus)?);
                Ok(Value::Num(match op {
                    ArithOp::Add => a + b,
                    ArithOp::Sub => a - b,
                    ArithOp::Mul => a * b,
                    ArithOp::Div => a / b,
                    ArithOp::Mod => a % b,
                }))
            }
            Expr::Negate(inner) => Ok(Value::Num(-self.to_number(&self.eval(inner, focus)?))),
            Expr::Union(l, r) => {
                let mut nodes = self.eval_nodes(l, focus)?;
                nodes.extend(self.eval_nodes(r, focus)?);
                self.sort_document_order(&mut nodes);
                Ok(Value::Nodes(nodes))
            }
            Expr::Path { absolute, steps } => {
                let start = if *absolute {
                    XNode::Node(self.dom.root())
                } else {
                    focus.node
                };
                Ok(Value::Nodes(self.apply_steps(vec![start], steps)?))
            }
            Expr::Filter {
                primary,
                predicates,
                steps,
            } => {
                let mut nodes = self.eval_nodes(primary, focus)?;
                for predicate in predicates {
                    nodes = self.filter_by_predicate(nodes, predicate)?;
                }
                Ok(Value::Nodes(self.apply_steps(nodes, steps)?))
            }
            Expr::Literal(s) => Ok(Value::Str(s.clone())),
            Expr::Number(n) => Ok(Value::Num(*n)),
            Expr::Call(name, args) => self.call(name, args, focus),
        }
    }

    fn eval_nodes(&self, expr: &Expr, focus: &Focus) -> Result<Vec<XNode>> {
        match self.eval(expr, focus)? {
            Value::Nodes(nodes) => Ok(nodes),
            _ => Err(xpath_error("expression does not evaluate to a node-set")),
        }
    }

    fn apply_steps(&self, mut nodes: Vec<XNode>, steps: &[Step]) -> Result<Vec<XNode>> {
        for step in steps {
            let mut next = Vec::new();
            for node in &nodes {
                let candidates: Vec<XNode> = self
                    .axis_nodes(*node, step.axis)
                    .into_iter()
                    .filter(|n| self.node_test(n, &step.test, step.axis))
                    .collect();
                let mut selected = candidates;
                for predicate in &step.predicates {
                    selected = self.filter_by_predicate(selected, predicate)?;
                }
                next.extend(selected);
            }
            self.sort_document_order(&mut next);
            nodes = next;
        }
        Ok(nodes)
    }

    /// Positions follow the order of `nodes` (axis order for steps,
    /// document order for filter expressions).
    fn filter_by_predicate(&self, nodes: Vec<XNode>, predicate: &Expr) -> Result<Vec<XNode>> {
        let size = nodes.len();
        let mut kept = Vec::new();
        for (i, node) in nodes.into_iter().enumerate() {
            let focus = Focus {
                node,
                position: i + 1,
                size,
            };
            let keep = match self.eval(predicate, &focus)? {
                Value::Num(n) => n == (i + 1) as f64,
                other => Self::to_bool(&other),
            };
            if keep {
                kept.push(node);
            }
        }
        Ok(kept)
    }

    fn axis_nodes(&self, node: XNode, axis: Axis) -> Vec<XNode> {
        let dom = self.dom;
        let id = match node {
            XNode::Node(id) => id,
            XNode::Attr(owner, _) => {
                return match axis {
                    Axis::SelfAxis => vec![node],
                    Axis::Parent => vec![XNode::Node(owner)],
                    Axis::Ancestor | Axis::AncestorOrSelf => {
                        let mut out = Vec::new();
                        if axis == Axis::AncestorOrSelf {
                            out.push(node);
                        }
                        out.push(XNode::Node(owner));
                        out.extend(self.ancestors(owner).into_iter().map(XNode::Node));
                        out
                    }
                    _ => Vec::new(),
                };
            }
        };

        let wrap = |ids: Vec<NodeId>| ids.into_iter().map(XNode::Node).collect::<Vec<_>>();
        match axis {
            Axis::SelfAxis => vec![node],
            Axis::Child => wrap(dom.children(id).to_vec()),
            Axis::Descendant => wrap(self.descendants(id)),
            Axis::DescendantOrSelf => {
                let mut out = vec![id];
                out.extend(self.descendants(id));
                wrap(out)
            }
            Axis::Parent => wrap(dom.parent(id).into_iter().collect()),
            Axis::Ancestor => wrap(self.ancestors(id)),
            Axis::AncestorOrSelf => {
                let mut out = vec![id];
                out.extend(self.ancestors(id));
                wrap(out)
            }
            Axis::FollowingSibling | Axis::PrecedingSibling => {
                let Some(parent) = dom.parent(id) else {
                    return Vec::new();
                };
                let siblings = dom.children(parent);
                let Some(pos) = siblings.iter().position(|c| *c == id) else {
                    return Vec::new();
                };
                if axis == Axis::FollowingSibling {
                    wrap(siblings[pos + 1..].to_vec())
                } else {
                    wrap(siblings[..pos].iter().rev().copied().collect())
                }
            }
            Axis::Following => {
                let own = self.order.get(&id).copied().unwrap_or(usize::MAX);
                wrap(
                    dom.preorder()
                        .into_iter()
                        .filter(|n| self.order.get(n).copied().unwrap_or(0) > own)
                        .filter(|n| !dom.is_descendant_of(*n, id))
                        .collect(),
                )
            }
            Axis::Preceding => {
                let own = self.order.get(&id).copied().unwrap_or(0);
                let mut out: Vec<NodeId> = dom
                    .preorder()
                    .into_iter()
                    .filter(|n| self.order.get(n).copied().unwrap_or(usize::MAX) < own)
                    .filter(|n| !dom.is_descendant_of(id, *n))
                    .collect();
                out.reverse();
                wrap(out)
            }
            Axis::Attribute => dom
                .element(id)
                .map(|e| (0..e.attrs.len()).map(|i| XNode::Attr(id, i)).collect())
                .unwrap_or_default(),
        }
    }

    fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.dom.children(id).iter().rev().copied().collect();
        while let Some(node) = stack.pop() {
            out.push(node);
            stack.extend(self.dom.children(node).iter().rev().copied());
        }
        out
    }

    fn ancestors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut cursor = self.dom.parent(id);
        while let Some(parent) = cursor {
            out.push(parent);
            cursor = self.dom.parent(parent);
        }
        out
    }

    fn node_test(&self, node: &XNode, test: &NodeTest, axis: Axis) -> bool {
        match node {
            XNode::Attr(owner, idx) => {
                if axis != Axis::Attribute && !matches!(test, NodeTest::Node) {
                    return false;
                }
                let name = self
                    .dom
                    .element(*owner)
                    .and_then(|e| e.attrs.get(*idx))
                    .map(|(k, _)| k.as_str());
                match test {
                    NodeTest::Any | NodeTest::Node => name.is_some(),
                    NodeTest::Name(expected) => name.map(|n| n.eq_ignore_ascii_case(expected)).unwrap_or(false),
                    NodeTest::Text => false,
                }
            }
            XNode::Node(id) => {
                let node_type = self.dom.node(*id).map(|n| &n.node_type);
                match test {
                    NodeTest::Node => true,
                    NodeTest::Text => matches!(node_type, Some(NodeType::Text(_))),
                    NodeTest::Any => matches!(node_type, Some(NodeType::Element(_))),
                    NodeTest::Name(expected) => match node_type {
                        Some(NodeType::Element(e)) => e.tag_name.eq_ignore_ascii_case(expected),
                        _ => false,
                    },
                }
            }
        }
    }

    fn compare(&self, op: CmpOp, left: &Value, right: &Value) -> bool {
        match (left, right) {
            (Value::Nodes(a), Value::Nodes(b)) => a.iter().any(|x| {
                let sx = self.string_value(x);
                b.iter()
                    .any(|y| compare_atoms(op, &Value::Str(sx.clone()), &Value::Str(self.string_value(y)), self))
            }),
            (Value::Nodes(nodes), other) => match other {
                Value::Bool(_) => compare_atoms(op, &Value::Bool(!nodes.is_empty()), other, self),
                _ => nodes
                    .iter()
                    .any(|n| compare_atoms(op, &Value::Str(self.string_value(n)), other, self)),
            },
            (other, Value::Nodes(nodes)) => match other {
                Value::Bool(_) => compare_atoms(op, other, &Value::Bool(!nodes.is_empty()), self),
                _ => nodes
                    .iter()
                    .any(|n| compare_atoms(op, other, &Value::Str(self.string_value(n)), self)),
            },
            _ => compare_atoms(op, left, right, self),
        }
    }

    fn call(&self, name: &str, args: &[Expr], focus: &Focus) -> Result<Value> {
        let string_arg = |i: usize| -> Result<String> {
            match args.get(i) {
                Some(expr) => Ok(self.to_string(&self.eval(expr, focus)?)),
                None => Ok(self.string_value(&focus.node)),
            }
        };

        match name {
            "last" => Ok(Value::Num(focus.size as f64)),
            "position" => Ok(Value::Num(focus.position as f64)),
            "count" => Ok(Value::Num(self.eval_nodes(&args[0], focus)?.len() as f64)),
            "string" => Ok(Value::Str(string_arg(0)?)),
            "concat" => {
                let mut out = String::new();
                for i in 0..args.len() {
                    out.push_str(&string_arg(i)?);
                }
                Ok(Value::Str(out))
            }
            "contains" => Ok(Value::Bool(string_arg(0)?.contains(&string_arg(1)?))),
            "starts-with" => Ok(Value::Bool(string_arg(0)?.starts_with(&string_arg(1)?))),
            "substring-before" | "substring-after" => {
                let haystack = string_arg(0)?;
                let needle = string_arg(1)?;
                let out = match haystack.find(&needle) {
                    Some(pos) if name == "substring-before" => haystack[..pos].to_string(),
                    Some(pos) => haystack[pos + needle.len()..].to_string(),
                    None => String::new(),
                };
                Ok(Value::Str(out))
            }
            "substring" => {
                let source = string_arg(0)?;
                let start = xpath_round(self.to_number(&self.eval(&args[1], focus)?));
                let end = match args.get(2) {
                    Some(expr) => start + xpath_round(self.to_number(&self.eval(expr, focus)?)),
                    None => f64::INFINITY,
                };
                // Positions are 1-based; NaN bounds select nothing.
                let out = source
                    .chars()
                    .enumerate()
                    .filter(|(i, _)| {
                        let pos = (*i + 1) as f64;
                        pos >= start && pos < end
                    })
                    .map(|(_, c)| c)
                    .collect();
                Ok(Value::Str(out))
            }
            "normalize-space" => Ok(Value::Str(normalize_space(&string_arg(0)?))),
            "string-length" => Ok(Value::Num(string_arg(0)?.chars().count() as f64)),
            "translate" => {
                let source = string_arg(0)?;
                let from: Vec<char> = string_arg(1)?.chars().collect();
                let to: Vec<char> = string_arg(2)?.chars().collect();
                let out = source
                    .chars()
                    .filter_map(|c| match from.iter().position(|f| *f == c) {
                        Some(i) => to.get(i).copied(),
                        None => Some(c),
                    })
                    .collect();
                Ok(Value::Str(out))
            }
            "sum" => {
                let nodes = self.eval_nodes(&args[0], focus)?;
                Ok(Value::Num(
                    nodes.iter().map(|n| string_to_number(&self.string_value(n))).sum(),
                ))
            }
            "floor" => Ok(Value::Num(self.to_number(&self.eval(&args[0], focus)?).floor())),
            "ceiling" => Ok(Value::Num(self.to_number(&self.eval(&args[0], focus)?).ceil())),
            "round" => Ok(Value::Num(xpath_round(self.to_number(&self.eval(&args[0], focus)?)))),
            "id" => {
                let wanted: Vec<String> = match self.eval(&args[0], focus)? {
                    Value::Nodes(nodes) => nodes
                        .iter()
                        .flat_map(|n| {
                            self.string_value(n)
                                .split_whitespace()
                                .map(str::to_string)
                                .collect::<Vec<_>>()
                        })
                        .collect(),
                    other => self.to_string(&other).split_whitespace().map(str::to_string).collect(),
                };
                let nodes = self
                    .dom
                    .all_elements()
                    .into_iter()
                    .filter(|el| {
                        self.dom
                            .attr(*el, "id")
                            .map(|id| wanted.iter().any(|w| w == id))
                            .unwrap_or(false)
                    })
                    .map(XNode::Node)
                    .collect();
                Ok(Value::Nodes(nodes))
            }
            "lang" => {
                let wanted = string_arg(0)?.to_ascii_lowercase();
                let start = match focus.node {
                    XNode::Node(id) | XNode::Attr(id, _) => id,
                };
                let declared = std::iter::once(start)
                    .chain(self.ancestors(start))
                    .find_map(|id| {
                        let el = self.dom.element(id)?;
                        el.attr("xml:lang").or_else(|| el.attr("lang"))
                    })
                    .map(str::to_ascii_lowercase);
                Ok(Value::Bool(match declared {
                    Some(lang) => lang == wanted || lang.starts_with(&format!("{wanted}-")),
                    None => false,
                }))
            }
            "not" => Ok(Value::Bool(!Self::to_bool(&self.eval(&args[0], focus)?))),
            "boolean" => Ok(Value::Bool(Self::to_bool(&self.eval(&args[0], focus)?))),
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            "number" => match args.first() {
                Some(expr) => Ok(Value::Num(self.to_number(&self.eval(expr, focus)?))),
                None => Ok(Value::Num(string_to_number(&self.string_value(&focus.node)))),
            },
            "name" | "local-name" => {
                let target = match args.first() {
                    Some(expr) => self.eval_nodes(expr, focus)?.first().copied(),
                    None => Some(focus.node),
                };
                Ok(Value::Str(target.map(|n| self.node_name(&n)).unwrap_or_default()))
            }
            other => Err(xpath_error(format!("unknown function: {other}()"))),
        }
    }

    fn node_name(&self, node: &XNode) -> String {
        match node {
            XNode::Node(id) => self.dom.tag_name(*id).unwrap_or_default().to_string(),
            XNode::Attr(id, idx) => self
                .dom
                .element(*id)
                .and_then(|e| e.attrs.get(*idx))
                .map(|(k, _)| k.clone())
                .unwrap_or_default(),
        }
    }
}

fn compare_atoms(op: CmpOp, left: &Value, right: &Value, ev: &Evaluator<'_>) -> bool {
    match op {
        CmpOp::Eq | CmpOp::Neq => {
            let equal = match (left, right) {
                (Value::Bool(_), _) | (_, Value::Bool(_)) => {
                    Evaluator::to_bool(left) == Evaluator::to_bool(right)
                }
                (Value::Num(_), _) | (_, Value::Num(_)) => ev.to_number(left) == ev.to_number(right),
                _ => ev.to_string(left) == ev.to_string(right),
            };
            if op == CmpOp::Eq {
                equal
            } else {
                !equal
            }
        }
        _ => {
            let ordering = ev.to_number(left).partial_cmp(&ev.to_number(right));
            match (op, ordering) {
                (_, None) => false,
                (CmpOp::Lt, Some(o)) => o == Ordering::Less,
                (CmpOp::Le, Some(o)) => o != Ordering::Greater,
                (CmpOp::Gt, Some(o)) => o == Ordering::Greater,
                (_, Some(o)) => o != Ordering::Less,
            }
        }
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim();
    let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
    let well_formed = !digits.is_empty()
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.chars().filter(|c| *c == '.').count() <= 1
        && digits != ".";
    if well_formed {
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
    } else {
        f64::NAN
    }
}

/// `round()` semantics: halves go toward positive infinity.
fn xpath_round(n: f64) -> f64 {
    if n.is_nan() || n.is_infinite() {
        n
    } else {
        (n + 0.5).floor()
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Evaluates `expr` with the document node as context.
pub fn evaluate(dom: &Dom, expr: &str) -> Result<Value> {
    let ast = parse(expr)?;
    let evaluator = Evaluator::new(dom);
    let focus = Focus {
        node: XNode::Node(dom.root()),
        position: 1,
        size: 1,
    };
    let value = evaluator.eval(&ast, &focus)?;
    Ok(match value {
        Value::Nodes(mut nodes) => {
            evaluator.sort_document_order(&mut nodes);
            Value::Nodes(nodes)
        }
        other => other,
    })
}

/// Node-set result in document order; any other result type is an error.
pub fn select_all(dom: &Dom, expr: &str) -> Result<Vec<XNode>> {
    match evaluate(dom, expr)? {
        Value::Nodes(nodes) => Ok(nodes),
        _ => Err(xpath_error("the result is not a node-set")),
    }
}

/// First node in document order, like `FIRST_ORDERED_NODE_TYPE`.
pub fn select_first(dom: &Dom, expr: &str) -> Result<Option<XNode>> {
    Ok(select_all(dom, expr)?.into_iter().next())
}
