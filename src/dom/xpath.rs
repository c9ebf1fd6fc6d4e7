//! XPath 1.0 subset evaluated directly over a parsed `scraper` tree.
//!
//! Supported: absolute and relative location paths, `//`, `.`, `..`, `*`,
//! `@attr`, `text()`, `node()`, the common axes, predicates (positional and
//! boolean), comparisons, `and`/`or`, unions and a handful of core functions.
//! Results are always element nodes in document order.

use std::collections::{HashMap, HashSet};

use ego_tree::{NodeId, NodeRef};
use scraper::{ElementRef, Node};

#[derive(Debug, Clone, PartialEq)]
pub struct XPath {
    source: String,
    expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Path(LocationPath),
    Filter(Box<Expr>, Vec<Expr>),
    Union(Vec<Expr>),
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    Literal(String),
    Number(f64),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
struct LocationPath {
    absolute: bool,
    steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Expr>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
    DescendantOrSelf,
    Parent,
    Ancestor,
    AncestorOrSelf,
    Myself,
    FollowingSibling,
    PrecedingSibling,
    Attribute,
}

impl Axis {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "child" => Axis::Child,
            "descendant" => Axis::Descendant,
            "descendant-or-self" => Axis::DescendantOrSelf,
            "parent" => Axis::Parent,
            "ancestor" => Axis::Ancestor,
            "ancestor-or-self" => Axis::AncestorOrSelf,
            "self" => Axis::Myself,
            "following-sibling" => Axis::FollowingSibling,
            "preceding-sibling" => Axis::PrecedingSibling,
            "attribute" => Axis::Attribute,
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

impl XPath {
    pub fn parse(source: &str) -> Result<Self, String> {
        let tokens = tokenize(source)?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_expr()?;
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected token {token:?}"));
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Evaluates with `context` as the context node; absolute paths start
    /// at the document root regardless.
    pub fn select<'a>(&self, context: ElementRef<'a>) -> Vec<ElementRef<'a>> {
        let node = *context;
        let ctx = Context {
            node: XNode::Node(node),
            position: 1,
            size: 1,
        };
        match eval(&self.expr, &ctx) {
            Value::Nodes(nodes) => {
                let mut elements: Vec<ElementRef<'a>> = nodes
                    .into_iter()
                    .filter_map(|n| match n {
                        XNode::Node(node) => ElementRef::wrap(node),
                        XNode::Attribute { .. } => None,
                    })
                    .collect();
                sort_document_order(&mut elements, node);
                elements
            }
            _ => Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// tokenizer

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
    Star,
    AxisSep,
    Op(CompareOp),
    Literal(String),
    Number(f64),
    Name(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            ' ' | '\t' | '\n' | '\r' => i += 1,
            '/' if next == Some('/') => {
                tokens.push(Token::DoubleSlash);
                i += 2;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '[' => {
                tokens.push(Token::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Token::RBracket);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '@' => {
                tokens.push(Token::At);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            ':' if next == Some(':') => {
                tokens.push(Token::AxisSep);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Op(CompareOp::Eq));
                i += 1;
            }
            '!' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                i += 2;
            }
            '<' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Le));
                i += 2;
            }
            '<' => {
                tokens.push(Token::Op(CompareOp::Lt));
                i += 1;
            }
            '>' if next == Some('=') => {
                tokens.push(Token::Op(CompareOp::Ge));
                i += 2;
            }
            '>' => {
                tokens.push(Token::Op(CompareOp::Gt));
                i += 1;
            }
            '.' if next == Some('.') => {
                tokens.push(Token::DotDot);
                i += 2;
            }
            '.' if !next.is_some_and(|n| n.is_ascii_digit()) => {
                tokens.push(Token::Dot);
                i += 1;
            }
            '"' | '\'' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&ch| ch == c)
                    .ok_or_else(|| "unterminated string literal".to_string())?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{text}'"))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '-')
                {
                    i += 1;
                }
                tokens.push(Token::Name(chars[start..i].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }
    Ok(tokens)
}

// ---------------------------------------------------------------------------
// parser

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
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
        self.pos += 1;
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<(), String> {
        if self.eat(expected) {
            Ok(())
        } else {
            Err(format!("expected {expected:?}, found {:?}", self.peek()))
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if matches!(self.peek(), Some(Token::Name(name)) if name == keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_and()?;
        while self.eat_keyword("or") {
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_comparison()?;
        while self.eat_keyword("and") {
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let mut left = self.parse_union()?;
        while let Some(Token::Op(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.parse_union()?;
            left = Expr::Compare(op, Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_union(&mut self) -> Result<Expr, String> {
        let first = self.parse_primary()?;
        if self.peek() != Some(&Token::Pipe) {
            return Ok(first);
        }
        let mut parts = vec![first];
        while self.eat(&Token::Pipe) {
            parts.push(self.parse_primary()?);
        }
        Ok(Expr::Union(parts))
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        match self.peek().cloned() {
            Some(Token::Literal(text)) => {
                self.pos += 1;
                Ok(Expr::Literal(text))
            }
            Some(Token::Number(value)) => {
                self.pos += 1;
                Ok(Expr::Number(value))
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen)?;
                let predicates = self.parse_predicates()?;
                let filtered = if predicates.is_empty() {
                    inner
                } else {
                    Expr::Filter(Box::new(inner), predicates)
                };
                if matches!(self.peek(), Some(Token::Slash) | Some(Token::DoubleSlash)) {
                    return Err("paths after a parenthesized expression are not supported".into());
                }
                Ok(filtered)
            }
            Some(Token::Name(name))
                if self.peek_at(1) == Some(&Token::LParen) && !is_node_type(&name) =>
            {
                self.pos += 2;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(&Token::RParen)?;
                        break;
                    }
                }
                Ok(Expr::Call(name, args))
            }
            Some(_) => self.parse_location_path().map(Expr::Path),
            None => Err("unexpected end of expression".into()),
        }
    }

    fn parse_location_path(&mut self) -> Result<LocationPath, String> {
        let mut steps = Vec::new();
        let absolute = match self.peek() {
            Some(Token::Slash) => {
                self.pos += 1;
                if !self.starts_step() {
                    return Ok(LocationPath {
                        absolute: true,
                        steps,
                    });
                }
                true
            }
            Some(Token::DoubleSlash) => {
                self.pos += 1;
                steps.push(descendant_or_self());
                true
            }
            _ => false,
        };
        steps.push(self.parse_step()?);
        loop {
            if self.eat(&Token::Slash) {
                steps.push(self.parse_step()?);
            } else if self.eat(&Token::DoubleSlash) {
                steps.push(descendant_or_self());
                steps.push(self.parse_step()?);
            } else {
                break;
            }
        }
        Ok(LocationPath { absolute, steps })
    }

    fn starts_step(&self) -> bool {
        matches!(
            self.peek(),
            Some(Token::Name(_) | Token::Star | Token::At | Token::Dot | Token::DotDot)
        )
    }

    fn parse_step(&mut self) -> Result<Step, String> {
        if self.eat(&Token::Dot) {
            return Ok(Step {
                axis: Axis::Myself,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }
        if self.eat(&Token::DotDot) {
            return Ok(Step {
                axis: Axis::Parent,
                test: NodeTest::Node,
                predicates: Vec::new(),
            });
        }

        let mut axis = Axis::Child;
        if self.eat(&Token::At) {
            axis = Axis::Attribute;
        } else if let Some(Token::Name(name)) = self.peek().cloned() {
            if self.peek_at(1) == Some(&Token::AxisSep) {
                axis = Axis::from_name(&name).ok_or_else(|| format!("unknown axis '{name}'"))?;
                self.pos += 2;
            }
        }

        let test = match self.advance() {
            Some(Token::Star) => NodeTest::Any,
            Some(Token::Name(name)) if is_node_type(&name) => {
                self.expect(&Token::LParen)?;
                self.expect(&Token::RParen)?;
                if name == "text" {
                    NodeTest::Text
                } else {
                    NodeTest::Node
                }
            }
            Some(Token::Name(name)) => NodeTest::Name(name.to_lowercase()),
            other => return Err(format!("expected node test, found {other:?}")),
        };

        let predicates = self.parse_predicates()?;
        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn parse_predicates(&mut self) -> Result<Vec<Expr>, String> {
        let mut predicates = Vec::new();
        while self.eat(&Token::LBracket) {
            predicates.push(self.parse_expr()?);
            self.expect(&Token::RBracket)?;
        }
        Ok(predicates)
    }
}

fn is_node_type(name: &str) -> bool {
    name == "text" || name == "node"
}

fn descendant_or_self() -> Step {
    Step {
        axis: Axis::DescendantOrSelf,
        test: NodeTest::Node,
        predicates: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// evaluation

#[derive(Debug, Clone, Copy)]
enum XNode<'a> {
    Node(NodeRef<'a, Node>),
    Attribute {
        owner: NodeRef<'a, Node>,
        name: &'a str,
        value: &'a str,
    },
}

impl<'a> XNode<'a> {
    fn identity(&self) -> (NodeId, Option<&'a str>) {
        match self {
            XNode::Node(node) => (node.id(), None),
            XNode::Attribute { owner, name, .. } => (owner.id(), Some(*name)),
        }
    }

    fn string_value(&self) -> String {
        match self {
            XNode::Node(node) => node_text(*node),
            XNode::Attribute { value, .. } => (*value).to_string(),
        }
    }
}

fn node_text(node: NodeRef<'_, Node>) -> String {
    match node.value() {
        Node::Text(text) => String::from(&**text),
        _ => node
            .descendants()
            .filter_map(|n| n.value().as_text().map(|t| String::from(&**t)))
            .collect(),
    }
}

#[derive(Debug, Clone)]
enum Value<'a> {
    Nodes(Vec<XNode<'a>>),
    Str(String),
    Num(f64),
    Bool(bool),
}

impl Value<'_> {
    fn boolean(&self) -> bool {
        match self {
            Value::Nodes(nodes) => !nodes.is_empty(),
            Value::Str(s) => !s.is_empty(),
            Value::Num(n) => *n != 0.0 && !n.is_nan(),
            Value::Bool(b) => *b,
        }
    }

    fn string(&self) -> String {
        match self {
            Value::Nodes(nodes) => nodes.first().map(XNode::string_value).unwrap_or_default(),
            Value::Str(s) => s.clone(),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.is_finite() {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            Value::Bool(b) => b.to_string(),
        }
    }

    fn number(&self) -> f64 {
        match self {
            Value::Num(n) => *n,
            Value::Bool(b) => f64::from(u8::from(*b)),
            other => to_number(&other.string()),
        }
    }
}

fn to_number(text: &str) -> f64 {
    text.trim().parse::<f64>().unwrap_or(f64::NAN)
}

struct Context<'a> {
    node: XNode<'a>,
    position: usize,
    size: usize,
}

fn eval<'a>(expr: &Expr, ctx: &Context<'a>) -> Value<'a> {
    match expr {
        Expr::Literal(text) => Value::Str(text.clone()),
        Expr::Number(n) => Value::Num(*n),
        Expr::Or(a, b) => Value::Bool(eval(a, ctx).boolean() || eval(b, ctx).boolean()),
        Expr::And(a, b) => Value::Bool(eval(a, ctx).boolean() && eval(b, ctx).boolean()),
        Expr::Compare(op, a, b) => Value::Bool(compare(*op, &eval(a, ctx), &eval(b, ctx))),
        Expr::Path(path) => Value::Nodes(eval_path(path, ctx.node)),
        Expr::Union(parts) => {
            let mut seen = HashSet::new();
            let mut nodes = Vec::new();
            for part in parts {
                if let Value::Nodes(found) = eval(part, ctx) {
                    for node in found {
                        if seen.insert(node.identity()) {
                            nodes.push(node);
                        }
                    }
                }
            }
            Value::Nodes(nodes)
        }
        Expr::Filter(inner, predicates) => match eval(inner, ctx) {
            Value::Nodes(mut nodes) => {
                if let XNode::Node(anchor) = ctx.node {
                    sort_xnodes(&mut nodes, anchor);
                }
                for predicate in predicates {
                    nodes = apply_predicate(nodes, predicate);
                }
                Value::Nodes(nodes)
            }
            other => other,
        },
        Expr::Call(name, args) => call(name, args, ctx),
    }
}

fn call<'a>(name: &str, args: &[Expr], ctx: &Context<'a>) -> Value<'a> {
    let arg = |i: usize| args.get(i).map(|a| eval(a, ctx));
    let string_arg = |i: usize| match arg(i) {
        Some(value) => value.string(),
        None => ctx.node.string_value(),
    };
    match name {
        "last" => Value::Num(ctx.size as f64),
        "position" => Value::Num(ctx.position as f64),
        "true" => Value::Bool(true),
        "false" => Value::Bool(false),
        "not" => Value::Bool(!arg(0).map(|v| v.boolean()).unwrap_or(false)),
        "count" => match arg(0) {
            Some(Value::Nodes(nodes)) => Value::Num(nodes.len() as f64),
            _ => Value::Num(0.0),
        },
        "string" => Value::Str(string_arg(0)),
        "number" => Value::Num(to_number(&string_arg(0))),
        "normalize-space" => Value::Str(
            string_arg(0)
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "string-length" => Value::Num(string_arg(0).chars().count() as f64),
        "contains" => Value::Bool(string_arg(0).contains(&string_arg(1))),
        "starts-with" => Value::Bool(string_arg(0).starts_with(&string_arg(1))),
        "ends-with" => Value::Bool(string_arg(0).ends_with(&string_arg(1))),
        "concat" => Value::Str(
            (0..args.len())
                .map(|i| arg(i).map(|v| v.string()).unwrap_or_default())
                .collect(),
        ),
        _ => {
            tracing::debug!("unsupported xpath function {name}()");
            Value::Bool(false)
        }
    }
}

fn compare(op: CompareOp, left: &Value<'_>, right: &Value<'_>) -> bool {
    match (left, right) {
        (Value::Nodes(a), Value::Nodes(b)) => a.iter().any(|x| {
            let xs = x.string_value();
            b.iter()
                .any(|y| compare_atoms(op, &Value::Str(xs.clone()), &Value::Str(y.string_value())))
        }),
        (Value::Nodes(nodes), Value::Bool(_)) | (Value::Bool(_), Value::Nodes(nodes)) => {
            let as_bool = Value::Bool(!nodes.is_empty());
            if matches!(left, Value::Nodes(_)) {
                compare_atoms(op, &as_bool, right)
            } else {
                compare_atoms(op, left, &as_bool)
            }
        }
        (Value::Nodes(nodes), other) => nodes
            .iter()
            .any(|n| compare_atoms(op, &atom_like(n, other), other)),
        (other, Value::Nodes(nodes)) => nodes
            .iter()
            .any(|n| compare_atoms(op, other, &atom_like(n, other))),
        _ => compare_atoms(op, left, right),
    }
}

fn atom_like<'a>(node: &XNode<'a>, other: &Value<'_>) -> Value<'a> {
    match other {
        Value::Num(_) => Value::Num(to_number(&node.string_value())),
        _ => Value::Str(node.string_value()),
    }
}

fn compare_atoms(op: CompareOp, left: &Value<'_>, right: &Value<'_>) -> bool {
    match op {
        CompareOp::Eq | CompareOp::Ne => {
            let equal = match (left, right) {
                (Value::Bool(_), _) | (_, Value::Bool(_)) => left.boolean() == right.boolean(),
                (Value::Num(_), _) | (_, Value::Num(_)) => left.number() == right.number(),
                _ => left.string() == right.string(),
            };
            (op == CompareOp::Eq) == equal
        }
        CompareOp::Lt => left.number() < right.number(),
        CompareOp::Le => left.number() <= right.number(),
        CompareOp::Gt => left.number() > right.number(),
        CompareOp::Ge => left.number() >= right.number(),
    }
}

fn eval_path<'a>(path: &LocationPath, context: XNode<'a>) -> Vec<XNode<'a>> {
    let start = if path.absolute {
        let anchor = match context {
            XNode::Node(node) => node,
            XNode::Attribute { owner, .. } => owner,
        };
        let root = anchor.ancestors().last().unwrap_or(anchor);
        XNode::Node(root)
    } else {
        context
    };

    let mut current = vec![start];
    for step in &path.steps {
        let mut seen = HashSet::new();
        let mut next = Vec::new();
        for node in &current {
            let mut matched: Vec<XNode<'a>> = axis_nodes(step.axis, *node)
                .into_iter()
                .filter(|candidate| node_test(&step.test, step.axis, candidate))
                .collect();
            for predicate in &step.predicates {
                matched = apply_predicate(matched, predicate);
            }
            for candidate in matched {
                if seen.insert(candidate.identity()) {
                    next.push(candidate);
                }
            }
        }
        current = next;
    }
    current
}

fn apply_predicate<'a>(nodes: Vec<XNode<'a>>, predicate: &Expr) -> Vec<XNode<'a>> {
    let size = nodes.len();
    nodes
        .into_iter()
        .enumerate()
        .filter(|(index, node)| {
            let ctx = Context {
                node: *node,
                position: index + 1,
                size,
            };
            match eval(predicate, &ctx) {
                Value::Num(n) => n == (index + 1) as f64,
                other => other.boolean(),
            }
        })
        .map(|(_, node)| node)
        .collect()
}

/// Reverse axes are produced nearest-first so positional predicates count
/// outward from the context node.
fn axis_nodes<'a>(axis: Axis, node: XNode<'a>) -> Vec<XNode<'a>> {
    let node = match node {
        XNode::Node(node) => node,
        XNode::Attribute { owner, .. } => {
            return match axis {
                Axis::Parent | Axis::Ancestor => vec![XNode::Node(owner)],
                Axis::AncestorOrSelf | Axis::Myself => vec![node],
                _ => Vec::new(),
            };
        }
    };
    match axis {
        Axis::Child => node.children().map(XNode::Node).collect(),
        Axis::Descendant => node.descendants().skip(1).map(XNode::Node).collect(),
        Axis::DescendantOrSelf => node.descendants().map(XNode::Node).collect(),
        Axis::Parent => node.parent().map(XNode::Node).into_iter().collect(),
        Axis::Ancestor => node.ancestors().map(XNode::Node).collect(),
        Axis::AncestorOrSelf => std::iter::once(node)
            .chain(node.ancestors())
            .map(XNode::Node)
            .collect(),
        Axis::Myself => vec![XNode::Node(node)],
        Axis::FollowingSibling => node.next_siblings().map(XNode::Node).collect(),
        Axis::PrecedingSibling => node.prev_siblings().map(XNode::Node).collect(),
        Axis::Attribute => match node.value() {
            Node::Element(element) => element
                .attrs()
                .map(|(name, value)| XNode::Attribute {
                    owner: node,
                    name,
                    value,
                })
                .collect(),
            _ => Vec::new(),
        },
    }
}

fn node_test(test: &NodeTest, axis: Axis, node: &XNode<'_>) -> bool {
    match node {
        XNode::Attribute { name, .. } => match test {
            NodeTest::Any | NodeTest::Node => true,
            NodeTest::Name(expected) => name.eq_ignore_ascii_case(expected),
            NodeTest::Text => false,
        },
        XNode::Node(node) => match (test, node.value()) {
            (_, _) if axis == Axis::Attribute => false,
            (NodeTest::Node, _) => true,
            (NodeTest::Text, Node::Text(_)) => true,
            (NodeTest::Any, Node::Element(_)) => true,
            (NodeTest::Name(expected), Node::Element(element)) => {
                element.name().eq_ignore_ascii_case(expected)
            }
            _ => false,
        },
    }
}

fn document_order(anchor: NodeRef<'_, Node>) -> HashMap<NodeId, usize> {
    let root = anchor.ancestors().last().unwrap_or(anchor);
    root.descendants()
        .enumerate()
        .map(|(index, node)| (node.id(), index))
        .collect()
}

fn sort_xnodes(nodes: &mut [XNode<'_>], anchor: NodeRef<'_, Node>) {
    if nodes.len() < 2 {
        return;
    }
    let order = document_order(anchor);
    nodes.sort_by_key(|n| order.get(&n.identity().0).copied().unwrap_or(usize::MAX));
}

fn sort_document_order(elements: &mut [ElementRef<'_>], anchor: NodeRef<'_, Node>) {
    if elements.len() < 2 {
        return;
    }
    let order = document_order(anchor);
    elements.sort_by_key(|e| order.get(&e.id()).copied().unwrap_or(usize::MAX));
}
