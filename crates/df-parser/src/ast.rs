//! Syntax tree for DOT documents plus a printer that writes it back out.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum IdKind {
    Identifier,
    Numeral,
    /// Double-quoted string; the value keeps escapes as written.
    Quoted,
    /// `<...>` HTML-like string; the value excludes the outer brackets.
    Html,
}

/// A DOT identifier of any of the four lexical forms.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Id {
    pub kind: IdKind,
    pub value: String,
}

impl Id {
    #[must_use]
    pub fn new(kind: IdKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    /// Build an id from arbitrary text, quoting it unless it is a bare
    /// identifier or numeral.
    #[must_use]
    pub fn from_text(text: &str) -> Self {
        if is_plain_identifier(text) && !is_keyword(text) {
            Self::new(IdKind::Identifier, text)
        } else if is_numeral(text) {
            Self::new(IdKind::Numeral, text)
        } else {
            Self::new(IdKind::Quoted, escape_quotes(text))
        }
    }

    /// The id without its delimiters.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.value
    }

    #[must_use]
    pub fn eq_ignore_case(&self, other: &str) -> bool {
        self.value.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IdKind::Identifier | IdKind::Numeral => f.write_str(&self.value),
            IdKind::Quoted => write!(f, "\"{}\"", self.value),
            IdKind::Html => write!(f, "<{}>", self.value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Attribute {
    pub key: Id,
    pub value: Id,
}

impl Attribute {
    #[must_use]
    pub fn new(key: &str, value: &str) -> Self {
        Self {
            key: Id::from_text(key),
            value: Id::from_text(value),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AttrTarget {
    Graph,
    Node,
    Edge,
}

impl AttrTarget {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Graph => "graph",
            Self::Node => "node",
            Self::Edge => "edge",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EdgeOp {
    Directed,
    Undirected,
}

impl EdgeOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Directed => "->",
            Self::Undirected => "--",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeId {
    pub id: Id,
    /// Port and optional compass point, in source order.
    pub port: Vec<Id>,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        for part in &self.port {
            write!(f, ":{part}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeStmt {
    pub node: NodeId,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EdgeEndpoint {
    Node(NodeId),
    Subgraph(Subgraph),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EdgeStmt {
    pub head: EdgeEndpoint,
    pub tail: Vec<(EdgeOp, EdgeEndpoint)>,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttrStmt {
    pub target: AttrTarget,
    pub attributes: Vec<Attribute>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subgraph {
    /// Whether the `subgraph` keyword was written.
    pub keyword: bool,
    pub id: Option<Id>,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Statement {
    Node(NodeStmt),
    Edge(EdgeStmt),
    Attr(AttrStmt),
    /// Top-level `key = value` graph attribute.
    Assign(Attribute),
    Subgraph(Subgraph),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DotGraph {
    pub strict: bool,
    pub directed: bool,
    pub id: Option<Id>,
    pub statements: Vec<Statement>,
}

impl DotGraph {
    /// Every edge operator in the document, subgraphs included.
    #[must_use]
    pub fn edge_operators(&self) -> Vec<EdgeOp> {
        let mut ops = Vec::new();
        collect_edge_operators(&self.statements, &mut ops);
        ops
    }

    /// Set a root graph attribute, replacing any existing assignment of the
    /// same key at the top level.
    pub fn set_graph_attribute(&mut self, key: &str, value: &str) {
        self.remove_root_attribute(AttrTarget::Graph, key);
        self.statements.retain(|statement| {
            !matches!(statement, Statement::Assign(attribute) if attribute.key.eq_ignore_case(key))
        });
        self.statements
            .insert(0, Statement::Assign(Attribute::new(key, value)));
    }

    /// Prepend a `node [...]` default statement. Later node defaults in the
    /// document still take precedence for the nodes that follow them.
    pub fn set_node_defaults(&mut self, attributes: &[(&str, String)]) {
        self.prepend_defaults(AttrTarget::Node, attributes);
    }

    /// Prepend an `edge [...]` default statement.
    pub fn set_edge_defaults(&mut self, attributes: &[(&str, String)]) {
        self.prepend_defaults(AttrTarget::Edge, attributes);
    }

    /// Value of a root graph attribute, from `key=value` or `graph [...]`.
    #[must_use]
    pub fn graph_attribute(&self, key: &str) -> Option<&Id> {
        self.statements
            .iter()
            .rev()
            .find_map(|statement| match statement {
                Statement::Assign(attribute) if attribute.key.eq_ignore_case(key) => {
                    Some(&attribute.value)
                }
                Statement::Attr(AttrStmt {
                    target: AttrTarget::Graph,
                    attributes,
                }) => attributes
                    .iter()
                    .rev()
                    .find(|attribute| attribute.key.eq_ignore_case(key))
                    .map(|attribute| &attribute.value),
                _ => None,
            })
    }

    fn prepend_defaults(&mut self, target: AttrTarget, attributes: &[(&str, String)]) {
        if attributes.is_empty() {
            return;
        }
        let attributes = attributes
            .iter()
            .map(|(key, value)| Attribute::new(key, value))
            .collect();
        let insert_at = self
            .statements
            .iter()
            .take_while(|statement| matches!(statement, Statement::Assign(_)))
            .count();
        self.statements
            .insert(insert_at, Statement::Attr(AttrStmt { target, attributes }));
    }

    fn remove_root_attribute(&mut self, target: AttrTarget, key: &str) {
        for statement in &mut self.statements {
            if let Statement::Attr(attr_stmt) = statement
                && attr_stmt.target == target
            {
                attr_stmt
                    .attributes
                    .retain(|attribute| !attribute.key.eq_ignore_case(key));
            }
        }
        self.statements.retain(|statement| {
            !matches!(statement, Statement::Attr(attr_stmt) if attr_stmt.target == target && attr_stmt.attributes.is_empty())
        });
    }
}

fn collect_edge_operators(statements: &[Statement], ops: &mut Vec<EdgeOp>) {
    for statement in statements {
        match statement {
            Statement::Edge(edge) => {
                if let EdgeEndpoint::Subgraph(subgraph) = &edge.head {
                    collect_edge_operators(&subgraph.statements, ops);
                }
                for (op, endpoint) in &edge.tail {
                    ops.push(*op);
                    if let EdgeEndpoint::Subgraph(subgraph) = endpoint {
                        collect_edge_operators(&subgraph.statements, ops);
                    }
                }
            }
            Statement::Subgraph(subgraph) => collect_edge_operators(&subgraph.statements, ops),
            Statement::Node(_) | Statement::Attr(_) | Statement::Assign(_) => {}
        }
    }
}

impl fmt::Display for DotGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.strict {
            f.write_str("strict ")?;
        }
        f.write_str(if self.directed { "digraph" } else { "graph" })?;
        if let Some(id) = &self.id {
            write!(f, " {id}")?;
        }
        f.write_str(" {\n")?;
        write_statements(f, &self.statements, 1)?;
        f.write_str("}\n")
    }
}

fn write_statements(f: &mut fmt::Formatter<'_>, statements: &[Statement], depth: usize) -> fmt::Result {
    for statement in statements {
        write_indent(f, depth)?;
        write_statement(f, statement, depth)?;
        f.write_str(";\n")?;
    }
    Ok(())
}

fn write_statement(f: &mut fmt::Formatter<'_>, statement: &Statement, depth: usize) -> fmt::Result {
    match statement {
        Statement::Node(node) => {
            write!(f, "{}", node.node)?;
            write_attribute_list(f, &node.attributes)
        }
        Statement::Edge(edge) => {
            write_endpoint(f, &edge.head, depth)?;
            for (op, endpoint) in &edge.tail {
                write!(f, " {} ", op.as_str())?;
                write_endpoint(f, endpoint, depth)?;
            }
            write_attribute_list(f, &edge.attributes)
        }
        Statement::Attr(attr) => {
            f.write_str(attr.target.as_str())?;
            write_attribute_list(f, &attr.attributes)
        }
        Statement::Assign(attribute) => write!(f, "{attribute}"),
        Statement::Subgraph(subgraph) => write_subgraph(f, subgraph, depth),
    }
}

fn write_endpoint(f: &mut fmt::Formatter<'_>, endpoint: &EdgeEndpoint, depth: usize) -> fmt::Result {
    match endpoint {
        EdgeEndpoint::Node(node) => write!(f, "{node}"),
        EdgeEndpoint::Subgraph(subgraph) => write_subgraph(f, subgraph, depth),
    }
}

fn write_subgraph(f: &mut fmt::Formatter<'_>, subgraph: &Subgraph, depth: usize) -> fmt::Result {
    if subgraph.keyword || subgraph.id.is_some() {
        f.write_str("subgraph ")?;
    }
    if let Some(id) = &subgraph.id {
        write!(f, "{id} ")?;
    }
    f.write_str("{\n")?;
    write_statements(f, &subgraph.statements, depth + 1)?;
    write_indent(f, depth)?;
    f.write_str("}")
}

fn write_attribute_list(f: &mut fmt::Formatter<'_>, attributes: &[Attribute]) -> fmt::Result {
    if attributes.is_empty() {
        return Ok(());
    }
    f.write_str(" [")?;
    for (index, attribute) in attributes.iter().enumerate() {
        if index > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{attribute}")?;
    }
    f.write_str("]")
}

fn write_indent(f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        f.write_str("  ")?;
    }
    Ok(())
}

pub(crate) const KEYWORDS: [&str; 6] = ["node", "edge", "graph", "digraph", "subgraph", "strict"];

pub(crate) fn is_keyword(text: &str) -> bool {
    KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(text))
}

pub(crate) fn is_identifier_start(ch: char) -> bool {
    ch.is_alphabetic() || ch == '_' || is_extended_char(ch)
}

pub(crate) fn is_identifier_continue(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_' || is_extended_char(ch)
}

fn is_extended_char(ch: char) -> bool {
    !ch.is_ascii() && !ch.is_whitespace() && !ch.is_control()
}

fn is_plain_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars.next().is_some_and(is_identifier_start) && chars.all(is_identifier_continue)
}

fn is_numeral(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    if digits.is_empty() || digits.matches('.').count() > 1 {
        return false;
    }
    digits.chars().all(|ch| ch.is_ascii_digit() || ch == '.') && digits.chars().any(|ch| ch.is_ascii_digit())
}

fn escape_quotes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                out.push('\\');
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}
