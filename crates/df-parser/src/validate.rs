use std::fmt;
use std::ops::Range;
use std::panic;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, warn};

use crate::ast::{DotGraph, EdgeOp};
use crate::grammar::parse_dot_document_with_body;
use crate::graph_builder::ParsedGraph;

/// Deepest brace, bracket or HTML nesting accepted before parsing.
pub const MAX_NESTING_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("syntax error at line {line}, column {column}: {message}")]
    Syntax {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("root graph must be a `digraph`")]
    Undirected,
    #[error("undirected edge operator `--` used inside a digraph ({count} occurrences)")]
    EdgeOperator { count: usize },
    #[error("nesting depth {depth} exceeds the limit of {limit}")]
    TooDeep { depth: usize, limit: usize },
    #[error("parser panicked: {message}")]
    ParserPanic { message: String },
}

/// A DOT document that passed grammar validation.
///
/// Only [`validate`] constructs one, so holding a `GraphDocument` means the
/// text parses as a directed graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GraphDocument {
    text: String,
    graph: DotGraph,
    body: Range<usize>,
}

impl GraphDocument {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn into_string(self) -> String {
        self.text
    }

    /// SHA-256 of the document text, lowercase hex.
    #[must_use]
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.text.as_bytes()))
    }

    #[must_use]
    pub fn graph_name(&self) -> Option<&str> {
        self.graph.id.as_ref().map(|id| id.text())
    }

    /// Byte range of the root statement list, between its braces.
    #[must_use]
    pub fn body_span(&self) -> Range<usize> {
        self.body.clone()
    }

    /// The parsed syntax tree.
    #[must_use]
    pub fn syntax(&self) -> &DotGraph {
        &self.graph
    }

    #[must_use]
    pub fn parsed_graph(&self) -> ParsedGraph {
        ParsedGraph::from_dot(&self.graph)
    }
}

impl AsRef<str> for GraphDocument {
    fn as_ref(&self) -> &str {
        &self.text
    }
}

impl fmt::Display for GraphDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl TryFrom<String> for GraphDocument {
    type Error = ValidationError;

    fn try_from(text: String) -> Result<Self, Self::Error> {
        validate(&text)
    }
}

impl From<GraphDocument> for String {
    fn from(document: GraphDocument) -> Self {
        document.text
    }
}

/// Check sanitized text against the DOT grammar and the directed-graph rules.
pub fn validate(sanitized: &str) -> Result<GraphDocument, ValidationError> {
    let result = check(sanitized);
    match &result {
        Ok(document) => debug!(
            graph = document.graph_name().unwrap_or(""),
            bytes = sanitized.len(),
            "graph document validated"
        ),
        Err(error) => warn!(%error, "graph document rejected"),
    }
    result
}

#[must_use]
pub fn is_valid(text: &str) -> bool {
    check(text).is_ok()
}

fn check(text: &str) -> Result<GraphDocument, ValidationError> {
    let depth = nesting_depth(text);
    if depth > MAX_NESTING_DEPTH {
        return Err(ValidationError::TooDeep {
            depth,
            limit: MAX_NESTING_DEPTH,
        });
    }

    let parsed = panic::catch_unwind(|| parse_dot_document_with_body(text)).map_err(|payload| {
        ValidationError::ParserPanic {
            message: panic_message(payload.as_ref()),
        }
    })?;

    let (graph, body) = parsed.map_err(|errors| match errors.first() {
        Some(first) => ValidationError::Syntax {
            line: first.line,
            column: first.column,
            message: first.message.clone(),
        },
        None => ValidationError::Syntax {
            line: 1,
            column: 1,
            message: "unrecognized input".to_string(),
        },
    })?;

    if !graph.directed {
        return Err(ValidationError::Undirected);
    }

    let undirected = graph
        .edge_operators()
        .into_iter()
        .filter(|op| *op == EdgeOp::Undirected)
        .count();
    if undirected > 0 {
        return Err(ValidationError::EdgeOperator { count: undirected });
    }

    Ok(GraphDocument {
        text: text.to_string(),
        graph,
        body,
    })
}

/// Maximum nesting of `{`, `[` and HTML `<` outside quoted strings and
/// comments.
///
/// Comments are skipped with the same rules the grammar uses, so a quote
/// inside a comment cannot hide the braces after it. Nothing after an
/// unterminated string or block comment is counted; the grammar reads it
/// as the same unterminated token and fails there.
fn nesting_depth(text: &str) -> usize {
    let mut depth = 0_usize;
    let mut html = 0_usize;
    let mut deepest = 0_usize;
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if html > 0 {
            match ch {
                '<' => html += 1,
                '>' => html -= 1,
                _ => {}
            }
            deepest = deepest.max(depth + html);
            continue;
        }
        match ch {
            '"' => {
                let mut escaped = false;
                let mut closed = false;
                for inner in chars.by_ref() {
                    match inner {
                        _ if escaped => escaped = false,
                        '\\' => escaped = true,
                        '"' => {
                            closed = true;
                            break;
                        }
                        _ => {}
                    }
                }
                if !closed {
                    return deepest;
                }
            }
            '/' if chars.peek() == Some(&'/') => skip_line(&mut chars),
            '#' => skip_line(&mut chars),
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut star = false;
                let mut closed = false;
                for inner in chars.by_ref() {
                    if star && inner == '/' {
                        closed = true;
                        break;
                    }
                    star = inner == '*';
                }
                if !closed {
                    return deepest;
                }
            }
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            '<' => html += 1,
            _ => {}
        }
        deepest = deepest.max(depth + html);
    }
    deepest
}

fn skip_line(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) {
    for ch in chars.by_ref() {
        if ch == '\n' {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
