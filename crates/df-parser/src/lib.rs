#![forbid(unsafe_code)]

//! Recovering a valid DOT document from free text.
//!
//! The stages run in order: [`extract_candidate`] cuts the first
//! brace-balanced `digraph` block out of the response, [`Sanitizer`] applies
//! textual repairs, and [`validate`] checks the result against the DOT
//! grammar, producing a [`GraphDocument`].

pub mod ast;
mod extract;
mod grammar;
mod graph_builder;
mod sanitize;
mod validate;

use serde_json::json;
use thiserror::Error;

pub use ast::{
    AttrStmt, AttrTarget, Attribute, DotGraph, EdgeEndpoint, EdgeOp, EdgeStmt, Id, IdKind,
    NodeId, NodeStmt, Statement, Subgraph,
};
pub use extract::{ExtractError, GRAPH_KEYWORD, explanation_prefix, extract_candidate};
pub use grammar::{DotSyntaxError, parse_dot_document, parse_dot_document_with_body};
pub use graph_builder::{GraphEdge, GraphNode, ParsedGraph};
pub use sanitize::{DEFAULT_MAX_BYTES, SanitizeError, SanitizeRule, Sanitizer, sanitize};
pub use validate::{GraphDocument, MAX_NESTING_DEPTH, ValidationError, is_valid, validate};

/// Failure of one of the three text stages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PrepareError {
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Sanitize(#[from] SanitizeError),
    #[error(transparent)]
    Validate(#[from] ValidationError),
}

impl PrepareError {
    #[must_use]
    pub const fn stage(&self) -> &'static str {
        match self {
            Self::Extract(_) => "extract",
            Self::Sanitize(_) => "sanitize",
            Self::Validate(_) => "validate",
        }
    }
}

/// Extract, sanitize and validate in one call.
pub fn prepare_document(raw: &str, sanitizer: &Sanitizer) -> Result<GraphDocument, PrepareError> {
    let candidate = extract_candidate(raw)?;
    let sanitized = sanitizer.apply(&candidate)?;
    Ok(validate(&sanitized)?)
}

/// Compact JSON summary of a validated document.
#[must_use]
pub fn parse_evidence_json(document: &GraphDocument) -> String {
    let parsed = document.parsed_graph();
    json!({
        "graph_name": document.graph_name(),
        "digest": document.digest(),
        "node_count": parsed.node_count(),
        "edge_count": parsed.edge_count(),
        "warning_count": parsed.warnings.len(),
        "warnings": parsed.warnings,
    })
    .to_string()
}
