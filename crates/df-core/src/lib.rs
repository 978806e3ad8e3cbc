#![forbid(unsafe_code)]

//! Shared value types for the dotflow pipeline.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Speaker of a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Structural complexity of a flow graph.
///
/// `cyclomatic_complexity` is `edge_count - node_count + 2`, which is only
/// meaningful for a single connected component with one entry and one exit.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Metrics {
    pub node_count: usize,
    pub edge_count: usize,
    pub cyclomatic_complexity: i64,
}

impl Metrics {
    #[must_use]
    pub fn from_counts(node_count: usize, edge_count: usize) -> Self {
        let cyclomatic_complexity = edge_count as i64 - node_count as i64 + 2;
        Self {
            node_count,
            edge_count,
            cyclomatic_complexity,
        }
    }

    /// Degraded triple reported when the graph could not be analyzed.
    #[must_use]
    pub const fn zeroed() -> Self {
        Self {
            node_count: 0,
            edge_count: 0,
            cyclomatic_complexity: 0,
        }
    }

    #[must_use]
    pub fn is_zeroed(&self) -> bool {
        *self == Self::zeroed()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
}

impl ImageFormat {
    pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', b'\r', b'\n', 0x1a, b'\n'];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Png => "png",
        }
    }

    #[must_use]
    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
        }
    }

    /// Check the magic bytes at the start of `bytes`.
    #[must_use]
    pub fn matches(self, bytes: &[u8]) -> bool {
        match self {
            Self::Png => bytes.starts_with(&Self::PNG_SIGNATURE),
        }
    }
}

/// Raster output for exactly one graph document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedImage {
    pub bytes: Vec<u8>,
    pub format: ImageFormat,
    /// Name of the rendering strategy that produced the bytes.
    pub strategy: String,
    /// SHA-256 hex digest of the source document.
    pub document_digest: String,
}

impl RenderedImage {
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.bytes)
    }

    #[must_use]
    pub fn data_uri(&self) -> String {
        format!("data:{};base64,{}", self.format.mime_type(), self.to_base64())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FlowErrorCode {
    EmptyInput,
    Generation,
    Extraction,
    Sanitization,
    Validation,
    Render,
    RepairWithoutDocument,
}

impl FlowErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::EmptyInput => "dotflow/error/empty-input",
            Self::Generation => "dotflow/error/generation",
            Self::Extraction => "dotflow/error/extraction",
            Self::Sanitization => "dotflow/error/sanitization",
            Self::Validation => "dotflow/error/validation",
            Self::Render => "dotflow/error/render",
            Self::RepairWithoutDocument => "dotflow/error/repair-without-document",
        }
    }
}

pub const REPHRASE_MESSAGE: &str =
    "Could not generate valid graph structure. Please try rephrasing your description.";
pub const VISUALIZATION_FAILED_MESSAGE: &str = "Error generating graph visualization";

/// Every outcome of one pipeline attempt other than success.
///
/// None of these are process-fatal; callers turn them into user messages.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum FlowError {
    #[error("input was empty")]
    EmptyInput,
    #[error("text generation failed: {message}")]
    Generation { message: String },
    #[error("no graph description found: {message}")]
    Extraction { message: String },
    #[error("graph description could not be sanitized: {message}")]
    Sanitization { message: String },
    #[error("graph description failed validation: {message}")]
    Validation { message: String },
    #[error("rendering failed: {}", .attempts.join("; "))]
    Render { attempts: Vec<String> },
    #[error("no current graph document to repair")]
    RepairWithoutDocument,
}

impl FlowError {
    #[must_use]
    pub fn code(&self) -> FlowErrorCode {
        match self {
            Self::EmptyInput => FlowErrorCode::EmptyInput,
            Self::Generation { .. } => FlowErrorCode::Generation,
            Self::Extraction { .. } => FlowErrorCode::Extraction,
            Self::Sanitization { .. } => FlowErrorCode::Sanitization,
            Self::Validation { .. } => FlowErrorCode::Validation,
            Self::Render { .. } => FlowErrorCode::Render,
            Self::RepairWithoutDocument => FlowErrorCode::RepairWithoutDocument,
        }
    }

    /// Text surfaced to the person driving the conversation.
    #[must_use]
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyInput => "Please provide a process description",
            Self::Generation { .. } => "The text generation service failed. Please try again.",
            Self::Extraction { .. } | Self::Sanitization { .. } | Self::Validation { .. } => {
                REPHRASE_MESSAGE
            }
            Self::Render { .. } => VISUALIZATION_FAILED_MESSAGE,
            Self::RepairWithoutDocument => {
                "There is no graph to repair yet. Generate one first."
            }
        }
    }

    /// Whether the failure happened before a valid document existed.
    #[must_use]
    pub fn is_document_failure(&self) -> bool {
        matches!(
            self,
            Self::Extraction { .. } | Self::Sanitization { .. } | Self::Validation { .. }
        )
    }
}
