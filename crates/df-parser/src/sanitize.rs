use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::extract::GRAPH_KEYWORD;

/// Largest candidate the sanitizer accepts, in bytes.
pub const DEFAULT_MAX_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SanitizeError {
    #[error("candidate is empty after cleanup")]
    Empty,
    #[error("candidate is {size} bytes, limit is {limit}")]
    Oversized { size: usize, limit: usize },
}

/// One textual repair. Every rule is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SanitizeRule {
    /// Drop control and zero-width characters, keeping `\n`, `\r` and `\t`.
    StripNonPrintable,
    /// Wrap as `digraph G {\n...\n}` when the keyword is missing.
    EnsureRootEnvelope,
    /// `|` becomes `"`.
    PipeToQuote,
    /// `""` becomes `"`, repeated until none remain.
    CollapseDoubledQuotes,
    /// `};};` becomes `};`, repeated until none remain.
    CollapseDuplicateCloser,
}

impl SanitizeRule {
    pub const ALL: [Self; 5] = [
        Self::StripNonPrintable,
        Self::EnsureRootEnvelope,
        Self::PipeToQuote,
        Self::CollapseDoubledQuotes,
        Self::CollapseDuplicateCloser,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StripNonPrintable => "strip-non-printable",
            Self::EnsureRootEnvelope => "ensure-root-envelope",
            Self::PipeToQuote => "pipe-to-quote",
            Self::CollapseDoubledQuotes => "collapse-doubled-quotes",
            Self::CollapseDuplicateCloser => "collapse-duplicate-closer",
        }
    }

    #[must_use]
    pub fn apply(self, text: &str) -> String {
        match self {
            Self::StripNonPrintable => text.chars().filter(|ch| is_printable(*ch)).collect(),
            Self::EnsureRootEnvelope => {
                if text.contains(GRAPH_KEYWORD) {
                    text.to_string()
                } else {
                    format!("{GRAPH_KEYWORD} G {{\n{text}\n}}")
                }
            }
            Self::PipeToQuote => text.replace('|', "\""),
            Self::CollapseDoubledQuotes => collapse_to_fixed_point(text, "\"\"", "\""),
            Self::CollapseDuplicateCloser => collapse_to_fixed_point(text, "};};", "};"),
        }
    }
}

/// Ordered list of repairs applied to an extracted candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sanitizer {
    rules: Vec<SanitizeRule>,
    max_bytes: usize,
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self {
            rules: SanitizeRule::ALL.to_vec(),
            max_bytes: DEFAULT_MAX_BYTES,
        }
    }
}

impl Sanitizer {
    #[must_use]
    pub fn with_rules(rules: Vec<SanitizeRule>) -> Self {
        Self {
            rules,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn rules(&self) -> &[SanitizeRule] {
        &self.rules
    }

    /// Run every rule in order.
    ///
    /// The size limit holds for both the candidate and the repaired text, so
    /// applying the sanitizer to its own output is a no-op.
    pub fn apply(&self, candidate: &str) -> Result<String, SanitizeError> {
        self.check_size(candidate)?;

        let mut text = candidate.to_string();
        for (index, rule) in self.rules.iter().enumerate() {
            let next = rule.apply(&text);
            if next != text {
                debug!(
                    rule = rule.as_str(),
                    before = text.len(),
                    after = next.len(),
                    "sanitize rule changed candidate"
                );
            }
            text = next;
            if index == 0 && text.trim().is_empty() {
                break;
            }
        }

        if text.trim().is_empty() {
            warn!(error = %SanitizeError::Empty, "sanitizer rejected candidate");
            return Err(SanitizeError::Empty);
        }
        self.check_size(&text)?;
        Ok(text)
    }

    fn check_size(&self, text: &str) -> Result<(), SanitizeError> {
        if text.len() <= self.max_bytes {
            return Ok(());
        }
        let error = SanitizeError::Oversized {
            size: text.len(),
            limit: self.max_bytes,
        };
        warn!(%error, "sanitizer rejected candidate");
        Err(error)
    }
}

/// Sanitize with the default rule list.
pub fn sanitize(candidate: &str) -> Result<String, SanitizeError> {
    Sanitizer::default().apply(candidate)
}

fn is_printable(ch: char) -> bool {
    if matches!(ch, '\n' | '\r' | '\t') {
        return true;
    }
    !ch.is_control() && !is_zero_width(ch)
}

fn is_zero_width(ch: char) -> bool {
    matches!(
        ch,
        '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}' | '\u{FEFF}' | '\u{00AD}'
    )
}

fn collapse_to_fixed_point(text: &str, pattern: &str, replacement: &str) -> String {
    let mut current = text.to_string();
    while current.contains(pattern) {
        current = current.replace(pattern, replacement);
    }
    current
}
