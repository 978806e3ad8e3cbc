use thiserror::Error;
use tracing::debug;

pub const GRAPH_KEYWORD: &str = "digraph";
const STRICT_MODIFIER: &str = "strict";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("response contains no `digraph` keyword")]
    KeywordMissing,
    /// Braces never closed. `start` is the byte offset of the keyword.
    #[error("braces opened after byte {start} are never closed")]
    Unbalanced { start: usize },
}

/// Cut the first brace-balanced `digraph { ... }` block out of free text.
///
/// Scanning starts at the first occurrence of the keyword. A closing brace
/// seen before any opening brace is ignored. The block ends where the depth
/// returns to zero; anything after it is dropped. A `strict` modifier
/// directly before the keyword is kept.
pub fn extract_candidate(raw: &str) -> Result<String, ExtractError> {
    let keyword_at = raw.find(GRAPH_KEYWORD).ok_or(ExtractError::KeywordMissing)?;
    let start = strict_prefix_start(raw, keyword_at).unwrap_or(keyword_at);

    let mut depth = 0_usize;
    let mut opened = false;
    for (offset, ch) in raw[keyword_at..].char_indices() {
        match ch {
            '{' => {
                depth += 1;
                opened = true;
            }
            '}' if opened => {
                depth -= 1;
                if depth == 0 {
                    let end = keyword_at + offset + ch.len_utf8();
                    let candidate = raw[start..end].trim().to_string();
                    debug!(
                        start,
                        end,
                        bytes = candidate.len(),
                        "extracted graph candidate"
                    );
                    return Ok(candidate);
                }
            }
            _ => {}
        }
    }

    Err(ExtractError::Unbalanced { start: keyword_at })
}

/// Text before the first `digraph` keyword, trimmed. The whole input when
/// the keyword is absent.
#[must_use]
pub fn explanation_prefix(raw: &str) -> &str {
    let end = raw.find(GRAPH_KEYWORD).unwrap_or(raw.len());
    let end = strict_prefix_start(raw, end).unwrap_or(end);
    raw[..end].trim()
}

fn strict_prefix_start(raw: &str, keyword_at: usize) -> Option<usize> {
    let before = raw[..keyword_at].trim_end_matches([' ', '\t']);
    if before.len() == keyword_at {
        return None;
    }
    let modifier_at = before.len().checked_sub(STRICT_MODIFIER.len())?;
    let modifier = before.get(modifier_at..)?;
    if !modifier.eq_ignore_ascii_case(STRICT_MODIFIER) {
        return None;
    }
    let boundary = before[..modifier_at]
        .chars()
        .next_back()
        .is_none_or(|ch| !ch.is_alphanumeric() && ch != '_');
    boundary.then_some(modifier_at)
}
