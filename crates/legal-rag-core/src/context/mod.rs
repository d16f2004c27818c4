//! Context assembler (component F): produces a single, bounded context
//! string from the nucleus chunk's full document. Truncation only ever
//! touches the trailing, non-nucleus document body; the nucleus markers
//! and metadata block are protected and never truncated.

pub mod intent;

pub use intent::Intent;

use crate::corpus::{Chunk, Document};
use crate::errors::{RetrievalError, Result};

pub const NUCLEUS_START: &str = "<<<NUCLEUS_START>>>";
pub const NUCLEUS_END: &str = "<<<NUCLEUS_END>>>";

/// Safety buffer reserved for the generator's own output, subtracted from
/// the context window before the remaining budget reaches this assembler.
pub const SAFETY_BUFFER_TOKENS: usize = 256;

#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub collection_id: String,
    pub doc_id: String,
}

pub struct ContextAssembler;

impl ContextAssembler {
    pub fn new() -> Self {
        Self
    }

    /// Assembles the context string for `nucleus` within `document`, given
    /// the raw user `query` (for intent classification) and a token
    /// `budget` already net of the safety buffer.
    pub fn assemble(
        &self,
        document: &Document,
        nucleus: &Chunk,
        query: &str,
        budget_tokens: usize,
    ) -> Result<AssembledContext> {
        let metadata_block = document.metadata.as_plain_lines().join("\n");
        let intent = Intent::classify(query);
        let prelude = intent.build_prelude(&document.metadata);

        let full_text = document.full_text();
        let (before, marked_nucleus, after) = split_around_nucleus(&full_text, &nucleus.content);

        let mut protected = String::new();
        if let Some(p) = &prelude {
            protected.push_str(p);
            protected.push_str("\n\n");
        }
        protected.push_str(&metadata_block);
        protected.push_str("\n\n");
        protected.push_str(before);
        protected.push_str(&marked_nucleus);

        let protected_tokens = estimate_tokens(&protected);
        if protected_tokens > budget_tokens {
            return Err(RetrievalError::PromptTooLarge {
                needed: protected_tokens,
                budget: budget_tokens,
            });
        }

        let remaining_tokens = budget_tokens - protected_tokens;
        let truncated_after = truncate_to_token_budget(after, remaining_tokens);

        let mut text = protected;
        text.push_str(&truncated_after);

        Ok(AssembledContext {
            text,
            collection_id: document.collection_id.clone(),
            doc_id: document.doc_id.clone(),
        })
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new()
    }
}

fn estimate_tokens(s: &str) -> usize {
    s.len() / 4
}

/// Truncates `text` to at most `budget_tokens` (char_len/4 estimate),
/// trimming only from the end.
fn truncate_to_token_budget(text: &str, budget_tokens: usize) -> String {
    let budget_chars = budget_tokens.saturating_mul(4);
    if text.len() <= budget_chars {
        return text.to_string();
    }
    let mut end = budget_chars.min(text.len());
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Splits `full_text` into `(before, marked_nucleus, after)`. If
/// `nucleus_content` isn't found verbatim, a marked copy is prepended and
/// the whole original text becomes the "after" segment.
fn split_around_nucleus<'a>(full_text: &'a str, nucleus_content: &str) -> (&'a str, String, String) {
    if let Some(idx) = full_text.find(nucleus_content) {
        let before = &full_text[..idx];
        let after = &full_text[idx + nucleus_content.len()..];
        let marked = format!("{NUCLEUS_START}\n{nucleus_content}\n{NUCLEUS_END}");
        (before, marked, after.to_string())
    } else {
        let marked = format!("{NUCLEUS_START}\n{nucleus_content}\n{NUCLEUS_END}\n\n");
        ("", marked, full_text.to_string())
    }
}
