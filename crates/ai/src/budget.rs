//! Fixed per-call budget for knowledge inlined into provider requests.

use crate::types::KnowledgeDigest;

/// Maximum number of content chunks taken from each knowledge source.
pub const DEFAULT_MAX_CHUNKS_PER_SOURCE: usize = 5;

/// Maximum characters kept from a single chunk.
pub const DEFAULT_MAX_CHUNK_CHARS: usize = 2_000;

/// Explicit resource budget applied when turning knowledge sources into digests.
///
/// This is a static cap, not a token counter: the same inputs always produce the
/// same request size.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KnowledgeBudget {
    pub max_chunks_per_source: usize,
    pub max_chunk_chars: usize,
}

impl Default for KnowledgeBudget {
    fn default() -> Self {
        Self {
            max_chunks_per_source: DEFAULT_MAX_CHUNKS_PER_SOURCE,
            max_chunk_chars: DEFAULT_MAX_CHUNK_CHARS,
        }
    }
}

impl KnowledgeBudget {
    pub fn new(max_chunks_per_source: usize, max_chunk_chars: usize) -> Self {
        Self {
            max_chunks_per_source,
            max_chunk_chars,
        }
    }

    /// Build a digest, keeping the first non-blank chunks up to the budget.
    pub fn digest<I>(
        &self,
        source_name: impl Into<String>,
        domain: impl Into<String>,
        summary: Option<String>,
        chunks: I,
    ) -> KnowledgeDigest
    where
        I: IntoIterator<Item = String>,
    {
        let excerpts = chunks
            .into_iter()
            .filter(|c| !c.trim().is_empty())
            .take(self.max_chunks_per_source)
            .map(|c| truncate_chars(c.trim(), self.max_chunk_chars))
            .collect();

        KnowledgeDigest {
            source_name: source_name.into(),
            domain: domain.into(),
            summary: summary
                .map(|s| truncate_chars(s.trim(), self.max_chunk_chars))
                .filter(|s| !s.is_empty()),
            excerpts,
        }
    }
}

fn truncate_chars(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}
