//! Recursive length-bounded chunking around a `TranslationModel`.
//!
//! Text over the model's token budget is cut into `tokens / max + 1`
//! contiguous character slices of equal width, each translated recursively,
//! and the results joined with a single space. Slices are estimated by
//! character width rather than token boundaries, so a slice can still come
//! out over budget; the recursion splits it again. Slices may cut mid-word.

use tracing::{debug, trace};

use crate::error::TranslateError;
use crate::llm::TranslationModel;

/// Default recursion cap. Each level at least halves the slice width, so
/// this is far beyond anything a real message reaches.
pub const DEFAULT_MAX_DEPTH: usize = 16;

/// A translated unit with bookkeeping about how it was produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    /// Number of `generate` calls made.
    pub chunks: usize,
    /// Deepest recursion level reached (0 = no split).
    pub depth: usize,
}

/// Translates arbitrarily long text within a model's fixed context window.
pub struct ChunkedTranslator<M> {
    model: M,
    max_depth: usize,
}

impl<M: TranslationModel> ChunkedTranslator<M> {
    pub fn new(model: M) -> Self {
        Self {
            model,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Cap the number of nested split levels. `0` disables splitting.
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    /// Translate `text`, splitting as needed.
    pub fn translate(&self, text: &str) -> Result<String, TranslateError> {
        self.translate_counted(text).map(|t| t.text)
    }

    /// Translate `text` and report how many chunks it took.
    ///
    /// Blank input translates to an empty string without touching the model.
    pub fn translate_counted(&self, text: &str) -> Result<Translation, TranslateError> {
        if text.trim().is_empty() {
            return Ok(Translation {
                text: String::new(),
                chunks: 0,
                depth: 0,
            });
        }
        self.translate_at(text, 0)
    }

    fn translate_at(&self, text: &str, depth: usize) -> Result<Translation, TranslateError> {
        let limit = self.model.max_tokens();
        let tokens = self.model.tokenize(text)?;
        if tokens.len() <= limit {
            trace!(tokens = tokens.len(), depth, "Translating single chunk");
            let translated = self.model.generate(&tokens)?;
            return Ok(Translation {
                text: translated,
                chunks: 1,
                depth,
            });
        }

        let slices = split_slices(text, tokens.len(), limit);
        if slices.len() < 2 {
            return Err(TranslateError::Unsplittable {
                chars: text.chars().count(),
                tokens: tokens.len(),
                limit,
            });
        }
        if depth >= self.max_depth {
            return Err(TranslateError::DepthExceeded {
                limit: self.max_depth,
            });
        }
        debug!(
            tokens = tokens.len(),
            limit,
            slices = slices.len(),
            depth,
            "Text over token budget, splitting"
        );

        let mut parts = Vec::with_capacity(slices.len());
        let mut chunks = 0;
        let mut deepest = depth;
        for slice in slices {
            let part = self.translate_at(slice, depth + 1)?;
            chunks += part.chunks;
            deepest = deepest.max(part.depth);
            parts.push(part.text);
        }

        Ok(Translation {
            text: parts.join(" "),
            chunks,
            depth: deepest,
        })
    }
}

/// Cut `text` into `token_count / max_tokens + 1` contiguous character slices.
///
/// All slices but the last are `char_len / num_bins` characters wide; the
/// last one takes the remainder, so no character is dropped. The bin count
/// is clamped to the character length; a result of fewer than two slices
/// means the text cannot be split further.
pub fn split_slices(text: &str, token_count: usize, max_tokens: usize) -> Vec<&str> {
    let char_len = text.chars().count();
    let num_bins = (token_count / max_tokens.max(1) + 1).min(char_len);
    if num_bins < 2 {
        return vec![text];
    }
    let bin_size = char_len / num_bins;

    let offsets: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    (0..num_bins)
        .map(|i| {
            let start = offsets[i * bin_size];
            let end = if i + 1 == num_bins {
                text.len()
            } else {
                offsets[(i + 1) * bin_size]
            };
            &text[start..end]
        })
        .collect()
}
