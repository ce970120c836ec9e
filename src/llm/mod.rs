//! Translation model integration.
//!
//! The model is an opaque capability with its own tokenizer and a fixed
//! context window (`max_tokens`). `ChunkedTranslator` layers the recursive
//! length-bounded splitting on top of any `TranslationModel`.

pub mod chunker;
pub mod http;

pub use chunker::{ChunkedTranslator, Translation};
pub use http::HttpTranslationModel;

use crate::error::TranslateError;

/// Token id as produced by the model's tokenizer.
pub type Token = u32;

/// A translation model with a fixed source/target language pair.
pub trait TranslationModel {
    /// Maximum number of tokens a single `generate` call accepts.
    fn max_tokens(&self) -> usize;

    /// Tokenize `text` with the model's own tokenizer.
    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TranslateError>;

    /// Translate an already-tokenized input.
    fn generate(&self, tokens: &[Token]) -> Result<String, TranslateError>;
}

impl<M: TranslationModel + ?Sized> TranslationModel for &M {
    fn max_tokens(&self) -> usize {
        (**self).max_tokens()
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TranslateError> {
        (**self).tokenize(text)
    }

    fn generate(&self, tokens: &[Token]) -> Result<String, TranslateError> {
        (**self).generate(tokens)
    }
}

impl<M: TranslationModel + ?Sized> TranslationModel for Box<M> {
    fn max_tokens(&self) -> usize {
        (**self).max_tokens()
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TranslateError> {
        (**self).tokenize(text)
    }

    fn generate(&self, tokens: &[Token]) -> Result<String, TranslateError> {
        (**self).generate(tokens)
    }
}
