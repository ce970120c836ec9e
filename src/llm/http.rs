//! HTTP client for a model-serving sidecar.
//!
//! The sidecar hosts the translation model (mBART-50 in the reference
//! deployment) and exposes its tokenizer and generator:
//!
//! - `POST {base}/tokenize` `{"text", "src_lang"}` → `{"ids": [..]}`
//! - `POST {base}/generate` `{"ids", "src_lang", "tgt_lang"}` → `{"text": ".."}`

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ModelConfig;
use crate::error::TranslateError;
use crate::llm::{Token, TranslationModel};

/// Generation on CPU can take minutes for a full 512-token chunk.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Serialize)]
struct TokenizeRequest<'a> {
    text: &'a str,
    src_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct TokenizeResponse {
    ids: Vec<Token>,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    ids: &'a [Token],
    src_lang: &'a str,
    tgt_lang: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    text: String,
}

/// Blocking HTTP-backed translation model.
pub struct HttpTranslationModel {
    client: reqwest::blocking::Client,
    base_url: String,
    source_lang: String,
    target_lang: String,
    max_tokens: usize,
}

impl HttpTranslationModel {
    pub fn new(config: &ModelConfig) -> Result<Self, TranslateError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TranslateError::Request {
                endpoint: config.url.clone(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;

        info!(
            url = %config.url,
            src = %config.source_lang,
            tgt = %config.target_lang,
            max_tokens = config.max_tokens,
            "Using HTTP translation model"
        );

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            source_lang: config.source_lang.clone(),
            target_lang: config.target_lang.clone(),
            max_tokens: config.max_tokens,
        })
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn post<B, R>(&self, path: &str, body: &B) -> Result<R, TranslateError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let endpoint = self.endpoint(path);
        let response = self
            .client
            .post(&endpoint)
            .json(body)
            .send()
            .map_err(|e| TranslateError::Request {
                endpoint: endpoint.clone(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().unwrap_or_default();
            return Err(TranslateError::Request {
                endpoint,
                reason: format!("HTTP {status}: {}", detail.chars().take(200).collect::<String>()),
            });
        }

        response
            .json()
            .map_err(|e| TranslateError::InvalidResponse {
                endpoint,
                reason: e.to_string(),
            })
    }
}

impl TranslationModel for HttpTranslationModel {
    fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    fn tokenize(&self, text: &str) -> Result<Vec<Token>, TranslateError> {
        let response: TokenizeResponse = self.post(
            "tokenize",
            &TokenizeRequest {
                text,
                src_lang: &self.source_lang,
            },
        )?;
        Ok(response.ids)
    }

    fn generate(&self, tokens: &[Token]) -> Result<String, TranslateError> {
        let response: GenerateResponse = self.post(
            "generate",
            &GenerateRequest {
                ids: tokens,
                src_lang: &self.source_lang,
                tgt_lang: &self.target_lang,
            },
        )?;
        Ok(response.text)
    }
}
