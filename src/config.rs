//! Configuration types, built once from environment variables.
//!
//! Nothing below `main` reads the environment; the structs here are passed
//! by reference into the inbox, outbox and model constructors.

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default MAXTOK of the reference mBART-50 deployment.
pub const DEFAULT_MAX_TOKENS: usize = 512;

/// Retrieval (IMAP) settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
}

/// Delivery (SMTP) settings.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub sender_address: String,
    pub recipient_address: String,
}

/// Translation model settings.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Base URL of the model-serving sidecar.
    pub url: String,
    pub source_lang: String,
    pub target_lang: String,
    /// Maximum tokens accepted per `generate` call.
    pub max_tokens: usize,
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub imap: ImapConfig,
    pub smtp: SmtpConfig,
    pub model: ModelConfig,
}

impl Config {
    /// Build config from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| -> Result<String, ConfigError> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
        };

        let imap_host = required("MT_IMAP_HOST")?;
        let imap = ImapConfig {
            port: parse_or(&lookup, "MT_IMAP_PORT", 993)?,
            username: required("MT_IMAP_USERNAME")?,
            password: SecretString::from(required("MT_IMAP_PASSWORD")?),
            mailbox: lookup("MT_IMAP_MAILBOX").unwrap_or_else(|| "INBOX".to_string()),
            host: imap_host.clone(),
        };

        let smtp = SmtpConfig {
            host: lookup("MT_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp")),
            port: parse_or(&lookup, "MT_SMTP_PORT", 587)?,
            username: required("MT_SMTP_USERNAME")?,
            password: SecretString::from(required("MT_SMTP_PASSWORD")?),
            sender_address: required("MT_SENDER_ADDRESS")?,
            recipient_address: required("MT_RECIPIENT_ADDRESS")?,
        };

        let max_tokens = parse_or(&lookup, "MT_MAX_TOKENS", DEFAULT_MAX_TOKENS)?;
        if max_tokens == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MT_MAX_TOKENS".into(),
                message: "must be greater than zero".into(),
            });
        }

        let model = ModelConfig {
            url: lookup("MT_MODEL_URL").unwrap_or_else(|| "http://127.0.0.1:8088".to_string()),
            source_lang: lookup("MT_SOURCE_LANG").unwrap_or_else(|| "de_DE".to_string()),
            target_lang: lookup("MT_TARGET_LANG").unwrap_or_else(|| "en_XX".to_string()),
            max_tokens,
        };

        Ok(Self { imap, smtp, model })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}
