//! Error types for mail-translate.
//!
//! Per-message errors (`MessageError`) are contained by the pipeline loop.
//! Everything that reaches the top-level `Error` ends the run.

use std::path::PathBuf;

/// Top-level error type: anything here terminates the run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mailbox error: {0}")]
    Mailbox(#[from] MailboxError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Model error: {0}")]
    Model(#[from] TranslateError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Retrieval (IMAP) errors.
#[derive(Debug, thiserror::Error)]
pub enum MailboxError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    Connect {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mailbox connection closed by server")]
    Closed,

    #[error("Malformed server response: {0}")]
    Protocol(String),

    #[error("Server rejected {command}: {reason}")]
    Rejected { command: String, reason: String },
}

impl MailboxError {
    /// Whether the session can no longer be used after this error.
    ///
    /// A rejected command leaves the session intact; everything else
    /// means the connection state is unknown.
    pub fn is_session_fatal(&self) -> bool {
        !matches!(self, MailboxError::Rejected { .. })
    }
}

/// Delivery (SMTP) errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Invalid {field} address: {reason}")]
    InvalidAddress { field: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport failed: {0}")]
    Transport(String),
}

/// Translation model errors.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("Model request to {endpoint} failed: {reason}")]
    Request { endpoint: String, reason: String },

    #[error("Invalid response from {endpoint}: {reason}")]
    InvalidResponse { endpoint: String, reason: String },

    #[error("Chunking recursion exceeded depth {limit}")]
    DepthExceeded { limit: usize },

    #[error("Text of {chars} char(s) has {tokens} tokens, over the {limit} token limit, and cannot be split")]
    Unsplittable {
        chars: usize,
        tokens: usize,
        limit: usize,
    },
}

/// Ledger persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger I/O on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl LedgerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors scoped to a single message. The pipeline logs these and moves on.
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    #[error("Message could not be parsed")]
    Unparsable,

    #[error("Invalid or missing Date header: {0}")]
    InvalidDate(String),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] MailboxError),

    #[error("Translation failed: {0}")]
    Translate(#[from] TranslateError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
