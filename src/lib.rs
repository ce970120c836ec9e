//! Mail Translate — poll a mailbox, translate new messages, re-deliver them.

pub mod channels;
pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod store;
