//! Persistence layer — the processed-message ledger.

pub mod ledger;

pub use ledger::Ledger;
