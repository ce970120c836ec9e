//! Translation pipeline.
//!
//! Every candidate message flows through:
//! 1. `Ledger::contains()`: skip ids handled by an earlier run
//! 2. `Inbox::fetch()`: raw bytes, parsed with `mail-parser`
//! 3. age check against the message's own `Date:` header
//! 4. `normalize`: plain-text parts into paragraph segments
//! 5. `ChunkedTranslator`: segments and subject, within the token budget
//! 6. `Outbox::send()`, then `Ledger::record()` + `persist()`

pub mod normalize;
pub mod processor;
pub mod types;

pub use normalize::{NormalizedBody, PartText};
pub use processor::{SUBJECT_PREFIX, TranslationPipeline};
pub use types::{Outcome, RunParams, RunSummary};
