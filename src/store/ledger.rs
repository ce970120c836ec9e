//! Dedup ledger — the set of message ids already handled.
//!
//! Stored as a flat file with one id per line, rewritten atomically
//! (temp file + rename) on every `persist`.

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::channels::MessageId;
use crate::error::LedgerError;

/// Persistent set of processed message ids.
#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    order: Vec<MessageId>,
    seen: HashSet<MessageId>,
}

impl Ledger {
    /// Empty ledger backed by `path` (nothing is read or written).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            order: Vec::new(),
            seen: HashSet::new(),
        }
    }

    /// Load the ledger at `path`. A missing file yields an empty ledger.
    ///
    /// Ids may be separated by newlines or commas, so single-row CSV logs
    /// load unchanged.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let mut ledger = Self::new(path);
        let contents = match std::fs::read_to_string(&ledger.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %ledger.path.display(), "No ledger yet, starting empty");
                return Ok(ledger);
            }
            Err(e) => return Err(LedgerError::io(&ledger.path, e)),
        };

        for id in contents
            .split(['\n', ','])
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            ledger.record(MessageId::from(id));
        }
        debug!(path = %ledger.path.display(), entries = ledger.len(), "Ledger loaded");
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, id: &MessageId) -> bool {
        self.seen.contains(id)
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn record(&mut self, id: MessageId) -> bool {
        if !self.seen.insert(id.clone()) {
            return false;
        }
        self.order.push(id);
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &MessageId> {
        self.order.iter()
    }

    /// Overwrite the backing file with the current contents.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };

        let mut tmp =
            tempfile::NamedTempFile::new_in(dir).map_err(|e| LedgerError::io(&self.path, e))?;
        for id in &self.order {
            writeln!(tmp, "{id}").map_err(|e| LedgerError::io(&self.path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| LedgerError::io(&self.path, e))?;
        tmp.persist(&self.path)
            .map_err(|e| LedgerError::io(&self.path, e.error))?;

        debug!(path = %self.path.display(), entries = self.len(), "Ledger persisted");
        Ok(())
    }
}
