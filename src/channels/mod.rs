//! Mail retrieval and delivery adapters.
//!
//! The pipeline only sees the `Inbox` and `Outbox` traits. `ImapInbox` and
//! `SmtpOutbox` are the network-backed implementations.

pub mod imap;
pub mod smtp;

pub use imap::ImapInbox;
pub use smtp::SmtpOutbox;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DeliveryError, MailboxError};

/// Server-assigned identifier for one mailbox message (the IMAP UID).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u32> for MessageId {
    fn from(uid: u32) -> Self {
        Self(uid.to_string())
    }
}

impl From<&str> for MessageId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// An unparsed RFC 5322 message as retrieved from the inbox.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: MessageId,
    pub bytes: Vec<u8>,
}

impl RawMessage {
    pub fn new(id: MessageId, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            bytes: bytes.into(),
        }
    }
}

/// A translated message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Mailbox the pipeline reads candidates from.
pub trait Inbox {
    /// Return identifiers matching `criteria` (the transport's own query syntax).
    fn search(&mut self, criteria: &str) -> Result<Vec<MessageId>, MailboxError>;

    /// Fetch the full raw message for `id`.
    fn fetch(&mut self, id: &MessageId) -> Result<RawMessage, MailboxError>;

    /// Close the selected mailbox and log out.
    fn close(&mut self) -> Result<(), MailboxError>;
}

/// Outbound transport for translated messages.
pub trait Outbox {
    fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}

/// Scope guard that closes an inbox exactly once.
///
/// `finish()` closes explicitly and reports the result; if the guard is
/// dropped first (early return, `?`, panic unwind) the session is closed in
/// `Drop` and any error is logged.
pub struct InboxSession<'a> {
    inbox: &'a mut dyn Inbox,
    closed: bool,
}

impl<'a> InboxSession<'a> {
    pub fn new(inbox: &'a mut dyn Inbox) -> Self {
        Self {
            inbox,
            closed: false,
        }
    }

    pub fn search(&mut self, criteria: &str) -> Result<Vec<MessageId>, MailboxError> {
        self.inbox.search(criteria)
    }

    pub fn fetch(&mut self, id: &MessageId) -> Result<RawMessage, MailboxError> {
        self.inbox.fetch(id)
    }

    /// Close the session now and surface the result.
    pub fn finish(mut self) -> Result<(), MailboxError> {
        self.closed = true;
        self.inbox.close()
    }
}

impl Drop for InboxSession<'_> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.inbox.close() {
            Ok(()) => debug!("Inbox session closed on scope exit"),
            Err(e) => warn!(error = %e, "Failed to close inbox session"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingInbox {
        closes: usize,
    }

    impl Inbox for CountingInbox {
        fn search(&mut self, _criteria: &str) -> Result<Vec<MessageId>, MailboxError> {
            Ok(vec![MessageId::from(1)])
        }

        fn fetch(&mut self, _id: &MessageId) -> Result<RawMessage, MailboxError> {
            Err(MailboxError::Closed)
        }

        fn close(&mut self) -> Result<(), MailboxError> {
            self.closes += 1;
            Ok(())
        }
    }

    #[test]
    fn message_id_display_and_from() {
        assert_eq!(MessageId::from(42).to_string(), "42");
        assert_eq!(MessageId::from("abc").as_str(), "abc");
    }

    #[test]
    fn session_closes_on_drop() {
        let mut inbox = CountingInbox::default();
        {
            let mut session = InboxSession::new(&mut inbox);
            assert!(session.fetch(&MessageId::from(1)).is_err());
        }
        assert_eq!(inbox.closes, 1);
    }

    #[test]
    fn finish_closes_exactly_once() {
        let mut inbox = CountingInbox::default();
        {
            let mut session = InboxSession::new(&mut inbox);
            assert_eq!(session.search("ALL").unwrap().len(), 1);
            session.finish().unwrap();
        }
        assert_eq!(inbox.closes, 1);
    }
}
