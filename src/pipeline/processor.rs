//! Translation pipeline — dedup → age check → normalize → translate →
//! deliver → record.
//!
//! Messages are processed strictly one at a time. The ledger is persisted
//! after every recorded message, so a crash re-processes at most the
//! message that was in flight.
//!
//! Failure policy:
//! - per-message errors are logged and the loop continues; the id stays
//!   out of the ledger and is retried on the next run
//! - session-fatal inbox errors and ledger I/O errors end the run
//! - the inbox session is closed on every exit path

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use tracing::{debug, error, info, warn};

use crate::channels::{Inbox, InboxSession, OutboundMessage, Outbox, RawMessage};
use crate::error::{Error, MessageError};
use crate::llm::{ChunkedTranslator, TranslationModel};
use crate::pipeline::normalize;
use crate::pipeline::types::{Outcome, RunParams, RunSummary};
use crate::store::Ledger;

/// Marker prepended to every re-delivered subject.
pub const SUBJECT_PREFIX: &str = "TRANSLATION: ";

/// Orchestrates one pass over the inbox.
pub struct TranslationPipeline<M> {
    translator: ChunkedTranslator<M>,
    outbox: Box<dyn Outbox>,
    params: RunParams,
}

impl<M: TranslationModel> TranslationPipeline<M> {
    pub fn new(translator: ChunkedTranslator<M>, outbox: Box<dyn Outbox>, params: RunParams) -> Self {
        Self {
            translator,
            outbox,
            params,
        }
    }

    pub fn params(&self) -> &RunParams {
        &self.params
    }

    /// Process every message matching the search criteria.
    ///
    /// `shutdown` is checked between messages; once set, the current
    /// message finishes, the session is closed, and the summary comes back
    /// with `stopped` set.
    pub fn run(
        &self,
        inbox: &mut dyn Inbox,
        ledger: &mut Ledger,
        shutdown: &AtomicBool,
    ) -> Result<RunSummary, Error> {
        let mut session = InboxSession::new(inbox);
        let ids = session.search(&self.params.criteria)?;
        info!(
            count = ids.len(),
            criteria = %self.params.criteria,
            "Candidate messages found"
        );

        let total = ids.len();
        let mut summary = RunSummary::default();

        for (idx, id) in ids.iter().enumerate() {
            if shutdown.load(Ordering::Relaxed) {
                warn!(remaining = total - idx, "Shutdown requested, stopping run");
                summary.stopped = true;
                break;
            }
            summary.seen += 1;
            debug!(id = %id, n = idx + 1, total, "Looking at message");

            if ledger.contains(id) {
                debug!(id = %id, "Already translated");
                summary.record(&Outcome::AlreadyProcessed);
                continue;
            }

            let result = session
                .fetch(id)
                .map_err(MessageError::from)
                .and_then(|raw| self.process_message(&raw, Utc::now()));

            match result {
                Ok(outcome) => {
                    if outcome.marks_seen() {
                        ledger.record(id.clone());
                        ledger.persist()?;
                        debug!(id = %id, outcome = outcome.label(), "Recorded in ledger");
                    }
                    summary.record(&outcome);
                }
                Err(MessageError::Fetch(e)) if e.is_session_fatal() => {
                    error!(id = %id, error = %e, "Inbox session failed, aborting run");
                    return Err(e.into());
                }
                Err(e) => {
                    error!(id = %id, error = %e, "Failed to process message");
                    summary.failed += 1;
                }
            }
        }

        session.finish()?;
        info!(
            seen = summary.seen,
            delivered = summary.delivered,
            already_processed = summary.already_processed,
            too_old = summary.too_old,
            no_content = summary.no_content,
            failed = summary.failed,
            stopped = summary.stopped,
            "Run complete"
        );
        Ok(summary)
    }

    /// Run one fetched message through age check, normalization,
    /// translation and delivery. Does not touch the ledger.
    pub fn process_message(
        &self,
        raw: &RawMessage,
        now: DateTime<Utc>,
    ) -> Result<Outcome, MessageError> {
        let id = &raw.id;
        let message = MessageParser::default()
            .parse(raw.bytes.as_slice())
            .ok_or(MessageError::Unparsable)?;

        let date = message_date(&message)?;
        let age_days = (now - date).num_days();
        if is_too_old(age_days, self.params.max_age_days) {
            info!(
                id = %id,
                age_days,
                max_age_days = self.params.max_age_days,
                "Skipping message older than threshold"
            );
            return Ok(Outcome::TooOld { age_days });
        }

        let parts = normalize::extract_parts(&message, &raw.bytes);
        let degraded_parts = parts.iter().filter(|p| p.is_degraded()).count();
        if degraded_parts > 0 {
            warn!(
                id = %id,
                parts = degraded_parts,
                "Degraded decode, using raw payload"
            );
        }

        let body = normalize::normalize_parts(&parts);
        if body.is_empty() {
            info!(id = %id, "No text found, maybe an image-only message");
            return Ok(Outcome::NoContent);
        }

        let started = Instant::now();
        let mut translated = Vec::with_capacity(body.len());
        let mut chunks = 0;
        for segment in &body.segments {
            let translation = self.translator.translate_counted(segment)?;
            chunks += translation.chunks;
            translated.push(translation.text);
        }
        info!(
            id = %id,
            segments = body.len(),
            chunks,
            elapsed_secs = started.elapsed().as_secs_f64(),
            "Body translated"
        );

        let subject = message.subject().unwrap_or_default();
        let translated_subject = self.translator.translate(subject.trim())?;

        let outbound = OutboundMessage {
            from: self.params.sender_address.clone(),
            to: self.params.recipient_address.clone(),
            subject: format!("{SUBJECT_PREFIX}{translated_subject}"),
            body: translated.join("\n"),
        };
        self.outbox.send(&outbound)?;
        info!(id = %id, "Sent translated message");

        Ok(Outcome::Delivered {
            segments: body.len(),
            chunks,
            degraded: body.degraded,
        })
    }
}

/// Age filter. A message exactly `max_age_days` old is kept.
pub fn is_too_old(age_days: i64, max_age_days: i64) -> bool {
    age_days > max_age_days
}

/// The message's own `Date:` header as UTC.
pub fn message_date(message: &mail_parser::Message<'_>) -> Result<DateTime<Utc>, MessageError> {
    let date = message
        .date()
        .ok_or_else(|| MessageError::InvalidDate("missing or unparsable Date header".into()))?;

    if !(1..=12).contains(&date.month) || !(1..=31).contains(&date.day) {
        return Err(MessageError::InvalidDate(format!(
            "out-of-range date {}-{}-{}",
            date.year, date.month, date.day
        )));
    }

    DateTime::from_timestamp(date.to_timestamp(), 0)
        .ok_or_else(|| MessageError::InvalidDate(format!("timestamp out of range: {}", date.to_rfc3339())))
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use chrono::TimeZone;

    use super::*;
    use crate::channels::MessageId;
    use crate::error::{DeliveryError, TranslateError};
    use crate::llm::Token;

    /// Character tokenizer; "translation" is upper-casing.
    struct UpperModel;

    impl TranslationModel for UpperModel {
        fn max_tokens(&self) -> usize {
            64
        }

        fn tokenize(&self, text: &str) -> Result<Vec<Token>, TranslateError> {
            Ok(text.chars().map(|c| c as Token).collect())
        }

        fn generate(&self, tokens: &[Token]) -> Result<String, TranslateError> {
            Ok(tokens
                .iter()
                .filter_map(|t| char::from_u32(*t))
                .collect::<String>()
                .to_uppercase())
        }
    }

    #[derive(Clone, Default)]
    struct RecordingOutbox {
        sent: Arc<Mutex<Vec<OutboundMessage>>>,
        fail: bool,
    }

    impl Outbox for RecordingOutbox {
        fn send(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
            if self.fail {
                return Err(DeliveryError::Transport("connection reset".into()));
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    fn pipeline(outbox: RecordingOutbox) -> TranslationPipeline<UpperModel> {
        TranslationPipeline::new(
            ChunkedTranslator::new(UpperModel),
            Box::new(outbox),
            RunParams {
                criteria: "ALL".into(),
                max_age_days: 10,
                sender_address: "bot@example.com".into(),
                recipient_address: "me@example.com".into(),
            },
        )
    }

    fn raw(date: &str, subject: &str, body: &str) -> RawMessage {
        let bytes = format!(
            "From: sender@uni-potsdam.de\r\nDate: {date}\r\nSubject: {subject}\r\n\r\n{body}"
        );
        RawMessage::new(MessageId::from(1), bytes.into_bytes())
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    // ── Age filter ──────────────────────────────────────────────────

    #[test]
    fn age_comparator_is_strictly_greater() {
        assert!(!is_too_old(10, 10));
        assert!(is_too_old(11, 10));
        assert!(!is_too_old(0, 10));
    }

    #[test]
    fn message_exactly_at_threshold_is_kept() {
        let outbox = RecordingOutbox::default();
        let p = pipeline(outbox.clone());
        let msg = raw("Fri, 09 Oct 2026 12:00:00 +0000", "Hallo", "Guten Tag zusammen");
        let outcome = p.process_message(&msg, at(2026, 10, 19, 12, 0, 30)).unwrap();
        assert!(matches!(outcome, Outcome::Delivered { .. }));
        assert_eq!(outbox.sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn message_one_day_past_threshold_is_skipped() {
        let outbox = RecordingOutbox::default();
        let p = pipeline(outbox.clone());
        let msg = raw("Fri, 09 Oct 2026 12:00:00 +0000", "Hallo", "Guten Tag zusammen");
        let outcome = p.process_message(&msg, at(2026, 10, 20, 12, 0, 30)).unwrap();
        assert_eq!(outcome, Outcome::TooOld { age_days: 11 });
        assert!(outbox.sent.lock().unwrap().is_empty());
    }

    #[test]
    fn timezone_offset_respected() {
        let msg = MessageParser::default()
            .parse(b"Date: Mon, 19 Oct 2026 10:00:00 +0200\r\n\r\nx".as_slice())
            .unwrap();
        assert_eq!(message_date(&msg).unwrap(), at(2026, 10, 19, 8, 0, 0));
    }

    #[test]
    fn missing_date_is_per_message_error() {
        let outbox = RecordingOutbox::default();
        let p = pipeline(outbox);
        let msg = RawMessage::new(
            MessageId::from(2),
            b"Subject: kein Datum\r\n\r\nein Text ohne Datum".to_vec(),
        );
        assert!(matches!(
            p.process_message(&msg, Utc::now()),
            Err(MessageError::InvalidDate(_))
        ));
    }

    // ── Delivery ────────────────────────────────────────────────────

    #[test]
    fn delivered_message_is_translated_and_prefixed() {
        let outbox = RecordingOutbox::default();
        let p = pipeline(outbox.clone());
        let now = at(2026, 10, 19, 9, 0, 0);
        let msg = raw(
            "Mon, 19 Oct 2026 08:00:00 +0000",
            "Rundschreiben",
            "Hallo\r\nWelt\r\n\r\nNeue Zeile",
        );

        let outcome = p.process_message(&msg, now).unwrap();
        assert_eq!(
            outcome,
            Outcome::Delivered {
                segments: 2,
                chunks: 2,
                degraded: false
            }
        );

        let sent = outbox.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "TRANSLATION: RUNDSCHREIBEN");
        assert_eq!(sent[0].body, "HALLO WELT\nNEUE ZEILE");
        assert_eq!(sent[0].from, "bot@example.com");
        assert_eq!(sent[0].to, "me@example.com");
    }

    #[test]
    fn empty_subject_keeps_prefix_only() {
        let outbox = RecordingOutbox::default();
        let p = pipeline(outbox.clone());
        let msg = raw("Mon, 19 Oct 2026 08:00:00 +0000", "", "zwei Worte");
        p.process_message(&msg, at(2026, 10, 19, 9, 0, 0)).unwrap();
        assert_eq!(outbox.sent.lock().unwrap()[0].subject, "TRANSLATION: ");
    }

    #[test]
    fn delivery_failure_is_per_message_error() {
        let outbox = RecordingOutbox {
            fail: true,
            ..Default::default()
        };
        let p = pipeline(outbox);
        let msg = raw("Mon, 19 Oct 2026 08:00:00 +0000", "Hi", "zwei Worte");
        assert!(matches!(
            p.process_message(&msg, at(2026, 10, 19, 9, 0, 0)),
            Err(MessageError::Delivery(_))
        ));
    }

    #[test]
    fn image_only_is_no_content() {
        let outbox = RecordingOutbox::default();
        let p = pipeline(outbox.clone());
        let msg = raw("Mon, 19 Oct 2026 08:00:00 +0000", "Bild", "iVBORw0KGgoAAAANSUhEUg");
        assert_eq!(
            p.process_message(&msg, at(2026, 10, 19, 9, 0, 0)).unwrap(),
            Outcome::NoContent
        );
        assert!(outbox.sent.lock().unwrap().is_empty());
    }
}
