//! IMAP inbox over implicit TLS.
//!
//! A small IMAP4rev1 client: LOGIN, SELECT, UID SEARCH, UID FETCH, CLOSE,
//! LOGOUT. Responses are read literal-aware so message bodies containing
//! CRLF or tag-like lines are taken byte-exact.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use secrecy::ExposeSecret;
use tracing::{debug, info};

use crate::channels::{Inbox, MessageId, RawMessage};
use crate::config::ImapConfig;
use crate::error::MailboxError;

/// TLS stream used by the production inbox.
pub type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// One logical response line with its literals split out.
#[derive(Debug, Default)]
struct ResponseLine {
    /// Line text with every `{N}` literal payload removed.
    text: String,
    literals: Vec<Vec<u8>>,
}

/// Result of one tagged command.
#[derive(Debug)]
struct Response {
    untagged: Vec<ResponseLine>,
}

/// IMAP session with a selected mailbox.
pub struct ImapInbox<S: Read + Write = TlsStream> {
    stream: BufReader<S>,
    tag_counter: u32,
    selected: bool,
    logged_out: bool,
}

impl ImapInbox<TlsStream> {
    /// Connect over TLS, log in, and select the configured mailbox.
    pub fn connect(config: &ImapConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port)).map_err(|source| {
            MailboxError::Connect {
                host: config.host.clone(),
                port: config.port,
                source,
            }
        })?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
            .map_err(|e| MailboxError::Tls(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Tls(e.to_string()))?;
        let tls = rustls::StreamOwned::new(conn, tcp);

        let inbox = Self::handshake(
            tls,
            &config.username,
            config.password.expose_secret(),
            &config.mailbox,
        )?;
        info!(host = %config.host, mailbox = %config.mailbox, "IMAP session opened");
        Ok(inbox)
    }
}

impl<S: Read + Write> ImapInbox<S> {
    /// Read the greeting, log in, and select `mailbox` on an open stream.
    pub fn handshake(
        stream: S,
        username: &str,
        password: &str,
        mailbox: &str,
    ) -> Result<Self, MailboxError> {
        let mut inbox = Self {
            stream: BufReader::new(stream),
            tag_counter: 0,
            selected: false,
            logged_out: false,
        };

        let greeting = inbox.read_line()?;
        if !(greeting.text.starts_with("* OK") || greeting.text.starts_with("* PREAUTH")) {
            return Err(MailboxError::Protocol(format!(
                "unexpected greeting: {}",
                greeting.text.trim_end()
            )));
        }

        inbox.command(
            &format!("LOGIN {} {}", quote(username), quote(password)),
            "LOGIN",
        )?;
        inbox.command(&format!("SELECT {}", quote(mailbox)), "SELECT")?;
        inbox.selected = true;
        Ok(inbox)
    }

    /// Send a command and read through its tagged completion.
    ///
    /// `label` replaces the command text in errors so credentials never
    /// reach logs.
    fn command(&mut self, cmd: &str, label: &str) -> Result<Response, MailboxError> {
        self.tag_counter += 1;
        let tag = format!("A{} ", self.tag_counter);
        let full = format!("{tag}{cmd}\r\n");
        let writer = self.stream.get_mut();
        writer.write_all(full.as_bytes())?;
        writer.flush()?;

        let mut untagged = Vec::new();
        loop {
            let line = self.read_line()?;
            if !line.text.starts_with(&tag) {
                untagged.push(line);
                continue;
            }
            let rest = line.text[tag.len()..].trim();
            let (status, reason) = rest.split_once(' ').unwrap_or((rest, ""));
            return match status.to_ascii_uppercase().as_str() {
                "OK" => Ok(Response { untagged }),
                "NO" | "BAD" => Err(MailboxError::Rejected {
                    command: label.to_string(),
                    reason: format!("{status} {reason}").trim().to_string(),
                }),
                _ => Err(MailboxError::Protocol(format!(
                    "unexpected completion for {label}: {rest}"
                ))),
            };
        }
    }

    /// Read one logical line, pulling in any `{N}` literals it announces.
    fn read_line(&mut self) -> Result<ResponseLine, MailboxError> {
        let mut line = ResponseLine::default();
        loop {
            let mut buf = Vec::new();
            let n = self.stream.read_until(b'\n', &mut buf)?;
            if n == 0 {
                return Err(MailboxError::Closed);
            }
            let chunk = String::from_utf8_lossy(&buf);
            let chunk = chunk.trim_end_matches(['\r', '\n']);

            match literal_len(chunk) {
                Some(len) => {
                    line.text.push_str(chunk);
                    let mut literal = vec![0u8; len];
                    self.stream.read_exact(&mut literal)?;
                    line.literals.push(literal);
                }
                None => {
                    line.text.push_str(chunk);
                    return Ok(line);
                }
            }
        }
    }
}

impl<S: Read + Write> Inbox for ImapInbox<S> {
    fn search(&mut self, criteria: &str) -> Result<Vec<MessageId>, MailboxError> {
        let response = self.command(&format!("UID SEARCH {criteria}"), "UID SEARCH")?;
        let mut ids = Vec::new();
        for line in &response.untagged {
            let Some(rest) = line.text.strip_prefix("* SEARCH") else {
                continue;
            };
            for token in rest.split_whitespace() {
                let uid: u32 = token.parse().map_err(|_| {
                    MailboxError::Protocol(format!("non-numeric SEARCH result: {token}"))
                })?;
                ids.push(MessageId::from(uid));
            }
        }
        debug!(count = ids.len(), "UID SEARCH complete");
        Ok(ids)
    }

    fn fetch(&mut self, id: &MessageId) -> Result<RawMessage, MailboxError> {
        let command = format!("UID FETCH {id}");
        let response = self.command(&format!("UID FETCH {id} (BODY.PEEK[])"), &command)?;
        let body = response
            .untagged
            .into_iter()
            .filter(|line| line.text.contains("FETCH"))
            .find_map(|line| line.literals.into_iter().next())
            .ok_or_else(|| MailboxError::Rejected {
                command,
                reason: "no message body returned".into(),
            })?;
        Ok(RawMessage::new(id.clone(), body))
    }

    fn close(&mut self) -> Result<(), MailboxError> {
        if self.logged_out {
            return Ok(());
        }
        let closed = if self.selected {
            self.selected = false;
            self.command("CLOSE", "CLOSE").map(|_| ())
        } else {
            Ok(())
        };
        if closed.as_ref().is_err_and(MailboxError::is_session_fatal) {
            return closed;
        }

        // A rejected CLOSE still leaves a logged-in session behind.
        self.logged_out = true;
        let logged_out = self.command("LOGOUT", "LOGOUT");
        closed?;
        logged_out?;
        info!("IMAP session logged out");
        Ok(())
    }
}

/// Length of a literal announced at the end of `line`, e.g. `BODY[] {342}`.
fn literal_len(line: &str) -> Option<usize> {
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].trim_end_matches('+').parse().ok()
}

/// Quote an IMAP astring.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
