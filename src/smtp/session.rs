//! A single inbound SMTP session.
//!
//! The session walks the client through greeting, MAIL, a single RCPT and
//! DATA, then hands the payload to the ingestion pipeline. It never reveals
//! whether a recipient exists: RCPT is accepted for any syntactically valid
//! path and unknown recipients are dropped after DATA.
//!
//! When a TLS acceptor is configured the session offers STARTTLS and, after
//! the handshake, continues on the encrypted stream with a fresh state.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::time::timeout;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::command::SmtpCommand;
use super::reply::Reply;
use crate::config::Config;
use crate::mail::{Envelope, IngestOutcome, MailIngestionPipeline};
use crate::{EphemailError, Result};

/// Longest accepted command line, including CRLF.
pub const MAX_COMMAND_LINE: usize = 1024;

/// Chunk size used while reading DATA.
const DATA_CHUNK: usize = 8192;

/// Per-session settings.
#[derive(Clone)]
pub struct SessionSettings {
    /// Name announced in the greeting and replies.
    pub hostname: String,
    /// Largest accepted message body in bytes.
    pub max_message_bytes: usize,
    /// How long a read may wait before the session is dropped.
    pub idle_timeout: Duration,
    /// Acceptor used for STARTTLS. `None` disables the extension.
    pub tls: Option<TlsAcceptor>,
}

impl SessionSettings {
    /// Build settings from the application configuration.
    ///
    /// TLS stays off; attach an acceptor with [`with_tls`](Self::with_tls).
    pub fn from_config(config: &Config) -> Self {
        Self {
            hostname: config.smtp_hostname().to_string(),
            max_message_bytes: config.smtp.max_message_bytes,
            idle_timeout: Duration::from_secs(config.smtp.idle_timeout_secs),
            tls: None,
        }
    }

    /// Offer STARTTLS using `acceptor`.
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }
}

/// Outcome of reading one line.
enum Line {
    Complete(Vec<u8>),
    TooLong,
    Eof,
}

/// Outcome of reading a DATA body.
enum Body {
    Complete(Vec<u8>),
    TooLarge,
    Eof,
}

/// Byte stream a session can run over, plain or encrypted.
trait Transport: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for T {}

/// One SMTP conversation over any bidirectional byte stream.
pub struct SmtpSession {
    id: Uuid,
    stream: BufReader<Box<dyn Transport>>,
    pipeline: MailIngestionPipeline,
    settings: SessionSettings,
    peer: Option<SocketAddr>,
    tls_active: bool,
    greeted: bool,
    from: Option<String>,
    to: Option<String>,
}

impl SmtpSession {
    /// Create a session over `stream`.
    pub fn new<S>(stream: S, pipeline: MailIngestionPipeline, settings: SessionSettings) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let stream: Box<dyn Transport> = Box::new(stream);
        Self {
            id: Uuid::new_v4(),
            stream: BufReader::new(stream),
            pipeline,
            settings,
            peer: None,
            tls_active: false,
            greeted: false,
            from: None,
            to: None,
        }
    }

    /// Record the remote peer for logging.
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Drive the session until QUIT, EOF or idle timeout.
    pub async fn run(mut self) -> Result<()> {
        info!(session_id = %self.id, peer = ?self.peer, "SMTP session opened");

        let greeting = Reply::new(220, format!("{} ESMTP ephemail", self.settings.hostname));
        self.send(&greeting).await?;

        loop {
            let line = match self.read_line(MAX_COMMAND_LINE).await? {
                Some(Line::Complete(line)) => line,
                Some(Line::TooLong) => {
                    self.send(&Reply::new(500, "Line too long")).await?;
                    continue;
                }
                Some(Line::Eof) => {
                    debug!(session_id = %self.id, "Client closed connection");
                    break;
                }
                None => {
                    self.send(&Reply::timeout(&self.settings.hostname)).await?;
                    info!(session_id = %self.id, "SMTP session timed out");
                    break;
                }
            };

            let line = String::from_utf8_lossy(&line);
            let command = SmtpCommand::parse(&line);
            debug!(session_id = %self.id, command = ?command, "SMTP command");

            if command == SmtpCommand::Quit {
                self.send(&Reply::closing(&self.settings.hostname)).await?;
                break;
            }
            if command == SmtpCommand::StartTls {
                match self.settings.tls.clone() {
                    Some(acceptor) if !self.tls_active => {
                        self.send(&Reply::tls_ready()).await?;
                        self = self.upgrade(acceptor).await?;
                    }
                    _ => self.send(&Reply::tls_unavailable()).await?,
                }
                continue;
            }
            if command == SmtpCommand::Data {
                if !self.handle_data().await? {
                    break;
                }
                continue;
            }

            let reply = self.handle(command);
            self.send(&reply).await?;
        }

        info!(session_id = %self.id, "SMTP session closed");
        Ok(())
    }

    fn handle(&mut self, command: SmtpCommand) -> Reply {
        match command {
            SmtpCommand::Helo(client) => {
                self.greeted = true;
                self.reset();
                Reply::new(250, format!("{} greets {}", self.settings.hostname, client))
            }
            SmtpCommand::Ehlo(client) => {
                self.greeted = true;
                self.reset();
                let mut lines = vec![
                    format!("{} greets {}", self.settings.hostname, client),
                    format!("SIZE {}", self.settings.max_message_bytes),
                ];
                if self.settings.tls.is_some() && !self.tls_active {
                    lines.push("STARTTLS".to_string());
                }
                lines.push("8BITMIME".to_string());
                Reply::multiline(250, lines)
            }
            SmtpCommand::Mail { from, size } => {
                if !self.greeted || self.from.is_some() {
                    return Reply::bad_sequence();
                }
                if size.is_some_and(|n| n > self.settings.max_message_bytes) {
                    return Reply::too_large();
                }
                self.from = Some(from);
                Reply::ok()
            }
            SmtpCommand::Rcpt(to) => {
                if self.from.is_none() {
                    return Reply::bad_sequence();
                }
                if self.to.is_some() {
                    return Reply::too_many_recipients();
                }
                self.to = Some(to);
                Reply::ok()
            }
            SmtpCommand::Rset => {
                self.reset();
                Reply::ok()
            }
            SmtpCommand::Noop => Reply::ok(),
            SmtpCommand::Vrfy(_) => Reply::new(
                252,
                "Cannot VRFY user, but will accept message and attempt delivery",
            ),
            SmtpCommand::Invalid(reason) => Reply::syntax(reason),
            SmtpCommand::Unknown(_) => Reply::unrecognized(),
            // Handled by the caller
            SmtpCommand::Data | SmtpCommand::Quit | SmtpCommand::StartTls => {
                Reply::bad_sequence()
            }
        }
    }

    /// Returns false if the connection should close.
    async fn handle_data(&mut self) -> Result<bool> {
        let (Some(from), Some(to)) = (self.from.clone(), self.to.clone()) else {
            self.send(&Reply::bad_sequence()).await?;
            return Ok(true);
        };

        self.send(&Reply::start_data()).await?;

        let body = match self.read_body().await? {
            Some(Body::Complete(body)) => body,
            Some(Body::TooLarge) => {
                self.reset();
                warn!(session_id = %self.id, "Message exceeded size limit");
                self.send(&Reply::too_large()).await?;
                return Ok(true);
            }
            Some(Body::Eof) => return Ok(false),
            None => {
                self.send(&Reply::timeout(&self.settings.hostname)).await?;
                return Ok(false);
            }
        };
        self.reset();

        let envelope = Envelope::new(from, to);
        let reply = match self.pipeline.ingest(&envelope, body).await {
            Ok(IngestOutcome::Stored(_)) | Ok(IngestOutcome::Dropped) => {
                Reply::new(250, "OK: message accepted")
            }
            Err(EphemailError::Validation(_)) => Reply::too_large(),
            Err(EphemailError::Decode(e)) => {
                warn!(session_id = %self.id, error = %e, "Rejected undecodable message");
                Reply::rejected()
            }
            Err(e) if e.is_transient() => {
                warn!(session_id = %self.id, error = %e, "Delivery deferred");
                Reply::storage_failure()
            }
            Err(e) => {
                error!(session_id = %self.id, error = %e, "Unexpected ingestion error");
                Reply::storage_failure()
            }
        };
        self.send(&reply).await?;
        Ok(true)
    }

    /// Run the TLS handshake and continue on the encrypted stream.
    ///
    /// Anything the client pipelined after STARTTLS is discarded, and the
    /// client has to greet again.
    async fn upgrade(self, acceptor: TlsAcceptor) -> Result<Self> {
        let stream = self.stream.into_inner();
        let tls = timeout(self.settings.idle_timeout, acceptor.accept(stream))
            .await
            .map_err(|_| EphemailError::Tls("handshake timed out".to_string()))?
            .map_err(|e| EphemailError::Tls(format!("handshake failed: {e}")))?;
        info!(session_id = %self.id, "TLS established");

        let stream: Box<dyn Transport> = Box::new(tls);
        Ok(Self {
            stream: BufReader::new(stream),
            tls_active: true,
            greeted: false,
            from: None,
            to: None,
            ..self
        })
    }

    fn reset(&mut self) {
        self.from = None;
        self.to = None;
    }

    async fn send(&mut self, reply: &Reply) -> Result<()> {
        let stream = self.stream.get_mut();
        stream.write_all(&reply.to_wire()).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read one line of at most `limit` bytes. `None` on idle timeout.
    async fn read_line(&mut self, limit: usize) -> Result<Option<Line>> {
        let mut buf = Vec::new();
        let Some(n) = self.read_chunk(&mut buf, limit).await? else {
            return Ok(None);
        };
        if n == 0 {
            return Ok(Some(Line::Eof));
        }
        if buf.ends_with(b"\n") {
            return Ok(Some(Line::Complete(buf)));
        }

        // Discard the remainder of an overlong line
        loop {
            buf.clear();
            match self.read_chunk(&mut buf, limit).await? {
                None => return Ok(None),
                Some(0) => return Ok(Some(Line::Eof)),
                Some(_) if buf.ends_with(b"\n") => return Ok(Some(Line::TooLong)),
                Some(_) => {}
            }
        }
    }

    /// Read a dot-terminated body, undoing dot-stuffing.
    ///
    /// Once the limit is exceeded the rest of the body is read and
    /// discarded so the client stays in sync.
    async fn read_body(&mut self) -> Result<Option<Body>> {
        let limit = self.settings.max_message_bytes;
        let mut body = Vec::new();
        let mut chunk = Vec::new();
        let mut at_line_start = true;
        let mut too_large = false;

        loop {
            chunk.clear();
            match self.read_chunk(&mut chunk, DATA_CHUNK).await? {
                None => return Ok(None),
                Some(0) => return Ok(Some(Body::Eof)),
                Some(_) => {}
            }

            let mut data = chunk.as_slice();
            if at_line_start {
                if data == b".\r\n" || data == b".\n" {
                    break;
                }
                if data.first() == Some(&b'.') {
                    data = &data[1..];
                }
            }
            at_line_start = chunk.ends_with(b"\n");

            if too_large {
                continue;
            }
            if body.len() + data.len() > limit {
                too_large = true;
                body = Vec::new();
                continue;
            }
            body.extend_from_slice(data);
        }

        if too_large {
            Ok(Some(Body::TooLarge))
        } else {
            Ok(Some(Body::Complete(body)))
        }
    }

    /// Read up to `limit` bytes through the next newline, bounded by the
    /// idle timeout. `None` on timeout.
    async fn read_chunk(&mut self, buf: &mut Vec<u8>, limit: usize) -> Result<Option<usize>> {
        let mut reader = (&mut self.stream).take(limit as u64);
        match timeout(self.settings.idle_timeout, reader.read_until(b'\n', buf)).await {
            Ok(result) => Ok(Some(result?)),
            Err(_) => Ok(None),
        }
    }
}
