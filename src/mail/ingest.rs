//! Inbound mail ingestion.
//!
//! The pipeline owns everything between "the transport has a complete
//! payload" and "the message is stored or dropped". The transport only maps
//! the outcome to a reply.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::decoder::{DecodedMail, MailparseDecoder, MimeDecoder};
use super::repository::MessageRepository;
use crate::address::normalize_recipient;
use crate::datetime;
use crate::db::Database;
use crate::{EphemailError, Result};

/// Default ceiling on raw message size (1 MiB).
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Envelope of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Sender as given in MAIL FROM, verbatim.
    pub sender: String,
    /// Recipient as given in RCPT TO.
    pub recipient: String,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipient: recipient.into(),
        }
    }
}

/// Result of a successful ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    /// Message stored under the given ID.
    Stored(Uuid),
    /// Recipient unknown or expired; nothing stored.
    Dropped,
}

/// Pipeline turning an envelope and raw payload into a stored message.
#[derive(Clone)]
pub struct MailIngestionPipeline {
    db: Database,
    decoder: Arc<dyn MimeDecoder>,
    max_message_bytes: usize,
}

impl MailIngestionPipeline {
    /// Create a pipeline using the mailparse decoder and the default size ceiling.
    pub fn new(db: Database) -> Self {
        Self {
            db,
            decoder: Arc::new(MailparseDecoder),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }

    /// Set the size ceiling.
    pub fn with_max_message_bytes(mut self, max_message_bytes: usize) -> Self {
        self.max_message_bytes = max_message_bytes;
        self
    }

    /// Replace the decoder.
    pub fn with_decoder(mut self, decoder: Arc<dyn MimeDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Size ceiling in bytes.
    pub fn max_message_bytes(&self) -> usize {
        self.max_message_bytes
    }

    /// Ingest a message received now.
    pub async fn ingest(&self, envelope: &Envelope, raw: Vec<u8>) -> Result<IngestOutcome> {
        self.ingest_at(envelope, raw, datetime::now()).await
    }

    /// Ingest a message, judging recipient liveness at `now`.
    ///
    /// Unknown or expired recipients yield `Dropped`, indistinguishable to
    /// the sender from a stored message. Oversize payloads fail with
    /// `Validation`, undecodable ones with `Decode`, and storage failures
    /// with `Database`. Nothing is persisted on failure.
    pub async fn ingest_at(
        &self,
        envelope: &Envelope,
        raw: Vec<u8>,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome> {
        if raw.len() > self.max_message_bytes {
            return Err(EphemailError::Validation(format!(
                "message of {} bytes exceeds limit of {}",
                raw.len(),
                self.max_message_bytes
            )));
        }

        let mail = self.decode(raw).await?;
        let recipient = normalize_recipient(&envelope.recipient);
        let now = datetime::truncate(now);

        match self.store(envelope, &recipient, &mail, now).await {
            Ok(Some(id)) => {
                info!(
                    message_id = %id,
                    recipient = %recipient,
                    attachments = mail.attachments.len(),
                    "Message stored"
                );
                Ok(IngestOutcome::Stored(id))
            }
            Ok(None) => {
                debug!(recipient = %recipient, "Recipient unknown or expired, message dropped");
                Ok(IngestOutcome::Dropped)
            }
            Err(e) => {
                error!(recipient = %recipient, error = %e, "Failed to store message");
                Err(e)
            }
        }
    }

    async fn decode(&self, raw: Vec<u8>) -> Result<DecodedMail> {
        let decoder = Arc::clone(&self.decoder);
        // A panicking decoder is our fault, not the sender's
        let mail = tokio::task::spawn_blocking(move || decoder.decode(&raw))
            .await
            .map_err(|e| EphemailError::Internal(format!("decoder task failed: {e}")))??;
        Ok(mail)
    }

    async fn store(
        &self,
        envelope: &Envelope,
        recipient: &str,
        mail: &DecodedMail,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let message_id = Uuid::new_v4();
        let mut tx = self.db.begin().await?;

        let stored = MessageRepository::insert_if_active(
            &mut *tx,
            message_id,
            &envelope.sender,
            recipient,
            mail,
            now,
        )
        .await?;
        if stored.is_none() {
            return Ok(None);
        }

        for (position, attachment) in mail.attachments.iter().enumerate() {
            MessageRepository::insert_attachment(&mut *tx, message_id, position as i64, attachment)
                .await?;
        }

        tx.commit().await?;
        Ok(Some(message_id))
    }
}
