//! Message repository for ephemail.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::decoder::{DecodedAttachment, DecodedMail};
use super::types::{normalize_page, Attachment, AttachmentInfo, Message};
use crate::datetime::to_micros;
use crate::db::DbPool;
use crate::Result;

const MESSAGE_COLUMNS: &str = "id, address_id, sender, subject, text_body, html_body, created_at";

const ATTACHMENT_INFO_COLUMNS: &str =
    "id, message_id, position, filename, content_type, length(data) AS size";

/// Repository for message and attachment operations.
pub struct MessageRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> MessageRepository<'a> {
    /// Create a new MessageRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a message for `recipient` if that address is live at `now`.
    ///
    /// Resolution and insert are a single statement, so an address that
    /// expires or is deleted concurrently cannot end up with a new message.
    /// Returns the owning address ID, or `None` if nothing was stored.
    pub async fn insert_if_active(
        conn: &mut SqliteConnection,
        message_id: Uuid,
        sender: &str,
        recipient: &str,
        mail: &DecodedMail,
        now: DateTime<Utc>,
    ) -> Result<Option<i64>> {
        let now = to_micros(now);
        let address_id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO messages (id, address_id, sender, subject, text_body, html_body, created_at)
             SELECT ?, id, ?, ?, ?, ?, ?
             FROM addresses
             WHERE address = ? AND expires_at > ?
             RETURNING address_id",
        )
        .bind(message_id)
        .bind(sender)
        .bind(&mail.subject)
        .bind(&mail.text)
        .bind(&mail.html)
        .bind(now)
        .bind(recipient)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(address_id)
    }

    /// Insert an attachment for a message.
    pub async fn insert_attachment(
        conn: &mut SqliteConnection,
        message_id: Uuid,
        position: i64,
        attachment: &DecodedAttachment,
    ) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO attachments (id, message_id, position, filename, content_type, data)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(id)
        .bind(message_id)
        .bind(position)
        .bind(&attachment.filename)
        .bind(&attachment.content_type)
        .bind(&attachment.data)
        .execute(&mut *conn)
        .await?;
        Ok(id)
    }

    /// List messages for an address, newest first.
    ///
    /// `page` starts at 1. Out-of-range values are clamped.
    pub async fn list_for_address(
        &self,
        address_id: i64,
        page: i64,
        page_size: i64,
    ) -> Result<Vec<Message>> {
        let (page, page_size) = normalize_page(page, page_size);
        let sql = format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE address_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ? OFFSET ?"
        );
        let messages = sqlx::query_as::<_, Message>(&sql)
            .bind(address_id)
            .bind(page_size)
            .bind((page - 1) * page_size)
            .fetch_all(self.pool)
            .await?;
        Ok(messages)
    }

    /// Count messages for an address.
    pub async fn count_for_address(&self, address_id: i64) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages WHERE address_id = ?")
            .bind(address_id)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Get a message by ID.
    pub async fn get(&self, message_id: Uuid) -> Result<Option<Message>> {
        let sql = format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?");
        let message = sqlx::query_as::<_, Message>(&sql)
            .bind(message_id)
            .fetch_optional(self.pool)
            .await?;
        Ok(message)
    }

    /// List attachment metadata for a message, in message order.
    pub async fn attachments_for(&self, message_id: Uuid) -> Result<Vec<AttachmentInfo>> {
        let sql = format!(
            "SELECT {ATTACHMENT_INFO_COLUMNS} FROM attachments
             WHERE message_id = ?
             ORDER BY position"
        );
        let attachments = sqlx::query_as::<_, AttachmentInfo>(&sql)
            .bind(message_id)
            .fetch_all(self.pool)
            .await?;
        Ok(attachments)
    }

    /// Get an attachment with its payload.
    ///
    /// The attachment must belong to `message_id`.
    pub async fn get_attachment(
        &self,
        message_id: Uuid,
        attachment_id: Uuid,
    ) -> Result<Option<Attachment>> {
        let attachment = sqlx::query_as::<_, Attachment>(
            "SELECT id, message_id, filename, content_type, data FROM attachments
             WHERE id = ? AND message_id = ?",
        )
        .bind(attachment_id)
        .bind(message_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(attachment)
    }

    /// Delete a single message. Its attachments go with it.
    pub async fn delete(&self, message_id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM messages WHERE id = ?")
            .bind(message_id)
            .execute(self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Count all stored messages.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }

    /// Count all stored attachments.
    pub async fn count_attachments(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM attachments")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}
