//! Message types for ephemail.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};
use uuid::Uuid;

use crate::datetime::get_timestamp;

/// Content type recorded when an attachment declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Page size used when the requested one is out of range.
pub const DEFAULT_PAGE_SIZE: i64 = 20;

/// Largest page size a listing will return.
pub const MAX_PAGE_SIZE: i64 = 100;

/// A message received for a disposable address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    /// Message ID.
    pub id: Uuid,
    /// Owning address.
    pub address_id: i64,
    /// Envelope sender, verbatim.
    pub sender: String,
    /// Decoded subject.
    pub subject: String,
    /// Plain-text body.
    pub text_body: String,
    /// HTML body.
    pub html_body: String,
    /// When the message was stored.
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for Message {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            address_id: row.try_get("address_id")?,
            sender: row.try_get("sender")?,
            subject: row.try_get("subject")?,
            text_body: row.try_get("text_body")?,
            html_body: row.try_get("html_body")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }
}

/// Attachment metadata, without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentInfo {
    /// Attachment ID.
    pub id: Uuid,
    /// Owning message.
    pub message_id: Uuid,
    /// Order within the message.
    pub position: i64,
    /// Declared filename, possibly empty.
    pub filename: String,
    /// Declared content type.
    pub content_type: String,
    /// Payload size in bytes.
    pub size: i64,
}

impl<'r> FromRow<'r, SqliteRow> for AttachmentInfo {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            message_id: row.try_get("message_id")?,
            position: row.try_get("position")?,
            filename: row.try_get("filename")?,
            content_type: row.try_get("content_type")?,
            size: row.try_get("size")?,
        })
    }
}

/// An attachment with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Attachment ID.
    pub id: Uuid,
    /// Owning message.
    pub message_id: Uuid,
    /// Declared filename, possibly empty.
    pub filename: String,
    /// Declared content type.
    pub content_type: String,
    /// Decoded payload.
    pub data: Vec<u8>,
}

impl<'r> FromRow<'r, SqliteRow> for Attachment {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            message_id: row.try_get("message_id")?,
            filename: row.try_get("filename")?,
            content_type: row.try_get("content_type")?,
            data: row.try_get("data")?,
        })
    }
}

/// Clamp listing parameters to `(page, page_size)` with `page >= 1`.
pub fn normalize_page(page: i64, page_size: i64) -> (i64, i64) {
    let page = page.max(1);
    let page_size = if (1..=MAX_PAGE_SIZE).contains(&page_size) {
        page_size
    } else {
        DEFAULT_PAGE_SIZE
    };
    (page, page_size)
}
