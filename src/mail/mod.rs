//! Mail module for ephemail.
//!
//! This module provides inbound mail handling:
//! - MIME decoding into subject, bodies and attachments
//! - Atomic resolve-and-store against live addresses
//! - Read-side message and attachment queries

mod decoder;
mod ingest;
mod repository;
mod types;

pub use decoder::{DecodedAttachment, DecodedMail, MailparseDecoder, MimeDecoder};
pub use ingest::{Envelope, IngestOutcome, MailIngestionPipeline, DEFAULT_MAX_MESSAGE_BYTES};
pub use repository::MessageRepository;
pub use types::{
    normalize_page, Attachment, AttachmentInfo, Message, DEFAULT_CONTENT_TYPE, DEFAULT_PAGE_SIZE,
    MAX_PAGE_SIZE,
};
