//! ephemail - disposable, time-limited email addresses.
//!
//! Addresses are allocated with a fixed lifetime, receive mail over SMTP
//! while live, and are purged together with their messages once expired.
//! Every allocation and deletion is recorded in an append-only audit trail.

pub mod address;
pub mod audit;
pub mod config;
pub mod datetime;
pub mod db;
pub mod error;
pub mod logging;
pub mod mail;
pub mod retention;
pub mod smtp;

pub use address::{
    is_well_formed_address, Address, AddressAllocator, AddressRepository, AddressService,
    Attribution,
};
pub use audit::{AuditAction, AuditEntry, AuditRecorder};
pub use config::Config;
pub use db::Database;
pub use error::{EphemailError, Result};
pub use mail::{Envelope, IngestOutcome, MailIngestionPipeline, Message, MessageRepository};
pub use retention::RetentionSweeper;
pub use smtp::{SessionSettings, SmtpServer};
