//! Audit module for ephemail.
//!
//! An append-only ledger of address create and delete events. Entries are
//! written only as a side effect of those two mutations, never for message
//! or attachment changes.

mod recorder;
mod types;

pub use recorder::AuditRecorder;
pub use types::{AuditAction, AuditEntry, NewAuditEntry};
