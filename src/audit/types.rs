//! Audit trail types for ephemail.

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::address::{Address, Attribution};
use crate::datetime::get_timestamp;

/// Address lifecycle action recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    /// Address was allocated.
    Create,
    /// Address was deleted (expiry or explicit request).
    Delete,
}

impl AuditAction {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "create",
            AuditAction::Delete => "delete",
        }
    }

    /// Parse from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "create" => Some(AuditAction::Create),
            "delete" => Some(AuditAction::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded audit entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    /// Entry ID.
    pub id: i64,
    /// ID of the address the entry refers to. The address may no longer exist.
    pub address_id: i64,
    /// Address string at the time of the action.
    pub address: String,
    /// What happened.
    pub action: AuditAction,
    /// Originating peer, if known.
    pub ip: Option<String>,
    /// Client agent, if known.
    pub user_agent: Option<String>,
    /// When the action happened.
    pub created_at: DateTime<Utc>,
}

impl<'r> FromRow<'r, SqliteRow> for AuditEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        let action: String = row.try_get("action")?;
        let action = AuditAction::parse(&action).ok_or_else(|| sqlx::Error::ColumnDecode {
            index: "action".to_string(),
            source: format!("unknown audit action '{action}'").into(),
        })?;

        Ok(Self {
            id: row.try_get("id")?,
            address_id: row.try_get("address_id")?,
            address: row.try_get("address")?,
            action,
            ip: row.try_get("ip")?,
            user_agent: row.try_get("user_agent")?,
            created_at: get_timestamp(row, "created_at")?,
        })
    }
}

/// New audit entry for insertion.
#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    /// ID of the address acted on.
    pub address_id: i64,
    /// Address string.
    pub address: String,
    /// What happened.
    pub action: AuditAction,
    /// Who triggered it.
    pub attribution: Attribution,
    /// When it happened.
    pub created_at: DateTime<Utc>,
}

impl NewAuditEntry {
    /// Entry for an address that has just been allocated.
    pub fn created(address: &Address, attribution: &Attribution, at: DateTime<Utc>) -> Self {
        Self::for_action(AuditAction::Create, address, attribution, at)
    }

    /// Entry for an address that is being deleted.
    pub fn deleted(address: &Address, attribution: &Attribution, at: DateTime<Utc>) -> Self {
        Self::for_action(AuditAction::Delete, address, attribution, at)
    }

    fn for_action(
        action: AuditAction,
        address: &Address,
        attribution: &Attribution,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            address_id: address.id,
            address: address.address.clone(),
            action,
            attribution: attribution.clone(),
            created_at: at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_roundtrip() {
        for action in [AuditAction::Create, AuditAction::Delete] {
            assert_eq!(AuditAction::parse(action.as_str()), Some(action));
        }
        assert_eq!(AuditAction::parse("access"), None);
        assert_eq!(AuditAction::Delete.to_string(), "delete");
    }

    #[test]
    fn test_new_entry_copies_address() {
        let now = Utc::now();
        let address = Address {
            id: 7,
            address: "abcde12345@example.com".to_string(),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
            creator_ip: None,
            creator_agent: None,
        };
        let attribution = Attribution::new().with_user_agent("test-agent");

        let entry = NewAuditEntry::deleted(&address, &attribution, now);
        assert_eq!(entry.address_id, 7);
        assert_eq!(entry.address, "abcde12345@example.com");
        assert_eq!(entry.action, AuditAction::Delete);
        assert_eq!(entry.attribution.user_agent.as_deref(), Some("test-agent"));
    }
}
