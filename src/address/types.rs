//! Address types for ephemail.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{FromRow, Row};

use crate::datetime::get_timestamp;

/// A disposable address with a fixed lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Address {
    /// Address ID.
    pub id: i64,
    /// Full address (`local-part@domain`).
    pub address: String,
    /// When the address was allocated.
    pub created_at: DateTime<Utc>,
    /// When the address stops accepting mail. Never changes after creation.
    pub expires_at: DateTime<Utc>,
    /// Network peer that requested the address, if known.
    #[serde(skip)]
    pub creator_ip: Option<String>,
    /// Client agent that requested the address, if known.
    #[serde(skip)]
    pub creator_agent: Option<String>,
}

impl Address {
    /// Check whether the address still accepts mail at `now`.
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }
}

impl<'r> FromRow<'r, SqliteRow> for Address {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            address: row.try_get("address")?,
            created_at: get_timestamp(row, "created_at")?,
            expires_at: get_timestamp(row, "expires_at")?,
            creator_ip: row.try_get("creator_ip")?,
            creator_agent: row.try_get("creator_agent")?,
        })
    }
}

/// Best-effort record of who triggered an address mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribution {
    /// Originating network peer.
    pub ip: Option<String>,
    /// Client agent string.
    pub user_agent: Option<String>,
}

impl Attribution {
    /// Create an empty attribution.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribution used for mutations the system performs on its own.
    pub fn system() -> Self {
        Self::default()
    }

    /// Set the originating peer.
    pub fn with_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Set the client agent.
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }
}

/// New address for insertion.
#[derive(Debug, Clone)]
pub struct NewAddress {
    /// Full address string.
    pub address: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Expiration time.
    pub expires_at: DateTime<Utc>,
    /// Who requested the address.
    pub attribution: Attribution,
}
