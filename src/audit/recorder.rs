//! Append-only audit recorder.
//!
//! Entries are written on the same connection, inside the same transaction,
//! as the address create or delete that triggers them. A failed audit write
//! therefore fails the whole mutation: an address is never created or
//! removed without its entry. This makes allocation and deletion depend on
//! the audit table being writable, which is intentional.
//!
//! The store rejects UPDATE and DELETE on `audit_log`, and the table has no
//! foreign key, so entries survive the cascade that removes their address.

use sqlx::SqliteConnection;
use tracing::debug;

use super::types::{AuditAction, AuditEntry, NewAuditEntry};
use crate::datetime::to_micros;
use crate::db::DbPool;
use crate::Result;

const AUDIT_COLUMNS: &str = "id, address_id, address, action, ip, user_agent, created_at";

/// Recorder and reader for the audit trail.
pub struct AuditRecorder<'a> {
    pool: &'a DbPool,
}

impl<'a> AuditRecorder<'a> {
    /// Create a new AuditRecorder with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Append an entry using the caller's connection or transaction.
    pub async fn record(conn: &mut SqliteConnection, entry: &NewAuditEntry) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO audit_log (address_id, address, action, ip, user_agent, created_at)
             VALUES (?, ?, ?, ?, ?, ?)
             RETURNING id",
        )
        .bind(entry.address_id)
        .bind(&entry.address)
        .bind(entry.action.as_str())
        .bind(&entry.attribution.ip)
        .bind(&entry.attribution.user_agent)
        .bind(to_micros(entry.created_at))
        .fetch_one(&mut *conn)
        .await?;

        debug!(
            audit_id = id,
            address = %entry.address,
            action = %entry.action,
            "Audit entry recorded"
        );
        Ok(id)
    }

    /// List all entries for an address in the order they were written.
    pub async fn list_for_address(&self, address_id: i64) -> Result<Vec<AuditEntry>> {
        let sql = format!("SELECT {AUDIT_COLUMNS} FROM audit_log WHERE address_id = ? ORDER BY id");
        let entries = sqlx::query_as::<_, AuditEntry>(&sql)
            .bind(address_id)
            .fetch_all(self.pool)
            .await?;
        Ok(entries)
    }

    /// Count entries with the given action.
    pub async fn count_by_action(&self, action: AuditAction) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM audit_log WHERE action = ?")
            .bind(action.as_str())
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{Address, Attribution};
    use crate::Database;
    use chrono::Utc;

    fn address(id: i64) -> Address {
        let now = crate::datetime::now();
        Address {
            id,
            address: format!("{:0>10}@example.com", id),
            created_at: now,
            expires_at: now + chrono::Duration::hours(1),
            creator_ip: None,
            creator_agent: None,
        }
    }

    #[tokio::test]
    async fn test_record_and_list() {
        let db = Database::open_in_memory().await.unwrap();
        let addr = address(1);
        let now = crate::datetime::now();
        let attribution = Attribution::new().with_ip("192.0.2.10");

        let mut conn = db.pool().acquire().await.unwrap();
        AuditRecorder::record(&mut conn, &NewAuditEntry::created(&addr, &attribution, now))
            .await
            .unwrap();
        AuditRecorder::record(
            &mut conn,
            &NewAuditEntry::deleted(&addr, &Attribution::system(), now),
        )
        .await
        .unwrap();
        drop(conn);

        let recorder = AuditRecorder::new(db.pool());
        let entries = recorder.list_for_address(1).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, AuditAction::Create);
        assert_eq!(entries[0].ip.as_deref(), Some("192.0.2.10"));
        assert_eq!(entries[0].created_at, now);
        assert_eq!(entries[1].action, AuditAction::Delete);
        assert!(entries[1].ip.is_none());

        assert_eq!(recorder.count_by_action(AuditAction::Create).await.unwrap(), 1);
        assert_eq!(recorder.count_by_action(AuditAction::Delete).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_record_is_rolled_back_with_transaction() {
        let db = Database::open_in_memory().await.unwrap();
        let addr = address(2);

        {
            let mut tx = db.begin().await.unwrap();
            AuditRecorder::record(
                &mut tx,
                &NewAuditEntry::created(&addr, &Attribution::new(), Utc::now()),
            )
            .await
            .unwrap();
        }

        let recorder = AuditRecorder::new(db.pool());
        assert!(recorder.list_for_address(2).await.unwrap().is_empty());
    }
}
