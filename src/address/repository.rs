//! Address repository for ephemail.
//!
//! Reads go through the pool. Writes take a connection so they can run
//! inside the caller's transaction together with the audit entry.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::types::{Address, NewAddress};
use crate::datetime::to_micros;
use crate::db::DbPool;
use crate::Result;

const ADDRESS_COLUMNS: &str =
    "id, address, created_at, expires_at, creator_ip, creator_agent";

/// Repository for address operations.
pub struct AddressRepository<'a> {
    pool: &'a DbPool,
}

impl<'a> AddressRepository<'a> {
    /// Create a new AddressRepository with the given pool reference.
    pub fn new(pool: &'a DbPool) -> Self {
        Self { pool }
    }

    /// Insert a new address.
    ///
    /// A duplicate address string surfaces as `EphemailError::Conflict`.
    pub async fn insert(conn: &mut SqliteConnection, new_address: &NewAddress) -> Result<Address> {
        let sql = format!(
            "INSERT INTO addresses (address, created_at, expires_at, creator_ip, creator_agent)
             VALUES (?, ?, ?, ?, ?)
             RETURNING {ADDRESS_COLUMNS}"
        );
        let address = sqlx::query_as::<_, Address>(&sql)
            .bind(&new_address.address)
            .bind(to_micros(new_address.created_at))
            .bind(to_micros(new_address.expires_at))
            .bind(&new_address.attribution.ip)
            .bind(&new_address.attribution.user_agent)
            .fetch_one(&mut *conn)
            .await?;
        Ok(address)
    }

    /// Delete an address, returning the row that was removed.
    ///
    /// Messages and attachments go with it through the foreign-key cascade.
    pub async fn delete_returning(conn: &mut SqliteConnection, id: i64) -> Result<Option<Address>> {
        let sql = format!("DELETE FROM addresses WHERE id = ? RETURNING {ADDRESS_COLUMNS}");
        let address = sqlx::query_as::<_, Address>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
        Ok(address)
    }

    /// Get an address by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Address>> {
        let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE id = ?");
        let address = sqlx::query_as::<_, Address>(&sql)
            .bind(id)
            .fetch_optional(self.pool)
            .await?;
        Ok(address)
    }

    /// Get an address by its full address string, regardless of expiry.
    pub async fn get_by_address(&self, address: &str) -> Result<Option<Address>> {
        let sql = format!("SELECT {ADDRESS_COLUMNS} FROM addresses WHERE address = ?");
        let address = sqlx::query_as::<_, Address>(&sql)
            .bind(address)
            .fetch_optional(self.pool)
            .await?;
        Ok(address)
    }

    /// List addresses whose expiration time is before `now`, oldest first.
    pub async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Address>> {
        let sql = format!(
            "SELECT {ADDRESS_COLUMNS} FROM addresses WHERE expires_at < ? ORDER BY expires_at, id"
        );
        let addresses = sqlx::query_as::<_, Address>(&sql)
            .bind(to_micros(now))
            .fetch_all(self.pool)
            .await?;
        Ok(addresses)
    }

    /// Count all stored addresses.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM addresses")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::Attribution;
    use crate::{Database, EphemailError};
    use chrono::TimeZone;

    fn new_address(address: &str, expires_in_secs: i64) -> NewAddress {
        let created_at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap();
        NewAddress {
            address: address.to_string(),
            created_at,
            expires_at: created_at + chrono::Duration::seconds(expires_in_secs),
            attribution: Attribution::new().with_ip("198.51.100.1"),
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let created = AddressRepository::insert(&mut conn, &new_address("aaaaaaaaaa@example.com", 3600))
            .await
            .unwrap();
        drop(conn);

        assert_eq!(created.address, "aaaaaaaaaa@example.com");
        assert_eq!(created.creator_ip.as_deref(), Some("198.51.100.1"));
        assert_eq!(
            created.expires_at - created.created_at,
            chrono::Duration::hours(1)
        );

        let repo = AddressRepository::new(db.pool());
        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id, created);
        let by_address = repo
            .get_by_address("aaaaaaaaaa@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(by_address.id, created.id);
        assert!(repo.get_by_address("bbbbbbbbbb@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_insert_duplicate_is_conflict() {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        AddressRepository::insert(&mut conn, &new_address("aaaaaaaaaa@example.com", 60))
            .await
            .unwrap();
        let err = AddressRepository::insert(&mut conn, &new_address("aaaaaaaaaa@example.com", 60))
            .await
            .unwrap_err();
        assert!(matches!(err, EphemailError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_returning() {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        let created = AddressRepository::insert(&mut conn, &new_address("aaaaaaaaaa@example.com", 60))
            .await
            .unwrap();
        let deleted = AddressRepository::delete_returning(&mut conn, created.id)
            .await
            .unwrap();
        assert_eq!(deleted, Some(created.clone()));

        let again = AddressRepository::delete_returning(&mut conn, created.id)
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_list_expired_and_counts() {
        let db = Database::open_in_memory().await.unwrap();
        let mut conn = db.pool().acquire().await.unwrap();

        for (address, ttl) in [
            ("expired001@example.com", 10),
            ("expired002@example.com", 20),
            ("livelive01@example.com", 7200),
        ] {
            AddressRepository::insert(&mut conn, &new_address(address, ttl))
                .await
                .unwrap();
        }
        drop(conn);

        let now = Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap();
        let repo = AddressRepository::new(db.pool());
        let expired = repo.list_expired(now).await.unwrap();
        let names: Vec<_> = expired.iter().map(|a| a.address.as_str()).collect();
        assert_eq!(names, vec!["expired001@example.com", "expired002@example.com"]);

        assert_eq!(repo.count().await.unwrap(), 3);
    }
}
