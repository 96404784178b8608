//! Address lifecycle service.
//!
//! Lookups used by ingestion and the read side, and the cascading delete
//! shared by explicit deletion and the retention sweeper.

use chrono::{DateTime, Utc};
use tracing::info;

use super::repository::AddressRepository;
use super::types::{Address, Attribution};
use super::validation::validate_address;
use crate::audit::{AuditRecorder, NewAuditEntry};
use crate::datetime;
use crate::db::Database;
use crate::{EphemailError, Result};

/// Service for address lookup and deletion.
#[derive(Clone)]
pub struct AddressService {
    db: Database,
    domain: String,
}

impl AddressService {
    /// Create a new AddressService for the given domain.
    pub fn new(db: Database, domain: impl Into<String>) -> Self {
        Self {
            db,
            domain: domain.into(),
        }
    }

    /// Database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Domain the service accepts addresses for.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resolve an address that is live at `now`.
    ///
    /// Malformed input is rejected before the store is consulted.
    pub async fn find_active(&self, candidate: &str, now: DateTime<Utc>) -> Result<Address> {
        validate_address(candidate, &self.domain)?;

        let repo = AddressRepository::new(self.db.pool());
        let address = repo
            .get_by_address(candidate)
            .await?
            .ok_or_else(|| EphemailError::NotFound("address".to_string()))?;

        if !address.is_active_at(now) {
            return Err(EphemailError::Expired("address".to_string()));
        }
        Ok(address)
    }

    /// Delete an address with all its messages and attachments.
    pub async fn delete_cascade(&self, address_id: i64, attribution: &Attribution) -> Result<()> {
        self.delete_cascade_at(address_id, attribution, datetime::now())
            .await
            .map(|_| ())
    }

    /// Delete an address, recording the audit entry at `now`.
    ///
    /// The "delete" entry, the address row and everything hanging off it go
    /// in one transaction. Returns the removed address.
    pub async fn delete_cascade_at(
        &self,
        address_id: i64,
        attribution: &Attribution,
        now: DateTime<Utc>,
    ) -> Result<Address> {
        let mut tx = self.db.begin().await?;

        let address = AddressRepository::delete_returning(&mut *tx, address_id)
            .await?
            .ok_or_else(|| EphemailError::NotFound("address".to_string()))?;

        let entry = NewAuditEntry::deleted(&address, attribution, datetime::truncate(now));
        AuditRecorder::record(&mut *tx, &entry).await?;

        tx.commit().await?;

        info!(
            address_id = address.id,
            address = %address.address,
            "Address deleted"
        );
        Ok(address)
    }

    /// Delete an address by its string form, whether or not it has expired.
    pub async fn delete_by_address(
        &self,
        candidate: &str,
        attribution: &Attribution,
    ) -> Result<()> {
        validate_address(candidate, &self.domain)?;

        let repo = AddressRepository::new(self.db.pool());
        let address = repo
            .get_by_address(candidate)
            .await?
            .ok_or_else(|| EphemailError::NotFound("address".to_string()))?;

        self.delete_cascade(address.id, attribution).await
    }
}
