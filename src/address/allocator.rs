//! Address allocation.
//!
//! Candidates are drawn at random and inserted directly; the store's unique
//! index is the only race guard. A uniqueness conflict triggers a fresh
//! candidate, up to a fixed number of attempts.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info, warn};

use super::repository::AddressRepository;
use super::types::{Address, Attribution, NewAddress};
use super::validation::{LOCAL_PART_ALPHABET, LOCAL_PART_LENGTH};
use crate::audit::{AuditRecorder, NewAuditEntry};
use crate::datetime;
use crate::db::Database;
use crate::{EphemailError, Result};

/// Default number of candidates tried before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Source of candidate local parts.
pub trait CandidateSource: Send + Sync {
    /// Produce the next candidate local part.
    fn local_part(&self) -> String;
}

/// Uniformly random local parts over the generated-address alphabet.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomLocalPart;

impl CandidateSource for RandomLocalPart {
    fn local_part(&self) -> String {
        let mut rng = rand::rng();
        (0..LOCAL_PART_LENGTH)
            .map(|_| {
                let idx = rng.random_range(0..LOCAL_PART_ALPHABET.len());
                LOCAL_PART_ALPHABET[idx] as char
            })
            .collect()
    }
}

/// Allocates unique disposable addresses.
pub struct AddressAllocator {
    db: Database,
    domain: String,
    ttl: chrono::Duration,
    max_attempts: u32,
    candidates: Arc<dyn CandidateSource>,
}

impl AddressAllocator {
    /// Create an allocator for `domain` issuing addresses that live for `ttl`.
    pub fn new(db: Database, domain: impl Into<String>, ttl: chrono::Duration) -> Self {
        Self {
            db,
            domain: domain.into(),
            ttl,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            candidates: Arc::new(RandomLocalPart),
        }
    }

    /// Set the retry ceiling. Values below one are treated as one.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Replace the candidate source.
    pub fn with_candidate_source(mut self, candidates: Arc<dyn CandidateSource>) -> Self {
        self.candidates = candidates;
        self
    }

    /// Domain addresses are allocated under.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Lifetime given to new addresses.
    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Allocate a new address starting now.
    pub async fn allocate(&self, attribution: &Attribution) -> Result<Address> {
        self.allocate_at(attribution, datetime::now()).await
    }

    /// Allocate a new address created at `now`.
    ///
    /// The address and its "create" audit entry are committed together.
    /// Returns `AllocationExhausted` if every attempt collided.
    pub async fn allocate_at(
        &self,
        attribution: &Attribution,
        now: DateTime<Utc>,
    ) -> Result<Address> {
        let created_at = datetime::truncate(now);
        let expires_at = created_at + self.ttl;

        for attempt in 1..=self.max_attempts {
            let candidate = format!("{}@{}", self.candidates.local_part(), self.domain);
            let new_address = NewAddress {
                address: candidate,
                created_at,
                expires_at,
                attribution: attribution.clone(),
            };

            match self.insert_with_audit(&new_address).await {
                Ok(address) => {
                    info!(
                        address = %address.address,
                        expires_at = %address.expires_at,
                        attempt,
                        "Address allocated"
                    );
                    return Ok(address);
                }
                Err(EphemailError::Conflict(_)) => {
                    debug!(
                        candidate = %new_address.address,
                        attempt,
                        "Address collision, regenerating"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        warn!(
            attempts = self.max_attempts,
            domain = %self.domain,
            "Address allocation exhausted"
        );
        Err(EphemailError::AllocationExhausted(self.max_attempts))
    }

    async fn insert_with_audit(&self, new_address: &NewAddress) -> Result<Address> {
        let mut tx = self.db.begin().await?;

        let address = AddressRepository::insert(&mut *tx, new_address).await?;
        let entry =
            NewAuditEntry::created(&address, &new_address.attribution, new_address.created_at);
        AuditRecorder::record(&mut *tx, &entry).await?;

        tx.commit().await?;
        Ok(address)
    }
}
