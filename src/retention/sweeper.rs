//! Retention sweeper.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::address::{AddressRepository, AddressService, Attribution};
use crate::datetime;
use crate::{EphemailError, Result};

/// Default interval between sweeps in seconds (1 hour).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 3600;

/// Periodically deletes expired addresses with their messages.
pub struct RetentionSweeper {
    service: AddressService,
    interval: Duration,
    running: Mutex<()>,
}

impl RetentionSweeper {
    /// Create a sweeper running every `interval`.
    pub fn new(service: AddressService, interval: Duration) -> Self {
        Self {
            service,
            interval,
            running: Mutex::new(()),
        }
    }

    /// Delete every address that expired before `now`.
    ///
    /// Returns the number of addresses removed. If another sweep is still in
    /// progress this one does nothing and returns 0.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        self.sweep_until(now, None).await
    }

    async fn sweep_until(
        &self,
        now: DateTime<Utc>,
        shutdown: Option<&watch::Receiver<bool>>,
    ) -> Result<usize> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Sweep already in progress, skipping");
            return Ok(0);
        };

        let repo = AddressRepository::new(self.service.db().pool());
        let expired = repo.list_expired(now).await?;
        if expired.is_empty() {
            debug!("No expired addresses");
            return Ok(0);
        }

        let attribution = Attribution::system();
        let mut deleted = 0;
        for address in &expired {
            if shutdown.is_some_and(|rx| *rx.borrow()) {
                info!(deleted_count = deleted, "Sweep interrupted by shutdown");
                return Ok(deleted);
            }

            match self
                .service
                .delete_cascade_at(address.id, &attribution, now)
                .await
            {
                Ok(_) => deleted += 1,
                Err(EphemailError::NotFound(_)) => {
                    debug!(address_id = address.id, "Address already deleted");
                }
                Err(e) => {
                    warn!(
                        address_id = address.id,
                        address = %address.address,
                        error = %e,
                        "Failed to purge expired address"
                    );
                }
            }
        }

        info!(
            deleted_count = deleted,
            expired_count = expired.len(),
            "Expired addresses purged"
        );
        Ok(deleted)
    }

    /// Run sweeps until `shutdown` turns true or its sender is dropped.
    ///
    /// The first sweep runs immediately.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Retention sweeper started (interval: {} seconds)",
            self.interval.as_secs()
        );

        let stop = shutdown.clone();
        let mut timer = interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*stop.borrow() {
            tokio::select! {
                _ = timer.tick() => {
                    if let Err(e) = self.sweep_until(datetime::now(), Some(&stop)).await {
                        error!("Retention sweep failed: {}", e);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Retention sweeper stopped");
    }

    /// Spawn [`run`](Self::run) as a background task.
    pub fn spawn(self: Arc<Self>, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::NewAddress;
    use crate::audit::{AuditAction, AuditRecorder};
    use crate::mail::{DecodedMail, MessageRepository};
    use crate::Database;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn base_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()
    }

    async fn insert(db: &Database, address: &str, ttl_secs: i64) -> i64 {
        let mut conn = db.pool().acquire().await.unwrap();
        let created = AddressRepository::insert(
            &mut conn,
            &NewAddress {
                address: address.to_string(),
                created_at: base_time(),
                expires_at: base_time() + chrono::Duration::seconds(ttl_secs),
                attribution: Attribution::new(),
            },
        )
        .await
        .unwrap();

        MessageRepository::insert_if_active(
            &mut conn,
            Uuid::new_v4(),
            "sender@remote.test",
            address,
            &DecodedMail::default(),
            base_time(),
        )
        .await
        .unwrap()
        .unwrap();
        created.id
    }

    async fn setup() -> (Database, RetentionSweeper) {
        let db = Database::open_in_memory().await.unwrap();
        let service = AddressService::new(db.clone(), "example.com");
        let sweeper = RetentionSweeper::new(service, Duration::from_secs(3600));
        (db, sweeper)
    }

    #[tokio::test]
    async fn test_sweep_removes_only_expired() {
        let (db, sweeper) = setup().await;
        let expired_a = insert(&db, "expired001@example.com", 10).await;
        let expired_b = insert(&db, "expired002@example.com", 20).await;
        let live = insert(&db, "livelive01@example.com", 7200).await;

        let now = base_time() + chrono::Duration::minutes(5);
        assert_eq!(sweeper.sweep(now).await.unwrap(), 2);

        let repo = AddressRepository::new(db.pool());
        assert!(repo.get_by_id(expired_a).await.unwrap().is_none());
        assert!(repo.get_by_id(expired_b).await.unwrap().is_none());
        assert!(repo.get_by_id(live).await.unwrap().is_some());

        let messages = MessageRepository::new(db.pool());
        assert_eq!(messages.count().await.unwrap(), 1);
        assert_eq!(messages.count_for_address(live).await.unwrap(), 1);

        let recorder = AuditRecorder::new(db.pool());
        assert_eq!(recorder.count_by_action(AuditAction::Delete).await.unwrap(), 2);
        let entries = recorder.list_for_address(expired_a).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].address, "expired001@example.com");
        assert!(entries[0].ip.is_none());

        // Nothing left to do on a second pass
        assert_eq!(sweeper.sweep(now).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_sweep_keeps_address_at_exact_expiry() {
        let (db, sweeper) = setup().await;
        let id = insert(&db, "boundary01@example.com", 60).await;

        let at_expiry = base_time() + chrono::Duration::seconds(60);
        assert_eq!(sweeper.sweep(at_expiry).await.unwrap(), 0);

        let repo = AddressRepository::new(db.pool());
        assert!(repo.get_by_id(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_skips_failing_address() {
        let (db, sweeper) = setup().await;
        insert(&db, "expired001@example.com", 10).await;
        let stuck = insert(&db, "stuckstuck@example.com", 15).await;
        insert(&db, "expired002@example.com", 20).await;

        sqlx::query(
            "CREATE TRIGGER block_stuck BEFORE DELETE ON addresses
             WHEN OLD.address = 'stuckstuck@example.com'
             BEGIN SELECT RAISE(ABORT, 'locked'); END;",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let now = base_time() + chrono::Duration::minutes(5);
        assert_eq!(sweeper.sweep(now).await.unwrap(), 2);

        let repo = AddressRepository::new(db.pool());
        assert_eq!(repo.count().await.unwrap(), 1);
        assert!(repo.get_by_id(stuck).await.unwrap().is_some());

        // The failed delete left no audit entry
        let recorder = AuditRecorder::new(db.pool());
        assert!(recorder.list_for_address(stuck).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sweep_is_single_flight() {
        let (db, sweeper) = setup().await;
        insert(&db, "expired001@example.com", 10).await;

        let guard = sweeper.running.lock().await;
        let now = base_time() + chrono::Duration::minutes(5);
        assert_eq!(sweeper.sweep(now).await.unwrap(), 0);
        drop(guard);

        assert_eq!(sweeper.sweep(now).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_spawn_sweeps_and_stops_on_shutdown() {
        let (db, sweeper) = setup().await;
        // Expired long before the real clock
        insert(&db, "expired001@example.com", 10).await;

        let (tx, rx) = watch::channel(false);
        let handle = Arc::new(sweeper).spawn(rx);

        let repo = AddressRepository::new(db.pool());
        let mut remaining = repo.count().await.unwrap();
        for _ in 0..100 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            remaining = repo.count().await.unwrap();
        }
        assert_eq!(remaining, 0);

        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_run_exits_when_sender_dropped() {
        let (_db, sweeper) = setup().await;
        let (tx, rx) = watch::channel(false);
        let handle = Arc::new(sweeper).spawn(rx);

        drop(tx);
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
