//! Retention module for ephemail.
//!
//! Expired addresses are purged by a periodic background sweep. Each address
//! is deleted in its own transaction with its audit entry, so one failure
//! never blocks the rest of the batch.

mod sweeper;

pub use sweeper::{RetentionSweeper, DEFAULT_SWEEP_INTERVAL_SECS};
