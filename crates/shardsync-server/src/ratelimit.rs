//! Fleet-wide rate-limit interval.
//!
//! One value, last write wins. Every accepted set is broadcast to the
//! connected clusters, even when the value did not change. Propagation is
//! best effort: clusters that miss a broadcast pick the value up with
//! `RATELIMIT_FETCH` or on their next start.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use shardsync_core::events::{EventPayload, SyncedRatelimit};
use shardsync_core::{Result, SyncError};
use tracing::info;

use crate::manager::{BroadcastReport, ConnectionManager};

/// Baseline interval: 20ms.
pub const DEFAULT_INTERVAL_NANOS: i64 = 20_000_000;

/// Nanoseconds as fractional milliseconds, for display.
#[allow(clippy::cast_precision_loss)]
pub fn nanos_to_millis(nanos: i64) -> f64 {
    nanos as f64 / 1_000_000.0
}

/// Holds and propagates the shared rate-limit interval.
pub struct RatelimitCoordinator {
    interval_nanos: AtomicI64,
    manager: Arc<ConnectionManager>,
}

impl RatelimitCoordinator {
    /// Start from `initial_nanos`, or the baseline if it is not positive.
    pub fn new(manager: Arc<ConnectionManager>, initial_nanos: i64) -> Self {
        let initial = if initial_nanos > 0 {
            initial_nanos
        } else {
            DEFAULT_INTERVAL_NANOS
        };
        Self {
            interval_nanos: AtomicI64::new(initial),
            manager,
        }
    }

    /// Current interval in nanoseconds.
    pub fn interval_nanos(&self) -> i64 {
        self.interval_nanos.load(Ordering::SeqCst)
    }

    /// Store a new interval and broadcast it.
    ///
    /// Non-positive values are rejected and leave the current value alone.
    pub fn set_interval_nanos(&self, value: i64) -> Result<BroadcastReport> {
        if value <= 0 {
            return Err(SyncError::InvalidInterval(value));
        }
        let previous = self.interval_nanos.swap(value, Ordering::SeqCst);
        let report = self.manager.broadcast(&self.payload())?;
        info!(
            previous,
            interval_nanos = value,
            interval_ms = nanos_to_millis(value),
            recipients = report.attempted,
            "rate-limit interval updated"
        );
        Ok(report)
    }

    /// The `SYNCED_RATELIMIT` payload for the current value.
    pub fn payload(&self) -> EventPayload {
        EventPayload::SyncedRatelimit(SyncedRatelimit {
            interval_time_nanos: self.interval_nanos(),
        })
    }
}
