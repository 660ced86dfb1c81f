//! Key-rotation controller.
//!
//! A single timer-driven task that, on each tick, mints successors for
//! issuers nearing expiry (Phase A) and retires issuers whose validity
//! has passed (Phase B). Each phase runs in one transaction with
//! `FOR UPDATE SKIP LOCKED` row claims inside the store, so any number
//! of controller instances can tick concurrently without double-rotating
//! a row, and live issue/redeem traffic is never blocked.
//!
//! A failed phase rolls back and is retried on the next tick; the
//! controller never exits on a per-tick error. Rotation correctness
//! therefore depends on ticks being frequent relative to the expiration
//! window; the default cadence is one tick per minute.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::metrics::ServerMetrics;
use crate::storage::IssuerStore;

/// Default tick cadence.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(60);

pub struct RotationController {
    store: Arc<dyn IssuerStore>,
    metrics: ServerMetrics,
    expiration_window_days: i64,
    renewal_window_days: i64,
    period: Duration,
}

impl RotationController {
    pub fn new(
        store: Arc<dyn IssuerStore>,
        metrics: ServerMetrics,
        expiration_window_days: i64,
        renewal_window_days: i64,
        period: Duration,
    ) -> Self {
        Self {
            store,
            metrics,
            expiration_window_days,
            renewal_window_days,
            period,
        }
    }

    /// Run the controller on its cadence until the task is aborted.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                self.tick().await;
            }
        })
    }

    /// One rotation pass: Phase A (rotate) then Phase B (retire).
    pub async fn tick(&self) {
        self.metrics.rotation_tick();

        match self
            .store
            .rotate_issuers(self.expiration_window_days, self.renewal_window_days)
            .await
        {
            Ok(successors) => {
                if !successors.is_empty() {
                    info!(count = successors.len(), "Rotation pass minted successors");
                    self.metrics.rotated(successors.len() as u64);
                }
            }
            Err(e) => {
                error!(error = %e, "Rotation phase failed; will retry next tick");
                self.metrics.rotation_failure();
            }
        }

        match self.store.retire_issuers().await {
            Ok(retired) => {
                if !retired.is_empty() {
                    info!(count = retired.len(), "Rotation pass retired issuers");
                    self.metrics.retired(retired.len() as u64);
                }
            }
            Err(e) => {
                error!(error = %e, "Retire phase failed; will retry next tick");
                self.metrics.rotation_failure();
            }
        }
    }
}
