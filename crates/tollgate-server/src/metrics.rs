//! Prometheus metrics for the server.
//!
//! All counters live on one [`Registry`] owned by [`ServerMetrics`] and
//! are exported in text exposition format at `GET /metrics`. The struct
//! is `Clone` and safe to share across handlers and the rotation
//! controller.

use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

/// Redemption outcome label values.
pub const OUTCOME_OK: &str = "ok";
pub const OUTCOME_DUPLICATE: &str = "duplicate";
pub const OUTCOME_UNVERIFIED: &str = "unverified";

#[derive(Clone)]
pub struct ServerMetrics {
    registry: Registry,

    /// Signed tokens handed out, by issuer type.
    tokens_issued: IntCounterVec,

    /// Redemption attempts, by issuer type and outcome.
    redemptions: IntCounterVec,

    rotation_ticks: IntCounter,
    issuers_rotated: IntCounter,
    issuers_retired: IntCounter,
    rotation_failures: IntCounter,
}

impl ServerMetrics {
    /// Create the metrics set and register it on a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let tokens_issued = IntCounterVec::new(
            Opts::new("tollgate_tokens_issued_total", "Signed tokens issued"),
            &["issuer_type"],
        )?;
        let redemptions = IntCounterVec::new(
            Opts::new("tollgate_redemptions_total", "Redemption attempts"),
            &["issuer_type", "outcome"],
        )?;
        let rotation_ticks = IntCounter::new(
            "tollgate_rotation_ticks_total",
            "Rotation controller ticks",
        )?;
        let issuers_rotated = IntCounter::new(
            "tollgate_issuers_rotated_total",
            "Successor issuers minted by the rotation controller",
        )?;
        let issuers_retired = IntCounter::new(
            "tollgate_issuers_retired_total",
            "Issuers retired by the rotation controller",
        )?;
        let rotation_failures = IntCounter::new(
            "tollgate_rotation_failures_total",
            "Rotation phases that failed and will be retried next tick",
        )?;

        registry.register(Box::new(tokens_issued.clone()))?;
        registry.register(Box::new(redemptions.clone()))?;
        registry.register(Box::new(rotation_ticks.clone()))?;
        registry.register(Box::new(issuers_rotated.clone()))?;
        registry.register(Box::new(issuers_retired.clone()))?;
        registry.register(Box::new(rotation_failures.clone()))?;

        Ok(Self {
            registry,
            tokens_issued,
            redemptions,
            rotation_ticks,
            issuers_rotated,
            issuers_retired,
            rotation_failures,
        })
    }

    pub fn record_issuance(&self, issuer_type: &str, count: u64) {
        self.tokens_issued
            .with_label_values(&[issuer_type])
            .inc_by(count);
    }

    pub fn record_redemption(&self, issuer_type: &str, outcome: &str) {
        self.redemptions
            .with_label_values(&[issuer_type, outcome])
            .inc();
    }

    pub fn rotation_tick(&self) {
        self.rotation_ticks.inc();
    }

    pub fn rotation_failure(&self) {
        self.rotation_failures.inc();
    }

    pub fn rotated(&self, count: u64) {
        self.issuers_rotated.inc_by(count);
    }

    pub fn retired(&self, count: u64) {
        self.issuers_retired.inc_by(count);
    }

    /// Render the registry in Prometheus text exposition format.
    pub fn export(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| prometheus::Error::Msg(format!("metrics are not utf-8: {e}")))
    }
}
