//! Liveness and readiness state.
//!
//! Liveness is unconditional once the process serves traffic. Readiness means
//! "at least one collector has succeeded since start". A collector that
//! starts failing later does not flip the process back to not-ready, because
//! its last-known-good samples remain servable.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Last observed outcome for one collector.
#[derive(Debug, Clone, Serialize)]
pub struct CollectorStatus {
    /// Whether the most recent tick succeeded.
    pub healthy: bool,
    /// Timestamp of the last successful tick, if any.
    pub last_success: Option<DateTime<Utc>>,
    /// Error text from the last failed tick, cleared on success.
    pub last_error: Option<String>,
    /// Ticks failed since the last success.
    pub consecutive_failures: u32,
}

impl CollectorStatus {
    fn new() -> Self {
        Self {
            healthy: false,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
        }
    }
}

/// Shared health state written by the scheduler and read by the probes.
#[derive(Debug, Default)]
pub struct HealthState {
    ready: AtomicBool,
    collectors: RwLock<HashMap<String, CollectorStatus>>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful tick for `collector`.
    pub fn record_success(&self, collector: &str) {
        self.ready.store(true, Ordering::Relaxed);
        let mut collectors = self.collectors.write().unwrap_or_else(|e| e.into_inner());
        let status = collectors
            .entry(collector.to_string())
            .or_insert_with(CollectorStatus::new);
        status.healthy = true;
        status.last_success = Some(Utc::now());
        status.last_error = None;
        status.consecutive_failures = 0;
    }

    /// Record a failed tick for `collector`; returns the failure streak length.
    pub fn record_failure(&self, collector: &str, error: &str) -> u32 {
        let mut collectors = self.collectors.write().unwrap_or_else(|e| e.into_inner());
        let status = collectors
            .entry(collector.to_string())
            .or_insert_with(CollectorStatus::new);
        status.healthy = false;
        status.last_error = Some(error.to_string());
        status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        status.consecutive_failures
    }

    /// True once any collector has completed a successful tick.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    /// Per-collector status for the readiness probe body.
    pub fn collector_statuses(&self) -> HashMap<String, CollectorStatus> {
        self.collectors
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
