//! Per-collector scheduling.
//!
//! Each collector runs on its own tokio task with a fixed-interval ticker.
//! Intervals are measured from tick start and overruns skip ticks instead of
//! queueing them, so a slow warehouse can never build a backlog. A tick
//! failure is logged and recorded in health state; the registry keeps the
//! collector's last published samples until the next success overwrites them.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::collector::spec::{CollectorError, CollectorSpec, MIN_INTERVAL};
use crate::health::HealthState;
use crate::registry::{MetricRegistry, Sample};
use crate::warehouse::Warehouse;

/// Default timeout for graceful shutdown (5 seconds).
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives all collector loops and owns their task handles.
pub struct CollectorScheduler {
    warehouse: Arc<dyn Warehouse>,
    registry: Arc<MetricRegistry>,
    health: Arc<HealthState>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl CollectorScheduler {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        registry: Arc<MetricRegistry>,
        health: Arc<HealthState>,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            warehouse,
            registry,
            health,
            shutdown_tx,
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Spawn the scheduling loop for one collector.
    ///
    /// The first tick fires immediately so metrics appear right after
    /// startup instead of one interval later.
    pub fn spawn(&self, spec: CollectorSpec) -> Result<(), CollectorError> {
        if spec.interval < MIN_INTERVAL {
            return Err(CollectorError::Scheduler(format!(
                "collector '{}' interval {:?} is below the minimum {:?}",
                spec.name, spec.interval, MIN_INTERVAL
            )));
        }

        let name = spec.name;
        let warehouse = Arc::clone(&self.warehouse);
        let registry = Arc::clone(&self.registry);
        let health = Arc::clone(&self.health);
        let shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(run_loop(spec, warehouse, registry, health, shutdown_rx));
        self.tasks
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((name, handle));

        tracing::info!(collector = %name, "Collector scheduled");
        Ok(())
    }

    /// Number of scheduled collectors.
    pub fn collector_count(&self) -> usize {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Gracefully stop all collector loops with the default timeout.
    pub async fn shutdown(self) {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await;
    }

    /// Signal shutdown and wait for loops to finish.
    ///
    /// An in-flight query delays its loop by at most the collector's own
    /// timeout; loops still running when `timeout` elapses are aborted.
    pub async fn shutdown_with_timeout(self, timeout: Duration) {
        let _ = self.shutdown_tx.send(true);

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(|e| e.into_inner()));
        let deadline = tokio::time::Instant::now() + timeout;

        for (name, handle) in tasks {
            let abort = handle.abort_handle();
            match tokio::time::timeout_at(deadline, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::error!(collector = %name, error = %e, "Collector task panicked")
                }
                Err(_) => {
                    abort.abort();
                    tracing::warn!(collector = %name, "Collector did not stop in time, aborting");
                }
            }
        }
        tracing::info!("Collector scheduler stopped");
    }
}

async fn run_loop(
    spec: CollectorSpec,
    warehouse: Arc<dyn Warehouse>,
    registry: Arc<MetricRegistry>,
    health: Arc<HealthState>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(spec.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                tracing::debug!(collector = %spec.name, "Collector loop stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        match run_tick(&spec, warehouse.as_ref()).await {
            Ok(samples) => {
                let count = samples.len();
                registry.publish(spec.name, samples);
                health.record_success(spec.name);
                tracing::debug!(collector = %spec.name, samples = count, "Collection succeeded");
            }
            Err(e) => {
                let streak = health.record_failure(spec.name, &e.to_string());
                tracing::warn!(
                    collector = %spec.name,
                    error = %e,
                    consecutive_failures = streak,
                    "Collection failed, keeping last published samples"
                );
            }
        }
    }
}

/// One collection cycle: query, map, done. The registry write happens in the
/// caller so a failure here leaves the previous sample set untouched.
async fn run_tick(
    spec: &CollectorSpec,
    warehouse: &dyn Warehouse,
) -> Result<Vec<Sample>, CollectorError> {
    let rows = warehouse.query(spec.sql, spec.timeout).await?;
    tracing::trace!(collector = %spec.name, rows = rows.len(), "Query returned");
    Ok(spec.mapping.map(&rows))
}
