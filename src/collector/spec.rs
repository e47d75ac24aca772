//! Collector definitions and row-to-sample mapping.

use std::collections::BTreeMap;
use std::time::Duration;

use thiserror::Error;

use crate::registry::{MetricDescriptor, MetricKind, Sample};
use crate::warehouse::{Row, WarehouseError};

/// Minimum allowed collection interval (1 second).
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// Errors that can occur during collection.
#[derive(Debug, Error)]
pub enum CollectorError {
    /// The warehouse query failed.
    #[error("warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    /// Scheduler lifecycle error.
    #[error("scheduler error: {0}")]
    Scheduler(String),
}

/// Declarative mapping from query rows to samples of one metric family.
///
/// Queries are written so their select list is the label columns in order
/// followed by the value column. NULL label cells become empty label values;
/// rows with a NULL or non-numeric value cell are skipped.
#[derive(Debug, Clone)]
pub struct RowMapping {
    /// Metric family name.
    pub metric: &'static str,
    /// Help text for the exposition header.
    pub help: &'static str,
    /// Gauge or counter.
    pub kind: MetricKind,
    /// Label names, matching the leading select columns in order.
    pub labels: &'static [&'static str],
}

impl RowMapping {
    /// Descriptor for registry registration.
    pub fn descriptor(&self) -> MetricDescriptor {
        MetricDescriptor {
            name: self.metric,
            help: self.help,
            kind: self.kind,
        }
    }

    /// Map result rows to samples. Pure; never fails, only skips.
    pub fn map(&self, rows: &[Row]) -> Vec<Sample> {
        let mut samples = Vec::with_capacity(rows.len());

        for row in rows {
            if row.len() <= self.labels.len() {
                tracing::warn!(
                    metric = %self.metric,
                    columns = row.len(),
                    expected = self.labels.len() + 1,
                    "Row has too few columns, skipping"
                );
                continue;
            }

            let value = match &row[self.labels.len()] {
                Some(raw) => match raw.trim().parse::<f64>() {
                    Ok(v) => v,
                    Err(_) => {
                        tracing::debug!(
                            metric = %self.metric,
                            value = %raw,
                            "Non-numeric value cell, skipping row"
                        );
                        continue;
                    }
                },
                None => {
                    tracing::debug!(metric = %self.metric, "NULL value cell, skipping row");
                    continue;
                }
            };

            let labels: BTreeMap<String, String> = self
                .labels
                .iter()
                .zip(row.iter())
                .map(|(name, cell)| (name.to_string(), cell.clone().unwrap_or_default()))
                .collect();

            samples.push(Sample::new(self.metric, labels, value));
        }

        samples
    }
}

/// Immutable description of one collector: what to ask the warehouse, how
/// often, and how to turn the answer into samples. Built once at startup.
#[derive(Debug, Clone)]
pub struct CollectorSpec {
    /// Unique collector name; scopes registry publishes and health status.
    pub name: &'static str,
    /// Tick interval, measured from tick start.
    pub interval: Duration,
    /// Hard per-query deadline; always at most the interval.
    pub timeout: Duration,
    /// Read-only SQL against ACCOUNT_USAGE views.
    pub sql: &'static str,
    /// Row-to-sample mapping.
    pub mapping: RowMapping,
}
