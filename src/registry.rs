//! In-memory metric registry.
//!
//! The registry is the only shared mutable state in the exporter. Collectors
//! publish complete sample sets into it; the HTTP server takes immutable
//! snapshots out of it. Values are the latest observation only: a publish
//! replaces the collector's previous set wholesale, and nothing survives a
//! process restart.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::RwLock;

/// Content type identifying the Prometheus text exposition format.
pub const EXPOSITION_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Metric kind as rendered in the `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// Arbitrary point-in-time value.
    Gauge,
    /// Monotonically non-decreasing value.
    Counter,
}

impl MetricKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
        }
    }
}

/// Static description of one metric family.
///
/// Every family is registered once at startup and owned by exactly one
/// collector; the registry does not accept samples for unknown families.
#[derive(Debug, Clone)]
pub struct MetricDescriptor {
    pub name: &'static str,
    pub help: &'static str,
    pub kind: MetricKind,
}

/// One published measurement.
///
/// Identity is `(name, labels)`; label insertion order is irrelevant because
/// labels are kept in a `BTreeMap`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: &'static str,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn new(name: &'static str, labels: BTreeMap<String, String>, value: f64) -> Self {
        Self {
            name,
            labels,
            value,
        }
    }
}

/// Thread-safe registry mapping collector names to their current sample sets.
///
/// `publish` swaps a collector's entire set under a write lock; `snapshot`
/// clones the full contents under a read lock. Critical sections are short;
/// no rendering or I/O happens while the lock is held.
#[derive(Debug)]
pub struct MetricRegistry {
    descriptors: Vec<MetricDescriptor>,
    slots: RwLock<HashMap<String, Vec<Sample>>>,
}

impl MetricRegistry {
    /// Create a registry with the full set of metric descriptors.
    pub fn new(mut descriptors: Vec<MetricDescriptor>) -> Self {
        descriptors.sort_by(|a, b| a.name.cmp(b.name));
        Self {
            descriptors,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Atomically replace the sample set published under `collector`.
    ///
    /// Duplicate identities within `samples` collapse to the last occurrence.
    /// Samples for families that were never registered are dropped with a
    /// warning rather than rendered without a descriptor.
    pub fn publish(&self, collector: &str, samples: Vec<Sample>) {
        let mut deduped: BTreeMap<(&'static str, BTreeMap<String, String>), Sample> =
            BTreeMap::new();
        for sample in samples {
            if !self.descriptors.iter().any(|d| d.name == sample.name) {
                tracing::warn!(
                    collector = %collector,
                    metric = %sample.name,
                    "Dropping sample for unregistered metric family"
                );
                continue;
            }
            deduped.insert((sample.name, sample.labels.clone()), sample);
        }

        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        slots.insert(collector.to_string(), deduped.into_values().collect());
    }

    /// Take a point-in-time, immutable copy of the registry contents.
    ///
    /// The copy is consistent per collector: it holds either the complete old
    /// set or the complete new set for every collector, never a mix.
    pub fn snapshot(&self) -> Snapshot {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        let mut samples: Vec<Sample> = slots.values().flatten().cloned().collect();
        samples.sort_by(|a, b| a.name.cmp(b.name).then_with(|| a.labels.cmp(&b.labels)));

        Snapshot {
            descriptors: self.descriptors.clone(),
            samples,
        }
    }
}

/// Immutable registry snapshot, safe to render concurrently with publishes.
#[derive(Debug, Clone)]
pub struct Snapshot {
    descriptors: Vec<MetricDescriptor>,
    samples: Vec<Sample>,
}

impl Snapshot {
    /// Total number of samples across all families.
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Render to the Prometheus text exposition format.
    ///
    /// Output is deterministic: families in name order, samples in label
    /// order. Families with no current samples are omitted entirely.
    pub fn render(&self) -> String {
        let mut out = String::with_capacity(64 * self.samples.len() + 128);

        for descriptor in &self.descriptors {
            let family: Vec<&Sample> = self
                .samples
                .iter()
                .filter(|s| s.name == descriptor.name)
                .collect();
            if family.is_empty() {
                continue;
            }

            let _ = writeln!(out, "# HELP {} {}", descriptor.name, descriptor.help);
            let _ = writeln!(out, "# TYPE {} {}", descriptor.name, descriptor.kind.as_str());
            for sample in family {
                if sample.labels.is_empty() {
                    let _ = writeln!(out, "{} {}", sample.name, format_value(sample.value));
                } else {
                    let labels = sample
                        .labels
                        .iter()
                        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
                        .collect::<Vec<_>>()
                        .join(",");
                    let _ = writeln!(
                        out,
                        "{}{{{}}} {}",
                        sample.name,
                        labels,
                        format_value(sample.value)
                    );
                }
            }
        }

        out
    }
}

/// Escape a label value per the exposition format: backslash, quote, newline.
fn escape_label_value(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Format a sample value the way Prometheus expects.
fn format_value(value: f64) -> String {
    if value == value.trunc() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}
