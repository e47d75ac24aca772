//! Snowflake Prometheus exporter.
//!
//! This crate provides the core of the exporter: named collectors poll
//! Snowflake `ACCOUNT_USAGE` views on independent schedules, publish the
//! results into an in-memory metric registry, and an HTTP server renders the
//! latest snapshot in the Prometheus text exposition format on demand.
//!
//! # Architecture
//!
//! - **Warehouse**: authenticated read-only query access to Snowflake
//! - **Registry**: latest-value sample store with atomic per-collector replace
//! - **Collectors**: one query/metric family each, scheduled on tokio tasks
//! - **Server**: `/metrics` scrape endpoint plus liveness/readiness probes
//!
//! Collection and serving are decoupled in time: a scrape never triggers a
//! query, and a failing warehouse never produces a scrape error: the last
//! successfully collected values stay servable.

pub mod collector;
pub mod config;
pub mod health;
pub mod registry;
pub mod server;
pub mod warehouse;

pub use collector::{CollectorScheduler, CollectorSpec};
pub use config::AppConfig;
pub use health::HealthState;
pub use registry::{MetricRegistry, Sample, Snapshot};
pub use warehouse::{SnowflakeClient, Warehouse, WarehouseError};
