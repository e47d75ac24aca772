//! Collector layer.
//!
//! A collector pairs one read-only ACCOUNT_USAGE query with a declarative
//! row-to-sample mapping and a schedule. The scheduler runs each collector
//! on its own tokio task and publishes results into the shared registry;
//! failures are isolated per collector and never reach the HTTP side.
//!
//! - [`CollectorSpec`] / [`RowMapping`]: what to collect and how to map it
//! - [`catalog`]: the built-in Snowflake metric families
//! - [`CollectorScheduler`]: tick loops, skip-on-overrun, graceful shutdown

pub mod catalog;
mod scheduler;
mod spec;

pub use scheduler::{CollectorScheduler, DEFAULT_SHUTDOWN_TIMEOUT};
pub use spec::{CollectorError, CollectorSpec, RowMapping, MIN_INTERVAL};
