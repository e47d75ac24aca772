//! Configuration for the exporter.
//!
//! Provides YAML-based configuration loading and validation for:
//! - Server settings (port, bind address)
//! - Snowflake connection (account, credentials, context)
//! - Per-collector schedules
//!
//! Credentials can be injected from the environment via `${VAR}` expansion,
//! and the whole configuration can alternatively come from `SNOWFLAKE_*`
//! environment variables with no file at all.

mod app;
mod collector;
mod validation;

pub use app::{AppConfig, ServerConfig, WarehouseConfig, DEFAULT_LOGIN_TIMEOUT, DEFAULT_PORT};
pub use collector::{CollectorSettings, CollectorsConfig, ResolvedSettings};
pub use validation::{expand_env_vars, ConfigError};

// Re-export constants
pub use collector::{DEFAULT_INTERVAL, DEFAULT_TIMEOUT};
