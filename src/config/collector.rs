//! Per-collector schedule configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::validation::ConfigError;
use crate::collector::MIN_INTERVAL;

/// Default collection interval (60 seconds, the classic exporter cadence).
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Default per-query timeout (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

fn default_enabled() -> bool {
    true
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

/// Settings for one collector; unset fields fall back to the global defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorSettings {
    /// Enable this collector (default: true).
    pub enabled: bool,
    /// Collection interval override.
    #[serde(with = "humantime_serde")]
    pub interval: Option<Duration>,
    /// Per-query timeout override.
    #[serde(with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: None,
            timeout: None,
        }
    }
}

/// Effective settings after applying global defaults.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSettings {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
}

/// Schedules for the built-in collectors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorsConfig {
    /// Interval for collectors without an override (default: 60s).
    #[serde(with = "humantime_serde")]
    pub default_interval: Duration,

    /// Timeout for collectors without an override (default: 30s).
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    pub warehouse_credits: CollectorSettings,
    pub warehouse_load: CollectorSettings,
    pub query_duration: CollectorSettings,
    pub failed_queries: CollectorSettings,
    pub table_storage: CollectorSettings,
    pub login_success: CollectorSettings,
    pub login_failure: CollectorSettings,
    pub access_events: CollectorSettings,
    pub sessions: CollectorSettings,
}

impl Default for CollectorsConfig {
    fn default() -> Self {
        Self {
            default_interval: DEFAULT_INTERVAL,
            default_timeout: DEFAULT_TIMEOUT,
            warehouse_credits: CollectorSettings::default(),
            warehouse_load: CollectorSettings::default(),
            query_duration: CollectorSettings::default(),
            failed_queries: CollectorSettings::default(),
            table_storage: CollectorSettings::default(),
            login_success: CollectorSettings::default(),
            login_failure: CollectorSettings::default(),
            access_events: CollectorSettings::default(),
            sessions: CollectorSettings::default(),
        }
    }
}

impl CollectorsConfig {
    fn settings(&self, name: &str) -> Option<&CollectorSettings> {
        match name {
            "warehouse_credits" => Some(&self.warehouse_credits),
            "warehouse_load" => Some(&self.warehouse_load),
            "query_duration" => Some(&self.query_duration),
            "failed_queries" => Some(&self.failed_queries),
            "table_storage" => Some(&self.table_storage),
            "login_success" => Some(&self.login_success),
            "login_failure" => Some(&self.login_failure),
            "access_events" => Some(&self.access_events),
            "sessions" => Some(&self.sessions),
            _ => None,
        }
    }

    /// Resolve effective settings for `name`.
    ///
    /// Unknown names resolve to disabled; the catalog only asks for names it
    /// defines, so hitting that path means a catalog/config mismatch.
    pub fn resolve(&self, name: &str) -> ResolvedSettings {
        match self.settings(name) {
            Some(settings) => ResolvedSettings {
                enabled: settings.enabled,
                interval: settings.interval.unwrap_or(self.default_interval),
                timeout: settings.timeout.unwrap_or(self.default_timeout),
            },
            None => {
                tracing::warn!(collector = %name, "No settings entry for collector");
                ResolvedSettings {
                    enabled: false,
                    interval: self.default_interval,
                    timeout: self.default_timeout,
                }
            }
        }
    }

    /// Validate all effective schedules.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` on sub-second intervals or
    /// zero timeouts.
    pub fn validate(&self, names: &[&str]) -> Result<(), ConfigError> {
        if self.default_interval < MIN_INTERVAL {
            return Err(ConfigError::ValidationError(format!(
                "default_interval must be at least {:?}",
                MIN_INTERVAL
            )));
        }
        if self.default_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "default_timeout must be non-zero".to_string(),
            ));
        }

        for name in names {
            let resolved = self.resolve(name);
            if !resolved.enabled {
                continue;
            }
            if resolved.interval < MIN_INTERVAL {
                return Err(ConfigError::ValidationError(format!(
                    "collector '{}' interval must be at least {:?}",
                    name, MIN_INTERVAL
                )));
            }
            if resolved.timeout.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "collector '{}' timeout must be non-zero",
                    name
                )));
            }
        }
        Ok(())
    }
}
