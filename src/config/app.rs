//! Application configuration structures.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::collector::CollectorsConfig;
use super::validation::{expand_env_vars, ConfigError};
use crate::collector::catalog;

/// Default exporter port.
pub const DEFAULT_PORT: u16 = 8000;

/// Default login/connect timeout (10 seconds).
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_secs(10);

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_login_timeout() -> Duration {
    DEFAULT_LOGIN_TIMEOUT
}

/// Web server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server bind address (default: "0.0.0.0").
    pub bind: String,

    /// Server port (default: 8000).
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: DEFAULT_PORT,
        }
    }
}

/// Snowflake connection configuration.
///
/// Credentials are normally injected via `${VAR}` expansion from the
/// environment rather than written into the file.
#[derive(Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Account identifier (the part before `.snowflakecomputing.com`).
    pub account: String,
    /// Login name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Database to resolve unqualified names against.
    pub database: String,
    /// Schema within the database.
    pub schema: String,
    /// Virtual warehouse used to run the usage queries.
    pub warehouse: String,
    /// Optional role.
    #[serde(default)]
    pub role: Option<String>,
    /// Optional endpoint override (private link deployments).
    #[serde(default)]
    pub host: Option<String>,
    /// Login/connect timeout (default: 10s).
    #[serde(default = "default_login_timeout", with = "humantime_serde")]
    pub login_timeout: Duration,
}

// Keep the password out of log output.
impl std::fmt::Debug for WarehouseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WarehouseConfig")
            .field("account", &self.account)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("schema", &self.schema)
            .field("warehouse", &self.warehouse)
            .field("role", &self.role)
            .field("host", &self.host)
            .field("login_timeout", &self.login_timeout)
            .finish()
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Web server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Snowflake connection.
    pub warehouse: WarehouseConfig,

    /// Collector schedules.
    #[serde(default)]
    pub collectors: CollectorsConfig,
}

impl AppConfig {
    /// Load configuration from a YAML file, expanding `${VAR}` references
    /// from the environment first.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or validated.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_yaml::from_str(&expand_env_vars(&content))?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration purely from environment variables, the way the
    /// classic single-file exporter was configured.
    ///
    /// Required: `SNOWFLAKE_USERNAME`, `SNOWFLAKE_PASSWORD`,
    /// `SNOWFLAKE_ACCOUNT`, `SNOWFLAKE_WAREHOUSE`, `SNOWFLAKE_DATABASE`,
    /// `SNOWFLAKE_SCHEMA`. Optional: `SNOWFLAKE_ROLE`, `EXPORTER_PORT`.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` naming every missing variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        let required = [
            "SNOWFLAKE_USERNAME",
            "SNOWFLAKE_PASSWORD",
            "SNOWFLAKE_ACCOUNT",
            "SNOWFLAKE_WAREHOUSE",
            "SNOWFLAKE_DATABASE",
            "SNOWFLAKE_SCHEMA",
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|var| std::env::var(var).map(|v| v.is_empty()).unwrap_or(true))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "missing required environment variables: {}",
                missing.join(", ")
            )));
        }

        let var = |name: &str| std::env::var(name).unwrap_or_default();
        let port = match std::env::var("EXPORTER_PORT") {
            Ok(raw) => raw.parse::<u16>().map_err(|_| {
                ConfigError::ValidationError(format!("invalid EXPORTER_PORT: '{raw}'"))
            })?,
            Err(_) => DEFAULT_PORT,
        };

        let config = Self {
            server: ServerConfig {
                bind: default_bind(),
                port,
            },
            warehouse: WarehouseConfig {
                account: var("SNOWFLAKE_ACCOUNT"),
                user: var("SNOWFLAKE_USERNAME"),
                password: var("SNOWFLAKE_PASSWORD"),
                database: var("SNOWFLAKE_DATABASE"),
                schema: var("SNOWFLAKE_SCHEMA"),
                warehouse: var("SNOWFLAKE_WAREHOUSE"),
                role: std::env::var("SNOWFLAKE_ROLE").ok().filter(|r| !r.is_empty()),
                host: None,
                login_timeout: DEFAULT_LOGIN_TIMEOUT,
            },
            collectors: CollectorsConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    /// Returns `ConfigError::ValidationError` if any field is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.bind.parse::<IpAddr>().map_err(|_| {
            ConfigError::ValidationError(format!(
                "invalid server bind address: '{}'",
                self.server.bind
            ))
        })?;

        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server port must be non-zero".to_string(),
            ));
        }

        for (field, value) in [
            ("warehouse.account", &self.warehouse.account),
            ("warehouse.user", &self.warehouse.user),
            ("warehouse.password", &self.warehouse.password),
            ("warehouse.database", &self.warehouse.database),
            ("warehouse.schema", &self.warehouse.schema),
            ("warehouse.warehouse", &self.warehouse.warehouse),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "{} must not be empty",
                    field
                )));
            }
        }

        if self.warehouse.login_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "warehouse.login_timeout must be non-zero".to_string(),
            ));
        }

        self.collectors.validate(&catalog::collector_names())?;
        Ok(())
    }
}
