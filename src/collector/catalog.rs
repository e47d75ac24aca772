//! Built-in collector catalog.
//!
//! Nine metric families over `SNOWFLAKE.ACCOUNT_USAGE` views, one collector
//! each. Select lists are label columns first, value column last, matching
//! [`RowMapping`](super::RowMapping). History views are windowed to the
//! trailing hour; `TABLE_STORAGE_METRICS` is a point-in-time view and is not.

use crate::collector::spec::{CollectorSpec, RowMapping};
use crate::config::CollectorsConfig;
use crate::registry::{MetricDescriptor, MetricKind};

struct CollectorDef {
    name: &'static str,
    sql: &'static str,
    mapping: RowMapping,
}

const DEFINITIONS: &[CollectorDef] = &[
    CollectorDef {
        name: "warehouse_credits",
        sql: "SELECT warehouse_name, SUM(credits_used) \
              FROM SNOWFLAKE.ACCOUNT_USAGE.WAREHOUSE_METERING_HISTORY \
              WHERE start_time > DATEADD(hour, -1, CURRENT_TIMESTAMP()) \
              GROUP BY warehouse_name",
        mapping: RowMapping {
            metric: "snowflake_warehouse_credits_used",
            help: "Credits used per warehouse",
            kind: MetricKind::Gauge,
            labels: &["warehouse"],
        },
    },
    CollectorDef {
        name: "warehouse_load",
        sql: "SELECT warehouse_name, AVG(average_running) \
              FROM SNOWFLAKE.ACCOUNT_USAGE.WAREHOUSE_LOAD_HISTORY \
              WHERE start_time > DATEADD(hour, -1, CURRENT_TIMESTAMP()) \
              GROUP BY warehouse_name",
        mapping: RowMapping {
            metric: "snowflake_warehouse_load_avg",
            help: "Average warehouse load",
            kind: MetricKind::Gauge,
            labels: &["warehouse"],
        },
    },
    CollectorDef {
        name: "query_duration",
        sql: "SELECT warehouse_name, AVG(total_elapsed_time)/1000 \
              FROM SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY \
              WHERE start_time > DATEADD(hour, -1, CURRENT_TIMESTAMP()) \
              AND execution_status = 'SUCCESS' \
              AND warehouse_name IS NOT NULL \
              GROUP BY warehouse_name",
        mapping: RowMapping {
            metric: "snowflake_query_duration_seconds_avg",
            help: "Average query duration in seconds",
            kind: MetricKind::Gauge,
            labels: &["warehouse"],
        },
    },
    CollectorDef {
        name: "failed_queries",
        sql: "SELECT warehouse_name, COUNT(*) \
              FROM SNOWFLAKE.ACCOUNT_USAGE.QUERY_HISTORY \
              WHERE start_time > DATEADD(hour, -1, CURRENT_TIMESTAMP()) \
              AND execution_status = 'FAILED' \
              AND warehouse_name IS NOT NULL \
              GROUP BY warehouse_name",
        mapping: RowMapping {
            metric: "snowflake_failed_queries_count",
            help: "Number of failed queries",
            kind: MetricKind::Gauge,
            labels: &["warehouse"],
        },
    },
    CollectorDef {
        name: "table_storage",
        sql: "SELECT table_catalog, table_schema, table_name, bytes \
              FROM SNOWFLAKE.ACCOUNT_USAGE.TABLE_STORAGE_METRICS",
        mapping: RowMapping {
            metric: "snowflake_table_storage_bytes_used",
            help: "Table storage size in bytes",
            kind: MetricKind::Gauge,
            labels: &["database", "schema", "table"],
        },
    },
    CollectorDef {
        name: "login_success",
        sql: "SELECT user_name, COUNT(*) \
              FROM SNOWFLAKE.ACCOUNT_USAGE.LOGIN_HISTORY \
              WHERE event_timestamp > DATEADD(hour, -1, CURRENT_TIMESTAMP()) \
              AND is_success = 'TRUE' \
              GROUP BY user_name",
        mapping: RowMapping {
            metric: "snowflake_login_success_count",
            help: "Number of successful logins",
            kind: MetricKind::Gauge,
            labels: &["user"],
        },
    },
    CollectorDef {
        name: "login_failure",
        sql: "SELECT user_name, COUNT(*) \
              FROM SNOWFLAKE.ACCOUNT_USAGE.LOGIN_HISTORY \
              WHERE event_timestamp > DATEADD(hour, -1, CURRENT_TIMESTAMP()) \
              AND is_success = 'FALSE' \
              GROUP BY user_name",
        mapping: RowMapping {
            metric: "snowflake_login_failure_count",
            help: "Number of failed logins",
            kind: MetricKind::Gauge,
            labels: &["user"],
        },
    },
    CollectorDef {
        name: "access_events",
        sql: "SELECT user_name, object_name, COUNT(*) \
              FROM SNOWFLAKE.ACCOUNT_USAGE.ACCESS_HISTORY \
              WHERE event_timestamp > DATEADD(hour, -1, CURRENT_TIMESTAMP()) \
              GROUP BY user_name, object_name",
        mapping: RowMapping {
            metric: "snowflake_access_events_count",
            help: "Table access events count",
            kind: MetricKind::Gauge,
            labels: &["user", "table"],
        },
    },
    CollectorDef {
        name: "sessions",
        sql: "SELECT user_name, COUNT(*) \
              FROM SNOWFLAKE.ACCOUNT_USAGE.SESSIONS \
              WHERE logout_time IS NULL \
              AND login_time > DATEADD(hour, -1, CURRENT_TIMESTAMP()) \
              GROUP BY user_name",
        mapping: RowMapping {
            metric: "snowflake_session_count",
            help: "Active sessions count",
            kind: MetricKind::Gauge,
            labels: &["user"],
        },
    },
];

/// Names of all built-in collectors, in catalog order.
pub fn collector_names() -> Vec<&'static str> {
    DEFINITIONS.iter().map(|d| d.name).collect()
}

/// Descriptors for every built-in metric family, enabled or not.
///
/// Registering all of them keeps the registry's descriptor table independent
/// of which collectors the operator turned on.
pub fn descriptors() -> Vec<MetricDescriptor> {
    DEFINITIONS.iter().map(|d| d.mapping.descriptor()).collect()
}

/// Build specs for the enabled collectors with their resolved schedules.
///
/// Per-query timeouts are capped at the collector's interval so a stuck
/// query can never span two ticks.
pub fn builtin_collectors(config: &CollectorsConfig) -> Vec<CollectorSpec> {
    DEFINITIONS
        .iter()
        .filter_map(|def| {
            let settings = config.resolve(def.name);
            if !settings.enabled {
                tracing::debug!(collector = %def.name, "Collector disabled by configuration");
                return None;
            }
            Some(CollectorSpec {
                name: def.name,
                interval: settings.interval,
                timeout: settings.timeout.min(settings.interval),
                sql: def.sql,
                mapping: def.mapping.clone(),
            })
        })
        .collect()
}
