//! Warehouse access layer.
//!
//! Everything the exporter knows about Snowflake lives behind the
//! [`Warehouse`] trait: authenticate once, run read-only SQL, hand back rows
//! of nullable text columns. Collectors never see sessions, tokens, or HTTP;
//! a session that expires mid-run is renewed inside the client.

mod snowflake;

use std::time::Duration;

use thiserror::Error;

pub use snowflake::SnowflakeClient;

/// One result row: nullable text columns in select order.
pub type Row = Vec<Option<String>>;

/// Errors surfaced by warehouse queries.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// Credentials rejected or session renewal failed.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The warehouse rejected the statement itself.
    #[error("query rejected: {0}")]
    Query(String),

    /// The per-call deadline elapsed before a result arrived.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// Connection-level failure; worth retrying on the next tick.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Read-only query access to the warehouse.
///
/// Implementations must enforce the per-call timeout themselves so a stuck
/// query can never block a collector loop past its deadline.
#[async_trait::async_trait]
pub trait Warehouse: Send + Sync + 'static {
    /// Execute `sql` and return all result rows in order.
    async fn query(&self, sql: &str, timeout: Duration) -> Result<Vec<Row>, WarehouseError>;
}
