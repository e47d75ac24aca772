//! End-to-end tests for the exporter.
//!
//! Binds a real listener, drives the scheduler against a scripted warehouse
//! stub, and scrapes over HTTP the way Prometheus would.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use snowflake_exporter::collector::{catalog, CollectorScheduler, CollectorSpec, RowMapping};
use snowflake_exporter::health::HealthState;
use snowflake_exporter::registry::{MetricKind, MetricRegistry, Sample};
use snowflake_exporter::server::{create_router, AppState};
use snowflake_exporter::warehouse::{Row, Warehouse, WarehouseError};
use tokio::net::TcpListener;

// =============================================================================
// Test Helpers
// =============================================================================

/// Warehouse stub scripted by SQL fragment.
struct ScriptedWarehouse {
    scripts: Vec<(&'static str, Result<Vec<Row>, &'static str>)>,
}

impl ScriptedWarehouse {
    fn new() -> Self {
        Self {
            scripts: Vec::new(),
        }
    }

    fn on(mut self, fragment: &'static str, rows: Vec<Row>) -> Self {
        self.scripts.push((fragment, Ok(rows)));
        self
    }

    fn failing(mut self, fragment: &'static str, message: &'static str) -> Self {
        self.scripts.push((fragment, Err(message)));
        self
    }
}

#[async_trait::async_trait]
impl Warehouse for ScriptedWarehouse {
    async fn query(&self, sql: &str, _timeout: Duration) -> Result<Vec<Row>, WarehouseError> {
        for (fragment, result) in &self.scripts {
            if sql.contains(fragment) {
                return match result {
                    Ok(rows) => Ok(rows.clone()),
                    Err(message) => Err(WarehouseError::Query(message.to_string())),
                };
            }
        }
        Ok(Vec::new())
    }
}

fn row(cells: &[&str]) -> Row {
    cells.iter().map(|c| Some(c.to_string())).collect()
}

fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn sessions_spec() -> CollectorSpec {
    CollectorSpec {
        name: "sessions",
        interval: Duration::from_secs(60),
        timeout: Duration::from_secs(30),
        sql: "SELECT user_name, COUNT(*) FROM SNOWFLAKE.ACCOUNT_USAGE.SESSIONS",
        mapping: RowMapping {
            metric: "snowflake_session_count",
            help: "Active sessions count",
            kind: MetricKind::Gauge,
            labels: &["user"],
        },
    }
}

fn credits_spec() -> CollectorSpec {
    CollectorSpec {
        name: "warehouse_credits",
        interval: Duration::from_secs(60),
        timeout: Duration::from_secs(30),
        sql: "SELECT warehouse_name, SUM(credits_used) FROM WAREHOUSE_METERING_HISTORY",
        mapping: RowMapping {
            metric: "snowflake_warehouse_credits_used",
            help: "Credits used per warehouse",
            kind: MetricKind::Gauge,
            labels: &["warehouse"],
        },
    }
}

struct TestExporter {
    base_url: String,
    registry: Arc<MetricRegistry>,
    health: Arc<HealthState>,
    scheduler: CollectorScheduler,
}

/// Start scheduler and HTTP server against a scripted warehouse.
async fn start_test_exporter(warehouse: ScriptedWarehouse, specs: Vec<CollectorSpec>) -> TestExporter {
    let registry = Arc::new(MetricRegistry::new(catalog::descriptors()));
    let health = Arc::new(HealthState::new());

    let scheduler = CollectorScheduler::new(
        Arc::new(warehouse) as Arc<dyn Warehouse>,
        Arc::clone(&registry),
        Arc::clone(&health),
    );
    for spec in specs {
        scheduler.spawn(spec).expect("Failed to spawn collector");
    }

    let state = AppState {
        registry: Arc::clone(&registry),
        health: Arc::clone(&health),
    };
    let router = create_router(state);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give the server and the immediate first ticks time to run.
    tokio::time::sleep(Duration::from_millis(200)).await;

    TestExporter {
        base_url: format!("http://{}", addr),
        registry,
        health,
        scheduler,
    }
}

async fn scrape(base_url: &str) -> (reqwest::StatusCode, String) {
    let resp = reqwest::get(format!("{}/metrics", base_url))
        .await
        .expect("Failed to scrape");
    let status = resp.status();
    let body = resp.text().await.expect("Failed to read scrape body");
    (status, body)
}

// =============================================================================
// Scrape Tests
// =============================================================================

#[tokio::test]
async fn test_end_to_end_collection_and_scrape() {
    let warehouse = ScriptedWarehouse::new()
        .on(
            "SESSIONS",
            vec![row(&["ALICE", "3"]), row(&["BOB", "1"])],
        )
        .on("WAREHOUSE_METERING_HISTORY", vec![row(&["ETL_WH", "1.5"])]);

    let exporter =
        start_test_exporter(warehouse, vec![sessions_spec(), credits_spec()]).await;

    let (status, body) = scrape(&exporter.base_url).await;
    assert_eq!(status, 200);
    assert!(body.contains("# HELP snowflake_session_count Active sessions count"));
    assert!(body.contains("# TYPE snowflake_session_count gauge"));
    assert!(body.contains("snowflake_session_count{user=\"ALICE\"} 3"));
    assert!(body.contains("snowflake_session_count{user=\"BOB\"} 1"));
    assert!(body.contains("snowflake_warehouse_credits_used{warehouse=\"ETL_WH\"} 1.5"));

    // Ready after the first successful tick.
    let resp = reqwest::get(format!("{}/readyz", exporter.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    exporter.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_scrape_content_type() {
    let exporter = start_test_exporter(ScriptedWarehouse::new(), vec![]).await;

    let resp = reqwest::get(format!("{}/metrics", exporter.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok()),
        Some("text/plain; version=0.0.4")
    );

    exporter.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_publish_fully_replaces_previous_set() {
    let exporter = start_test_exporter(ScriptedWarehouse::new(), vec![]).await;

    exporter.registry.publish(
        "sessions",
        vec![
            Sample::new("snowflake_session_count", labels(&[("user", "A")]), 1.0),
            Sample::new("snowflake_session_count", labels(&[("user", "B")]), 2.0),
            Sample::new("snowflake_session_count", labels(&[("user", "C")]), 3.0),
        ],
    );
    let (_, body) = scrape(&exporter.base_url).await;
    assert_eq!(body.matches("snowflake_session_count{").count(), 3);

    exporter.registry.publish(
        "sessions",
        vec![
            Sample::new("snowflake_session_count", labels(&[("user", "A")]), 5.0),
            Sample::new("snowflake_session_count", labels(&[("user", "D")]), 1.0),
        ],
    );
    let (_, body) = scrape(&exporter.base_url).await;
    assert_eq!(body.matches("snowflake_session_count{").count(), 2);
    assert!(body.contains("{user=\"A\"} 5"));
    assert!(body.contains("{user=\"D\"} 1"));
    assert!(!body.contains("user=\"B\""));
    assert!(!body.contains("user=\"C\""));

    exporter.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_failing_collector_never_breaks_scrapes() {
    let warehouse = ScriptedWarehouse::new()
        .failing("SESSIONS", "SQL compilation error")
        .on("WAREHOUSE_METERING_HISTORY", vec![row(&["ETL_WH", "2"])]);

    let exporter =
        start_test_exporter(warehouse, vec![sessions_spec(), credits_spec()]).await;

    // Scrape stays 200 and serves the healthy collector's samples.
    let (status, body) = scrape(&exporter.base_url).await;
    assert_eq!(status, 200);
    assert!(body.contains("snowflake_warehouse_credits_used{warehouse=\"ETL_WH\"} 2"));
    assert!(!body.contains("snowflake_session_count"));

    // Ready overall (one collector succeeded), with failure detail exposed.
    let resp = reqwest::get(format!("{}/readyz", exporter.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let detail: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(detail["collectors"]["sessions"]["healthy"], false);
    assert_eq!(detail["collectors"]["warehouse_credits"]["healthy"], true);

    exporter.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_not_ready_before_any_success() {
    let warehouse = ScriptedWarehouse::new().failing("SESSIONS", "access denied");
    let exporter = start_test_exporter(warehouse, vec![sessions_spec()]).await;

    // Liveness is unconditional.
    let resp = reqwest::get(format!("{}/healthz", exporter.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // Readiness requires one success.
    let resp = reqwest::get(format!("{}/readyz", exporter.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 503);

    // The scrape endpoint still answers 200 with an empty exposition.
    let (status, body) = scrape(&exporter.base_url).await;
    assert_eq!(status, 200);
    assert!(body.is_empty());

    exporter.scheduler.shutdown().await;
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[tokio::test]
async fn test_scrapes_see_whole_sets_under_concurrent_publishes() {
    let exporter = start_test_exporter(ScriptedWarehouse::new(), vec![]).await;

    fn session_sample(user: String, value: f64) -> Sample {
        let mut labels = BTreeMap::new();
        labels.insert("user".to_string(), user);
        Sample::new("snowflake_session_count", labels, value)
    }

    let set_a: Vec<Sample> = (0..3).map(|i| session_sample(format!("A{i}"), 1.0)).collect();
    let set_b: Vec<Sample> = (0..2).map(|i| session_sample(format!("B{i}"), 2.0)).collect();

    // Seed the registry so every scrape observes one of the two sets.
    exporter.registry.publish("sessions", set_a.clone());

    let registry = Arc::clone(&exporter.registry);
    let (a, b) = (set_a.clone(), set_b.clone());
    let writer = tokio::spawn(async move {
        for i in 0..200 {
            let set = if i % 2 == 0 { a.clone() } else { b.clone() };
            registry.publish("sessions", set);
            tokio::task::yield_now().await;
        }
    });

    for _ in 0..50 {
        let (_, body) = scrape(&exporter.base_url).await;
        let count = body.matches("snowflake_session_count{").count();
        // Either the 3-sample set or the 2-sample set, never a mix and
        // never partial.
        assert!(
            count == 3 || count == 2,
            "scrape saw a torn write: {count} samples\n{body}"
        );
        if count == 3 {
            assert!(!body.contains("user=\"B"));
        } else {
            assert!(!body.contains("user=\"A"));
        }
    }

    writer.await.unwrap();
    exporter.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_health_state_reflects_recovery() {
    let exporter = start_test_exporter(ScriptedWarehouse::new(), vec![]).await;

    exporter.health.record_failure("sessions", "timeout");
    assert!(!exporter.health.is_ready());

    exporter.health.record_success("sessions");
    let resp = reqwest::get(format!("{}/readyz", exporter.base_url))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    exporter.scheduler.shutdown().await;
}
