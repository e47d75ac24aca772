//! Snowflake client over the HTTPS SQL API.
//!
//! Authentication follows what the official connectors do for password auth:
//! a session login request that returns a session token, then statements
//! executed with `Authorization: Snowflake Token="..."`. An expired session
//! (HTTP 401) is renewed once, transparently, before the statement is retried.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use crate::config::WarehouseConfig;
use crate::warehouse::{Row, Warehouse, WarehouseError};

const LOGIN_PATH: &str = "/session/v1/login-request";
const STATEMENTS_PATH: &str = "/api/v2/statements";
const CLIENT_APP_ID: &str = "snowflake-exporter";

/// Snowflake session client.
///
/// Cheap to share behind an `Arc`; the only interior state is the current
/// session token.
pub struct SnowflakeClient {
    http: reqwest::Client,
    base_url: String,
    config: WarehouseConfig,
    session_token: Mutex<Option<String>>,
}

#[derive(Deserialize)]
struct LoginResponse {
    success: bool,
    message: Option<String>,
    data: Option<LoginData>,
}

#[derive(Deserialize)]
struct LoginData {
    token: String,
}

#[derive(Deserialize)]
struct StatementResponse {
    code: Option<String>,
    message: Option<String>,
    #[serde(default)]
    data: Vec<Vec<serde_json::Value>>,
}

impl SnowflakeClient {
    /// Build a client from warehouse configuration.
    ///
    /// No network traffic happens here; call [`authenticate`](Self::authenticate)
    /// to verify credentials eagerly.
    pub fn new(config: &WarehouseConfig) -> Result<Self, WarehouseError> {
        let base_url = match &config.host {
            Some(host) => host.trim_end_matches('/').to_string(),
            None => format!("https://{}.snowflakecomputing.com", config.account),
        };

        let http = reqwest::Client::builder()
            .connect_timeout(config.login_timeout)
            .build()
            .map_err(|e| WarehouseError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url,
            config: config.clone(),
            session_token: Mutex::new(None),
        })
    }

    /// Log in and cache the session token.
    ///
    /// Called once at startup so bad credentials are fatal before the HTTP
    /// port is bound, and again internally whenever the session expires.
    pub async fn authenticate(&self) -> Result<(), WarehouseError> {
        let token = self.login().await?;
        *self.session_token.lock().await = Some(token);
        Ok(())
    }

    async fn login(&self) -> Result<String, WarehouseError> {
        let body = json!({
            "data": {
                "LOGIN_NAME": self.config.user,
                "PASSWORD": self.config.password,
                "ACCOUNT_NAME": self.config.account,
                "CLIENT_APP_ID": CLIENT_APP_ID,
                "CLIENT_APP_VERSION": env!("CARGO_PKG_VERSION"),
            }
        });

        // The request timeout covers the whole exchange, body read included,
        // so a stalled response cannot hang the caller.
        let url = format!("{}{}", self.base_url, LOGIN_PATH);
        let response = self
            .http
            .post(&url)
            .timeout(self.config.login_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, self.config.login_timeout))?;

        if !response.status().is_success() {
            return Err(WarehouseError::Auth(format!(
                "login request returned {}",
                response.status()
            )));
        }

        let login: LoginResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                WarehouseError::Timeout(self.config.login_timeout)
            } else {
                WarehouseError::Transport(format!("malformed login response: {e}"))
            }
        })?;

        if !login.success {
            return Err(WarehouseError::Auth(
                login.message.unwrap_or_else(|| "login rejected".to_string()),
            ));
        }

        login
            .data
            .map(|d| d.token)
            .ok_or_else(|| WarehouseError::Auth("login response missing token".to_string()))
    }

    async fn current_token(&self) -> Result<String, WarehouseError> {
        let mut guard = self.session_token.lock().await;
        if let Some(token) = guard.as_ref() {
            return Ok(token.clone());
        }
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    /// Renew the session after a 401; returns the fresh token.
    async fn renew_session(&self) -> Result<String, WarehouseError> {
        let mut guard = self.session_token.lock().await;
        let token = self.login().await?;
        *guard = Some(token.clone());
        Ok(token)
    }

    async fn execute(
        &self,
        sql: &str,
        token: &str,
        deadline: Duration,
    ) -> Result<reqwest::Response, WarehouseError> {
        let mut body = json!({
            "statement": sql,
            "timeout": deadline.as_secs().max(1),
            "database": self.config.database,
            "schema": self.config.schema,
            "warehouse": self.config.warehouse,
        });
        if let Some(role) = &self.config.role {
            body["role"] = json!(role);
        }

        // Total per-request timeout: runs from connect until the response
        // body finishes, so it still applies while the caller reads the body.
        let url = format!("{}{}", self.base_url, STATEMENTS_PATH);
        self.http
            .post(&url)
            .timeout(deadline)
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Snowflake Token=\"{token}\""),
            )
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(e, deadline))
    }
}

#[async_trait::async_trait]
impl Warehouse for SnowflakeClient {
    async fn query(&self, sql: &str, deadline: Duration) -> Result<Vec<Row>, WarehouseError> {
        let token = self.current_token().await?;
        let mut response = self.execute(sql, &token, deadline).await?;

        // Expired session: renew once and retry the statement.
        if response.status() == StatusCode::UNAUTHORIZED {
            tracing::debug!("Session token expired, renewing");
            let token = self.renew_session().await?;
            response = self.execute(sql, &token, deadline).await?;
        }

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(WarehouseError::Auth(format!(
                "statement rejected with {status}"
            )));
        }

        let statement: StatementResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                WarehouseError::Timeout(deadline)
            } else {
                WarehouseError::Transport(format!("malformed statement response: {e}"))
            }
        })?;

        if !status.is_success() {
            return Err(WarehouseError::Query(
                statement
                    .message
                    .or(statement.code)
                    .unwrap_or_else(|| format!("statement returned {status}")),
            ));
        }

        Ok(statement.data.into_iter().map(convert_row).collect())
    }
}

/// The SQL API returns cells as JSON strings, numbers, or nulls; normalize
/// everything to optional text.
fn convert_row(cells: Vec<serde_json::Value>) -> Row {
    cells
        .into_iter()
        .map(|cell| match cell {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
        .collect()
}

fn classify_transport(err: reqwest::Error, deadline: Duration) -> WarehouseError {
    if err.is_timeout() {
        WarehouseError::Timeout(deadline)
    } else {
        WarehouseError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WarehouseConfig;
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn test_config(host: Option<&str>) -> WarehouseConfig {
        WarehouseConfig {
            account: "xy12345".to_string(),
            user: "EXPORTER".to_string(),
            password: "secret".to_string(),
            database: "SNOWFLAKE".to_string(),
            schema: "ACCOUNT_USAGE".to_string(),
            warehouse: "MONITOR_WH".to_string(),
            role: None,
            host: host.map(str::to_string),
            login_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_base_url_from_account() {
        let client = SnowflakeClient::new(&test_config(None)).unwrap();
        assert_eq!(client.base_url, "https://xy12345.snowflakecomputing.com");
    }

    #[test]
    fn test_base_url_host_override() {
        let client =
            SnowflakeClient::new(&test_config(Some("https://sf.internal.example:8443/"))).unwrap();
        assert_eq!(client.base_url, "https://sf.internal.example:8443");
    }

    #[test]
    fn test_convert_row_normalizes_cells() {
        let row = convert_row(vec![
            serde_json::Value::String("ETL_WH".to_string()),
            serde_json::json!(1.5),
            serde_json::Value::Null,
        ]);
        assert_eq!(
            row,
            vec![Some("ETL_WH".to_string()), Some("1.5".to_string()), None]
        );
    }

    /// How the stub answers statement requests.
    #[derive(Clone, Copy)]
    enum StatementScript {
        Ok,
        UnauthorizedThenOk,
        /// Send headers and a few body bytes, then hold the connection open.
        StallBody,
    }

    struct StubSnowflake {
        addr: SocketAddr,
        login_hits: Arc<AtomicU32>,
        statement_hits: Arc<AtomicU32>,
    }

    impl StubSnowflake {
        fn base_url(&self) -> String {
            format!("http://{}", self.addr)
        }
    }

    /// Minimal HTTP/1.1 server speaking just enough of the Snowflake API for
    /// the client: the login endpoint and the statements endpoint, keep-alive
    /// connections included.
    async fn start_stub(login_ok: bool, script: StatementScript) -> StubSnowflake {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let login_hits = Arc::new(AtomicU32::new(0));
        let statement_hits = Arc::new(AtomicU32::new(0));

        let logins = Arc::clone(&login_hits);
        let statements = Arc::clone(&statement_hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    return;
                };
                let logins = Arc::clone(&logins);
                let statements = Arc::clone(&statements);
                tokio::spawn(async move {
                    while let Some(request_line) = read_request(&mut socket).await {
                        if request_line.contains(LOGIN_PATH) {
                            logins.fetch_add(1, Ordering::SeqCst);
                            let body = if login_ok {
                                r#"{"success":true,"data":{"token":"session-token-1"}}"#
                            } else {
                                r#"{"success":false,"message":"Incorrect username or password was specified."}"#
                            };
                            write_response(&mut socket, "200 OK", body).await;
                            continue;
                        }

                        let hit = statements.fetch_add(1, Ordering::SeqCst) + 1;
                        match script {
                            StatementScript::UnauthorizedThenOk if hit == 1 => {
                                write_response(&mut socket, "401 Unauthorized", "{}").await;
                            }
                            StatementScript::Ok | StatementScript::UnauthorizedThenOk => {
                                write_response(
                                    &mut socket,
                                    "200 OK",
                                    r#"{"data":[["ETL_WH","1.5"]]}"#,
                                )
                                .await;
                            }
                            StatementScript::StallBody => {
                                let _ = socket
                                    .write_all(
                                        b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 100000\r\n\r\n{\"data\"",
                                    )
                                    .await;
                                tokio::time::sleep(Duration::from_secs(3600)).await;
                                return;
                            }
                        }
                    }
                });
            }
        });

        StubSnowflake {
            addr,
            login_hits,
            statement_hits,
        }
    }

    /// Read one request (headers plus content-length body); returns the
    /// request line, or `None` when the client closed the connection.
    async fn read_request(socket: &mut TcpStream) -> Option<String> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = socket.read(&mut chunk).await.ok()?;
            if n == 0 {
                return None;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };

            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let content_length = head
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    if name.eq_ignore_ascii_case("content-length") {
                        value.trim().parse::<usize>().ok()
                    } else {
                        None
                    }
                })
                .unwrap_or(0);

            let mut body_read = buf.len() - (end + 4);
            while body_read < content_length {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    return None;
                }
                body_read += n;
            }
            return Some(head.lines().next().unwrap_or_default().to_string());
        }
    }

    async fn write_response(socket: &mut TcpStream, status: &str, body: &str) {
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{body}",
            body.len()
        );
        let _ = socket.write_all(response.as_bytes()).await;
    }

    #[tokio::test]
    async fn test_authenticate_rejects_bad_credentials() {
        let stub = start_stub(false, StatementScript::Ok).await;
        let client = SnowflakeClient::new(&test_config(Some(&stub.base_url()))).unwrap();

        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, WarehouseError::Auth(_)), "got {err:?}");
        assert_eq!(stub.login_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_session_renews_once() {
        let stub = start_stub(true, StatementScript::UnauthorizedThenOk).await;
        let client = SnowflakeClient::new(&test_config(Some(&stub.base_url()))).unwrap();
        client.authenticate().await.unwrap();

        let rows = client
            .query("SELECT 1", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(
            rows,
            vec![vec![Some("ETL_WH".to_string()), Some("1.5".to_string())]]
        );
        // One rejected statement, one re-login, one retried statement.
        assert_eq!(stub.statement_hits.load(Ordering::SeqCst), 2);
        assert_eq!(stub.login_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_deadline_bounds_stalled_body_read() {
        // The server answers with headers and a truncated body, then stalls.
        // The per-call deadline must cover the body read, not just the send.
        let stub = start_stub(true, StatementScript::StallBody).await;
        let client = SnowflakeClient::new(&test_config(Some(&stub.base_url()))).unwrap();
        client.authenticate().await.unwrap();

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            client.query("SELECT 1", Duration::from_secs(1)),
        )
        .await
        .expect("query ran past its deadline");

        assert!(
            matches!(result, Err(WarehouseError::Timeout(d)) if d == Duration::from_secs(1)),
            "got {result:?}"
        );
    }
}
