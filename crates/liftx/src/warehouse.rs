// ai
//! 🏔️ The warehouse connection. One client, built once, shared by every load trigger.
//!
//! 🎬 *[three triggers used to each open their own connection, with the same twelve lines
//! copy-pasted between them. then someone noticed. this module is what happened next.]*
//!
//! 🧠 Knowledge graph:
//! - SQL goes through the statements endpoint (`POST /api/v2/statements`). A `202` means
//!   "still running"; we poll the statement handle until it finishes or the request
//!   timeout runs out. Polling is waiting, not retrying. Nothing is ever resent.
//! - Pipe notifications go through `POST /v1/data/pipes/<pipe>/insertFiles`.
//! - Auth is a bearer token of type `KEYPAIR_JWT` (configurable). Minting the JWT from a
//!   private key happens outside this process; we take the token ready-made.
//! - Every session carries a `query_tag` so the query history says who did it.
//!
//! ⚠️ No retries. A timeout or a non-2xx is fatal for the batch and therefore the run.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::time::Instant;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::error::IngestError;

// ============================================================
// 🔧 WarehouseConfig
// ============================================================

/// 🔧 `[warehouse]`. Also fed by the `SNOWFLAKE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// 🏷️ Account locator. Builds `https://<account>.snowflakecomputing.com`.
    #[serde(default)]
    pub account: Option<String>,
    /// 📡 Full base URL override (proxies, privatelink, test servers).
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// 🔒 A ready-minted token. Sent as `Authorization: Bearer <token>`.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default = "default_ingest")]
    pub role: String,
    #[serde(default = "default_ingest")]
    pub database: String,
    #[serde(default = "default_ingest")]
    pub schema: String,
    #[serde(default = "default_ingest")]
    pub warehouse: String,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_token_type() -> String {
    "KEYPAIR_JWT".to_string()
}

// -- 🏔️ role, database, schema, warehouse: everything was called INGEST. Everything.
fn default_ingest() -> String {
    "INGEST".to_string()
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            account: None,
            url: None,
            user: None,
            token: None,
            token_type: default_token_type(),
            role: default_ingest(),
            database: default_ingest(),
            schema: default_ingest(),
            warehouse: default_ingest(),
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WarehouseConfig {
    /// 📡 The base URL: the explicit override, or the one the account implies.
    pub fn base_url(&self) -> Option<String> {
        match (&self.url, &self.account) {
            (Some(url), _) => Some(url.trim_end_matches('/').to_string()),
            (None, Some(account)) => Some(format!("https://{account}.snowflakecomputing.com")),
            (None, None) => None,
        }
    }

    /// 🔒 Missing credentials are a startup failure, before a single line is read.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.base_url().is_none() {
            return Err(IngestError::config(
                "warehouse account is not set (SNOWFLAKE_ACCOUNT or [warehouse] account/url)",
            ));
        }
        if self.user.as_deref().is_none_or(str::is_empty) {
            return Err(IngestError::config(
                "warehouse user is not set (SNOWFLAKE_USER or [warehouse] user)",
            ));
        }
        if self.token.as_deref().is_none_or(str::is_empty) {
            return Err(IngestError::config(
                "warehouse token is not set (SNOWFLAKE_TOKEN or [warehouse] token)",
            ));
        }
        Ok(())
    }
}

// ============================================================
// 📎 Bindings + results
// ============================================================

/// 📎 One positional bind value, typed the way the statements endpoint wants it.
#[derive(Debug, Clone, PartialEq)]
pub enum BindValue {
    Text(Option<String>),
    Fixed(i64),
    Real(f64),
}

#[derive(Debug, Serialize)]
struct WireBinding {
    #[serde(rename = "type")]
    kind: &'static str,
    value: Option<String>,
}

impl BindValue {
    fn to_wire(&self) -> WireBinding {
        match self {
            BindValue::Text(value) => WireBinding {
                kind: "TEXT",
                value: value.clone(),
            },
            BindValue::Fixed(value) => WireBinding {
                kind: "FIXED",
                value: Some(value.to_string()),
            },
            BindValue::Real(value) => WireBinding {
                kind: "REAL",
                value: Some(value.to_string()),
            },
        }
    }
}

/// 🔢 `[a, b, c]` → `{"1": a, "2": b, "3": c}`. One-based, because SQL.
fn bindings_json(values: &[BindValue]) -> Result<Value> {
    let mut map = Map::new();
    for (index, value) in values.iter().enumerate() {
        map.insert(
            (index + 1).to_string(),
            serde_json::to_value(value.to_wire()).context("💀 A bind value would not serialize")?,
        );
    }
    Ok(Value::Object(map))
}

/// 📊 A finished statement: column names and stringly-typed rows, as the endpoint sends them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementResult {
    pub handle: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

impl StatementResult {
    /// 🔍 Column index by name, case-insensitive.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Vec<Vec<Option<String>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    #[serde(default)]
    row_type: Vec<RowType>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

impl From<StatementResponse> for StatementResult {
    fn from(response: StatementResponse) -> Self {
        StatementResult {
            handle: response.statement_handle.unwrap_or_default(),
            columns: response
                .result_set_meta_data
                .map(|m| m.row_type.into_iter().map(|c| c.name).collect())
                .unwrap_or_default(),
            rows: response.data,
        }
    }
}

/// 📨 What the pipe said about our file. `SUCCESS` means queued, not loaded.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct IngestResponse {
    #[serde(rename = "responseCode")]
    pub response_code: String,
    #[serde(rename = "requestId", default)]
    pub request_id: Option<String>,
}

// ============================================================
// 🏔️ WarehouseClient
// ============================================================

#[derive(Debug)]
pub struct WarehouseClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    config: WarehouseConfig,
    query_tag: String,
    closed: bool,
}

impl WarehouseClient {
    /// 🚀 Validate the credentials and build the one HTTP client this run will use.
    pub fn connect(config: &WarehouseConfig, query_tag: &str) -> Result<Self, IngestError> {
        config.validate()?;
        let base_url = config
            .base_url()
            .ok_or_else(|| IngestError::config("warehouse account is not set"))?;
        let token = config
            .token
            .clone()
            .ok_or_else(|| IngestError::config("warehouse token is not set"))?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| IngestError::config(format!("could not build the HTTP client: {e}")))?;

        debug!(
            "🏔️ warehouse client ready for {} as {:?} (role {}, tag {})",
            base_url, config.user, config.role, query_tag
        );
        Ok(Self {
            client,
            base_url,
            token,
            config: config.clone(),
            query_tag: query_tag.to_string(),
            closed: false,
        })
    }

    pub fn query_tag(&self) -> &str {
        &self.query_tag
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", &self.config.token_type)
            .header("Accept", "application/json")
            .header("User-Agent", concat!("liftx/", env!("CARGO_PKG_VERSION")))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            bail!("💀 The warehouse connection was already closed. Teardown came early.");
        }
        Ok(())
    }

    /// 📜 Run one SQL statement to completion and return its result set.
    pub async fn execute(
        &self,
        statement: &str,
        bindings: Option<&[BindValue]>,
    ) -> Result<StatementResult> {
        self.ensure_open()?;

        let mut body = json!({
            "statement": statement,
            "timeout": self.config.request_timeout_secs,
            "database": self.config.database,
            "schema": self.config.schema,
            "warehouse": self.config.warehouse,
            "role": self.config.role,
            "parameters": { "query_tag": self.query_tag },
        });
        if let Some(values) = bindings {
            body["bindings"] = bindings_json(values)?;
        }
        trace!("📜 executing: {}", statement);

        let url = format!("{}/api/v2/statements", self.base_url);
        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .context("💀 The statement never reached the warehouse. Check connectivity and the account URL.")?;

        let status = response.status();
        let text = response
            .text()
            .await
            .context("💀 The warehouse answered and then hung up mid-sentence")?;
        if !status.is_success() {
            bail!("💀 Warehouse rejected the statement ({status}): {text}");
        }
        let parsed: StatementResponse = serde_json::from_str(&text)
            .with_context(|| format!("💀 Could not parse the warehouse response: {text}"))?;

        if status == reqwest::StatusCode::ACCEPTED {
            let handle = parsed
                .statement_handle
                .context("💀 The warehouse said 'accepted' but gave us no handle to check back on")?;
            return self.wait_for(&handle).await;
        }
        Ok(parsed.into())
    }

    /// ⏳ Poll a running statement until it lands or the clock runs out.
    async fn wait_for(&self, handle: &str) -> Result<StatementResult> {
        let deadline = Instant::now() + Duration::from_secs(self.config.request_timeout_secs);
        let url = format!("{}/api/v2/statements/{}", self.base_url, handle);
        loop {
            tokio::time::sleep(Duration::from_millis(self.config.poll_interval_ms)).await;
            let response = self
                .authorized(self.client.get(&url))
                .send()
                .await
                .with_context(|| format!("💀 Lost touch with statement {handle} while it ran"))?;
            let status = response.status();
            let text = response
                .text()
                .await
                .with_context(|| format!("💀 Statement {handle} answered and then hung up mid-sentence"))?;

            if status == reqwest::StatusCode::ACCEPTED {
                trace!("⏳ statement {} still running", handle);
                if Instant::now() >= deadline {
                    bail!(
                        "💀 Statement {handle} was still running after {}s. We stopped waiting.",
                        self.config.request_timeout_secs
                    );
                }
                continue;
            }
            if !status.is_success() {
                bail!("💀 Statement {handle} failed ({status}): {text}");
            }
            let parsed: StatementResponse = serde_json::from_str(&text)
                .with_context(|| format!("💀 Could not parse the result of statement {handle}"))?;
            return Ok(parsed.into());
        }
    }

    /// 📨 Tell a pipe about newly staged files. Queued is all we ever learn.
    pub async fn insert_files(&self, pipe: &str, files: &[String]) -> Result<IngestResponse> {
        self.ensure_open()?;

        let request_id = Uuid::new_v4();
        let url = format!(
            "{}/v1/data/pipes/{}/insertFiles?requestId={}",
            self.base_url, pipe, request_id
        );
        let body = json!({
            "files": files.iter().map(|f| json!({ "path": f })).collect::<Vec<_>>(),
        });

        let response = self
            .authorized(self.client.post(&url))
            .json(&body)
            .send()
            .await
            .with_context(|| format!("💀 The ingest notification for pipe {pipe} never arrived"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .with_context(|| format!("💀 Pipe {pipe} acknowledged and then hung up mid-sentence"))?;
        if !status.is_success() {
            bail!("💀 Pipe {pipe} rejected the ingest notification ({status}): {text}");
        }
        serde_json::from_str(&text)
            .with_context(|| format!("💀 Could not parse the pipe's acknowledgement: {text}"))
    }

    /// 🗑️ Release the connection. Further calls fail instead of quietly reconnecting.
    pub async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            debug!("🗑️ warehouse connection closed (tag {})", self.query_tag);
        }
        Ok(())
    }
}
