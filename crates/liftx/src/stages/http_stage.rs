use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Stage, remote_name};

#[derive(Debug, Deserialize, Clone)]
pub struct HttpStageConfig {
    /// 📡 Base URL of the upload endpoint. Files land at `<url>/<file_name>`.
    pub url: String,
    /// 🔒 Optional bearer token.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    60
}

/// 📡 PUTs the raw Parquet bytes to an HTTP endpoint: a presigned bucket prefix,
/// a stage proxy, anything that takes a PUT and means it.
///
/// One `reqwest::Client` for the whole run. No retries. A non-2xx is a failure.
#[derive(Debug)]
pub struct HttpStage {
    client: reqwest::Client,
    config: HttpStageConfig,
}

impl HttpStage {
    pub fn new(config: HttpStageConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. The TLS stack wept.")?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl Stage for HttpStage {
    async fn stage(&mut self, local_path: &Path) -> Result<String> {
        let name = remote_name(local_path)?;
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("💀 Could not read '{}' for upload", local_path.display()))?;
        let url = format!("{}/{}", self.config.url.trim_end_matches('/'), name);

        let mut request = self
            .client
            .put(&url)
            .header("Content-Type", "application/octet-stream");
        if let Some(ref token) = self.config.token {
            request = request.bearer_auth(token);
        }

        let response = request.body(bytes).send().await.with_context(|| {
            format!("💀 The upload to '{url}' never arrived. The network was not vibing with it.")
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("💀 Stage endpoint '{url}' answered {status}: {body}");
        }
        debug!("📡 staged {} via HTTP ({})", name, status);
        Ok(name)
    }

    /// 🗑️ The connection pool drops with the client. Nothing else to do.
    async fn close(&mut self) -> Result<()> {
        debug!("🗑️ http stage closing");
        Ok(())
    }
}
