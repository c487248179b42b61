// ai
//! 📦 Stages: where a local Parquet file goes to become visible to the warehouse.
//!
//! 🎬 *[a freshly materialized file blinks in the temp dir. it has never been uploaded. it is nervous.]*
//!
//! A stage is I/O and nothing else. It takes a path, pushes the bytes somewhere
//! the load trigger can see them, and hands back the remote name. It does not
//! delete the local file (the driver does that, on purpose, on every path), it does
//! not retry, and it does not care what is inside the file.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (FileStage, HttpStage, InMemoryStage) → StageBackend enum
//! - `StageConfig` picks the variant, externally tagged: `[stage.File]`, `[stage.Http]`
//!   (plus `stage = "InMemory"` in tests)
//! - One long-lived stage handle per run. `close` is called exactly once, at teardown.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;

mod file_stage;
mod http_stage;
mod in_mem_stage;

pub use file_stage::{FileStage, FileStageConfig};
pub use http_stage::{HttpStage, HttpStageConfig};
pub use in_mem_stage::InMemoryStage;

/// 📦 Upload a local file, get back its remote name.
///
/// # Contract 📜
/// - `stage` uploads once and returns the name the load trigger should reference.
/// - `stage` never deletes `local_path`.
/// - `close` releases the connection. Called once. Skipping it is a bug.
#[async_trait]
pub trait Stage: std::fmt::Debug + Send {
    async fn stage(&mut self, local_path: &Path) -> Result<String>;
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 Every stage we know how to talk to.
#[derive(Debug)]
pub enum StageBackend {
    InMemory(InMemoryStage),
    File(FileStage),
    Http(HttpStage),
}

#[async_trait]
impl Stage for StageBackend {
    async fn stage(&mut self, local_path: &Path) -> Result<String> {
        match self {
            StageBackend::InMemory(stage) => stage.stage(local_path).await,
            StageBackend::File(stage) => stage.stage(local_path).await,
            StageBackend::Http(stage) => stage.stage(local_path).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            StageBackend::InMemory(stage) => stage.close().await,
            StageBackend::File(stage) => stage.close().await,
            StageBackend::Http(stage) => stage.close().await,
        }
    }
}

/// 🔧 Which stage to build. Lives in `[stage]` of the config file.
#[derive(Debug, Clone, Deserialize)]
pub enum StageConfig {
    File(FileStageConfig),
    Http(HttpStageConfig),
    /// 🧪 Only selectable from config in tests. Build `StageBackend::InMemory` directly otherwise.
    #[cfg(test)]
    InMemory,
}

impl StageBackend {
    /// 🚀 Build the configured stage. Fails here, at startup, rather than on batch #1.
    pub async fn from_config(config: &StageConfig) -> Result<Self> {
        Ok(match config {
            StageConfig::File(file) => StageBackend::File(FileStage::new(file.clone()).await?),
            StageConfig::Http(http) => StageBackend::Http(HttpStage::new(http.clone())?),
            #[cfg(test)]
            StageConfig::InMemory => StageBackend::InMemory(InMemoryStage::new()),
        })
    }
}

/// 🏷️ The remote name of a staged file is its local file name. Uniqueness was
/// already paid for by the materializer's uuid.
pub(crate) fn remote_name(local_path: &Path) -> Result<String> {
    local_path
        .file_name()
        .and_then(|name| name.to_str())
        .map(str::to_owned)
        .with_context(|| {
            format!(
                "💀 '{}' has no usable file name. We cannot stage a file we cannot name.",
                local_path.display()
            )
        })
}
