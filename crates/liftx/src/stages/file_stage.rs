use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, trace};

use super::{Stage, remote_name};

// -- 📁 FileStageConfig lives next to FileStage. One backend, one config, one file.
#[derive(Debug, Deserialize, Clone)]
pub struct FileStageConfig {
    /// 📁 A directory the warehouse can read, usually a mounted external stage.
    pub directory: PathBuf,
}

/// 📁 Copies staged files into a directory. The poor man's object store.
///
/// `new` creates the directory if it isn't there yet. `stage` copies, it never
/// moves, because moving would be an implicit delete of the local file.
#[derive(Debug)]
pub struct FileStage {
    config: FileStageConfig,
}

impl FileStage {
    pub async fn new(config: FileStageConfig) -> Result<Self> {
        tokio::fs::create_dir_all(&config.directory)
            .await
            .with_context(|| {
                format!(
                    "💀 The stage directory '{}' could not be conjured into existence. \
                     The path stared back. It did not blink.",
                    config.directory.display()
                )
            })?;
        debug!("📁 file stage ready at {}", config.directory.display());
        Ok(Self { config })
    }
}

#[async_trait]
impl Stage for FileStage {
    async fn stage(&mut self, local_path: &Path) -> Result<String> {
        let name = remote_name(local_path)?;
        let target = self.config.directory.join(&name);
        let bytes = tokio::fs::copy(local_path, &target).await.with_context(|| {
            format!(
                "💀 Copying '{}' into the stage at '{}' failed. Disk full? Mount gone? Both?",
                local_path.display(),
                target.display()
            )
        })?;
        trace!("📁 staged {} ({} bytes)", name, bytes);
        Ok(name)
    }

    /// 🗑️ Nothing to flush. `copy` already put the bytes down.
    async fn close(&mut self) -> Result<()> {
        Ok(())
    }
}
