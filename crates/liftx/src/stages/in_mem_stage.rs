use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Stage, remote_name};

/// 📦 A stage that never forgets. Every staged file is kept as `(name, bytes)`.
///
/// Clone-able because tests need to peek inside after the driver has taken
/// ownership of the backend. The `Arc` means every clone sees the same vault.
///
/// ⚠️ Tests only. If you're staging production tickets into RAM, the warehouse
/// will never see them and neither will you after the process exits.
#[derive(Debug, Default, Clone)]
pub struct InMemoryStage {
    /// 🔒 The evidence locker, in staging order.
    pub staged: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
    closed: Arc<Mutex<u32>>,
}

impl InMemoryStage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn staged_names(&self) -> Vec<String> {
        self.staged
            .lock()
            .await
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// 🔢 How many times `close` was called. The answer should always be 1.
    pub async fn close_count(&self) -> u32 {
        *self.closed.lock().await
    }
}

#[async_trait]
impl Stage for InMemoryStage {
    async fn stage(&mut self, local_path: &Path) -> Result<String> {
        let name = remote_name(local_path)?;
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("💀 Could not read '{}' into memory", local_path.display()))?;
        // 🔒 Lock, push, done.
        self.staged.lock().await.push((name.clone(), bytes));
        Ok(name)
    }

    async fn close(&mut self) -> Result<()> {
        *self.closed.lock().await += 1;
        Ok(())
    }
}
