use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

use super::{Commit, Granularity, LoadTrigger, Receipt, wrong_commit};
use crate::warehouse::WarehouseClient;

/// 📨 Hands staged file names to a pipe and walks away.
///
/// The acknowledgement means "queued". The load happens later, out of band,
/// and this trigger never finds out how it went. That is the whole point of a pipe.
#[derive(Debug)]
pub struct AsyncIngestTrigger {
    client: WarehouseClient,
    pipe: String,
}

impl AsyncIngestTrigger {
    pub fn new(client: WarehouseClient, pipe: String) -> Self {
        Self { client, pipe }
    }
}

#[async_trait]
impl LoadTrigger for AsyncIngestTrigger {
    fn name(&self) -> &'static str {
        "async ingest"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Batched
    }

    async fn commit(&mut self, commit: Commit<'_>) -> Result<Receipt> {
        // -- the pipe already knows its stage, the namespace is for COPY INTO
        let Commit::Staged { files, .. } = commit else {
            return Err(wrong_commit(self.name(), &commit));
        };
        let ack = self
            .client
            .insert_files(&self.pipe, files)
            .await
            .with_context(|| format!("💀 Submitting {} file(s) to pipe {} failed", files.len(), self.pipe))?;
        info!(
            "📨 response from the warehouse for {}: {}",
            files.join(", "),
            ack.response_code
        );
        Ok(Receipt::Submitted {
            response_code: ack.response_code,
        })
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close().await
    }
}
