use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tracing::debug;

use super::{Commit, Granularity, LoadTrigger, Receipt, wrong_commit};
use crate::warehouse::{StatementResult, WarehouseClient};

/// 🚛 `COPY INTO` from a stage. Columns matched case-insensitively by name,
/// staged files purged by the warehouse once the load succeeds.
#[derive(Debug)]
pub struct BulkCopyTrigger {
    client: WarehouseClient,
    table: String,
}

impl BulkCopyTrigger {
    pub fn new(client: WarehouseClient, table: String) -> Self {
        Self { client, table }
    }

    /// 📜 The statement, with an explicit FILES list so a leftover file from some
    /// other run in the same stage never rides along with this batch.
    pub fn statement(&self, namespace: &str, files: &[String]) -> String {
        let files = files
            .iter()
            .map(|f| format!("'{}'", f.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "COPY INTO {} FROM {} FILES = ({}) FILE_FORMAT = (TYPE = 'PARQUET') \
             MATCH_BY_COLUMN_NAME = CASE_INSENSITIVE PURGE = TRUE",
            self.table, namespace, files
        )
    }
}

/// 🔢 Sum `rows_loaded` over every file row. A result without that column
/// (the "0 files processed" answer) loaded nothing.
fn rows_loaded(result: &StatementResult) -> Result<u64> {
    let Some(index) = result.column("rows_loaded") else {
        return Ok(0);
    };
    result
        .rows
        .iter()
        .filter_map(|row| row.get(index).cloned().flatten())
        .map(|cell| {
            cell.parse::<u64>()
                .with_context(|| format!("💀 rows_loaded came back as '{cell}', which is not a count"))
        })
        .sum()
}

#[async_trait]
impl LoadTrigger for BulkCopyTrigger {
    fn name(&self) -> &'static str {
        "bulk copy"
    }

    fn granularity(&self) -> Granularity {
        Granularity::Batched
    }

    async fn commit(&mut self, commit: Commit<'_>) -> Result<Receipt> {
        let Commit::Staged {
            namespace,
            files,
            rows: expected,
        } = commit
        else {
            return Err(wrong_commit(self.name(), &commit));
        };
        let statement = self.statement(namespace, files);
        let result = self
            .client
            .execute(&statement, None)
            .await
            .with_context(|| format!("💀 COPY INTO {} from {} failed", self.table, namespace))?;
        let rows = rows_loaded(&result)?;
        if rows != expected {
            // -- the FILES list names only this batch, so a short count means the file
            //    never reached the namespace (or only part of it loaded)
            bail!(
                "💀 COPY INTO {} loaded {} of {} rows from {} (statement {}). \
                 Is [stage] uploading into that namespace?",
                self.table,
                rows,
                expected,
                namespace,
                result.handle
            );
        }
        debug!("🚛 COPY INTO {} loaded {} rows ({})", self.table, rows, result.handle);
        Ok(Receipt::Loaded { rows })
    }

    async fn close(&mut self) -> Result<()> {
        self.client.close().await
    }
}
