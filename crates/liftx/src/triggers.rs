// ai
//! 📡 Load triggers: the last step, where staged bytes (or one lonely row) become queryable data.
//!
//! 🎬 *[three scripts used to exist. they shared a connection routine, by copy-paste.
//! now they share a trait, by design, and a [`WarehouseClient`], by injection.]*
//!
//! 🧠 Knowledge graph:
//! - `BulkCopy`: `COPY INTO` from the configured stage, case-insensitive column match, purge on
//!   success. Synchronous. Loading fewer rows than were staged is a failure, not a receipt.
//! - `DirectInsert`: one `INSERT ... SELECT` per ticket. No stage, no Parquet, no batches.
//! - `AsyncIngest`: tells a pipe about the staged file. Success means *submitted*, never *loaded*.
//! - `granularity()` is how the driver knows whether to batch at all.
//! - Wrong commit kind for a variant is a trigger error, not a panic.

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;

use crate::common::TicketRecord;
use crate::error::IngestError;
use crate::warehouse::{WarehouseClient, WarehouseConfig};

mod async_ingest;
mod bulk_copy;
mod direct_insert;

pub use async_ingest::AsyncIngestTrigger;
pub use bulk_copy::BulkCopyTrigger;
pub use direct_insert::DirectInsertTrigger;

/// 🪣 What unit of work a trigger wants handed to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    /// Materialize, stage, then commit the staged file set.
    Batched,
    /// Commit every ticket on its own. Batch size means nothing here.
    RowByRow,
}

/// 📦 The thing being committed.
#[derive(Debug, Clone, Copy)]
pub enum Commit<'a> {
    Staged {
        namespace: &'a str,
        files: &'a [String],
        /// 🔢 Tickets inside `files`. Bulk copy must load exactly this many.
        rows: u64,
    },
    Row(&'a TicketRecord),
}

impl Commit<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Commit::Staged { .. } => "staged files",
            Commit::Row(_) => "a single row",
        }
    }
}

/// 🧾 What the destination told us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Receipt {
    Loaded { rows: u64 },
    Inserted,
    /// ⏳ Queued for ingestion. Whether it loads is somebody else's afternoon.
    Submitted { response_code: String },
}

/// 📡 Commit data to the warehouse.
///
/// # Contract 📜
/// - `commit` blocks until the destination answers. No retries.
/// - `close` releases the warehouse connection. Called once, at teardown.
#[async_trait]
pub trait LoadTrigger: std::fmt::Debug + Send {
    fn name(&self) -> &'static str;
    fn granularity(&self) -> Granularity;
    async fn commit(&mut self, commit: Commit<'_>) -> Result<Receipt>;
    async fn close(&mut self) -> Result<()>;
}

/// 🎭 The three ways tickets reach the warehouse.
#[derive(Debug)]
pub enum TriggerBackend {
    BulkCopy(BulkCopyTrigger),
    DirectInsert(DirectInsertTrigger),
    AsyncIngest(AsyncIngestTrigger),
}

#[async_trait]
impl LoadTrigger for TriggerBackend {
    fn name(&self) -> &'static str {
        match self {
            TriggerBackend::BulkCopy(t) => t.name(),
            TriggerBackend::DirectInsert(t) => t.name(),
            TriggerBackend::AsyncIngest(t) => t.name(),
        }
    }

    fn granularity(&self) -> Granularity {
        match self {
            TriggerBackend::BulkCopy(t) => t.granularity(),
            TriggerBackend::DirectInsert(t) => t.granularity(),
            TriggerBackend::AsyncIngest(t) => t.granularity(),
        }
    }

    async fn commit(&mut self, commit: Commit<'_>) -> Result<Receipt> {
        match self {
            TriggerBackend::BulkCopy(t) => t.commit(commit).await,
            TriggerBackend::DirectInsert(t) => t.commit(commit).await,
            TriggerBackend::AsyncIngest(t) => t.commit(commit).await,
        }
    }

    async fn close(&mut self) -> Result<()> {
        match self {
            TriggerBackend::BulkCopy(t) => t.close().await,
            TriggerBackend::DirectInsert(t) => t.close().await,
            TriggerBackend::AsyncIngest(t) => t.close().await,
        }
    }
}

/// 🏷️ Which trigger to build, without the connection attached yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    BulkCopy,
    DirectInsert,
    AsyncIngest,
}

impl TriggerKind {
    /// 🏷️ Shows up in the warehouse's query history. Pick a good one.
    pub fn query_tag(self) -> &'static str {
        match self {
            TriggerKind::BulkCopy => "liftx-copy-into",
            TriggerKind::DirectInsert => "liftx-insert",
            TriggerKind::AsyncIngest => "liftx-snowpipe",
        }
    }
}

impl TriggerBackend {
    /// 🚀 The one place a warehouse connection gets opened. Every variant goes through here.
    pub fn connect(
        kind: TriggerKind,
        warehouse: &WarehouseConfig,
        load: &LoadConfig,
    ) -> Result<Self, IngestError> {
        load.validate()?;
        let client = WarehouseClient::connect(warehouse, kind.query_tag())?;
        Ok(Self::with_client(kind, client, load))
    }

    pub fn with_client(kind: TriggerKind, client: WarehouseClient, load: &LoadConfig) -> Self {
        match kind {
            TriggerKind::BulkCopy => {
                TriggerBackend::BulkCopy(BulkCopyTrigger::new(client, load.table.clone()))
            }
            TriggerKind::DirectInsert => {
                TriggerBackend::DirectInsert(DirectInsertTrigger::new(client, load.table.clone()))
            }
            TriggerKind::AsyncIngest => {
                TriggerBackend::AsyncIngest(AsyncIngestTrigger::new(client, load.pipe.clone()))
            }
        }
    }
}

// ============================================================
// 🔧 LoadConfig - `[load]`
// ============================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LoadConfig {
    /// 🎯 Destination table for COPY INTO and INSERT.
    #[serde(default = "default_table")]
    pub table: String,
    /// 📦 The warehouse-side name of wherever `[stage]` uploads to. The staged variants
    /// refuse to start without it: the table stage `@%<table>` only takes `PUT`.
    #[serde(default)]
    pub stage_namespace: Option<String>,
    /// 📨 Fully qualified pipe for async ingestion.
    #[serde(default = "default_pipe")]
    pub pipe: String,
}

fn default_table() -> String {
    "lift_tickets".to_string()
}

fn default_pipe() -> String {
    "INGEST.INGEST.LIFT_TICKETS_PIPE".to_string()
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            table: default_table(),
            stage_namespace: None,
            pipe: default_pipe(),
        }
    }
}

impl LoadConfig {
    pub fn namespace(&self) -> String {
        self.stage_namespace
            .clone()
            .unwrap_or_else(|| format!("@%{}", self.table))
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        if self.table.trim().is_empty() {
            return Err(IngestError::config("[load] table must not be empty"));
        }
        if self.pipe.trim().is_empty() {
            return Err(IngestError::config("[load] pipe must not be empty"));
        }
        Ok(())
    }
}

/// 🚔 Shared refusal for a commit the variant doesn't speak.
pub(crate) fn wrong_commit(trigger: &str, commit: &Commit<'_>) -> anyhow::Error {
    anyhow::anyhow!(
        "💀 The {trigger} trigger was handed {}. It does not know what to do with that.",
        commit.kind()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::fixtures::full_ticket;
    use crate::warehouse::test_support::config_for;
    use wiremock::MockServer;

    #[test]
    fn the_one_where_the_table_stage_is_the_default_namespace() {
        let load = LoadConfig {
            table: "lift_tickets_copy".into(),
            ..LoadConfig::default()
        };
        assert_eq!(load.namespace(), "@%lift_tickets_copy");

        let custom = LoadConfig {
            stage_namespace: Some("@INGEST.INGEST.TICKET_STAGE".into()),
            ..LoadConfig::default()
        };
        assert_eq!(custom.namespace(), "@INGEST.INGEST.TICKET_STAGE");
    }

    #[test]
    fn the_one_where_an_empty_table_name_is_a_startup_failure() {
        let load = LoadConfig {
            table: "  ".into(),
            ..LoadConfig::default()
        };
        assert!(matches!(load.validate(), Err(IngestError::Configuration(_))));
    }

    #[tokio::test]
    async fn the_one_where_each_kind_knows_how_it_wants_its_data() {
        let server = MockServer::start().await;
        let load = LoadConfig::default();
        let cases = [
            (TriggerKind::BulkCopy, Granularity::Batched, "bulk copy"),
            (TriggerKind::DirectInsert, Granularity::RowByRow, "direct insert"),
            (TriggerKind::AsyncIngest, Granularity::Batched, "async ingest"),
        ];
        for (kind, granularity, name) in cases {
            let trigger = TriggerBackend::connect(kind, &config_for(&server), &load).unwrap();
            assert_eq!(trigger.granularity(), granularity);
            assert_eq!(trigger.name(), name);
        }
    }

    #[tokio::test]
    async fn the_one_where_a_row_sent_to_bulk_copy_is_refused_without_a_network_call() {
        let server = MockServer::start().await;
        let mut trigger =
            TriggerBackend::connect(TriggerKind::BulkCopy, &config_for(&server), &LoadConfig::default())
                .unwrap();
        let ticket = full_ticket(0);
        assert!(trigger.commit(Commit::Row(&ticket)).await.is_err());
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
