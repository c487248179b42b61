// ai
//! 🎿 liftx: lift tickets from stdin to the warehouse, one batch at a time.
//!
//! 🎬 *[narrator voice]* "Newline-delimited JSON goes in. Queryable rows come out.
//! In between: a buffer, a Parquet file, an upload, a load command, and a delete."
//!
//! 🧠 Knowledge graph:
//! ```text
//! stdin → decoder → accumulator → materializer → stage → trigger → (local delete)
//!                      ╰── direct insert skips straight to the trigger, one row at a time
//! ```
//! - [`Variant::CopyInto`]: staged batches, `COPY INTO`, purge on success
//! - [`Variant::Snowpipe`]: staged batches, pipe notification, success = submitted
//! - [`Variant::Insert`]: no batches, one `INSERT` per ticket
//! - [`generate`]: the fake-ticket producer that feeds all of the above

pub mod accumulator;
pub mod app_config;
pub mod common;
pub mod decoder;
pub mod driver;
pub mod error;
pub mod generator;
pub mod materializer;
pub mod progress;
pub mod stages;
pub mod triggers;
pub mod warehouse;

use std::io::Write;

use tokio::io::AsyncBufRead;
use tracing::{debug, warn};

use crate::accumulator::BatchSize;
use crate::app_config::AppConfig;
use crate::driver::PipelineDriver;
use crate::error::IngestError;
use crate::generator::{ResortCatalog, TicketGenerator, TimestampStyle};
use crate::materializer::ColumnarMaterializer;
use crate::progress::RunSummary;
use crate::stages::{StageBackend, StageConfig};
use crate::triggers::{LoadConfig, LoadTrigger, TriggerBackend, TriggerKind};

/// 🎭 The three ways to ingest. The batch size is the raw CLI value on purpose:
/// negative numbers reach [`BatchSize::try_from`] and fail as configuration errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    CopyInto { batch_size: i64 },
    Snowpipe { batch_size: i64 },
    Insert,
}

impl Variant {
    fn plan(self) -> (TriggerKind, Option<i64>) {
        match self {
            Variant::CopyInto { batch_size } => (TriggerKind::BulkCopy, Some(batch_size)),
            Variant::Snowpipe { batch_size } => (TriggerKind::AsyncIngest, Some(batch_size)),
            Variant::Insert => (TriggerKind::DirectInsert, None),
        }
    }
}

/// 🚀 Validate everything, connect once, then drive `reader` to the sentinel.
///
/// Every configuration check happens before the first line is read.
pub async fn run<R>(config: AppConfig, variant: Variant, reader: R) -> Result<RunSummary, IngestError>
where
    R: AsyncBufRead + Unpin,
{
    let (kind, batch_size) = variant.plan();
    debug!("🎭 variant {:?} → trigger {:?}", variant, kind);

    let Some(raw_batch_size) = batch_size else {
        let trigger = TriggerBackend::connect(kind, &config.warehouse, &config.load)?;
        return PipelineDriver::row_by_row(reader, trigger)?
            .with_progress(config.runtime.progress)
            .run()
            .await;
    };

    let batch_size = BatchSize::try_from(raw_batch_size)?;
    let stage_config = config.stage.as_ref().ok_or_else(|| {
        IngestError::config("this variant stages files, but no [stage] is configured")
    })?;
    let namespace = staged_namespace(stage_config, &config.load)?;

    // -- 🏗️ cheapest first. whatever got built before a failure is closed again.
    let mut materializer = ColumnarMaterializer::new(config.materializer.clone())
        .map_err(|e| IngestError::config(format!("temp scope could not be created: {e:#}")))?;
    let mut trigger = TriggerBackend::connect(kind, &config.warehouse, &config.load)?;
    let stage = match StageBackend::from_config(stage_config).await {
        Ok(stage) => stage,
        Err(e) => {
            if let Err(close_err) = trigger.close().await {
                warn!("⚠️ closing the warehouse connection after a failed setup: {close_err:#}");
            }
            if let Err(release_err) = materializer.release() {
                warn!("⚠️ releasing the temp scope after a failed setup: {release_err:#}");
            }
            return Err(IngestError::config(format!("stage could not be set up: {e:#}")));
        }
    };

    PipelineDriver::batched(reader, batch_size, materializer, stage, trigger, namespace)?
    .with_progress(config.runtime.progress)
    .run()
    .await
}

/// 📦 The namespace COPY INTO reads from (and the pipe's stage is expected to be).
///
/// It has to be spelled out: the table stage `@%<table>` only accepts `PUT`, and no
/// `[stage]` backend can write there, so defaulting to it would load nothing.
fn staged_namespace(stage: &StageConfig, load: &LoadConfig) -> Result<String, IngestError> {
    match (&load.stage_namespace, stage) {
        (Some(namespace), _) if !namespace.trim().is_empty() => Ok(namespace.clone()),
        #[cfg(test)]
        (None, StageConfig::InMemory) => Ok(load.namespace()),
        _ => Err(IngestError::config(
            "[load] stage_namespace must name the warehouse stage that [stage] uploads into \
             (for example @INGEST.INGEST.TICKET_STAGE); the table stage is not reachable from here",
        )),
    }
}

/// 🎰 Write `count` fake tickets and the closing blank line to `out`.
pub fn generate<W: Write>(out: W, count: u64, timestamps: TimestampStyle) -> anyhow::Result<()> {
    let catalog = ResortCatalog::default();
    let mut tickets = TicketGenerator::new(&catalog, rand::rng(), timestamps);
    generator::write_tickets(out, count, &mut tickets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::materializer::MaterializerConfig;
    use crate::stages::{FileStageConfig, HttpStageConfig};
    use crate::warehouse::WarehouseConfig;

    fn configured() -> AppConfig {
        AppConfig {
            warehouse: WarehouseConfig {
                url: Some("http://127.0.0.1:9".into()),
                user: Some("LIFTX".into()),
                token: Some("jwt".into()),
                ..WarehouseConfig::default()
            },
            stage: Some(StageConfig::InMemory),
            ..AppConfig::default()
        }
    }

    fn never_read() -> tokio::io::BufReader<&'static [u8]> {
        tokio::io::BufReader::new(&b"{this would fail to decode}\n"[..])
    }

    #[tokio::test]
    async fn the_one_where_zero_and_negative_batch_sizes_fail_before_reading() {
        for batch_size in [0, -5] {
            let err = run(configured(), Variant::CopyInto { batch_size }, never_read())
                .await
                .unwrap_err();
            assert!(matches!(err, IngestError::Configuration(_)), "{batch_size}: {err:?}");
        }
    }

    #[tokio::test]
    async fn the_one_where_missing_credentials_fail_before_reading() {
        let config = AppConfig {
            stage: Some(StageConfig::InMemory),
            ..AppConfig::default()
        };
        let err = run(config, Variant::Insert, never_read()).await.unwrap_err();
        assert!(matches!(err, IngestError::Configuration(_)));
    }

    #[tokio::test]
    async fn the_one_where_a_staged_variant_without_a_stage_is_refused() {
        let config = AppConfig {
            stage: None,
            ..configured()
        };
        let err = run(config, Variant::Snowpipe { batch_size: 10 }, never_read())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("[stage]"));
    }

    #[tokio::test]
    async fn the_one_where_a_real_stage_without_a_namespace_is_refused() {
        let stages = [
            StageConfig::Http(HttpStageConfig {
                url: "http://127.0.0.1:9/stage".into(),
                token: None,
                timeout_secs: 5,
            }),
            StageConfig::File(FileStageConfig {
                directory: "/mnt/ticket-stage".into(),
            }),
        ];
        for stage in stages {
            for variant in [Variant::CopyInto { batch_size: 10 }, Variant::Snowpipe { batch_size: 10 }] {
                let config = AppConfig {
                    stage: Some(stage.clone()),
                    ..configured()
                };
                let err = run(config, variant, never_read()).await.unwrap_err();
                assert!(matches!(err, IngestError::Configuration(_)), "{variant:?}: {err:?}");
                assert!(err.to_string().contains("stage_namespace"), "{err}");
            }
        }
    }

    #[tokio::test]
    async fn the_one_where_a_stage_that_cannot_start_leaves_no_temp_scope_behind() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let not_a_dir = scratch.path().join("occupied");
        std::fs::write(&not_a_dir, b"a file, not a directory").unwrap();

        let mut config = configured();
        config.stage = Some(StageConfig::File(FileStageConfig {
            directory: not_a_dir.join("stage"),
        }));
        config.load.stage_namespace = Some("@INGEST.INGEST.TICKET_STAGE".into());
        config.materializer = MaterializerConfig {
            temp_root: Some(root.path().to_path_buf()),
            ..MaterializerConfig::default()
        };

        let err = run(config, Variant::CopyInto { batch_size: 10 }, never_read())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("stage could not be set up"), "{err}");
        assert!(std::fs::read_dir(root.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn the_one_where_insert_with_empty_input_never_calls_anyone() {
        // -- nothing listens on port 9; a single request would fail the run
        let summary = run(configured(), Variant::Insert, tokio::io::BufReader::new(&b"\n"[..]))
            .await
            .unwrap();
        assert_eq!(summary.records_read, 0);
        assert_eq!(summary.trigger, "direct insert");
    }

    #[test]
    fn the_one_where_generate_writes_count_lines_and_a_sentinel() {
        let mut out = Vec::new();
        generate(&mut out, 2, TimestampStyle::Iso).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 3);
        assert!(text.ends_with("\n\n"));
    }
}
