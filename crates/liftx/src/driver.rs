// ai
//! 🚦 The pipeline driver: owns the read loop and everything that happens between
//! "a line arrived" and "the warehouse has it".
//!
//! 🎬 COLD OPEN - INT. STDIN - NIGHT
//!
//! A line arrives. It is a ticket. Then another. Then forty more. Somewhere a batch
//! fills up, and for a brief moment nobody reads anything while a Parquet file is
//! written, uploaded, loaded, and deleted. Then the reading resumes. Then a blank
//! line. Then silence. Then teardown, which happens no matter how the night went.
//!
//! 🧠 Knowledge graph:
//! - Strictly sequential. The next line is not read until the current batch is committed.
//! - Per batch: `Accumulating → Full → Materialized → Staged → Triggered → CleanedUp`,
//!   each transition traced with the batch number.
//! - The local file is deleted after the trigger, whether stage/trigger worked or not.
//! - After the loop (sentinel or EOF) a partial batch is flushed through the same path.
//! - Teardown: release the temp scope, close the stage, close the trigger. Always.
//!   A run error beats a teardown error; a teardown error alone still fails the run.
//! - Direct insert skips accumulator, materializer and stage entirely.

use std::time::Instant;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, trace, warn};

use crate::accumulator::{BatchAccumulator, BatchSize};
use crate::common::{Batch, TicketRecord};
use crate::decoder::{Line, decode_line};
use crate::error::IngestError;
use crate::materializer::{ColumnarMaterializer, MaterializedFile};
use crate::progress::{IngestProgress, RunSummary};
use crate::stages::{Stage, StageBackend};
use crate::triggers::{Commit, Granularity, LoadTrigger, Receipt, TriggerBackend};

/// 🪣 Everything only the staged variants need.
#[derive(Debug)]
struct Batching {
    accumulator: BatchAccumulator,
    materializer: ColumnarMaterializer,
    stage: StageBackend,
    namespace: String,
}

/// 📊 What one committed batch contributed to the summary.
#[derive(Debug)]
struct Committed {
    rows: u64,
    bytes: u64,
}

impl Batching {
    /// 🏭 materialize → stage → trigger → delete local file.
    async fn commit(
        &mut self,
        batch: Batch,
        trigger: &mut TriggerBackend,
    ) -> Result<Committed, IngestError> {
        let number = batch.number;
        let rows = batch.len();
        trace!(batch = number, rows, state = "Full", "🪣 batch full");

        let file = self
            .materializer
            .materialize(&batch)
            .map_err(|source| IngestError::Materialize {
                batch: number,
                rows,
                source,
            })?;
        trace!(batch = number, file = %file.file_name, state = "Materialized", "🧱 batch on disk");

        let outcome = self.stage_and_trigger(number, &file, trigger).await;

        // -- 🗑️ the local copy goes regardless. teardown sweeps whatever this misses.
        match file.discard() {
            Ok(()) => trace!(batch = number, state = "CleanedUp", "🧹 local file deleted"),
            Err(err) => warn!(
                batch = number,
                file = %file.file_name,
                "⚠️ could not delete local file, teardown will sweep it: {err}"
            ),
        }

        let receipt = outcome?;
        let rows_committed = match receipt {
            Receipt::Loaded { rows } => rows,
            Receipt::Submitted { .. } | Receipt::Inserted => rows as u64,
        };
        Ok(Committed {
            rows: rows_committed,
            bytes: file.bytes,
        })
    }

    async fn stage_and_trigger(
        &mut self,
        number: u64,
        file: &MaterializedFile,
        trigger: &mut TriggerBackend,
    ) -> Result<Receipt, IngestError> {
        let remote = self
            .stage
            .stage(&file.path)
            .await
            .map_err(|source| IngestError::Staging {
                batch: number,
                file: file.file_name.clone(),
                source,
            })?;
        trace!(batch = number, remote = %remote, state = "Staged", "📦 batch staged");

        let files = [remote];
        let receipt = trigger
            .commit(Commit::Staged {
                namespace: &self.namespace,
                files: &files,
                rows: file.rows as u64,
            })
            .await
            .map_err(|source| IngestError::Trigger {
                trigger: trigger.name(),
                source,
            })?;
        debug!(
            batch = number,
            remote = %files[0],
            namespace = %self.namespace,
            "📡 batch triggered: {:?}",
            receipt
        );
        trace!(batch = number, state = "Triggered", "📡 trigger acknowledged");
        Ok(receipt)
    }
}

/// 🚦 Reads tickets from `R` and pushes them through to the warehouse.
#[derive(Debug)]
pub struct PipelineDriver<R> {
    reader: R,
    trigger: TriggerBackend,
    batching: Option<Batching>,
    progress: IngestProgress,
}

impl<R> PipelineDriver<R>
where
    R: AsyncBufRead + Unpin,
{
    /// 🪣 Staged variants: bulk copy and async ingest.
    pub fn batched(
        reader: R,
        batch_size: BatchSize,
        materializer: ColumnarMaterializer,
        stage: StageBackend,
        trigger: TriggerBackend,
        namespace: String,
    ) -> Result<Self, IngestError> {
        if trigger.granularity() != Granularity::Batched {
            return Err(IngestError::config(format!(
                "the {} trigger does not take staged batches",
                trigger.name()
            )));
        }
        Ok(Self {
            reader,
            batching: Some(Batching {
                accumulator: BatchAccumulator::new(batch_size),
                materializer,
                stage,
                namespace,
            }),
            progress: IngestProgress::new(trigger.name(), false),
            trigger,
        })
    }

    /// ✍️ Row-by-row: direct insert. No batches, no files, no stage.
    pub fn row_by_row(reader: R, trigger: TriggerBackend) -> Result<Self, IngestError> {
        if trigger.granularity() != Granularity::RowByRow {
            return Err(IngestError::config(format!(
                "the {} trigger needs batches, not single rows",
                trigger.name()
            )));
        }
        Ok(Self {
            reader,
            batching: None,
            progress: IngestProgress::new(trigger.name(), false),
            trigger,
        })
    }

    /// 📊 Swap in a visible spinner.
    pub fn with_progress(mut self, visible: bool) -> Self {
        self.progress = IngestProgress::new(self.trigger.name(), visible);
        self
    }

    /// 🚀 Run to the sentinel (or EOF), flush, tear down, report.
    pub async fn run(mut self) -> Result<RunSummary, IngestError> {
        let started = Instant::now();
        let mut summary = RunSummary {
            trigger: self.trigger.name(),
            ..RunSummary::default()
        };
        match &self.batching {
            Some(batching) => info!(
                "🚀 ingest starting: {} trigger, batches into {}",
                summary.trigger, batching.namespace
            ),
            None => info!("🚀 ingest starting: {} trigger, one row at a time", summary.trigger),
        }

        let outcome = self.pump(&mut summary).await;
        let teardown = self.teardown().await;
        self.progress.finish();
        summary.elapsed = started.elapsed();

        match (outcome, teardown) {
            (Err(run_error), Err(teardown_error)) => {
                warn!("⚠️ teardown also failed after the run failed: {teardown_error:#}");
                Err(run_error)
            }
            (Err(run_error), Ok(())) => Err(run_error),
            (Ok(()), Err(teardown_error)) => Err(teardown_error),
            (Ok(()), Ok(())) => Ok(summary),
        }
    }

    async fn pump(&mut self, summary: &mut RunSummary) -> Result<(), IngestError> {
        // -- raw bytes: a line that isn't UTF-8 is a bad record, not a broken stream
        let mut line = Vec::new();
        let mut line_number: u64 = 0;

        loop {
            line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut line)
                .await
                .map_err(|source| IngestError::Read {
                    line: line_number + 1,
                    source,
                })?;
            if read == 0 {
                debug!("🏁 end of input after {} lines", line_number);
                break;
            }
            line_number += 1;

            let record = match decode_line(&line, line_number)? {
                Line::EndOfStream => {
                    debug!("🏁 sentinel at line {}, no more reading", line_number);
                    break;
                }
                Line::Record(record) => record,
            };
            summary.records_read += 1;
            self.progress.record_read();

            match self.batching.as_mut() {
                None => {
                    Self::commit_row(&mut self.trigger, &record).await?;
                    Self::tally(summary, &mut self.progress, 1, 1, 0);
                }
                Some(batching) => {
                    batching.accumulator.append(*record);
                    trace!(buffered = batching.accumulator.len(), state = "Accumulating");
                    if batching.accumulator.is_full() {
                        let batch = batching.accumulator.drain();
                        let size = batch.len();
                        let committed = batching.commit(batch, &mut self.trigger).await?;
                        Self::tally(summary, &mut self.progress, size, committed.rows, committed.bytes);
                    }
                }
            }
        }

        // -- 🪣 the partial batch at the end gets the same treatment as the full ones
        if let Some(batching) = self.batching.as_mut() {
            if !batching.accumulator.is_empty() {
                let batch = batching.accumulator.drain();
                let size = batch.len();
                debug!(batch = batch.number, rows = size, "🪣 flushing final partial batch");
                let committed = batching.commit(batch, &mut self.trigger).await?;
                Self::tally(summary, &mut self.progress, size, committed.rows, committed.bytes);
            }
        }
        Ok(())
    }

    async fn commit_row(trigger: &mut TriggerBackend, record: &TicketRecord) -> Result<(), IngestError> {
        trigger
            .commit(Commit::Row(record))
            .await
            .map_err(|source| IngestError::Trigger {
                trigger: trigger.name(),
                source,
            })?;
        Ok(())
    }

    fn tally(summary: &mut RunSummary, progress: &mut IngestProgress, size: usize, rows: u64, bytes: u64) {
        summary.batches_committed += 1;
        summary.rows_committed += rows;
        summary.bytes_staged += bytes;
        summary.batch_sizes.push(size);
        progress.batch_committed();
    }

    /// 🧹 Release the temp scope, close the stage, close the trigger. Every step is
    /// attempted even if an earlier one fails; the first failure is reported.
    async fn teardown(&mut self) -> Result<(), IngestError> {
        let mut failures: Vec<anyhow::Error> = Vec::new();

        if let Some(batching) = self.batching.as_mut() {
            if let Err(err) = batching.materializer.release() {
                failures.push(err);
            }
            if let Err(err) = batching.stage.close().await {
                failures.push(err.context("💀 closing the stage failed"));
            }
        }
        if let Err(err) = self.trigger.close().await {
            failures.push(err.context("💀 closing the warehouse connection failed"));
        }

        let mut failures = failures.into_iter();
        match failures.next() {
            None => {
                debug!("🧹 teardown complete");
                Ok(())
            }
            Some(first) => {
                for other in failures {
                    warn!("⚠️ additional teardown failure: {other:#}");
                }
                Err(IngestError::Teardown(first))
            }
        }
    }
}
