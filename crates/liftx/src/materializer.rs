// ai
//! 🧱 Columnar Materializer: turns a batch of tickets into one Parquet file on local disk.
//!
//! 🎬 *[a batch arrives. eleven columns await. somewhere, a snappy codec stretches.]*
//!
//! 🧠 Knowledge graph:
//! - Schema: Arrow's JSON inference over the batch, then forced into the fixed
//!   [`TICKET_COLUMNS`] order. Best effort on types, zero effort on reordering.
//! - Nested objects: embedded struct columns by default, raw JSON text when the
//!   downstream load wants to `PARSE_JSON` them itself.
//! - Encoding: dictionary OFF (txids and rfids are all unique, a dictionary would
//!   just be a second copy of the column), lossless block compression ON.
//! - Naming: `<uuid v7>.parquet`. Unique across batches, runs, and neighbors.
//! - Storage: a [`TempScope`] created once per process and swept on teardown.
//!
//! ```text
//! Batch → serde_json::Value rows → infer schema → reorder → Decoder → RecordBatch → ArrowWriter → file
//! ```
//!
//! ⚠️ A failure here is fatal for the batch and therefore for the run. No retry, no skip.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use arrow::datatypes::{Field, Schema, SchemaRef};
use arrow::json::reader::{ReaderBuilder, infer_json_schema_from_iterator};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::basic::{Compression, GzipLevel, ZstdLevel};
use parquet::file::properties::WriterProperties;
use serde::Deserialize;
use serde_json::Value;
use tempfile::TempDir;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::common::{Batch, TICKET_COLUMNS, TicketRecord};

/// 🪆 The two ticket fields that are objects rather than scalars.
const NESTED_COLUMNS: [&str; 2] = ["address", "emergency_contact"];

// ============================================================
// 🔧 MaterializerConfig - co-located with the thing it configures
// ============================================================

/// 🗜️ Block compression for the Parquet pages. All lossless. Snappy by default,
/// because that's what the warehouse loaders have been eating for years.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParquetCompression {
    #[default]
    Snappy,
    Zstd,
    Gzip,
    Lz4,
    Uncompressed,
}

/// 🪆 How nested ticket objects land in the file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NestedEncoding {
    /// Embedded struct columns. `MATCH_BY_COLUMN_NAME` maps them onto VARIANT.
    #[default]
    Struct,
    /// Raw JSON text, one string per object, `null` stays null.
    JsonText,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaterializerConfig {
    #[serde(default)]
    pub compression: ParquetCompression,
    #[serde(default)]
    pub nested_encoding: NestedEncoding,
    /// 📁 Parent directory for the temp scope. `None` means the OS temp dir.
    #[serde(default)]
    pub temp_root: Option<PathBuf>,
}

// ============================================================
// 📁 TempScope - the one directory we own, for as long as we live
// ============================================================

/// 📁 Scoped temporary storage: created once at startup, released once at teardown.
///
/// `release` is explicit so the driver can report a failed sweep. If nobody calls
/// it, `TempDir`'s Drop still tries. Belt and suspenders, except the suspenders
/// are `Drop` and the belt is us.
#[derive(Debug)]
pub struct TempScope {
    dir: Option<TempDir>,
}

impl TempScope {
    pub fn create(root: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("liftx-");
        let dir = match root {
            Some(root) => builder.tempdir_in(root).with_context(|| {
                format!(
                    "💀 Could not carve a temp scope out of '{}'. The directory said no.",
                    root.display()
                )
            })?,
            None => builder
                .tempdir()
                .context("💀 Could not create a temp scope in the OS temp dir. Disk full? /tmp on strike?")?,
        };
        debug!("📁 temp scope ready at {}", dir.path().display());
        Ok(Self { dir: Some(dir) })
    }

    /// 📍 `None` once released. Writing into a released scope is a bug we report, not a panic.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_ref().map(|d| d.path())
    }

    /// 🧹 Remove the scope and everything still inside it. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        match self.dir.take() {
            Some(dir) => {
                let path = dir.path().to_path_buf();
                dir.close().with_context(|| {
                    format!("💀 Temp scope '{}' refused to be swept", path.display())
                })?;
                debug!("🧹 temp scope {} released", path.display());
                Ok(())
            }
            None => Ok(()),
        }
    }
}

// ============================================================
// 🧱 MaterializedFile - one batch, one file
// ============================================================

/// 🧱 A batch that now exists as bytes on disk.
#[derive(Debug, Clone)]
pub struct MaterializedFile {
    pub path: PathBuf,
    pub file_name: String,
    pub rows: usize,
    pub bytes: u64,
}

impl MaterializedFile {
    /// 🗑️ Delete the local copy. Staging never does this for us.
    pub fn discard(&self) -> std::io::Result<()> {
        std::fs::remove_file(&self.path)
    }
}

// ============================================================
// 🏭 ColumnarMaterializer
// ============================================================

#[derive(Debug)]
pub struct ColumnarMaterializer {
    scope: TempScope,
    config: MaterializerConfig,
    properties: WriterProperties,
}

impl ColumnarMaterializer {
    /// 🚀 Creates the process-lifetime temp scope and freezes the writer properties.
    pub fn new(config: MaterializerConfig) -> Result<Self> {
        let scope = TempScope::create(config.temp_root.as_deref())?;
        let properties = writer_properties(config.compression);
        Ok(Self {
            scope,
            config,
            properties,
        })
    }

    pub fn scope_path(&self) -> Option<&Path> {
        self.scope.path()
    }

    /// 🧱 Write `batch` to a fresh `<uuid>.parquet` inside the temp scope.
    ///
    /// On any failure the half-written file is removed before the error leaves.
    pub fn materialize(&self, batch: &Batch) -> Result<MaterializedFile> {
        if batch.is_empty() {
            bail!("💀 Refusing to materialize batch #{}: it has no rows", batch.number);
        }
        let dir = self
            .scope
            .path()
            .context("💀 The temp scope was already released. Nowhere left to write.")?;

        let record_batch = self.to_record_batch(&batch.records)?;

        let file_name = format!("{}.parquet", Uuid::now_v7());
        let path = dir.join(&file_name);

        if let Err(err) = self.write_parquet(&path, &record_batch) {
            // -- 🧹 leave no half-baked bricks behind
            let _ = std::fs::remove_file(&path);
            return Err(err);
        }

        let bytes = std::fs::metadata(&path)
            .with_context(|| format!("💀 Wrote '{}' and then lost it", path.display()))?
            .len();

        debug!(
            batch = batch.number,
            rows = record_batch.num_rows(),
            bytes,
            file = %file_name,
            "🧱 batch materialized"
        );

        Ok(MaterializedFile {
            path,
            file_name,
            rows: record_batch.num_rows(),
            bytes,
        })
    }

    /// 🔄 Tickets → JSON rows → inferred schema (fixed order) → Arrow RecordBatch.
    pub fn to_record_batch(&self, records: &[TicketRecord]) -> Result<RecordBatch> {
        let rows = records
            .iter()
            .map(|r| self.to_row(r))
            .collect::<Result<Vec<Value>>>()?;

        check_column_kinds(&rows)?;
        let schema = infer_ticket_schema(&rows)?;
        trace!("📐 batch schema: {:?}", schema);

        let mut decoder = ReaderBuilder::new(schema)
            .with_batch_size(rows.len().max(1))
            .build_decoder()
            .context("💀 Arrow would not build a decoder for the inferred schema")?;
        decoder
            .serialize(&rows)
            .context("💀 A ticket did not fit the column type inferred for its batch")?;
        decoder
            .flush()
            .context("💀 Arrow choked flushing the batch")?
            .context("💀 Arrow flushed a batch and produced nothing. The tickets vanished.")
    }

    fn to_row(&self, record: &TicketRecord) -> Result<Value> {
        let mut row = serde_json::to_value(record)
            .with_context(|| format!("💀 Ticket '{}' would not serialize", record.txid))?;
        if self.config.nested_encoding == NestedEncoding::JsonText {
            for column in NESTED_COLUMNS {
                if let Some(slot) = row.get_mut(column) {
                    if !slot.is_null() {
                        *slot = Value::String(slot.to_string());
                    }
                }
            }
        }
        Ok(row)
    }

    fn write_parquet(&self, path: &Path, batch: &RecordBatch) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("💀 Could not create '{}'", path.display()))?;
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(self.properties.clone()))
            .context("💀 Parquet writer refused the schema")?;
        writer
            .write(batch)
            .context("💀 Parquet writer refused the rows")?;
        writer
            .close()
            .context("💀 Parquet writer could not write its footer")?;
        Ok(())
    }

    /// 🧹 Release the temp scope. Called once, by the driver, on every exit path.
    pub fn release(&mut self) -> Result<()> {
        self.scope.release()
    }
}

fn writer_properties(compression: ParquetCompression) -> WriterProperties {
    let codec = match compression {
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Zstd => Compression::ZSTD(ZstdLevel::default()),
        ParquetCompression::Gzip => Compression::GZIP(GzipLevel::default()),
        ParquetCompression::Lz4 => Compression::LZ4_RAW,
        ParquetCompression::Uncompressed => Compression::UNCOMPRESSED,
    };
    WriterProperties::builder()
        .set_compression(codec)
        .set_dictionary_enabled(false)
        .build()
}

fn json_kind(value: &Value) -> Option<&'static str> {
    match value {
        Value::Null => None,
        Value::Bool(_) => Some("boolean"),
        Value::Number(_) => Some("number"),
        Value::String(_) => Some("string"),
        Value::Array(_) => Some("array"),
        Value::Object(_) => Some("object"),
    }
}

/// 🚔 One JSON kind per column per batch. Inference would quietly widen a
/// string/number mix to text and then trip over the numbers. We trip first,
/// with the column name in the error.
fn check_column_kinds(rows: &[Value]) -> Result<()> {
    for column in TICKET_COLUMNS {
        let mut seen: Option<&'static str> = None;
        for row in rows {
            let Some(kind) = row.get(column).and_then(json_kind) else {
                continue;
            };
            match seen {
                None => seen = Some(kind),
                Some(first) if first != kind => {
                    bail!("💀 Column '{column}' mixes {first} and {kind} values within one batch")
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

fn infer_ticket_schema(rows: &[Value]) -> Result<SchemaRef> {
    let inferred = infer_json_schema_from_iterator(rows.iter().map(Ok))
        .context("💀 Arrow could not infer a schema from this batch")?;
    let fields = TICKET_COLUMNS
        .iter()
        .map(|column| {
            inferred
                .field_with_name(column)
                .cloned()
                .with_context(|| format!("💀 Column '{column}' is missing from the inferred schema"))
        })
        .collect::<Result<Vec<Field>>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PurchaseTime;
    use crate::common::fixtures::{full_ticket, sparse_ticket};
    use arrow::array::{Array, StringArray};
    use arrow::datatypes::DataType;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use parquet::basic::Encoding;

    fn materializer_in(root: &Path, config: MaterializerConfig) -> ColumnarMaterializer {
        ColumnarMaterializer::new(MaterializerConfig {
            temp_root: Some(root.to_path_buf()),
            ..config
        })
        .expect("💀 temp scope should be creatable under a fresh tempdir")
    }

    fn batch_of(records: Vec<TicketRecord>) -> Batch {
        Batch { number: 1, records }
    }

    #[test]
    fn the_one_where_a_batch_becomes_a_parquet_file_with_eleven_ordered_columns() {
        let root = tempfile::tempdir().unwrap();
        let m = materializer_in(root.path(), MaterializerConfig::default());
        let records = vec![full_ticket(0), sparse_ticket(1), full_ticket(2)];

        let file = m.materialize(&batch_of(records)).unwrap();
        assert_eq!(file.rows, 3);
        assert!(file.bytes > 0);
        assert!(file.file_name.ends_with(".parquet"));

        let builder = ParquetRecordBatchReaderBuilder::try_new(File::open(&file.path).unwrap()).unwrap();
        let names: Vec<_> = builder.schema().fields().iter().map(|f| f.name().clone()).collect();
        assert_eq!(names, TICKET_COLUMNS);
        assert!(matches!(
            builder.schema().field_with_name("address").unwrap().data_type(),
            DataType::Struct(_)
        ));

        let column = builder.metadata().row_group(0).column(0);
        assert_eq!(column.compression(), Compression::SNAPPY);
        assert!(!column.encodings().contains(&Encoding::RLE_DICTIONARY));
        assert!(!column.encodings().contains(&Encoding::PLAIN_DICTIONARY));

        let batches: Vec<_> = builder.build().unwrap().collect::<Result<_, _>>().unwrap();
        let txids = batches[0]
            .column_by_name("txid")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap();
        assert_eq!(txids.value(0), "tx-0000");
        assert_eq!(txids.value(2), "tx-0002");
    }

    #[test]
    fn the_one_where_json_text_mode_flattens_the_nested_objects() {
        let root = tempfile::tempdir().unwrap();
        let m = materializer_in(
            root.path(),
            MaterializerConfig {
                nested_encoding: NestedEncoding::JsonText,
                compression: ParquetCompression::Zstd,
                ..Default::default()
            },
        );
        let batch = m.to_record_batch(&[full_ticket(0), sparse_ticket(1)]).unwrap();
        let address = batch
            .column_by_name("address")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .expect("address should be text in json_text mode");
        assert!(address.value(0).contains("\"city\":\"Vail\""));
        assert!(address.is_null(1));
    }

    #[test]
    fn the_one_where_every_file_gets_its_own_name() {
        let root = tempfile::tempdir().unwrap();
        let m = materializer_in(root.path(), MaterializerConfig::default());
        let a = m.materialize(&batch_of(vec![full_ticket(0)])).unwrap();
        let b = m.materialize(&batch_of(vec![full_ticket(0)])).unwrap();
        assert_ne!(a.file_name, b.file_name);
    }

    #[test]
    fn the_one_where_mixed_purchase_time_kinds_are_a_fatal_type_mismatch() {
        let root = tempfile::tempdir().unwrap();
        let m = materializer_in(root.path(), MaterializerConfig::default());
        let mut epoch = full_ticket(1);
        epoch.purchase_time = PurchaseTime::Epoch(1_700_000_000.5);

        let err = m.materialize(&batch_of(vec![full_ticket(0), epoch])).unwrap_err();
        assert!(format!("{err:#}").contains("purchase_time"));
        // -- 🧹 nothing left behind in the scope
        let leftovers = std::fs::read_dir(m.scope_path().unwrap()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn the_one_where_an_all_null_column_still_materializes() {
        let root = tempfile::tempdir().unwrap();
        let m = materializer_in(root.path(), MaterializerConfig::default());
        let file = m
            .materialize(&batch_of(vec![sparse_ticket(0), sparse_ticket(1)]))
            .unwrap();
        assert_eq!(file.rows, 2);
    }

    #[test]
    fn the_one_where_empty_batches_are_refused() {
        let root = tempfile::tempdir().unwrap();
        let m = materializer_in(root.path(), MaterializerConfig::default());
        assert!(m.materialize(&batch_of(vec![])).is_err());
    }

    #[test]
    fn the_one_where_release_sweeps_the_scope_and_is_idempotent() {
        let root = tempfile::tempdir().unwrap();
        let mut m = materializer_in(root.path(), MaterializerConfig::default());
        m.materialize(&batch_of(vec![full_ticket(0)])).unwrap();

        m.release().unwrap();
        m.release().unwrap();
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
        assert!(m.materialize(&batch_of(vec![full_ticket(0)])).is_err());
    }
}
