//! 💀 The five (okay, seven) stages of ingestion grief.
//!
//! Every failure in liftx is fatal. No retries, no skip-and-continue, no
//! "we'll get it next batch". The run stops, teardown runs, and the operator
//! re-runs the job. These variants exist so the log says *which* wall we hit.
//!
//! 🧠 Knowledge graph:
//! - low-level causes are `anyhow::Error` chains built with `.context(...)`
//! - `IngestError` is the label on the chain, the CLI walks `err.chain()` for the rest
//! - `Teardown` only surfaces when the run itself succeeded (a run error always wins)

use thiserror::Error;

/// 🏷️ One variant per failure class the pipeline can end on.
#[derive(Debug, Error)]
pub enum IngestError {
    /// 🔧 Bad batch size, missing credentials, missing stage. Raised before any input is read.
    #[error("💀 configuration rejected: {0}")]
    Configuration(String),

    /// 📥 The input stream itself broke (not the JSON, the bytes).
    #[error("💀 failed reading input at line {line}")]
    Read {
        line: u64,
        #[source]
        source: std::io::Error,
    },

    /// 🧾 A line that is not a ticket. Aborts the whole pipeline.
    #[error("💀 line {line} is not a valid ticket record")]
    Decode {
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    /// 🧱 The batch refused to become a columnar file.
    #[error("💀 could not materialize batch #{batch} ({rows} rows)")]
    Materialize {
        batch: u64,
        rows: usize,
        #[source]
        source: anyhow::Error,
    },

    /// 📦 Upload to the stage failed.
    #[error("💀 staging '{file}' failed for batch #{batch}")]
    Staging {
        batch: u64,
        file: String,
        #[source]
        source: anyhow::Error,
    },

    /// 📡 The destination said no to the load / insert / ingest call.
    #[error("💀 {trigger} trigger failed")]
    Trigger {
        trigger: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// 🧹 Releasing the temp scope or closing a connection went sideways.
    #[error("💀 teardown did not finish cleanly")]
    Teardown(#[source] anyhow::Error),
}

impl IngestError {
    /// 🔧 Shorthand for the startup-time rejections.
    pub fn config(msg: impl Into<String>) -> Self {
        IngestError::Configuration(msg.into())
    }
}
