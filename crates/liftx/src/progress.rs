// AI
//! 📊 progress.rs: "How many tickets have we shipped?" asked every operator, every run.
//!
//! 🚀 Two jobs:
//! - a spinner on stderr while the run is live (hidden unless `[runtime] progress = true`,
//!   because most runs are cron jobs and cron has no terminal to spin in)
//! - a [`RunSummary`] at the end, rendered as a comfy table and logged at info
//!
//! ⚠️ Nothing here writes to stdout. Stdout belongs to the generator.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

// -- 📏 one mebibyte. not a megabyte.
const MIB: u64 = 1024 * 1024;

/// 📦 Bytes, scaled to whatever unit makes them readable.
fn format_bytes(bytes: u64) -> String {
    if bytes >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 "1000000" → "1,000,000".
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the long ones.
fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 🎟️ Live run counters behind a spinner.
///
/// Rates use a sliding 5-second window so a slow COPY doesn't make the
/// records/s number fall off a cliff and climb back like a seismograph.
pub struct IngestProgress {
    label: String,
    records: u64,
    batches: u64,
    progress_bar: ProgressBar,
    rate_samples: VecDeque<(Instant, u64)>,
}

impl std::fmt::Debug for IngestProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- ProgressBar doesn't derive Debug
        f.debug_struct("IngestProgress")
            .field("label", &self.label)
            .field("records", &self.records)
            .field("batches", &self.batches)
            .finish()
    }
}

impl IngestProgress {
    pub fn new(label: impl Into<String>, visible: bool) -> Self {
        let progress_bar = if visible {
            let bar = ProgressBar::new_spinner();
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };

        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((Instant::now(), 0u64));

        Self {
            label: label.into(),
            records: 0,
            batches: 0,
            progress_bar,
            rate_samples,
        }
    }

    /// 🔄 One more ticket read.
    pub fn record_read(&mut self) {
        self.records += 1;
        // -- redraw every 256 records, the spinner ticks on its own in between
        if self.records % 256 == 0 {
            self.render();
        }
    }

    /// ✅ One more unit of work committed.
    pub fn batch_committed(&mut self) {
        self.batches += 1;
        self.render();
    }

    pub fn finish(&self) {
        self.progress_bar.finish_and_clear();
    }

    fn records_per_sec(&mut self) -> f64 {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.records));

        match self.rate_samples.front() {
            Some(&(oldest_time, oldest_records)) => {
                let elapsed = now.duration_since(oldest_time).as_secs_f64();
                if elapsed > 0.0 {
                    self.records.saturating_sub(oldest_records) as f64 / elapsed
                } else {
                    0.0
                }
            }
            None => 0.0,
        }
    }

    fn render(&mut self) {
        let rate = self.records_per_sec();
        self.progress_bar.set_message(format!(
            "{}: {} tickets | {} tickets/s | {} committed",
            self.label,
            format_number(self.records),
            format_number(rate as u64),
            format_number(self.batches),
        ));
    }
}

/// 🧾 What a finished run did. Returned by the driver, logged by [`RunSummary::log`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub trigger: &'static str,
    pub records_read: u64,
    pub batches_committed: u64,
    /// 🔢 Rows the destination confirmed. Only bulk copy reports these, so for
    /// the other variants this is the row count we handed over.
    pub rows_committed: u64,
    pub bytes_staged: u64,
    pub elapsed: Duration,
    /// 📏 Size of every committed batch, in commit order.
    pub batch_sizes: Vec<usize>,
}

impl RunSummary {
    pub fn render_table(&self) -> String {
        let records_per_sec = if self.elapsed.as_secs_f64() > 0.0 {
            self.records_read as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        };

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} tickets read", format_number(self.records_read)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} tickets/s", format_number(records_per_sec as u64)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} commits", format_number(self.batches_committed)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} rows", format_number(self.rows_committed)))
                .set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} staged", format_bytes(self.bytes_staged)))
                .set_alignment(CellAlignment::Right),
            Cell::new(format!("{} elapsed", format_duration(self.elapsed)))
                .set_alignment(CellAlignment::Right),
        ]);
        format!("{}\n{}", self.trigger, table)
    }

    pub fn log(&self) {
        info!("✅ ingest complete\n{}", self.render_table());
    }
}
