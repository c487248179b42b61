//! 🧾 Record decoder: one line in, one ticket (or the end of the world) out.
//!
//! The empty line is special. It is not "skip me", it is "stop reading".
//! Producers print it after their last ticket and the driver honors it even
//! if more lines follow. That contract is old and load-bearing. Do not "fix" it.

use crate::common::TicketRecord;
use crate::error::IngestError;

/// 📜 What a single input line turned out to be.
#[derive(Debug, Clone, PartialEq)]
pub enum Line {
    Record(Box<TicketRecord>),
    /// 🏁 The blank sentinel line. Everything after it is ignored.
    EndOfStream,
}

/// 🔄 Decode one raw line (terminator included or not) into a [`Line`].
///
/// `line_number` is 1-based and only used to make the error message useful
/// at 3am. No normalization happens here beyond what serde does: nested
/// objects become structs, scalars become scalars, unknown keys are dropped.
/// Bytes that aren't UTF-8 are a decode error like any other bad JSON.
pub fn decode_line(raw: impl AsRef<[u8]>, line_number: u64) -> Result<Line, IngestError> {
    let raw = raw.as_ref();
    let content = raw.strip_suffix(b"\n").unwrap_or(raw);
    let content = content.strip_suffix(b"\r").unwrap_or(content);

    if content.is_empty() {
        return Ok(Line::EndOfStream);
    }

    let record: TicketRecord =
        serde_json::from_slice(content).map_err(|source| IngestError::Decode {
            line: line_number,
            source,
        })?;
    Ok(Line::Record(Box::new(record)))
}
