//! 🪣 The batch accumulator. Tickets go in, in order. Full batches come out, in order.
//!
//! It never drops a ticket and never reorders one. It has exactly one opinion:
//! how many tickets make a batch. That opinion is a [`BatchSize`], which cannot
//! be zero because we checked at startup.

use std::num::NonZeroUsize;

use crate::common::{Batch, TicketRecord};
use crate::error::IngestError;

/// 📏 A validated, strictly positive batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSize(NonZeroUsize);

impl BatchSize {
    pub fn new(size: usize) -> Result<Self, IngestError> {
        NonZeroUsize::new(size)
            .map(BatchSize)
            .ok_or_else(|| IngestError::config("batch size must be a positive integer, got 0"))
    }

    pub fn get(self) -> usize {
        self.0.get()
    }
}

impl TryFrom<i64> for BatchSize {
    type Error = IngestError;

    /// 🔧 Accepts whatever the CLI parsed, including the negative numbers
    /// someone will inevitably type. Those become configuration errors, not panics.
    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        let size = usize::try_from(raw).map_err(|_| {
            IngestError::config(format!("batch size must be a positive integer, got {raw}"))
        })?;
        BatchSize::new(size)
    }
}

/// 🪣 Buffers tickets until [`BatchSize`] is reached.
#[derive(Debug)]
pub struct BatchAccumulator {
    size: BatchSize,
    buffer: Vec<TicketRecord>,
    batches_drained: u64,
}

impl BatchAccumulator {
    pub fn new(size: BatchSize) -> Self {
        Self {
            size,
            buffer: Vec::with_capacity(size.get()),
            batches_drained: 0,
        }
    }

    pub fn append(&mut self, record: TicketRecord) {
        self.buffer.push(record);
    }

    pub fn is_full(&self) -> bool {
        self.buffer.len() >= self.size.get()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// 📤 Hand the current buffer over as a numbered [`Batch`] and start fresh.
    ///
    /// Ownership moves to the caller. The accumulator keeps nothing, not even a
    /// sentimental copy.
    pub fn drain(&mut self) -> Batch {
        self.batches_drained += 1;
        let records = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.size.get()));
        Batch {
            number: self.batches_drained,
            records,
        }
    }
}
