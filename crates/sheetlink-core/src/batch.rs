//! Bounded row buffer flushed in batches.
//!
//! [`RowBatcher`] collects converted rows and hands them to a [`RowSink`]
//! once the buffer reaches its threshold, so a large export turns into a
//! small number of write requests instead of one request per row.
//!
//! Write failures are not retried: the error is returned to the caller as
//! is, and the rows of the failed batch are dropped with it.

use tracing::{debug, trace};

use crate::BoxFuture;
use crate::error::{CoreError, CoreResult};

/// Default number of rows per write request.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Destination for batched rows.
pub trait RowSink: Send {
    /// Error returned by a failed write.
    type Error: Send;

    /// Writes one batch of rows.
    fn write_rows(&mut self, rows: Vec<Vec<String>>) -> BoxFuture<'_, Result<(), Self::Error>>;
}

/// Batcher state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    /// Rows are being buffered.
    Accumulating,
    /// A write is in flight.
    Flushing,
}

/// Counters describing what a batcher has written so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    /// Number of write requests issued.
    pub flushes: usize,
    /// Number of rows handed to the sink.
    pub rows_written: usize,
}

/// Accumulates rows and flushes them through a sink.
#[derive(Debug)]
pub struct RowBatcher<S> {
    sink: S,
    threshold: usize,
    buffer: Vec<Vec<String>>,
    state: BatchState,
    stats: BatchStats,
}

impl<S: RowSink> RowBatcher<S> {
    /// Creates a batcher flushing every `threshold` rows.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidBatchSize`] when `threshold` is zero.
    pub fn new(sink: S, threshold: usize) -> CoreResult<Self> {
        if threshold == 0 {
            return Err(CoreError::InvalidBatchSize(threshold));
        }
        Ok(Self {
            sink,
            threshold,
            buffer: Vec::with_capacity(threshold.min(DEFAULT_BATCH_SIZE)),
            state: BatchState::Accumulating,
            stats: BatchStats::default(),
        })
    }

    /// Creates a batcher with [`DEFAULT_BATCH_SIZE`].
    pub fn with_default_size(sink: S) -> Self {
        Self {
            sink,
            threshold: DEFAULT_BATCH_SIZE,
            buffer: Vec::with_capacity(DEFAULT_BATCH_SIZE),
            state: BatchState::Accumulating,
            stats: BatchStats::default(),
        }
    }

    /// Appends a row, flushing when the buffer reaches the threshold.
    pub async fn add_row(&mut self, row: Vec<String>) -> Result<(), S::Error> {
        self.buffer.push(row);
        trace!(buffered = self.buffer.len(), "row buffered");
        if self.buffer.len() >= self.threshold {
            self.flush().await?;
        }
        Ok(())
    }

    /// Flushes whatever is left in the buffer.
    ///
    /// Does nothing when the buffer is empty.
    pub async fn finalize(&mut self) -> Result<(), S::Error> {
        if self.buffer.is_empty() {
            debug!("nothing left to flush");
            return Ok(());
        }
        self.flush().await
    }

    async fn flush(&mut self) -> Result<(), S::Error> {
        let rows = std::mem::take(&mut self.buffer);
        let count = rows.len();
        self.state = BatchState::Flushing;
        debug!(rows = count, "flushing row batch");

        let result = self.sink.write_rows(rows).await;
        self.state = BatchState::Accumulating;
        result?;

        self.stats.flushes += 1;
        self.stats.rows_written += count;
        Ok(())
    }

    /// Returns the number of rows waiting to be flushed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns the flush threshold.
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Returns the current state.
    pub fn state(&self) -> BatchState {
        self.state
    }

    /// Returns the write counters.
    pub fn stats(&self) -> BatchStats {
        self.stats
    }

    /// Returns a reference to the sink.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consumes the batcher and returns its sink.
    ///
    /// Rows still buffered are discarded; call [`finalize`](Self::finalize)
    /// first.
    pub fn into_sink(self) -> S {
        self.sink
    }
}
