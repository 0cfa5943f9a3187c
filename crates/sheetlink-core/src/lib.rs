//! Core types: row conversion, row batching, tracing
//!
//! Nothing in this crate talks to Google. It holds the pieces that the
//! Google crate, the HTTP service and the CLI share:
//!
//! - [`RowData`] / [`convert_row`] turn heterogeneous input rows into
//!   spreadsheet cell text
//! - [`RowBatcher`] buffers rows and flushes them through a [`RowSink`]
//! - [`tracing`] configures the global subscriber

pub mod batch;
pub mod error;
pub mod row;
pub mod tracing;

use std::future::Future;
use std::pin::Pin;

pub use batch::{BatchState, BatchStats, DEFAULT_BATCH_SIZE, RowBatcher, RowSink};
pub use error::{CoreError, CoreResult};
pub use row::{CellValue, FieldMap, RowData, convert_row, header_row};
pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};

/// A boxed future that can be sent across threads.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
