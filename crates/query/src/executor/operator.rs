//! Row streams and the stage trait.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::Cell;
use rowql_core::{EvalError, Row};
use tracing::trace;

/// A lazy stream of rows. Errors end the query.
pub type RowStream<'a> = Box<dyn Iterator<Item = Result<Row, EvalError>> + 'a>;

/// A streaming stage that transforms one row stream into another.
pub trait Operator<'a> {
    fn execute(self, input: RowStream<'a>) -> RowStream<'a>;
}

/// Buffering counters of one execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ExecutionStats {
    /// Barrier stages that drained their input.
    pub barriers: usize,
    /// Rows held in memory by barrier stages.
    pub buffered_rows: usize,
    /// Rows read from data sources.
    pub scanned_rows: usize,
}

/// Shared counters stages update while rows flow.
#[derive(Debug, Default)]
pub struct StatsRecorder {
    barriers: Cell<usize>,
    buffered_rows: Cell<usize>,
    scanned_rows: Cell<usize>,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_scan(&self) {
        self.scanned_rows.set(self.scanned_rows.get() + 1);
    }

    pub fn record_barrier(&self, rows: usize) {
        self.barriers.set(self.barriers.get() + 1);
        self.buffered_rows.set(self.buffered_rows.get() + rows);
    }

    /// Adds the counters of a nested execution.
    pub fn absorb(&self, stats: ExecutionStats) {
        self.barriers.set(self.barriers.get() + stats.barriers);
        self.buffered_rows.set(self.buffered_rows.get() + stats.buffered_rows);
        self.scanned_rows.set(self.scanned_rows.get() + stats.scanned_rows);
    }

    pub fn snapshot(&self) -> ExecutionStats {
        ExecutionStats {
            barriers: self.barriers.get(),
            buffered_rows: self.buffered_rows.get(),
            scanned_rows: self.scanned_rows.get(),
        }
    }
}

/// Drains a stream into memory, recording a barrier.
pub fn drain(stream: RowStream<'_>, stats: &StatsRecorder, stage: &'static str) -> Result<Vec<Row>, EvalError> {
    let rows = stream.collect::<Result<Vec<_>, _>>()?;
    stats.record_barrier(rows.len());
    trace!(target: "rowql::exec", stage, rows = rows.len(), "barrier drained");
    Ok(rows)
}

/// Wraps materialised rows back into a stream.
pub fn from_rows<'a>(rows: Vec<Row>) -> RowStream<'a> {
    Box::new(rows.into_iter().map(Ok))
}
