//! Table scan executor.

use crate::executor::operator::StatsRecorder;
use crate::executor::relation::{Layout, Relation};
use alloc::boxed::Box;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use hashbrown::HashSet;
use rowql_core::{Record, Row};

/// Table scan executor - turns the records of one source into rows.
///
/// The source's columns are the union of its record keys in
/// first-appearance order. Keys a record lacks read as null.
pub struct TableScanExecutor<'a> {
    records: &'a [Record],
    stats: &'a StatsRecorder,
}

impl<'a> TableScanExecutor<'a> {
    pub fn new(records: &'a [Record], stats: &'a StatsRecorder) -> Self {
        Self { records, stats }
    }

    /// Column names of the source.
    pub fn columns(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut columns = Vec::new();
        for record in self.records {
            for column in record.columns() {
                if seen.insert(column) {
                    columns.push(column.to_string());
                }
            }
        }
        columns
    }

    /// Executes the scan; rows are produced lazily under `name`.
    pub fn execute(self, name: &str) -> Relation<'a> {
        let columns = self.columns();
        let layout = Layout::single(name, columns.clone(), self.records.is_empty());
        let stats = self.stats;
        let rows = self.records.iter().map(move |record| {
            stats.record_scan();
            Ok(Row::new(columns.iter().map(|c| record.get_or_null(c)).collect()))
        });
        Relation::new(layout, Box::new(rows))
    }
}
