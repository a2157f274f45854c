//! Sort executor.

use crate::executor::eval::Evaluator;
use alloc::vec::Vec;
use core::cmp::Ordering;
use rowql_core::Row;

/// One `ORDER BY` key over a row position.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortSpec {
    pub column: usize,
    pub descending: bool,
    /// Nulls are placed first or last regardless of the direction.
    pub nulls_first: bool,
}

impl SortSpec {
    pub fn asc(column: usize) -> Self {
        Self {
            column,
            descending: false,
            nulls_first: true,
        }
    }

    pub fn desc(column: usize) -> Self {
        Self {
            descending: true,
            ..Self::asc(column)
        }
    }
}

/// Sort executor - stable multi-key sort of materialised rows.
pub struct SortExecutor<'e> {
    keys: Vec<SortSpec>,
    evaluator: Evaluator<'e>,
}

impl<'e> SortExecutor<'e> {
    pub fn new(keys: Vec<SortSpec>, evaluator: Evaluator<'e>) -> Self {
        Self { keys, evaluator }
    }

    /// Sorts the rows; rows with equal keys keep their input order.
    pub fn execute(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if !self.keys.is_empty() {
            rows.sort_by(|a, b| self.compare_rows(a, b));
        }
        rows
    }

    fn compare_rows(&self, a: &Row, b: &Row) -> Ordering {
        for key in &self.keys {
            let (av, bv) = match (a.get(key.column), b.get(key.column)) {
                (Some(av), Some(bv)) => (av, bv),
                _ => continue,
            };
            let cmp = match (av.is_null(), bv.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) if key.nulls_first => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, true) if key.nulls_first => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let cmp = self.evaluator.sort_cmp(av, bv);
                    if key.descending {
                        cmp.reverse()
                    } else {
                        cmp
                    }
                }
            };
            if cmp != Ordering::Equal {
                return cmp;
            }
        }
        Ordering::Equal
    }
}
