//! Project executor.

use crate::executor::eval::{CExpr, Evaluator};
use crate::executor::operator::{Operator, RowStream};
use alloc::boxed::Box;
use alloc::vec::Vec;
use rowql_core::Row;

/// Project executor - computes the output columns of every row.
pub struct ProjectExecutor<'e> {
    /// One expression per output column.
    columns: Vec<CExpr>,
    evaluator: Evaluator<'e>,
}

impl<'e> ProjectExecutor<'e> {
    pub fn new(columns: Vec<CExpr>, evaluator: Evaluator<'e>) -> Self {
        Self { columns, evaluator }
    }

    /// Projects positions of the input row, in the given order.
    pub fn columns(indices: impl IntoIterator<Item = usize>, evaluator: Evaluator<'e>) -> Self {
        Self::new(indices.into_iter().map(CExpr::Column).collect(), evaluator)
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    fn project(&self, row: &Row) -> Result<Row, rowql_core::EvalError> {
        self.columns
            .iter()
            .map(|c| self.evaluator.eval(c, row))
            .collect::<Result<Vec<_>, _>>()
            .map(Row::new)
    }
}

impl<'a, 'e: 'a> Operator<'a> for ProjectExecutor<'e> {
    fn execute(self, input: RowStream<'a>) -> RowStream<'a> {
        Box::new(input.enumerate().map(move |(n, row)| {
            let row = row?;
            self.project(&row).map_err(|e| e.at_row(n + 1))
        }))
    }
}
