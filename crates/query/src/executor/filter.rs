//! Filter executor.

use crate::executor::eval::{CExpr, Evaluator};
use crate::executor::operator::{Operator, RowStream};
use alloc::boxed::Box;

/// Filter executor - keeps rows whose predicate is true.
///
/// Unknown (null) results drop the row, as does false.
pub struct FilterExecutor<'e> {
    predicate: CExpr,
    evaluator: Evaluator<'e>,
}

impl<'e> FilterExecutor<'e> {
    pub fn new(predicate: CExpr, evaluator: Evaluator<'e>) -> Self {
        Self {
            predicate,
            evaluator,
        }
    }
}

impl<'a, 'e: 'a> Operator<'a> for FilterExecutor<'e> {
    fn execute(self, input: RowStream<'a>) -> RowStream<'a> {
        let Self {
            predicate,
            evaluator,
        } = self;
        Box::new(input.enumerate().filter_map(move |(n, row)| {
            let row = match row {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            match evaluator.test(&predicate, &row) {
                Ok(true) => Some(Ok(row)),
                Ok(false) => None,
                Err(e) => Some(Err(e.at_row(n + 1))),
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::context::ExecutionOptions;
    use crate::executor::operator::from_rows;
    use alloc::vec;
    use alloc::vec::Vec;
    use rowql_core::{EvalErrorKind, Row, Value};

    #[test]
    fn test_filter_executor() {
        let options = ExecutionOptions::default();
        let rows = vec![
            Row::new(vec![Value::Int64(10)]),
            Row::new(vec![Value::Null]),
            Row::new(vec![Value::Int64(30)]),
        ];
        let pred = CExpr::binary(CExpr::Column(0), BinaryOp::Gt, CExpr::Literal(Value::Int64(15)));
        let result = FilterExecutor::new(pred, Evaluator::new(&options))
            .execute(from_rows(rows))
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(result, vec![Row::new(vec![Value::Int64(30)])]);
    }

    #[test]
    fn test_filter_error_names_row() {
        let options = ExecutionOptions::default();
        let rows = vec![
            Row::new(vec![Value::Int64(1)]),
            Row::new(vec![Value::from("x")]),
        ];
        let pred = CExpr::binary(CExpr::Column(0), BinaryOp::Gt, CExpr::Literal(Value::Int64(0)));
        let err = FilterExecutor::new(pred, Evaluator::new(&options))
            .execute(from_rows(rows))
            .collect::<Result<Vec<_>, _>>()
            .unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert_eq!(err.context, "row 2");
    }
}
