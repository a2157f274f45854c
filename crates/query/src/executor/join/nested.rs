//! Nested Loop Join implementation.

use super::JoinProbe;
use crate::executor::eval::{CExpr, Evaluator};
use alloc::vec::Vec;
use rowql_core::{EvalError, Row};

/// Nested Loop Join executor.
///
/// Compares every left row against every right row. Handles any join
/// condition, including non-equi joins and joins with no condition at all.
pub struct NestedLoopJoin<'e> {
    /// Condition over `left ++ right`; `None` pairs every row.
    condition: Option<CExpr>,
    evaluator: Evaluator<'e>,
}

impl<'e> NestedLoopJoin<'e> {
    pub fn new(condition: Option<CExpr>, evaluator: Evaluator<'e>) -> Self {
        Self {
            condition,
            evaluator,
        }
    }
}

impl JoinProbe for NestedLoopJoin<'_> {
    fn probe(&self, left: &Row, right: &[Row], out: &mut Vec<usize>) -> Result<(), EvalError> {
        let condition = match &self.condition {
            Some(condition) => condition,
            None => {
                out.extend(0..right.len());
                return Ok(());
            }
        };
        for (idx, right_row) in right.iter().enumerate() {
            if self.evaluator.test(condition, &Row::concat(left, right_row))? {
                out.push(idx);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::context::ExecutionOptions;
    use alloc::vec;
    use rowql_core::{EvalErrorKind, Value};

    fn rows(values: &[i64]) -> Vec<Row> {
        values.iter().map(|v| Row::new(vec![Value::Int64(*v)])).collect()
    }

    #[test]
    fn test_cross_join_pairs_everything() {
        let options = ExecutionOptions::default();
        let join = NestedLoopJoin::new(None, Evaluator::new(&options));
        let mut out = Vec::new();
        join.probe(&rows(&[1])[0], &rows(&[1, 2, 3]), &mut out).unwrap();
        assert_eq!(out, vec![0, 1, 2]);
    }

    #[test]
    fn test_non_equi_condition() {
        let options = ExecutionOptions::default();
        let condition = CExpr::binary(CExpr::Column(0), BinaryOp::Lt, CExpr::Column(1));
        let join = NestedLoopJoin::new(Some(condition), Evaluator::new(&options));
        let mut out = Vec::new();
        join.probe(&rows(&[2])[0], &rows(&[3, 1, 5, 2]), &mut out).unwrap();
        assert_eq!(out, vec![0, 2]);
    }

    #[test]
    fn test_null_never_matches() {
        let options = ExecutionOptions::default();
        let condition = CExpr::binary(CExpr::Column(0), BinaryOp::Eq, CExpr::Column(1));
        let join = NestedLoopJoin::new(Some(condition), Evaluator::new(&options));
        let mut out = Vec::new();
        join.probe(&Row::new(vec![Value::Null]), &[Row::new(vec![Value::Null])], &mut out)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_condition_errors_propagate() {
        let options = ExecutionOptions::default();
        let condition = CExpr::binary(CExpr::Column(0), BinaryOp::Eq, CExpr::Column(1));
        let join = NestedLoopJoin::new(Some(condition), Evaluator::new(&options));
        let mut out = Vec::new();
        let err = join
            .probe(&rows(&[1])[0], &[Row::new(vec![Value::from("x")])], &mut out)
            .unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
    }
}
