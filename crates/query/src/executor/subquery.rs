//! Subqueries inside expressions.
//!
//! Every subquery first runs once while the enclosing expression compiles,
//! inside a watched frame of nulls standing for the enclosing row. If no
//! column resolves to that frame, the result is folded into literals.
//! Otherwise the subquery is correlated: [`SubqueryExecutor`] runs it again
//! for every row of the enclosing block and appends the result to the row,
//! where the compiled expression reads it as a column.

use crate::ast::{ColumnRef, Query};
use crate::executor::eval::{CExpr, Evaluator};
use crate::executor::operator::{Operator, RowStream};
use crate::executor::relation::{Layout, Resolved};
use alloc::boxed::Box;
use alloc::format;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::Cell;
use rowql_core::{EvalError, EvalErrorKind, Row, Value};

/// Runs subqueries inside enclosing scopes.
pub trait SubqueryRunner {
    /// Runs `query` with `outer` as its enclosing scopes, innermost last.
    /// Returns the column count and the rows.
    fn run_subquery(&self, query: &Query, outer: &[Frame]) -> Result<(usize, Vec<Row>), EvalError>;

    /// Scopes enclosing the block being compiled, innermost last.
    fn outer_frames(&self) -> &[Frame];
}

/// An enclosing block's layout and the row it is evaluating.
#[derive(Clone, Debug)]
pub struct Frame {
    pub layout: Layout,
    pub row: Row,
    /// Set once a column of the frame is resolved.
    read: Option<Rc<Cell<bool>>>,
}

impl Frame {
    pub fn new(layout: Layout, row: Row) -> Self {
        Self {
            layout,
            row,
            read: None,
        }
    }

    /// A frame of nulls that records whether any of its columns is read.
    pub fn watched(layout: Layout) -> Self {
        let row = Row::nulls(layout.width());
        Self {
            layout,
            row,
            read: Some(Rc::new(Cell::new(false))),
        }
    }

    /// Returns true if a column of this watched frame, or of a clone of it,
    /// has been resolved.
    pub fn was_read(&self) -> bool {
        self.read.as_ref().map_or(false, |read| read.get())
    }

    fn value(&self, index: Option<usize>) -> Value {
        if let Some(read) = &self.read {
            read.set(true);
        }
        index
            .and_then(|i| self.row.get(i).cloned())
            .unwrap_or(Value::Null)
    }
}

/// Resolves a column the current block does not have against the
/// enclosing scopes, innermost first.
///
/// Returns `Ok(None)` when no scope has the column.
pub fn resolve_outer(frames: &[Frame], column: &ColumnRef) -> Result<Option<Value>, EvalError> {
    for frame in frames.iter().rev() {
        match frame.layout.resolve(column) {
            Ok(Resolved::Index(i)) => return Ok(Some(frame.value(Some(i)))),
            Ok(Resolved::Phantom) => return Ok(Some(frame.value(None))),
            Err(e) if e.kind == EvalErrorKind::UnknownColumn => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(None)
}

/// What a correlated subquery computes for each enclosing row.
#[derive(Clone, Debug, PartialEq)]
pub enum SubqueryTest {
    Exists { negated: bool },
    /// `expr` is compiled against the enclosing row.
    In { expr: CExpr, negated: bool },
}

/// A subquery bound to the enclosing block it reads columns from.
#[derive(Clone, Debug)]
pub struct CorrelatedSubquery {
    query: Query,
    test: SubqueryTest,
    /// Layout of the enclosing block.
    layout: Layout,
    /// Scopes around the enclosing block.
    outer: Vec<Frame>,
}

impl CorrelatedSubquery {
    pub fn new(query: Query, test: SubqueryTest, layout: Layout, outer: Vec<Frame>) -> Self {
        Self {
            query,
            test,
            layout,
            outer,
        }
    }

    pub fn test(&self) -> &SubqueryTest {
        &self.test
    }

    /// Runs the subquery for one enclosing row.
    pub fn evaluate(
        &self,
        row: &Row,
        runner: &dyn SubqueryRunner,
        evaluator: &Evaluator<'_>,
    ) -> Result<Value, EvalError> {
        let mut outer = self.outer.clone();
        outer.push(Frame::new(self.layout.clone(), row.clone()));
        match &self.test {
            SubqueryTest::Exists { negated } => {
                let (_, rows) = runner.run_subquery(&self.query, &outer)?;
                Ok(Value::Boolean(rows.is_empty() == *negated))
            }
            SubqueryTest::In { expr, negated } => {
                let needle = evaluator.eval(expr, row)?;
                let (width, rows) = runner.run_subquery(&self.query, &outer)?;
                let list = single_column(width, rows)?;
                let membership = CExpr::InList {
                    expr: Box::new(CExpr::Literal(needle)),
                    list,
                    negated: *negated,
                };
                evaluator.eval(&membership, row)
            }
        }
    }
}

/// The rows of an `IN` subquery as literals.
pub fn single_column(width: usize, rows: Vec<Row>) -> Result<Vec<CExpr>, EvalError> {
    if width != 1 {
        return Err(EvalError::invalid_argument(
            "IN",
            format!("IN subquery must return one column, got {}", width),
        ));
    }
    Ok(rows
        .into_iter()
        .map(|row| CExpr::Literal(row.into_values().into_iter().next().unwrap_or(Value::Null)))
        .collect())
}

/// Subquery executor - appends one value per correlated subquery to each
/// row, in registration order.
pub struct SubqueryExecutor<'r> {
    subqueries: Vec<CorrelatedSubquery>,
    runner: &'r dyn SubqueryRunner,
    evaluator: Evaluator<'r>,
}

impl<'r> SubqueryExecutor<'r> {
    pub fn new(subqueries: Vec<CorrelatedSubquery>, runner: &'r dyn SubqueryRunner, evaluator: Evaluator<'r>) -> Self {
        Self {
            subqueries,
            runner,
            evaluator,
        }
    }
}

impl<'r> Operator<'r> for SubqueryExecutor<'r> {
    fn execute(self, input: RowStream<'r>) -> RowStream<'r> {
        if self.subqueries.is_empty() {
            return input;
        }
        Box::new(input.map(move |row| {
            let mut row = row?;
            // Later subqueries may read the values of earlier ones.
            for subquery in &self.subqueries {
                let value = subquery.evaluate(&row, self.runner, &self.evaluator)?;
                row.push(value);
            }
            Ok(row)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionOptions;
    use crate::parser::parse_query;
    use alloc::string::{String, ToString};
    use alloc::vec;
    use core::cell::RefCell;

    /// Answers every subquery with the enclosing rows' first values it saw.
    #[derive(Default)]
    struct Recording {
        seen: RefCell<Vec<Value>>,
    }

    impl SubqueryRunner for Recording {
        fn run_subquery(&self, _query: &Query, outer: &[Frame]) -> Result<(usize, Vec<Row>), EvalError> {
            let frame = outer.last().ok_or_else(|| EvalError::unknown_column("outer"))?;
            let value = frame.row.values()[0].clone();
            self.seen.borrow_mut().push(value.clone());
            let rows = if value == Value::Int64(0) {
                vec![]
            } else {
                vec![Row::new(vec![value])]
            };
            Ok((1, rows))
        }

        fn outer_frames(&self) -> &[Frame] {
            &[]
        }
    }

    fn layout(columns: &[&str]) -> Layout {
        Layout::single("u", columns.iter().map(|c| c.to_string()).collect(), false)
    }

    fn frame(columns: &[&str], values: Vec<Value>) -> Frame {
        Frame::new(layout(columns), Row::new(values))
    }

    fn query(sql: &str) -> Query {
        parse_query(sql).unwrap()
    }

    #[test]
    fn test_resolve_outer_prefers_innermost_scope() {
        let frames = vec![
            frame(&["id", "a"], vec![Value::Int64(1), Value::Int64(10)]),
            frame(&["id"], vec![Value::Int64(2)]),
        ];
        assert_eq!(resolve_outer(&frames, &ColumnRef::bare("id")).unwrap(), Some(Value::Int64(2)));
        assert_eq!(resolve_outer(&frames, &ColumnRef::bare("a")).unwrap(), Some(Value::Int64(10)));
        assert_eq!(resolve_outer(&frames, &ColumnRef::bare("zzz")).unwrap(), None);
        assert_eq!(resolve_outer(&[], &ColumnRef::qualified("u", "id")).unwrap(), None);
    }

    #[test]
    fn test_watched_frame_records_reads() {
        let watched = Frame::watched(layout(&["id", "name"]));
        let frames = vec![watched.clone()];
        assert_eq!(resolve_outer(&frames, &ColumnRef::bare("other")).unwrap(), None);
        assert!(!watched.was_read());

        assert_eq!(resolve_outer(&frames, &ColumnRef::qualified("u", "name")).unwrap(), Some(Value::Null));
        assert!(watched.was_read());
        assert!(!frame(&["id"], vec![Value::Int64(1)]).was_read());
    }

    #[test]
    fn test_executor_appends_one_value_per_subquery() {
        let options = ExecutionOptions::default();
        let runner = Recording::default();
        let q = query("SELECT 1");
        let subqueries = vec![
            CorrelatedSubquery::new(q.clone(), SubqueryTest::Exists { negated: false }, layout(&["id"]), vec![]),
            CorrelatedSubquery::new(
                q,
                SubqueryTest::In {
                    expr: CExpr::Literal(Value::Int64(7)),
                    negated: false,
                },
                layout(&["id"]),
                vec![],
            ),
        ];
        let input: RowStream<'_> = Box::new(
            vec![Row::new(vec![Value::Int64(7)]), Row::new(vec![Value::Int64(0)])]
                .into_iter()
                .map(Ok),
        );
        let rows = SubqueryExecutor::new(subqueries, &runner, Evaluator::new(&options))
            .execute(input)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(
            rows,
            vec![
                Row::new(vec![Value::Int64(7), Value::Boolean(true), Value::Boolean(true)]),
                Row::new(vec![Value::Int64(0), Value::Boolean(false), Value::Boolean(false)]),
            ]
        );
        assert_eq!(runner.seen.borrow().len(), 4);
    }

    #[test]
    fn test_in_subquery_needs_one_column() {
        let err = single_column(2, vec![]).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::InvalidArgument);
        assert_eq!(err.context, String::from("IN"));
    }
}
