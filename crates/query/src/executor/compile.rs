//! Lowering of AST expressions to [`CExpr`].

use crate::ast::{Expr, Query};
use crate::executor::eval::CExpr;
use crate::executor::functions::ScalarFunction;
use crate::executor::relation::{Layout, Resolved};
use crate::executor::subquery::{
    resolve_outer, single_column, CorrelatedSubquery, Frame, SubqueryRunner, SubqueryTest,
};
use alloc::boxed::Box;
use alloc::format;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::cell::RefCell;
use rowql_core::{EvalError, EvalErrorKind, Row, Value};

/// Collects the distinct aggregate calls of an expression, outermost only.
pub fn collect_aggregates<'q>(expr: &'q Expr, out: &mut Vec<&'q Expr>) {
    if let Expr::Aggregate { .. } = expr {
        if !out.iter().any(|e| *e == expr) {
            out.push(expr);
        }
        return;
    }
    expr.for_each_child(|child| collect_aggregates(child, out));
}

/// Compiles expressions against one layout.
///
/// Columns missing from the layout resolve against the enclosing scopes of
/// the runner. Correlated subqueries are collected with the column each
/// one's value is appended at, past the end of the row.
pub struct Compiler<'c> {
    layout: &'c Layout,
    subqueries: &'c dyn SubqueryRunner,
    /// Clause name for error messages.
    clause: &'static str,
    /// Aggregate calls computed by a grouping stage, and the row position
    /// of the first one.
    aggregates: Option<(&'c [Expr], usize)>,
    /// Width of the rows the compiled expressions read.
    width: usize,
    correlated: RefCell<Vec<CorrelatedSubquery>>,
    allow_correlated: bool,
}

impl<'c> Compiler<'c> {
    pub fn new(layout: &'c Layout, subqueries: &'c dyn SubqueryRunner, clause: &'static str) -> Self {
        Self {
            layout,
            subqueries,
            clause,
            aggregates: None,
            width: layout.width(),
            correlated: RefCell::new(Vec::new()),
            allow_correlated: true,
        }
    }

    /// Lets aggregate calls read the values computed by grouping.
    pub fn with_aggregates(mut self, aggregates: Option<(&'c [Expr], usize)>) -> Self {
        self.aggregates = aggregates;
        if let Some((calls, base)) = aggregates {
            self.width = base + calls.len();
        }
        self
    }

    /// Rejects correlated subqueries, for clauses evaluated where no
    /// per-row subquery stage can run.
    pub fn uncorrelated(mut self) -> Self {
        self.allow_correlated = false;
        self
    }

    /// Continues compiling for another clause over the same rows, keeping
    /// the correlated subqueries collected so far.
    pub fn in_clause(mut self, clause: &'static str) -> Self {
        self.clause = clause;
        self
    }

    /// Width of the rows before correlated subquery values are appended.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Correlated subqueries in the order their values are appended.
    pub fn into_correlated(self) -> Vec<CorrelatedSubquery> {
        self.correlated.into_inner()
    }

    pub fn compile(&self, expr: &Expr) -> Result<CExpr, EvalError> {
        let compiled = match expr {
            Expr::Column(column) => match self.layout.resolve(column) {
                Ok(Resolved::Index(i)) => CExpr::Column(i),
                Ok(Resolved::Phantom) => CExpr::Literal(Value::Null),
                Err(e) if e.kind == EvalErrorKind::UnknownColumn => {
                    match resolve_outer(self.subqueries.outer_frames(), column)? {
                        Some(value) => CExpr::Literal(value),
                        None => return Err(e),
                    }
                }
                Err(e) => return Err(e),
            },
            Expr::Literal(value) => CExpr::Literal(value.clone()),
            Expr::Parameter { key, .. } => {
                return Err(EvalError::new(
                    EvalErrorKind::InvalidArgument,
                    key.to_string(),
                    format!("parameter {} has no bound value", key),
                ))
            }
            Expr::Binary { left, op, right } => {
                CExpr::binary(self.compile(left)?, *op, self.compile(right)?)
            }
            Expr::Unary { op, expr } => CExpr::Unary {
                op: *op,
                expr: self.boxed(expr)?,
            },
            Expr::IsNull { expr, negated } => CExpr::IsNull {
                expr: self.boxed(expr)?,
                negated: *negated,
            },
            Expr::Between {
                expr,
                low,
                high,
                negated,
            } => CExpr::Between {
                expr: self.boxed(expr)?,
                low: self.boxed(low)?,
                high: self.boxed(high)?,
                negated: *negated,
            },
            Expr::InList {
                expr,
                list,
                negated,
            } => CExpr::InList {
                expr: self.boxed(expr)?,
                list: self.compile_all(list)?,
                negated: *negated,
            },
            Expr::InSubquery {
                expr,
                query,
                negated,
            } => {
                let expr = self.boxed(expr)?;
                match self.run_once(query)? {
                    Some((width, rows)) => CExpr::InList {
                        expr,
                        list: single_column(width, rows)?,
                        negated: *negated,
                    },
                    None => {
                        let test = SubqueryTest::In {
                            expr: *expr,
                            negated: *negated,
                        };
                        self.correlate(query, test)?
                    }
                }
            }
            Expr::Exists { query, negated } => match self.run_once(query)? {
                Some((_, rows)) => CExpr::Literal(Value::Boolean(rows.is_empty() == *negated)),
                None => self.correlate(query, SubqueryTest::Exists { negated: *negated })?,
            },
            Expr::Like {
                expr,
                pattern,
                negated,
            } => CExpr::Like {
                expr: self.boxed(expr)?,
                pattern: self.boxed(pattern)?,
                negated: *negated,
            },
            Expr::Case {
                operand,
                branches,
                else_result,
            } => CExpr::Case {
                operand: match operand {
                    Some(o) => Some(self.boxed(o)?),
                    None => None,
                },
                branches: branches
                    .iter()
                    .map(|b| -> Result<(CExpr, CExpr), EvalError> {
                        Ok((self.compile(&b.when)?, self.compile(&b.then)?))
                    })
                    .collect::<Result<Vec<_>, _>>()?,
                else_result: match else_result {
                    Some(e) => Some(self.boxed(e)?),
                    None => None,
                },
            },
            Expr::Function { name, args } => {
                let func = ScalarFunction::from_name(name).ok_or_else(|| EvalError::unknown_function(name))?;
                func.check_arity(args.len())?;
                CExpr::Function {
                    func,
                    args: self.compile_all(args)?,
                }
            }
            Expr::Aggregate { func, .. } => {
                let slot = self
                    .aggregates
                    .and_then(|(calls, base)| calls.iter().position(|c| c == expr).map(|i| base + i));
                match slot {
                    Some(i) => CExpr::Column(i),
                    None => return Err(EvalError::aggregate_outside_group(func.name(), self.clause)),
                }
            }
        };
        Ok(compiled)
    }

    /// Runs a subquery inside a watched frame for the current layout.
    /// Returns `None` when it read that frame and so has to run per row.
    fn run_once(&self, query: &Query) -> Result<Option<(usize, Vec<Row>)>, EvalError> {
        let watched = Frame::watched(self.layout.clone());
        let mut outer = self.subqueries.outer_frames().to_vec();
        outer.push(watched.clone());
        let result = self.subqueries.run_subquery(query, &outer)?;
        Ok(if watched.was_read() { None } else { Some(result) })
    }

    /// Registers a correlated subquery and reads its value from the row.
    fn correlate(&self, query: &Query, test: SubqueryTest) -> Result<CExpr, EvalError> {
        if !self.allow_correlated {
            return Err(EvalError::invalid_argument(
                self.clause,
                format!("correlated subqueries are not supported in {}", self.clause),
            ));
        }
        let mut correlated = self.correlated.borrow_mut();
        correlated.push(CorrelatedSubquery::new(
            query.clone(),
            test,
            self.layout.clone(),
            self.subqueries.outer_frames().to_vec(),
        ));
        Ok(CExpr::Column(self.width + correlated.len() - 1))
    }

    fn boxed(&self, expr: &Expr) -> Result<Box<CExpr>, EvalError> {
        self.compile(expr).map(Box::new)
    }

    fn compile_all(&self, exprs: &[Expr]) -> Result<Vec<CExpr>, EvalError> {
        exprs.iter().map(|e| self.compile(e)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{AggregateFunc, BinaryOp, ColumnRef};
    use crate::parser::parse_query;
    use alloc::string::{String, ToString};
    use alloc::vec;

    struct FixedRows(usize, Vec<Row>);

    impl SubqueryRunner for FixedRows {
        fn run_subquery(&self, _query: &Query, _outer: &[Frame]) -> Result<(usize, Vec<Row>), EvalError> {
            Ok((self.0, self.1.clone()))
        }

        fn outer_frames(&self) -> &[Frame] {
            &[]
        }
    }

    /// Compiles inside the given enclosing scopes. Every subquery reads
    /// `t.a` from its enclosing scopes and returns no rows.
    struct Nested(Vec<Frame>);

    impl SubqueryRunner for Nested {
        fn run_subquery(&self, _query: &Query, outer: &[Frame]) -> Result<(usize, Vec<Row>), EvalError> {
            resolve_outer(outer, &ColumnRef::qualified("t", "a"))?;
            Ok((1, Vec::new()))
        }

        fn outer_frames(&self) -> &[Frame] {
            &self.0
        }
    }

    fn layout() -> Layout {
        Layout::single("t", vec!["a".to_string(), "b".to_string()], false)
    }

    fn subquery() -> Box<Query> {
        Box::new(parse_query("SELECT x FROM s").unwrap())
    }

    fn count_star() -> Expr {
        Expr::Aggregate {
            func: AggregateFunc::Count,
            arg: None,
            distinct: false,
        }
    }

    #[test]
    fn test_compile_columns() {
        let layout = layout();
        let runner = FixedRows(1, vec![]);
        let compiler = Compiler::new(&layout, &runner, "WHERE");
        let expr = Expr::binary(Expr::column("b"), BinaryOp::Gt, Expr::literal(1));
        assert_eq!(
            compiler.compile(&expr).unwrap(),
            CExpr::binary(CExpr::Column(1), BinaryOp::Gt, CExpr::Literal(Value::Int64(1)))
        );
        let err = compiler.compile(&Expr::Column(ColumnRef::qualified("u", "a"))).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownColumn);
    }

    #[test]
    fn test_unknown_function() {
        let layout = layout();
        let runner = FixedRows(1, vec![]);
        let compiler = Compiler::new(&layout, &runner, "SELECT");
        let expr = Expr::Function {
            name: String::from("FROBNICATE"),
            args: vec![],
        };
        let err = compiler.compile(&expr).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownFunction);
        assert_eq!(err.context, "FROBNICATE");
    }

    #[test]
    fn test_subqueries_become_literals() {
        let layout = layout();
        let runner = FixedRows(1, vec![Row::new(vec![Value::Int64(3)])]);
        let compiler = Compiler::new(&layout, &runner, "WHERE");
        let expr = Expr::InSubquery {
            expr: Box::new(Expr::column("a")),
            query: subquery(),
            negated: false,
        };
        match compiler.compile(&expr).unwrap() {
            CExpr::InList { list, .. } => assert_eq!(list, vec![CExpr::Literal(Value::Int64(3))]),
            other => panic!("unexpected {:?}", other),
        }
        let exists = Expr::Exists {
            query: subquery(),
            negated: true,
        };
        assert_eq!(compiler.compile(&exists).unwrap(), CExpr::Literal(Value::Boolean(false)));
    }

    #[test]
    fn test_outer_columns_become_literals() {
        let layout = layout();
        let outer = Layout::single("u", vec!["a".to_string(), "id".to_string()], false);
        let runner = Nested(vec![Frame::new(outer, Row::new(vec![Value::Int64(1), Value::Int64(9)]))]);
        let compiler = Compiler::new(&layout, &runner, "WHERE");
        assert_eq!(
            compiler.compile(&Expr::Column(ColumnRef::qualified("u", "id"))).unwrap(),
            CExpr::Literal(Value::Int64(9))
        );
        // The inner `a` shadows the outer one.
        assert_eq!(compiler.compile(&Expr::column("a")).unwrap(), CExpr::Column(0));
        let err = compiler.compile(&Expr::column("nope")).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::UnknownColumn);
    }

    #[test]
    fn test_correlated_subqueries_read_appended_columns() {
        let layout = layout();
        let runner = Nested(vec![]);
        let compiler = Compiler::new(&layout, &runner, "WHERE");
        let exists = Expr::Exists {
            query: Box::new(parse_query("SELECT 1 FROM s WHERE s.x = t.a").unwrap()),
            negated: false,
        };
        let within = Expr::InSubquery {
            expr: Box::new(Expr::column("b")),
            query: Box::new(parse_query("SELECT x FROM s WHERE s.y = t.a").unwrap()),
            negated: true,
        };
        assert_eq!(compiler.compile(&exists).unwrap(), CExpr::Column(2));
        assert_eq!(compiler.compile(&within).unwrap(), CExpr::Column(3));
        let correlated = compiler.into_correlated();
        assert_eq!(correlated.len(), 2);
        assert_eq!(
            correlated[1].test(),
            &SubqueryTest::In {
                expr: CExpr::Column(1),
                negated: true
            }
        );

        let err = Compiler::new(&layout, &runner, "ON")
            .uncorrelated()
            .compile(&exists)
            .unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::InvalidArgument);
        assert!(err.message.contains("ON"));
    }

    #[test]
    fn test_in_subquery_needs_one_column() {
        let layout = layout();
        let runner = FixedRows(2, vec![]);
        let compiler = Compiler::new(&layout, &runner, "WHERE");
        let expr = Expr::InSubquery {
            expr: Box::new(Expr::column("a")),
            query: subquery(),
            negated: false,
        };
        let err = compiler.compile(&expr).unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::InvalidArgument);
    }

    #[test]
    fn test_aggregates() {
        let layout = layout();
        let runner = FixedRows(1, vec![]);
        let err = Compiler::new(&layout, &runner, "WHERE")
            .compile(&count_star())
            .unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::AggregateOutsideGroup);
        assert!(err.message.contains("WHERE"));

        let calls = vec![count_star()];
        let compiler =
            Compiler::new(&layout, &runner, "SELECT").with_aggregates(Some((&calls[..], 2)));
        assert_eq!(compiler.compile(&count_star()).unwrap(), CExpr::Column(2));
    }

    #[test]
    fn test_collect_aggregates() {
        let sum = Expr::Aggregate {
            func: AggregateFunc::Sum,
            arg: Some(Box::new(Expr::column("a"))),
            distinct: false,
        };
        let expr = Expr::binary(
            Expr::binary(sum.clone(), BinaryOp::Div, count_star()),
            BinaryOp::Add,
            sum.clone(),
        );
        let mut found = Vec::new();
        collect_aggregates(&expr, &mut found);
        assert_eq!(found, vec![&sum, &count_star()]);
    }
}
