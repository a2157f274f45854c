//! Query runner - executes bound queries against in-memory data sources.
//!
//! Each select block is lowered to a chain of stages:
//!
//! ```text
//! scan -> join* -> filter -> [aggregate -> having] -> project -> [distinct] -> [sort] -> limit
//! ```
//!
//! Streaming stages pull rows one at a time. Barrier stages (the right side
//! of a join, aggregation, distinct, set operations other than `UNION ALL`,
//! and sort) drain their input first and are counted in [`ExecutionStats`].
//!
//! Correlated subqueries in `WHERE`, `HAVING`, the select list and `ORDER BY`
//! run through a [`SubqueryExecutor`] right before the stage that reads
//! them, once per row, in a nested runner that sees the row as its
//! enclosing scope.

use crate::ast::{
    ColumnRef, Expr, FromClause, JoinConstraint, JoinStep, LimitValue, Query, QueryTerm,
    SelectBlock, SelectItem, SortKey, SortTarget, Source, TableRef,
};
use crate::binder::BoundQuery;
use crate::context::ExecutionOptions;
use crate::executor::aggregate::{AggregateExecutor, AggregateSlot};
use crate::executor::compile::{collect_aggregates, Compiler};
use crate::executor::eval::{CExpr, Evaluator};
use crate::executor::filter::FilterExecutor;
use crate::executor::join::{split_equi_keys, HashJoin, JoinProbe, JoinStream, NestedLoopJoin, OuterSide};
use crate::executor::limit::LimitExecutor;
use crate::executor::operator::{drain, from_rows, ExecutionStats, Operator, RowStream, StatsRecorder};
use crate::executor::project::ProjectExecutor;
use crate::executor::relation::{Layout, Relation, Resolved};
use crate::executor::scan::TableScanExecutor;
use crate::executor::set_ops::{distinct_rows, SetOperationExecutor};
use crate::executor::sort::{SortExecutor, SortSpec};
use crate::executor::subquery::{Frame, SubqueryExecutor, SubqueryRunner};
use crate::lexer::{JoinKind, SetOperationKind};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::format;
use alloc::string::{String, ToString};
use alloc::vec;
use alloc::vec::Vec;
use core::hash::BuildHasher;
use rowql_core::{EvalError, EvalErrorKind, Record, Row, Value};
use tracing::debug;

/// Named row sets a query can read from.
pub trait DataSource {
    /// Returns the records of a source, or `None` if no such source exists.
    fn rows(&self, name: &str) -> Option<&[Record]>;
}

impl DataSource for BTreeMap<String, Vec<Record>> {
    fn rows(&self, name: &str) -> Option<&[Record]> {
        self.get(name).map(Vec::as_slice)
    }
}

impl<S: BuildHasher> DataSource for hashbrown::HashMap<String, Vec<Record>, S> {
    fn rows(&self, name: &str) -> Option<&[Record]> {
        self.get(name).map(Vec::as_slice)
    }
}

impl<T: DataSource + ?Sized> DataSource for &T {
    fn rows(&self, name: &str) -> Option<&[Record]> {
        (**self).rows(name)
    }
}

/// A simple in-memory data source for tests and small applications.
#[derive(Clone, Debug, Default)]
pub struct InMemoryDataSource {
    tables: BTreeMap<String, Vec<Record>>,
}

impl InMemoryDataSource {
    /// Creates a new empty in-memory data source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a table.
    pub fn add_table(&mut self, name: impl Into<String>, rows: Vec<Record>) {
        self.tables.insert(name.into(), rows);
    }

    /// Builder-style [`add_table`](Self::add_table).
    pub fn with_table(mut self, name: impl Into<String>, rows: Vec<Record>) -> Self {
        self.add_table(name, rows);
        self
    }
}

impl DataSource for InMemoryDataSource {
    fn rows(&self, name: &str) -> Option<&[Record]> {
        self.tables.rows(name)
    }
}

/// The rows of a finished query.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub stats: ExecutionStats,
}

impl ResultSet {
    /// Output rows as named records, in column order.
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                let mut record = Record::with_capacity(self.columns.len());
                for (column, value) in self.columns.iter().zip(row.values()) {
                    record.push(column.as_str(), value.clone());
                }
                record
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Executes a bound query with default options.
pub fn execute<D: DataSource + ?Sized>(bound: &BoundQuery, sources: &D) -> Result<ResultSet, EvalError> {
    execute_with(bound, sources, &ExecutionOptions::default())
}

/// Executes a bound query.
pub fn execute_with<D: DataSource + ?Sized>(
    bound: &BoundQuery,
    sources: &D,
    options: &ExecutionOptions,
) -> Result<ResultSet, EvalError> {
    let runner = QueryRunner::new(sources, options);
    let output = runner.run_query(bound.query())?;
    let columns = output.columns;
    let rows = output.rows.collect::<Result<Vec<_>, _>>()?;
    let stats = runner.stats();
    debug!(
        target: "rowql::exec",
        rows = rows.len(),
        columns = columns.len(),
        barriers = stats.barriers,
        scanned = stats.scanned_rows,
        "query executed"
    );
    Ok(ResultSet { columns, rows, stats })
}

/// Column names and the lazy rows of a query or block.
struct Output<'r> {
    columns: Vec<String>,
    rows: RowStream<'r>,
}

/// Query runner - executes query ASTs against a data source.
pub struct QueryRunner<'a, D: DataSource + ?Sized> {
    sources: &'a D,
    options: &'a ExecutionOptions,
    stats: StatsRecorder,
    /// Scopes of the blocks enclosing this query, innermost last.
    outer: Vec<Frame>,
}

impl<'a, D: DataSource + ?Sized> QueryRunner<'a, D> {
    pub fn new(sources: &'a D, options: &'a ExecutionOptions) -> Self {
        Self {
            sources,
            options,
            stats: StatsRecorder::new(),
            outer: Vec::new(),
        }
    }

    /// Counters recorded so far.
    pub fn stats(&self) -> ExecutionStats {
        self.stats.snapshot()
    }

    fn evaluator(&self) -> Evaluator<'a> {
        Evaluator::new(self.options)
    }

    fn run_query<'r>(&'r self, query: &Query) -> Result<Output<'r>, EvalError> {
        if let Some(block) = query.as_simple() {
            let output = self.run_block(block, &query.order_by)?;
            return self.apply_limit(query, output);
        }

        let mut output = self.run_term(&query.head)?;
        for compound in &query.compounds {
            let right = self.run_term(&compound.term)?;
            if right.columns.len() != output.columns.len() {
                return Err(EvalError::set_arity_mismatch(output.columns.len(), right.columns.len()));
            }
            let rows: RowStream<'r> = match compound.op {
                SetOperationKind::UnionAll => Box::new(output.rows.chain(right.rows)),
                op => {
                    let left = drain(output.rows, &self.stats, op.keyword())?;
                    let right = drain(right.rows, &self.stats, op.keyword())?;
                    from_rows(SetOperationExecutor::new(op).execute(left, right))
                }
            };
            debug!(target: "rowql::exec", op = compound.op.keyword(), "set operation applied");
            output = Output {
                columns: output.columns,
                rows,
            };
        }

        if !query.order_by.is_empty() {
            let keys = query
                .order_by
                .iter()
                .map(|key| {
                    let column = match &key.target {
                        SortTarget::Position(i) => position(*i, output.columns.len())?,
                        SortTarget::Expr(expr) => output_column(expr, &output.columns)?
                            .ok_or_else(|| compound_sort_error(expr))?,
                    };
                    Ok(self.sort_spec(key, column))
                })
                .collect::<Result<Vec<_>, EvalError>>()?;
            let rows = drain(output.rows, &self.stats, "sort")?;
            output.rows = from_rows(SortExecutor::new(keys, self.evaluator()).execute(rows));
        }
        self.apply_limit(query, output)
    }

    fn run_term<'r>(&'r self, term: &QueryTerm) -> Result<Output<'r>, EvalError> {
        match term {
            QueryTerm::Select(block) => self.run_block(block, &[]),
            QueryTerm::Nested(query) => self.run_query(query),
        }
    }

    fn run_block<'r>(&'r self, block: &SelectBlock, order_by: &[SortKey]) -> Result<Output<'r>, EvalError> {
        let evaluator = self.evaluator();
        let Relation { layout, mut rows } = match &block.from {
            Some(from) => self.run_from(from)?,
            // SELECT without FROM yields one empty row.
            None => Relation::new(Layout::empty(), from_rows(vec![Row::default()])),
        };

        if let Some(filter) = &block.filter {
            let compiler = Compiler::new(&layout, self, "WHERE");
            let predicate = compiler.compile(filter)?;
            rows = self.filter(rows, predicate, compiler);
        }

        let sort_exprs = order_by.iter().filter_map(|key| match &key.target {
            SortTarget::Expr(expr) => Some(expr),
            SortTarget::Position(_) => None,
        });
        let grouped = block.is_aggregate() || sort_exprs.clone().any(Expr::contains_aggregate);

        let mut calls = Vec::new();
        if grouped {
            let mut found = Vec::new();
            for item in &block.projection {
                if let SelectItem::Expr { expr, .. } = item {
                    collect_aggregates(expr, &mut found);
                }
            }
            if let Some(having) = &block.having {
                collect_aggregates(having, &mut found);
            }
            for expr in sort_exprs {
                collect_aggregates(expr, &mut found);
            }
            calls = found.into_iter().cloned().collect::<Vec<Expr>>();

            let keys = block
                .group_by
                .iter()
                .map(|expr| {
                    let expr = group_key(expr, block, &layout);
                    Compiler::new(&layout, self, "GROUP BY").uncorrelated().compile(expr)
                })
                .collect::<Result<Vec<_>, _>>()?;
            let slots = calls
                .iter()
                .map(|call| self.aggregate_slot(call, &layout))
                .collect::<Result<Vec<_>, _>>()?;

            let input = drain(rows, &self.stats, "aggregate")?;
            let groups = AggregateExecutor::new(keys, slots, layout.width(), evaluator).execute(input)?;
            debug!(target: "rowql::exec", groups = groups.len(), aggregates = calls.len(), "grouped");
            rows = from_rows(groups);
        }
        let aggregates = if grouped {
            Some((&calls[..], layout.width()))
        } else {
            None
        };

        if let Some(having) = &block.having {
            let compiler = Compiler::new(&layout, self, "HAVING").with_aggregates(aggregates);
            let predicate = compiler.compile(having)?;
            rows = self.filter(rows, predicate, compiler);
        }

        let select = Compiler::new(&layout, self, "SELECT").with_aggregates(aggregates);
        let mut columns = Vec::with_capacity(block.projection.len());
        let mut exprs = Vec::with_capacity(block.projection.len());
        for item in &block.projection {
            match item {
                SelectItem::Wildcard => {
                    for (name, index) in layout.wildcard() {
                        columns.push(name);
                        exprs.push(CExpr::Column(index));
                    }
                }
                SelectItem::QualifiedWildcard(source) => {
                    for (name, index) in layout.source_wildcard(source)? {
                        columns.push(name);
                        exprs.push(CExpr::Column(index));
                    }
                }
                SelectItem::Expr { expr, name, .. } => {
                    columns.push(name.clone());
                    exprs.push(select.compile(expr)?);
                }
            }
        }

        // Sort keys that are not output columns travel as hidden columns
        // after the visible ones and are cut off after sorting.
        let visible = columns.len();
        let order = select.in_clause("ORDER BY");
        let mut sort_keys = Vec::with_capacity(order_by.len());
        for key in order_by {
            let column = match &key.target {
                SortTarget::Position(i) => position(*i, visible)?,
                SortTarget::Expr(expr) => match output_column(expr, &columns)? {
                    Some(i) => i,
                    None => {
                        exprs.push(order.compile(expr)?);
                        exprs.len() - 1
                    }
                },
            };
            sort_keys.push(self.sort_spec(key, column));
        }
        let hidden = exprs.len() > visible;

        let correlated = order.into_correlated();
        if !correlated.is_empty() {
            rows = SubqueryExecutor::new(correlated, self, evaluator).execute(rows);
        }
        rows = ProjectExecutor::new(exprs, evaluator).execute(rows);

        if block.distinct {
            let input = drain(rows, &self.stats, "distinct")?;
            rows = from_rows(distinct_rows(input, visible));
        }

        if !sort_keys.is_empty() {
            let input = drain(rows, &self.stats, "sort")?;
            rows = from_rows(SortExecutor::new(sort_keys, evaluator).execute(input));
        }
        if hidden {
            rows = truncate(rows, visible);
        }

        debug!(target: "rowql::exec", columns = visible, grouped, distinct = block.distinct, "select block compiled");
        Ok(Output { columns, rows })
    }

    /// Keeps the rows `predicate` holds for. Correlated subqueries the
    /// predicate reads are evaluated first and cut off again afterwards.
    fn filter<'r>(&'r self, rows: RowStream<'r>, predicate: CExpr, compiler: Compiler<'_>) -> RowStream<'r> {
        let evaluator = self.evaluator();
        let width = compiler.width();
        let correlated = compiler.into_correlated();
        if correlated.is_empty() {
            return FilterExecutor::new(predicate, evaluator).execute(rows);
        }
        debug!(target: "rowql::exec", subqueries = correlated.len(), "correlated filter");
        let rows = SubqueryExecutor::new(correlated, self, evaluator).execute(rows);
        truncate(FilterExecutor::new(predicate, evaluator).execute(rows), width)
    }

    fn aggregate_slot(&self, call: &Expr, layout: &Layout) -> Result<AggregateSlot, EvalError> {
        match call {
            Expr::Aggregate { func, arg, distinct } => {
                let arg = match arg {
                    // Aggregates inside the argument fail to compile.
                    Some(arg) => Some(
                        Compiler::new(layout, self, func.name())
                            .uncorrelated()
                            .compile(arg)?,
                    ),
                    None => None,
                };
                Ok(AggregateSlot {
                    func: *func,
                    arg,
                    distinct: *distinct,
                })
            }
            _ => Err(EvalError::new(
                EvalErrorKind::InvalidArgument,
                "",
                "expected an aggregate call",
            )),
        }
    }

    fn sort_spec(&self, key: &SortKey, column: usize) -> SortSpec {
        SortSpec {
            column,
            descending: key.descending,
            nulls_first: key.nulls_first.unwrap_or(self.options.nulls_first),
        }
    }

    fn run_from<'r>(&'r self, from: &FromClause) -> Result<Relation<'r>, EvalError> {
        let mut relation = self.run_source(&from.base)?;
        for step in &from.joins {
            relation = self.join(relation, step)?;
        }
        Ok(relation)
    }

    fn run_source<'r>(&'r self, table: &TableRef) -> Result<Relation<'r>, EvalError> {
        let name = table.visible_name();
        match &table.source {
            Source::Table(source) => {
                let records = self
                    .sources
                    .rows(source)
                    .ok_or_else(|| EvalError::unknown_source(source))?;
                debug!(target: "rowql::exec", source = source.as_str(), rows = records.len(), "scan");
                Ok(TableScanExecutor::new(records, &self.stats).execute(name))
            }
            Source::Subquery(query) => {
                let output = self.run_query(query)?;
                let empty = output.columns.is_empty();
                Ok(Relation::new(Layout::single(name, output.columns, empty), output.rows))
            }
        }
    }

    fn join<'r>(&'r self, left: Relation<'r>, step: &JoinStep) -> Result<Relation<'r>, EvalError> {
        let right = self.run_source(&step.table)?;
        let right_rows = drain(right.rows, &self.stats, "join build")?;
        let left_width = left.layout.width();
        let right_width = right.layout.width();

        let mut merged = Vec::new();
        let condition = match (&step.kind, &step.constraint) {
            (JoinKind::Natural, _) => {
                let common: Vec<String> = right
                    .layout
                    .sources()
                    .iter()
                    .flat_map(|s| s.columns.iter())
                    .filter(|c| left.layout.has_column(c))
                    .cloned()
                    .collect();
                let any_empty = left.layout.sources().iter().chain(right.layout.sources()).any(|s| s.empty);
                if common.is_empty() && !any_empty {
                    return Err(EvalError::natural_join_no_common_column(step.table.visible_name()));
                }
                self.using_condition(&common, &left.layout, &right.layout, &mut merged)?
            }
            (_, JoinConstraint::Using(columns)) => {
                self.using_condition(columns, &left.layout, &right.layout, &mut merged)?
            }
            (_, JoinConstraint::On(expr)) => {
                let joined = left.layout.clone().join(right.layout.clone(), Vec::new());
                Some(Compiler::new(&joined, self, "ON").uncorrelated().compile(expr)?)
            }
            (_, JoinConstraint::None) => None,
        };

        let outer = match step.kind {
            JoinKind::Left => OuterSide::Left,
            JoinKind::Right => OuterSide::Right,
            _ => OuterSide::None,
        };
        let evaluator = self.evaluator();
        let probe: Box<dyn JoinProbe + 'r> = match condition {
            Some(condition) if self.options.use_hash_joins() => {
                let keys = split_equi_keys(condition, left_width);
                if keys.left.is_empty() {
                    Box::new(NestedLoopJoin::new(Some(CExpr::conjunction(keys.residual)), evaluator))
                } else {
                    debug!(target: "rowql::exec", keys = keys.left.len(), build_rows = right_rows.len(), "hash join");
                    Box::new(HashJoin::build(keys, &right_rows, evaluator)?)
                }
            }
            condition => {
                debug!(target: "rowql::exec", build_rows = right_rows.len(), "nested loop join");
                Box::new(NestedLoopJoin::new(condition, evaluator))
            }
        };

        let layout = left.layout.join(right.layout, merged);
        let rows = JoinStream::new(left.rows, left_width, right_rows, right_width, probe, outer);
        Ok(Relation::new(layout, Box::new(rows)))
    }

    /// Equality over shared column names. Each name becomes resolvable bare,
    /// reading the left side.
    fn using_condition(
        &self,
        columns: &[String],
        left: &Layout,
        right: &Layout,
        merged: &mut Vec<(String, usize)>,
    ) -> Result<Option<CExpr>, EvalError> {
        let shift = left.width();
        let mut parts = Vec::with_capacity(columns.len());
        for name in columns {
            let column = ColumnRef::bare(name.as_str());
            let l = match left.resolve(&column)? {
                Resolved::Index(i) => {
                    merged.push((name.clone(), i));
                    CExpr::Column(i)
                }
                Resolved::Phantom => CExpr::Literal(Value::Null),
            };
            let r = match right.resolve(&column)? {
                Resolved::Index(i) => CExpr::Column(shift + i),
                Resolved::Phantom => CExpr::Literal(Value::Null),
            };
            parts.push(CExpr::binary(l, crate::ast::BinaryOp::Eq, r));
        }
        Ok(if parts.is_empty() {
            None
        } else {
            Some(CExpr::conjunction(parts))
        })
    }

    fn apply_limit<'r>(&self, query: &Query, output: Output<'r>) -> Result<Output<'r>, EvalError> {
        let limit = query.limit.as_ref().map(limit_count).transpose()?;
        let offset = query.offset.as_ref().map(limit_count).transpose()?.unwrap_or(0);
        if limit.is_none() && offset == 0 {
            return Ok(output);
        }
        Ok(Output {
            columns: output.columns,
            rows: LimitExecutor::new(limit, offset).execute(output.rows),
        })
    }
}

impl<D: DataSource + ?Sized> SubqueryRunner for QueryRunner<'_, D> {
    fn run_subquery(&self, query: &Query, outer: &[Frame]) -> Result<(usize, Vec<Row>), EvalError> {
        let nested = QueryRunner {
            sources: self.sources,
            options: self.options,
            stats: StatsRecorder::new(),
            outer: outer.to_vec(),
        };
        let output = nested.run_query(query)?;
        let width = output.columns.len();
        let rows = drain(output.rows, &nested.stats, "subquery")?;
        self.stats.absorb(nested.stats());
        debug!(target: "rowql::exec", rows = rows.len(), depth = outer.len(), "subquery evaluated");
        Ok((width, rows))
    }

    fn outer_frames(&self) -> &[Frame] {
        &self.outer
    }
}

/// Cuts every row back to `width` values.
fn truncate<'r>(rows: RowStream<'r>, width: usize) -> RowStream<'r> {
    Box::new(rows.map(move |row| {
        row.map(|mut row| {
            row.truncate(width);
            row
        })
    }))
}

/// A `GROUP BY` name that is not a source column may refer to a select alias.
fn group_key<'q>(expr: &'q Expr, block: &'q SelectBlock, layout: &Layout) -> &'q Expr {
    if let Expr::Column(ColumnRef {
        qualifier: None,
        name,
    }) = expr
    {
        if !layout.has_column(name) {
            let aliased = block.projection.iter().find_map(|item| match item {
                SelectItem::Expr {
                    expr,
                    alias: Some(alias),
                    ..
                } if alias == name => Some(expr),
                _ => None,
            });
            if let Some(aliased) = aliased {
                return aliased;
            }
        }
    }
    expr
}

/// Output position a sort expression names: a bare output column name, or
/// an ordinal the parser could not check because it lies past a wildcard.
fn output_column(expr: &Expr, columns: &[String]) -> Result<Option<usize>, EvalError> {
    match expr {
        Expr::Column(ColumnRef {
            qualifier: None,
            name,
        }) => Ok(columns.iter().position(|c| c == name)),
        Expr::Literal(Value::Int64(n)) if *n >= 1 => position((*n - 1) as usize, columns.len()).map(Some),
        _ => Ok(None),
    }
}

fn position(index: usize, width: usize) -> Result<usize, EvalError> {
    if index < width {
        Ok(index)
    } else {
        Err(EvalError::invalid_argument(
            "ORDER BY",
            format!("position {} is not in the select list of {} columns", index + 1, width),
        ))
    }
}

fn compound_sort_error(expr: &Expr) -> EvalError {
    match expr {
        Expr::Column(column) => EvalError::unknown_column(&column.to_string()),
        _ => EvalError::invalid_argument(
            "ORDER BY",
            "ORDER BY of a set operation must name an output column",
        ),
    }
}

fn limit_count(value: &LimitValue) -> Result<u64, EvalError> {
    match value {
        LimitValue::Count(n) => Ok(*n),
        LimitValue::Parameter { key, .. } => Err(EvalError::new(
            EvalErrorKind::InvalidArgument,
            key.to_string(),
            format!("parameter {} has no bound value", key),
        )),
    }
}
