//! Query executor module.
//!
//! Expressions are compiled against a column [`Layout`] and evaluated by
//! the stages below, which pass lazy row streams to each other.

mod aggregate;
mod compile;
mod eval;
mod filter;
mod functions;
pub mod join;
mod limit;
mod operator;
mod project;
mod relation;
mod runner;
mod scan;
mod set_ops;
mod sort;
mod subquery;

pub use aggregate::{AggregateExecutor, AggregateSlot};
pub use compile::Compiler;
pub use eval::{CExpr, Evaluator};
pub use filter::FilterExecutor;
pub use functions::ScalarFunction;
pub use join::{HashJoin, NestedLoopJoin};
pub use limit::LimitExecutor;
pub use operator::{ExecutionStats, Operator, RowStream, StatsRecorder};
pub use project::ProjectExecutor;
pub use relation::{Layout, Relation, Resolved};
pub use runner::{execute, execute_with, DataSource, InMemoryDataSource, QueryRunner, ResultSet};
pub use scan::TableScanExecutor;
pub use set_ops::{distinct_rows, SetOperationExecutor};
pub use sort::{SortExecutor, SortSpec};
pub use subquery::{CorrelatedSubquery, Frame, SubqueryExecutor, SubqueryRunner, SubqueryTest};
