//! AST module for query expressions and query structure.

mod expr;
mod query;

pub use expr::{AggregateFunc, BinaryOp, CaseBranch, ColumnRef, Expr, ParamKey, UnaryOp};
pub use query::{
    Compound, FromClause, JoinConstraint, JoinStep, LimitValue, Query, QueryTerm, SelectBlock,
    SelectItem, SortKey, SortTarget, Source, TableRef,
};
