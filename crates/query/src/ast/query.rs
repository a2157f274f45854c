//! Query structure: select blocks, sources, joins and set operations.

use super::{Expr, ParamKey};
use crate::lexer::{JoinKind, SetOperationKind};
use alloc::boxed::Box;
use alloc::string::String;
use alloc::vec::Vec;

/// A complete query: one or more select terms combined by set operations,
/// followed by ordering and paging that apply to the combined result.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub head: QueryTerm,
    /// Applied left to right: `((head op1 t1) op2 t2) ...`.
    pub compounds: Vec<Compound>,
    pub order_by: Vec<SortKey>,
    pub limit: Option<LimitValue>,
    pub offset: Option<LimitValue>,
}

impl Query {
    /// Wraps a single select block.
    pub fn simple(block: SelectBlock) -> Self {
        Self {
            head: QueryTerm::Select(Box::new(block)),
            compounds: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Returns the select block when the query has no set operations.
    pub fn as_simple(&self) -> Option<&SelectBlock> {
        match (&self.head, self.compounds.is_empty()) {
            (QueryTerm::Select(block), true) => Some(block),
            _ => None,
        }
    }

    /// Number of output columns, when it is known without reading data.
    pub fn static_arity(&self) -> Option<usize> {
        self.head.static_arity()
    }

    /// Output column names of the head term, when known without data.
    pub fn static_names(&self) -> Option<Vec<&str>> {
        match &self.head {
            QueryTerm::Select(block) => block.static_names(),
            QueryTerm::Nested(query) => query.static_names(),
        }
    }
}

/// One operand of a set operation chain.
#[derive(Clone, Debug, PartialEq)]
pub enum QueryTerm {
    Select(Box<SelectBlock>),
    /// A parenthesised query with its own ordering and paging.
    Nested(Box<Query>),
}

impl QueryTerm {
    pub fn static_arity(&self) -> Option<usize> {
        match self {
            QueryTerm::Select(block) => block.static_arity(),
            QueryTerm::Nested(query) => query.static_arity(),
        }
    }
}

/// `<op> <term>` following the head of a query.
#[derive(Clone, Debug, PartialEq)]
pub struct Compound {
    pub op: SetOperationKind,
    pub term: QueryTerm,
    /// Byte offset of the set operation keyword.
    pub offset: usize,
}

/// `SELECT [DISTINCT] ... [FROM ...] [WHERE ...] [GROUP BY ...] [HAVING ...]`
#[derive(Clone, Debug, PartialEq, Default)]
pub struct SelectBlock {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: Option<FromClause>,
    pub filter: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
}

impl SelectBlock {
    /// Returns true if any item is `*` or `t.*`.
    pub fn has_wildcard(&self) -> bool {
        self.projection
            .iter()
            .any(|item| !matches!(item, SelectItem::Expr { .. }))
    }

    /// Column count, unless a wildcard makes it depend on the data.
    pub fn static_arity(&self) -> Option<usize> {
        if self.has_wildcard() {
            None
        } else {
            Some(self.projection.len())
        }
    }

    pub fn static_names(&self) -> Option<Vec<&str>> {
        self.projection
            .iter()
            .map(|item| match item {
                SelectItem::Expr { name, .. } => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns true if the block aggregates its input.
    pub fn is_aggregate(&self) -> bool {
        !self.group_by.is_empty()
            || self.having.is_some()
            || self.projection.iter().any(|item| match item {
                SelectItem::Expr { expr, .. } => expr.contains_aggregate(),
                _ => false,
            })
    }
}

/// One entry of the select list.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectItem {
    /// `*`
    Wildcard,
    /// `t.*`
    QualifiedWildcard(String),
    /// An expression and its output column name.
    Expr {
        expr: Expr,
        alias: Option<String>,
        /// The alias if given, else the column name for plain column
        /// references, else the expression text.
        name: String,
    },
}

/// `FROM base [join ...]`
#[derive(Clone, Debug, PartialEq)]
pub struct FromClause {
    pub base: TableRef,
    pub joins: Vec<JoinStep>,
}

impl FromClause {
    /// Iterates over every source reference, base first.
    pub fn tables(&self) -> impl Iterator<Item = &TableRef> {
        core::iter::once(&self.base).chain(self.joins.iter().map(|j| &j.table))
    }
}

/// A row source together with its optional alias.
#[derive(Clone, Debug, PartialEq)]
pub struct TableRef {
    pub source: Source,
    pub alias: Option<String>,
}

impl TableRef {
    pub fn table(name: impl Into<String>) -> Self {
        Self {
            source: Source::Table(name.into()),
            alias: None,
        }
    }

    /// The name columns of this source are qualified by.
    pub fn visible_name(&self) -> &str {
        match (&self.alias, &self.source) {
            (Some(alias), _) => alias,
            (None, Source::Table(name)) => name,
            // Subqueries always carry an alias after parsing.
            (None, Source::Subquery(_)) => "",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Source {
    /// A named row set supplied by the caller.
    Table(String),
    /// A derived table.
    Subquery(Box<Query>),
}

/// One join applied to the rows accumulated so far.
#[derive(Clone, Debug, PartialEq)]
pub struct JoinStep {
    pub kind: JoinKind,
    pub table: TableRef,
    pub constraint: JoinConstraint,
    /// Byte offset of the join keyword (or comma).
    pub offset: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum JoinConstraint {
    None,
    On(Expr),
    Using(Vec<String>),
}

/// `ORDER BY` entry.
#[derive(Clone, Debug, PartialEq)]
pub struct SortKey {
    pub target: SortTarget,
    pub descending: bool,
    /// Explicit `NULLS FIRST` / `NULLS LAST`.
    pub nulls_first: Option<bool>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SortTarget {
    /// 0-based output column.
    Position(usize),
    Expr(Expr),
}

/// `LIMIT` / `OFFSET` operand.
#[derive(Clone, Debug, PartialEq)]
pub enum LimitValue {
    Count(u64),
    Parameter { key: ParamKey, offset: usize },
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn item(name: &str) -> SelectItem {
        SelectItem::Expr {
            expr: Expr::column(name),
            alias: None,
            name: name.into(),
        }
    }

    #[test]
    fn test_static_arity() {
        let block = SelectBlock {
            projection: vec![item("a"), item("b")],
            ..Default::default()
        };
        assert_eq!(block.static_arity(), Some(2));
        assert_eq!(block.static_names(), Some(vec!["a", "b"]));

        let block = SelectBlock {
            projection: vec![item("a"), SelectItem::Wildcard],
            ..Default::default()
        };
        assert_eq!(block.static_arity(), None);
        assert!(Query::simple(block).static_names().is_none());
    }

    #[test]
    fn test_visible_name() {
        let mut t = TableRef::table("users");
        assert_eq!(t.visible_name(), "users");
        t.alias = Some("u".into());
        assert_eq!(t.visible_name(), "u");
    }
}
