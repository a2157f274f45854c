//! Parameter binding.
//!
//! [`bind`] copies a parsed [`Query`], replacing every placeholder with a
//! literal. Each placeholder's value is checked and coerced against the type
//! its position demands:
//!
//! - arithmetic operands and sign operands are numeric
//! - a comparison, `BETWEEN` or `IN` peer that is a literal lends its type
//! - `LIKE` operands are strings
//! - `LIMIT` / `OFFSET` take a non-negative integer (never null)
//!
//! Everything else accepts any value. The parsed query is never modified,
//! so one AST can be bound any number of times.

use crate::ast::{
    Expr, FromClause, JoinConstraint, LimitValue, Query, QueryTerm, SelectBlock, SelectItem, SortTarget,
    Source, UnaryOp,
};
use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use alloc::vec::Vec;
use rowql_core::{BindError, Value};
use tracing::debug;

pub use crate::ast::ParamKey;

/// Values for a query's placeholders.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Params {
    values: BTreeMap<ParamKey, Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds named bindings. A leading `:` on a name is ignored.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut params = Self::new();
        for (name, value) in pairs {
            params.set_named(name.as_ref(), value);
        }
        params
    }

    /// Builds positional bindings; the first value binds the first `?`.
    pub fn positional<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut params = Self::new();
        for (i, value) in values.into_iter().enumerate() {
            params.set_positional(i, value);
        }
        params
    }

    /// Adds a named binding, builder style.
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set_named(name, value);
        self
    }

    pub fn set_named(&mut self, name: &str, value: impl Into<Value>) {
        let name = name.strip_prefix(':').unwrap_or(name);
        self.values
            .insert(ParamKey::Named(String::from(name)), value.into());
    }

    pub fn set_positional(&mut self, index: usize, value: impl Into<Value>) {
        self.values.insert(ParamKey::Positional(index), value.into());
    }

    pub fn get(&self, key: &ParamKey) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A query with every placeholder replaced by a literal.
#[derive(Clone, Debug, PartialEq)]
pub struct BoundQuery {
    query: Query,
}

impl BoundQuery {
    /// Wraps a query that has no placeholders.
    ///
    /// Returns the first placeholder as a missing binding otherwise.
    pub fn from_query(query: Query) -> Result<Self, BindError> {
        bind(&query, &Params::new())
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn into_query(self) -> Query {
        self.query
    }
}

/// Binds `params` into a copy of `query`.
pub fn bind(query: &Query, params: &Params) -> Result<BoundQuery, BindError> {
    let mut bound = query.clone();
    let mut binder = Binder { params, bound: 0 };
    binder.bind_query(&mut bound)?;
    debug!(target: "rowql::binder", parameters = binder.bound, "bound query");
    Ok(BoundQuery { query: bound })
}

/// Distinct placeholders of `query`, in source order.
pub fn parameters(query: &Query) -> Vec<ParamKey> {
    let mut found = Vec::new();
    collect_query(query, &mut found);
    found.sort_by_key(|(offset, _)| *offset);
    let mut keys: Vec<ParamKey> = Vec::with_capacity(found.len());
    for (_, key) in found {
        if !keys.contains(&key) {
            keys.push(key);
        }
    }
    keys
}

fn collect_query(query: &Query, out: &mut Vec<(usize, ParamKey)>) {
    collect_term(&query.head, out);
    for compound in &query.compounds {
        collect_term(&compound.term, out);
    }
    for key in &query.order_by {
        if let SortTarget::Expr(expr) = &key.target {
            collect_expr(expr, out);
        }
    }
    for value in query.limit.iter().chain(query.offset.iter()) {
        if let LimitValue::Parameter { key, offset } = value {
            out.push((*offset, key.clone()));
        }
    }
}

fn collect_term(term: &QueryTerm, out: &mut Vec<(usize, ParamKey)>) {
    match term {
        QueryTerm::Select(block) => {
            for item in &block.projection {
                if let SelectItem::Expr { expr, .. } = item {
                    collect_expr(expr, out);
                }
            }
            if let Some(from) = &block.from {
                for table in from.tables() {
                    if let Source::Subquery(query) = &table.source {
                        collect_query(query, out);
                    }
                }
                for join in &from.joins {
                    if let JoinConstraint::On(expr) = &join.constraint {
                        collect_expr(expr, out);
                    }
                }
            }
            let rest = block.filter.iter().chain(&block.group_by).chain(&block.having);
            for expr in rest {
                collect_expr(expr, out);
            }
        }
        QueryTerm::Nested(query) => collect_query(query, out),
    }
}

fn collect_expr(expr: &Expr, out: &mut Vec<(usize, ParamKey)>) {
    match expr {
        Expr::Parameter { key, offset } => out.push((*offset, key.clone())),
        Expr::InSubquery { query, .. } | Expr::Exists { query, .. } => collect_query(query, out),
        _ => {}
    }
    expr.for_each_child(|child| collect_expr(child, out));
}

/// Type a placeholder's position demands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Demand {
    Any,
    Numeric,
    String,
    Boolean,
}

impl Demand {
    fn name(&self) -> &'static str {
        match self {
            Demand::Any => "any value",
            Demand::Numeric => "a number",
            Demand::String => "a string",
            Demand::Boolean => "a boolean",
        }
    }

    /// Demand lent by a literal peer.
    fn of_peer(peer: &Expr) -> Demand {
        match peer {
            Expr::Literal(Value::Int64(_)) | Expr::Literal(Value::Float64(_)) => Demand::Numeric,
            Expr::Literal(Value::String(_)) => Demand::String,
            Expr::Literal(Value::Boolean(_)) => Demand::Boolean,
            _ => Demand::Any,
        }
    }

    /// Demand lent by the first literal among `peers`.
    fn of_peers<'a>(peers: impl IntoIterator<Item = &'a Expr>) -> Demand {
        peers
            .into_iter()
            .map(Demand::of_peer)
            .find(|d| *d != Demand::Any)
            .unwrap_or(Demand::Any)
    }
}

struct Binder<'p> {
    params: &'p Params,
    bound: usize,
}

impl<'p> Binder<'p> {
    fn lookup(&mut self, key: &ParamKey) -> Result<&'p Value, BindError> {
        self.bound += 1;
        self.params
            .get(key)
            .ok_or_else(|| BindError::missing(key.to_string()))
    }

    fn bind_query(&mut self, query: &mut Query) -> Result<(), BindError> {
        self.bind_term(&mut query.head)?;
        for compound in &mut query.compounds {
            self.bind_term(&mut compound.term)?;
        }
        for key in &mut query.order_by {
            if let SortTarget::Expr(expr) = &mut key.target {
                self.bind_expr(expr, Demand::Any)?;
            }
        }
        for slot in [&mut query.limit, &mut query.offset] {
            if let Some(LimitValue::Parameter { key, .. }) = slot {
                let count = self.bind_count(&key.clone())?;
                *slot = Some(LimitValue::Count(count));
            }
        }
        Ok(())
    }

    fn bind_term(&mut self, term: &mut QueryTerm) -> Result<(), BindError> {
        match term {
            QueryTerm::Select(block) => self.bind_block(block),
            QueryTerm::Nested(query) => self.bind_query(query),
        }
    }

    fn bind_block(&mut self, block: &mut SelectBlock) -> Result<(), BindError> {
        for item in &mut block.projection {
            if let SelectItem::Expr { expr, .. } = item {
                self.bind_expr(expr, Demand::Any)?;
            }
        }
        if let Some(from) = &mut block.from {
            self.bind_from(from)?;
        }
        let exprs = block
            .filter
            .iter_mut()
            .chain(block.group_by.iter_mut())
            .chain(block.having.iter_mut());
        for expr in exprs {
            self.bind_expr(expr, Demand::Any)?;
        }
        Ok(())
    }

    fn bind_from(&mut self, from: &mut FromClause) -> Result<(), BindError> {
        if let Source::Subquery(query) = &mut from.base.source {
            self.bind_query(query)?;
        }
        for join in &mut from.joins {
            if let Source::Subquery(query) = &mut join.table.source {
                self.bind_query(query)?;
            }
            if let JoinConstraint::On(expr) = &mut join.constraint {
                self.bind_expr(expr, Demand::Any)?;
            }
        }
        Ok(())
    }

    fn bind_expr(&mut self, expr: &mut Expr, demand: Demand) -> Result<(), BindError> {
        match expr {
            Expr::Parameter { key, .. } => {
                let key = key.clone();
                let value = self.lookup(&key)?.clone();
                *expr = Expr::Literal(coerce(&key, value, demand)?);
                Ok(())
            }
            Expr::Binary { left, op, right } => {
                let (left_demand, right_demand) = if op.is_arithmetic() {
                    (Demand::Numeric, Demand::Numeric)
                } else if op.is_comparison() {
                    (Demand::of_peer(right), Demand::of_peer(left))
                } else {
                    (Demand::Any, Demand::Any)
                };
                self.bind_expr(left, left_demand)?;
                self.bind_expr(right, right_demand)
            }
            Expr::Unary { op, expr: operand } => {
                let demand = match op {
                    UnaryOp::Neg | UnaryOp::Plus => Demand::Numeric,
                    UnaryOp::Not => Demand::Any,
                };
                self.bind_expr(operand, demand)
            }
            Expr::Between {
                expr: subject,
                low,
                high,
                ..
            } => {
                let subject_demand = Demand::of_peers([&**low, &**high]);
                let low_demand = Demand::of_peers([&**subject, &**high]);
                let high_demand = Demand::of_peers([&**subject, &**low]);
                self.bind_expr(subject, subject_demand)?;
                self.bind_expr(low, low_demand)?;
                self.bind_expr(high, high_demand)
            }
            Expr::InList {
                expr: subject,
                list,
                ..
            } => {
                let subject_demand = Demand::of_peers(list.iter());
                let item_demand = Demand::of_peer(subject);
                self.bind_expr(subject, subject_demand)?;
                for item in list {
                    self.bind_expr(item, item_demand)?;
                }
                Ok(())
            }
            Expr::Like {
                expr: subject,
                pattern,
                ..
            } => {
                self.bind_expr(subject, Demand::String)?;
                self.bind_expr(pattern, Demand::String)
            }
            Expr::InSubquery {
                expr: subject,
                query,
                ..
            } => {
                self.bind_expr(subject, Demand::Any)?;
                self.bind_query(query)
            }
            Expr::Exists { query, .. } => self.bind_query(query),
            _ => {
                let mut result = Ok(());
                expr.for_each_child_mut(|child| {
                    if result.is_ok() {
                        result = self.bind_expr(child, Demand::Any);
                    }
                });
                result
            }
        }
    }

    fn bind_count(&mut self, key: &ParamKey) -> Result<u64, BindError> {
        let value = self.lookup(key)?;
        let incompatible =
            || BindError::incompatible(key.to_string(), "a non-negative integer", value.data_type());
        let numeric = value.coerce_numeric().ok_or_else(incompatible)?;
        match numeric {
            Value::Int64(n) if n >= 0 => Ok(n as u64),
            Value::Float64(f) if f >= 0.0 && f <= u64::MAX as f64 && (f as u64) as f64 == f => {
                Ok(f as u64)
            }
            _ => Err(incompatible()),
        }
    }
}

/// Coerces a bound value to the demanded type.
fn coerce(key: &ParamKey, value: Value, demand: Demand) -> Result<Value, BindError> {
    if demand == Demand::Any || value.is_null() {
        return Ok(value);
    }
    let coerced = match (demand, &value) {
        (Demand::Numeric, _) => value.coerce_numeric(),
        (Demand::String, Value::String(_)) => Some(value.clone()),
        (Demand::String, Value::Int64(_) | Value::Float64(_)) => Some(Value::String(value.to_string())),
        (Demand::Boolean, Value::Boolean(_)) => Some(value.clone()),
        (Demand::Boolean, Value::Int64(0)) => Some(Value::Boolean(false)),
        (Demand::Boolean, Value::Int64(1)) => Some(Value::Boolean(true)),
        _ => None,
    };
    coerced.ok_or_else(|| BindError::incompatible(key.to_string(), demand.name(), value.data_type()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::parser::parse_query;
    use alloc::vec;
    use rowql_core::BindErrorKind;

    fn filter_of(bound: &BoundQuery) -> &Expr {
        bound.query().as_simple().unwrap().filter.as_ref().unwrap()
    }

    #[test]
    fn test_bind_named() {
        let query = parse_query("SELECT a FROM t WHERE a = :x").unwrap();
        let bound = bind(&query, &Params::named([("x", 5)])).unwrap();
        assert_eq!(filter_of(&bound), &Expr::eq(Expr::column("a"), Expr::literal(5i64)));
        // The parsed query keeps its placeholder.
        assert_eq!(parameters(&query), vec![ParamKey::Named("x".into())]);
    }

    #[test]
    fn test_colon_prefix_is_optional() {
        let query = parse_query("SELECT a FROM t WHERE a = :x").unwrap();
        assert!(bind(&query, &Params::new().with(":x", 1)).is_ok());
    }

    #[test]
    fn test_bind_positional() {
        let query = parse_query("SELECT a FROM t WHERE a = ? OR b = ?").unwrap();
        assert_eq!(
            parameters(&query),
            vec![ParamKey::Positional(0), ParamKey::Positional(1)]
        );
        let err = bind(&query, &Params::positional([1])).unwrap_err();
        assert_eq!(err.kind, BindErrorKind::MissingBinding);
        assert_eq!(err.key, "?1");
        assert!(bind(&query, &Params::positional([1, 2])).is_ok());
    }

    #[test]
    fn test_numeric_demand() {
        let query = parse_query("SELECT a + :n FROM t").unwrap();
        assert!(bind(&query, &Params::named([("n", "12")])).is_ok());
        let err = bind(&query, &Params::named([("n", "twelve")])).unwrap_err();
        assert_eq!(err.kind, BindErrorKind::IncompatibleType);
        assert_eq!(err.key, ":n");
        assert!(bind(&query, &Params::named([("n", true)])).is_err());
        assert!(bind(&query, &Params::named([("n", Value::Null)])).is_ok());
    }

    #[test]
    fn test_literal_peer_demand() {
        let query = parse_query("SELECT a FROM t WHERE :s = 'x' AND :n > 3").unwrap();
        let bound = bind(&query, &Params::named([("s", Value::from(7)), ("n", Value::from("4"))])).unwrap();
        let expected = Expr::and(
            Expr::eq(Expr::literal("7"), Expr::literal("x")),
            Expr::binary(Expr::literal(4i64), BinaryOp::Gt, Expr::literal(3i64)),
        );
        assert_eq!(filter_of(&bound), &expected);
    }

    #[test]
    fn test_like_demands_string() {
        let query = parse_query("SELECT a FROM t WHERE name LIKE :p").unwrap();
        assert!(bind(&query, &Params::named([("p", "a%")])).is_ok());
        assert!(bind(&query, &Params::named([("p", false)])).is_err());
    }

    #[test]
    fn test_limit_binding() {
        let query = parse_query("SELECT a FROM t LIMIT :n OFFSET :m").unwrap();
        let bound = bind(&query, &Params::named([("n", Value::from(2)), ("m", Value::from(2.0))])).unwrap();
        assert_eq!(bound.query().limit, Some(LimitValue::Count(2)));
        assert_eq!(bound.query().offset, Some(LimitValue::Count(2)));

        for bad in [Value::from(-1), Value::from(1.5), Value::Null, Value::from("x")] {
            let params = Params::named([("n", bad), ("m", Value::from(0))]);
            let err = bind(&query, &params).unwrap_err();
            assert_eq!(err.kind, BindErrorKind::IncompatibleType);
        }
    }

    #[test]
    fn test_subquery_parameters() {
        let query = parse_query(
            "SELECT a FROM (SELECT a FROM t WHERE a > :lo) s WHERE a IN (SELECT b FROM u WHERE b < :hi)",
        )
        .unwrap();
        assert_eq!(
            parameters(&query),
            vec![ParamKey::Named("lo".into()), ParamKey::Named("hi".into())]
        );
        let err = bind(&query, &Params::named([("lo", 1)])).unwrap_err();
        assert_eq!(err.key, ":hi");
    }

    #[test]
    fn test_rebinding_is_isolated() {
        let query = parse_query("SELECT a FROM t WHERE a = :x").unwrap();
        let one = bind(&query, &Params::named([("x", 1)])).unwrap();
        let two = bind(&query, &Params::named([("x", 2)])).unwrap();
        assert_ne!(one, two);
        assert_eq!(filter_of(&one), &Expr::eq(Expr::column("a"), Expr::literal(1i64)));
    }

    #[test]
    fn test_repeated_named_parameter_listed_once() {
        let query = parse_query("SELECT a FROM t WHERE a = :x OR b = :x").unwrap();
        assert_eq!(parameters(&query), vec![ParamKey::Named("x".into())]);
    }
}
