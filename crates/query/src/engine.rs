//! Prepared statements and the engine facade.
//!
//! ```
//! use rowql_core::record;
//! use rowql_query::{Engine, InMemoryDataSource, Params};
//!
//! let sources = InMemoryDataSource::new().with_table(
//!     "t",
//!     vec![record! { "a" => 5, "b" => 1 }, record! { "a" => 6, "b" => 2 }],
//! );
//! let mut engine = Engine::new();
//! let result = engine
//!     .query("SELECT a, b FROM t WHERE a = :x", &Params::new().with("x", 5), &sources)
//!     .unwrap();
//! assert_eq!(result.records(), vec![record! { "a" => 5, "b" => 1 }]);
//! ```

use crate::ast::{ParamKey, Query};
use crate::binder::{bind, parameters, BoundQuery, Params};
use crate::context::ExecutionOptions;
use crate::executor::{execute_with, DataSource, ResultSet};
use crate::parser::parse_query;
use crate::plan_cache::StatementCache;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use rowql_core::Result;
use tracing::debug;

/// A parsed statement that can be bound and executed many times.
///
/// The parsed query is never modified, so one statement can be shared
/// between threads and bound with different parameters concurrently.
#[derive(Clone, Debug, PartialEq)]
pub struct PreparedQuery {
    source: String,
    query: Query,
    parameters: Vec<ParamKey>,
}

impl PreparedQuery {
    /// Tokenizes and parses `sql`.
    pub fn new(sql: &str) -> Result<Self> {
        let query = parse_query(sql)?;
        let parameters = parameters(&query);
        debug!(target: "rowql::parser", parameters = parameters.len(), "statement prepared");
        Ok(Self {
            source: String::from(sql),
            query,
            parameters,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Distinct placeholders in source order.
    pub fn parameters(&self) -> &[ParamKey] {
        &self.parameters
    }

    /// Binds parameters into a copy of the parsed query.
    pub fn bind(&self, params: &Params) -> Result<BoundQuery> {
        Ok(bind(&self.query, params)?)
    }

    /// Binds and executes with default options.
    pub fn execute<D: DataSource + ?Sized>(&self, params: &Params, sources: &D) -> Result<ResultSet> {
        self.execute_with(params, sources, &ExecutionOptions::default())
    }

    pub fn execute_with<D: DataSource + ?Sized>(
        &self,
        params: &Params,
        sources: &D,
        options: &ExecutionOptions,
    ) -> Result<ResultSet> {
        let bound = self.bind(params)?;
        Ok(execute_with(&bound, sources, options)?)
    }
}

/// Entry point tying together statement caching and execution options.
#[derive(Default)]
pub struct Engine {
    options: ExecutionOptions,
    cache: StatementCache,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an engine caching at most `capacity` statements.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            options: ExecutionOptions::default(),
            cache: StatementCache::new(capacity),
        }
    }

    pub fn with_options(mut self, options: ExecutionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &ExecutionOptions {
        &self.options
    }

    pub fn cache(&self) -> &StatementCache {
        &self.cache
    }

    /// Parses `sql`, or returns the cached statement for the same text.
    pub fn prepare(&mut self, sql: &str) -> Result<Arc<PreparedQuery>> {
        self.cache.get_or_insert_with(sql, || PreparedQuery::new(sql))
    }

    /// Prepares, binds and executes `sql`.
    pub fn query<D: DataSource + ?Sized>(&mut self, sql: &str, params: &Params, sources: &D) -> Result<ResultSet> {
        let statement = self.prepare(sql)?;
        statement.execute_with(params, sources, &self.options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::InMemoryDataSource;
    use alloc::vec;
    use rowql_core::{record, BindErrorKind, Error, Value};

    fn sources() -> InMemoryDataSource {
        InMemoryDataSource::new().with_table(
            "t",
            vec![record! { "a" => 5, "b" => 1 }, record! { "a" => 6, "b" => 2 }],
        )
    }

    #[test]
    fn test_prepared_query_parameters() {
        let statement = PreparedQuery::new("SELECT a FROM t WHERE a = :x OR b = ? OR a = :x").unwrap();
        assert_eq!(
            statement.parameters(),
            &[ParamKey::Named("x".into()), ParamKey::Positional(0)]
        );
    }

    #[test]
    fn test_rebinding_is_isolated() {
        let statement = PreparedQuery::new("SELECT b FROM t WHERE a = :x").unwrap();
        let sources = sources();
        let first = statement.execute(&Params::new().with("x", 5), &sources).unwrap();
        let second = statement.execute(&Params::new().with("x", 6), &sources).unwrap();
        assert_eq!(first.rows[0].values(), &[Value::Int64(1)]);
        assert_eq!(second.rows[0].values(), &[Value::Int64(2)]);
        assert_eq!(statement.parameters().len(), 1);
    }

    #[test]
    fn test_missing_binding() {
        let statement = PreparedQuery::new("SELECT b FROM t WHERE a = :x").unwrap();
        match statement.execute(&Params::new(), &sources()) {
            Err(Error::Bind(e)) => assert_eq!(e.kind, BindErrorKind::MissingBinding),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_engine_caches_statements() {
        let mut engine = Engine::with_capacity(8);
        let sources = sources();
        for x in [5, 6, 5] {
            let result = engine
                .query("SELECT b FROM t WHERE a = :x", &Params::new().with("x", x), &sources)
                .unwrap();
            assert_eq!(result.len(), 1);
        }
        assert_eq!(engine.cache().len(), 1);
        assert_eq!(engine.cache().hits(), 2);
        assert_eq!(engine.cache().misses(), 1);
    }

    #[test]
    fn test_prepared_query_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PreparedQuery>();
        assert_send_sync::<Arc<PreparedQuery>>();
    }
}
