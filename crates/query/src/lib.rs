//! rowql Query - SQL-like queries over in-memory record sets.
//!
//! This crate provides the full query pipeline:
//!
//! - `lexer`: Tokenizer and the keyword, operator and function tables
//! - `ast`: Expression and query structure definitions
//! - `parser`: Recursive-descent parser producing a `Query`
//! - `binder`: Parameter binding with type coercion
//! - `executor`: Query execution stages (scan, join, filter, aggregate, project, sort, limit)
//! - `context`: Execution options
//! - `plan_cache`: Prepared statement caching for repeated queries
//! - `engine`: Prepared statements and the `Engine` facade
//!
//! # Example
//!
//! ```rust
//! use rowql_core::record;
//! use rowql_query::{bind, execute, parse_query, InMemoryDataSource, Params};
//!
//! let sources = InMemoryDataSource::new()
//!     .with_table("t1", vec![record! { "id" => 1 }, record! { "id" => 2 }])
//!     .with_table("t2", vec![record! { "id" => 1, "v" => "x" }]);
//!
//! let query = parse_query("SELECT * FROM t1 LEFT JOIN t2 ON t1.id = t2.id").unwrap();
//! let bound = bind(&query, &Params::new()).unwrap();
//! let result = execute(&bound, &sources).unwrap();
//!
//! assert_eq!(result.columns, vec!["t1.id", "t2.id", "t2.v"]);
//! assert_eq!(result.len(), 2);
//! assert!(result.rows[1].values()[2].is_null());
//! ```

#![no_std]

extern crate alloc;

pub mod ast;
pub mod binder;
pub mod context;
pub mod engine;
pub mod executor;
pub mod lexer;
pub mod parser;
pub mod plan_cache;

pub use binder::{bind, parameters, BoundQuery, Params};
pub use context::{Collation, ExecutionOptions};
pub use engine::{Engine, PreparedQuery};
pub use executor::{execute, execute_with, DataSource, ExecutionStats, InMemoryDataSource, ResultSet};
pub use lexer::{tokenize, Token, TokenKind};
pub use parser::parse_query;
pub use plan_cache::StatementCache;
