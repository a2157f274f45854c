//! rowql Core - Value, row and error types for the rowql query engine.
//!
//! This crate provides the foundational types shared by every stage:
//!
//! - `DataType`: Types a non-null value can take (Boolean, Int64, Float64, String)
//! - `Value`: Scalars held in records, literals and parameters
//! - `Record`: A named row as supplied by callers and returned in results
//! - `Row`: A positional row used inside the executor
//! - `pattern_match`: SQL LIKE matching
//! - `Error`: Per-stage error types (lex, parse, bind, eval) and their umbrella
//!
//! # Example
//!
//! ```rust
//! use rowql_core::{record, Record, Row, Value};
//!
//! let user: Record = record! { "id" => 1, "name" => "Alice" };
//! assert_eq!(user.get("name"), Some(&Value::String("Alice".into())));
//! assert!(user.get_or_null("email").is_null());
//!
//! let row = Row::new(user.values().cloned().collect());
//! assert_eq!(row.get(0), Some(&Value::Int64(1)));
//! assert_eq!(Value::Int64(1), Value::Float64(1.0));
//! ```

#![no_std]

extern crate alloc;

mod error;
pub mod pattern_match;
mod record;
mod row;
mod types;
mod value;

pub use error::{
    BindError, BindErrorKind, Error, EvalError, EvalErrorKind, LexError, LexErrorKind, ParseError,
    ParseErrorKind, Result,
};
pub use record::Record;
pub use row::Row;
pub use types::DataType;
pub use value::{Incomparable, Value};
