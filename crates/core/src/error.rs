//! Error types for rowql.
//!
//! Each pipeline stage has its own error type carrying the position that
//! failed: a byte offset for lexing and parsing, a parameter key for binding,
//! and a source/column/row description for evaluation. [`Error`] wraps all
//! four so `?` composes across stages.

use crate::types::DataType;
use alloc::format;
use alloc::string::String;
use core::fmt;

/// Result type alias for rowql operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Kinds of lexical failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LexErrorKind {
    /// A quoted string or identifier ran to the end of input.
    UnterminatedString,
    /// A numeric literal is malformed (`1.`, `1e`, `12abc`).
    InvalidNumber,
    /// A byte that starts no token.
    InvalidCharacter,
    /// A `/* ... */` comment ran to the end of input.
    UnterminatedComment,
}

/// Malformed query text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LexError {
    pub kind: LexErrorKind,
    /// Byte offset of the offending lexeme.
    pub offset: usize,
    pub message: String,
}

impl LexError {
    pub fn new(kind: LexErrorKind, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            message: message.into(),
        }
    }

    /// Creates an unterminated string error.
    pub fn unterminated_string(offset: usize) -> Self {
        Self::new(LexErrorKind::UnterminatedString, offset, "unterminated string")
    }

    /// Creates an invalid numeric literal error.
    pub fn invalid_number(offset: usize, literal: &str) -> Self {
        Self::new(
            LexErrorKind::InvalidNumber,
            offset,
            format!("invalid numeric literal '{}'", literal),
        )
    }

    /// Creates an invalid character error.
    pub fn invalid_character(offset: usize, ch: char) -> Self {
        Self::new(
            LexErrorKind::InvalidCharacter,
            offset,
            format!("invalid character '{}'", ch.escape_debug()),
        )
    }

    /// Creates an unterminated comment error.
    pub fn unterminated_comment(offset: usize) -> Self {
        Self::new(LexErrorKind::UnterminatedComment, offset, "unterminated comment")
    }
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lex error at offset {}: {}", self.offset, self.message)
    }
}

impl core::error::Error for LexError {}

/// Kinds of syntactic failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    UnexpectedToken,
    UnexpectedEnd,
    UnbalancedParens,
    /// A token that starts no known clause.
    UnknownClause,
    /// A known clause after one that must follow it.
    OutOfOrderClause,
    /// A join whose kind and constraint contradict each other.
    AmbiguousJoin,
    /// Set operation sides with different column counts.
    SetArityMismatch,
    /// `LIMIT`/`OFFSET` operand that is not a non-negative integer or parameter.
    InvalidLimit,
}

/// Malformed token sequence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    /// Byte offset of the offending token (input length at end of input).
    pub offset: usize,
    /// What the parser expected, in words.
    pub message: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, offset: usize, message: impl Into<String>) -> Self {
        Self {
            kind,
            offset,
            message: message.into(),
        }
    }

    /// Creates an unexpected token error.
    pub fn unexpected(offset: usize, expected: &str, found: &str) -> Self {
        Self::new(
            ParseErrorKind::UnexpectedToken,
            offset,
            format!("expected {}, found '{}'", expected, found),
        )
    }

    /// Creates an unexpected end of input error.
    pub fn unexpected_end(offset: usize, expected: &str) -> Self {
        Self::new(
            ParseErrorKind::UnexpectedEnd,
            offset,
            format!("expected {}, found end of input", expected),
        )
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Parse error at offset {}: {}", self.offset, self.message)
    }
}

impl core::error::Error for ParseError {}

/// Kinds of binding failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BindErrorKind {
    MissingBinding,
    IncompatibleType,
}

/// A parameter that is unbound or cannot take the supplied value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BindError {
    pub kind: BindErrorKind,
    /// Display form of the parameter (`:name` or `?1`).
    pub key: String,
    pub message: String,
}

impl BindError {
    /// Creates a missing binding error.
    pub fn missing(key: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            kind: BindErrorKind::MissingBinding,
            message: format!("no value bound for parameter {}", key),
            key,
        }
    }

    /// Creates an incompatible type error.
    pub fn incompatible(key: impl Into<String>, expected: &str, got: Option<DataType>) -> Self {
        let key = key.into();
        let got = got.map(|t| t.name()).unwrap_or("NULL");
        Self {
            kind: BindErrorKind::IncompatibleType,
            message: format!("parameter {} expects {}, got {}", key, expected, got),
            key,
        }
    }
}

impl fmt::Display for BindError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bind error: {}", self.message)
    }
}

impl core::error::Error for BindError {}

/// Kinds of evaluation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EvalErrorKind {
    UnknownSource,
    UnknownColumn,
    AmbiguousColumn,
    AggregateOutsideGroup,
    TypeMismatch,
    NaturalJoinNoCommonColumn,
    SetArityMismatch,
    UnknownFunction,
    InvalidArgument,
}

/// A failure while running a bound query.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalError {
    pub kind: EvalErrorKind,
    /// The source, column, function or row the failure concerns.
    pub context: String,
    pub message: String,
}

impl EvalError {
    pub fn new(kind: EvalErrorKind, context: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            context: context.into(),
            message: message.into(),
        }
    }

    /// Creates an unknown source error.
    pub fn unknown_source(name: &str) -> Self {
        Self::new(EvalErrorKind::UnknownSource, name, format!("source not found: {}", name))
    }

    /// Creates an unknown column error.
    pub fn unknown_column(column: &str) -> Self {
        Self::new(EvalErrorKind::UnknownColumn, column, format!("column not found: {}", column))
    }

    /// Creates an ambiguous column error.
    pub fn ambiguous_column(column: &str) -> Self {
        Self::new(
            EvalErrorKind::AmbiguousColumn,
            column,
            format!("column {} exists in more than one source", column),
        )
    }

    /// Creates an aggregate outside group error.
    pub fn aggregate_outside_group(function: &str, clause: &str) -> Self {
        Self::new(
            EvalErrorKind::AggregateOutsideGroup,
            function,
            format!("aggregate {} is not allowed in {}", function, clause),
        )
    }

    /// Creates a comparison type mismatch error.
    pub fn type_mismatch(left: DataType, right: DataType, context: impl Into<String>) -> Self {
        Self::new(
            EvalErrorKind::TypeMismatch,
            context,
            format!("cannot compare {} with {}", left, right),
        )
    }

    /// Creates a NATURAL join error.
    pub fn natural_join_no_common_column(right: &str) -> Self {
        Self::new(
            EvalErrorKind::NaturalJoinNoCommonColumn,
            right,
            format!("NATURAL JOIN with {} shares no column names", right),
        )
    }

    /// Creates a set operation arity error.
    pub fn set_arity_mismatch(left: usize, right: usize) -> Self {
        Self::new(
            EvalErrorKind::SetArityMismatch,
            "set operation",
            format!("left side has {} columns, right side has {}", left, right),
        )
    }

    /// Creates an unknown function error.
    pub fn unknown_function(name: &str) -> Self {
        Self::new(EvalErrorKind::UnknownFunction, name, format!("unknown function: {}", name))
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(function: &str, message: impl Into<String>) -> Self {
        Self::new(EvalErrorKind::InvalidArgument, function, message)
    }

    /// Attaches the 1-based row number when no other context is set.
    pub fn at_row(mut self, row: usize) -> Self {
        if self.context.is_empty() {
            self.context = format!("row {}", row);
        }
        self
    }
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Evaluation error: {}", self.message)
    }
}

impl core::error::Error for EvalError {}

/// Error types for every rowql stage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    Lex(LexError),
    Parse(ParseError),
    Bind(BindError),
    Eval(EvalError),
}

impl Error {
    /// Returns the source offset for lex and parse errors.
    pub fn offset(&self) -> Option<usize> {
        match self {
            Error::Lex(e) => Some(e.offset),
            Error::Parse(e) => Some(e.offset),
            Error::Bind(_) | Error::Eval(_) => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Lex(e) => e.fmt(f),
            Error::Parse(e) => e.fmt(f),
            Error::Bind(e) => e.fmt(f),
            Error::Eval(e) => e.fmt(f),
        }
    }
}

impl core::error::Error for Error {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Error::Lex(e) => Some(e),
            Error::Parse(e) => Some(e),
            Error::Bind(e) => Some(e),
            Error::Eval(e) => Some(e),
        }
    }
}

impl From<LexError> for Error {
    fn from(e: LexError) -> Self {
        Error::Lex(e)
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<BindError> for Error {
    fn from(e: BindError) -> Self {
        Error::Bind(e)
    }
}

impl From<EvalError> for Error {
    fn from(e: EvalError) -> Self {
        Error::Eval(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_display() {
        let err = LexError::unterminated_string(7);
        assert!(err.to_string().contains("offset 7"));

        let err = ParseError::unexpected(3, "FROM", "WHERE");
        assert!(err.to_string().contains("expected FROM"));

        let err = BindError::missing(":x");
        assert!(err.to_string().contains(":x"));

        let err = EvalError::unknown_source("users");
        assert!(err.to_string().contains("users"));
    }

    #[test]
    fn test_error_constructors() {
        let err = BindError::incompatible("?0", "numeric", Some(DataType::String));
        assert_eq!(err.kind, BindErrorKind::IncompatibleType);
        assert!(err.message.contains("STRING"));

        let err = EvalError::type_mismatch(DataType::String, DataType::Int64, "row 2");
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
        assert_eq!(err.context, "row 2");
    }

    #[test]
    fn test_umbrella_conversion() {
        fn fails() -> Result<()> {
            Err(LexError::invalid_character(4, '$'))?
        }
        let err = fails().unwrap_err();
        assert_eq!(err.offset(), Some(4));
        match err {
            Error::Lex(e) => assert_eq!(e.kind, LexErrorKind::InvalidCharacter),
            _ => panic!("Wrong error type"),
        }
    }
}
