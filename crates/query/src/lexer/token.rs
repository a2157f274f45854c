//! Tokens and the closed vocabularies the lexer and parser classify against.

use alloc::string::String;
use core::fmt;

/// Classification of a token.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Integer or decimal literal, possibly signed.
    NumericConstant,
    /// Quoted string literal.
    StringConstant,
    /// `SELECT`, `FROM`, `LEFT JOIN`, `ORDER BY`, ...
    ClauseKeyword,
    /// Symbol operators and word operators (`AND`, `LIKE`, ...).
    Operator,
    /// Reserved words that are not clauses (`AS`, `ON`, `DESC`, ...).
    ReservedWord,
    /// `(` or `)`.
    Paren,
    /// `,` or `;`.
    Separator,
    /// Identifier immediately followed by `(`.
    FunctionName,
    /// Column, table or alias name, possibly dotted.
    Identifier,
    /// `NULL`.
    NullConstant,
    /// `:name` or `?`.
    Parameter,
}

impl TokenKind {
    pub fn name(&self) -> &'static str {
        match self {
            TokenKind::NumericConstant => "numeric constant",
            TokenKind::StringConstant => "string constant",
            TokenKind::ClauseKeyword => "clause keyword",
            TokenKind::Operator => "operator",
            TokenKind::ReservedWord => "reserved word",
            TokenKind::Paren => "parenthesis",
            TokenKind::Separator => "separator",
            TokenKind::FunctionName => "function name",
            TokenKind::Identifier => "identifier",
            TokenKind::NullConstant => "null",
            TokenKind::Parameter => "parameter",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A classified, positioned lexeme.
///
/// `value` is the interpreted form: unescaped string content, normalised
/// upper-case keywords, or the literal text of a number. `raw` is the exact
/// source span, so `source[start_offset..start_offset + raw.len()] == raw`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub raw: String,
    /// Byte offset of the first byte of `raw`.
    pub start_offset: usize,
    /// Set only for `:name` placeholders.
    pub parameter_name: Option<String>,
    /// Set only for `?` placeholders: 0-based ordinal among them.
    pub parameter_offset: Option<usize>,
}

impl Token {
    pub(crate) fn new(
        kind: TokenKind,
        value: impl Into<String>,
        raw: impl Into<String>,
        start_offset: usize,
    ) -> Self {
        Self {
            kind,
            value: value.into(),
            raw: raw.into(),
            start_offset,
            parameter_name: None,
            parameter_offset: None,
        }
    }

    /// Byte offset one past the end of this token.
    #[inline]
    pub fn end_offset(&self) -> usize {
        self.start_offset + self.raw.len()
    }

    /// Returns true if this token has the given kind and (case-insensitive) value.
    #[inline]
    pub fn is(&self, kind: TokenKind, value: &str) -> bool {
        self.kind == kind && self.value.eq_ignore_ascii_case(value)
    }

    /// Returns true for a clause keyword with the given normalised value.
    #[inline]
    pub fn is_clause(&self, value: &str) -> bool {
        self.is(TokenKind::ClauseKeyword, value)
    }

    /// Returns true for a reserved word with the given value.
    #[inline]
    pub fn is_reserved(&self, value: &str) -> bool {
        self.is(TokenKind::ReservedWord, value)
    }

    /// Returns true for an operator with the given value.
    #[inline]
    pub fn is_operator(&self, value: &str) -> bool {
        self.is(TokenKind::Operator, value)
    }

    /// Returns true if a value can end here, so a following `+`/`-` is binary.
    pub(crate) fn ends_operand(&self) -> bool {
        match self.kind {
            TokenKind::NumericConstant
            | TokenKind::StringConstant
            | TokenKind::Identifier
            | TokenKind::NullConstant
            | TokenKind::Parameter => true,
            TokenKind::Paren => self.value == ")",
            TokenKind::ReservedWord => {
                matches!(self.value.as_str(), "TRUE" | "FALSE" | "END")
            }
            _ => false,
        }
    }
}

/// Single-word clause keywords.
pub const CLAUSE_KEYWORDS: &[&str] = &[
    "SELECT",
    "FROM",
    "WHERE",
    "JOIN",
    "STRAIGHT_JOIN",
    "HAVING",
    "LIMIT",
    "OFFSET",
    "UNION",
    "EXCEPT",
    "INTERSECT",
];

/// Multi-word clause keywords, longest first within a shared prefix.
pub const MULTI_WORD_KEYWORDS: &[&[&str]] = &[
    &["ORDER", "BY"],
    &["GROUP", "BY"],
    &["UNION", "ALL"],
    &["LEFT", "OUTER", "JOIN"],
    &["LEFT", "JOIN"],
    &["RIGHT", "OUTER", "JOIN"],
    &["RIGHT", "JOIN"],
    &["INNER", "JOIN"],
    &["CROSS", "JOIN"],
    &["NATURAL", "JOIN"],
];

/// Reserved words that are neither clauses nor operators.
pub const RESERVED_WORDS: &[&str] = &[
    "AS", "ON", "USING", "ASC", "DESC", "DISTINCT", "ALL", "TRUE", "FALSE", "NULLS", "FIRST",
    "LAST", "INNER", "OUTER", "LEFT", "RIGHT", "CROSS", "NATURAL", "BY", "ESCAPE", "EXISTS",
    "CASE", "WHEN", "THEN", "ELSE", "END",
];

/// Reserved words that double as scalar function names when followed by `(`.
pub const FUNCTION_RESERVED_WORDS: &[&str] = &["LEFT", "RIGHT"];

/// Word operators.
pub const WORD_OPERATORS: &[&str] = &[
    "AND", "OR", "NOT", "IN", "LIKE", "IS", "BETWEEN", "XOR", "DIV", "MOD",
];

/// Symbol operators, longest first so matching is greedy.
pub const SYMBOL_OPERATORS: &[&str] = &[
    "<=>", "<=", ">=", "<>", "!=", "==", "||", "<<", ">>", "=", "<", ">", "+", "-", "*", "/", "%",
];

/// Returns the table entry for `word` (case-insensitive).
fn lookup(table: &'static [&'static str], word: &str) -> Option<&'static str> {
    table.iter().copied().find(|entry| entry.eq_ignore_ascii_case(word))
}

/// Reclassifies a scanned bare word.
///
/// Returns the kind and normalised value, or None for a plain identifier.
pub fn classify_word(word: &str) -> Option<(TokenKind, &'static str)> {
    if word.eq_ignore_ascii_case("NULL") {
        return Some((TokenKind::NullConstant, "NULL"));
    }
    if let Some(kw) = lookup(CLAUSE_KEYWORDS, word) {
        return Some((TokenKind::ClauseKeyword, kw));
    }
    if let Some(op) = lookup(WORD_OPERATORS, word) {
        return Some((TokenKind::Operator, op));
    }
    lookup(RESERVED_WORDS, word).map(|rw| (TokenKind::ReservedWord, rw))
}

/// Returns true if `word` starts some multi-word keyword.
pub fn starts_multi_word(word: &str) -> bool {
    MULTI_WORD_KEYWORDS
        .iter()
        .any(|seq| seq[0].eq_ignore_ascii_case(word))
}

/// Returns true if `word` may be reclassified as a function name.
pub fn is_function_reserved(word: &str) -> bool {
    lookup(FUNCTION_RESERVED_WORDS, word).is_some()
}

/// Row-pairing strategy of a join step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum JoinKind {
    /// `JOIN` / `INNER JOIN`.
    Join,
    Left,
    Right,
    Cross,
    /// `STRAIGHT_JOIN`: a plain join that forbids reordering. This engine
    /// never reorders joins, so it evaluates exactly like `Join`.
    Straight,
    Natural,
}

impl JoinKind {
    /// Maps a normalised join clause keyword to its kind.
    pub fn from_keyword(keyword: &str) -> Option<JoinKind> {
        match keyword {
            "JOIN" | "INNER JOIN" => Some(JoinKind::Join),
            "LEFT JOIN" | "LEFT OUTER JOIN" => Some(JoinKind::Left),
            "RIGHT JOIN" | "RIGHT OUTER JOIN" => Some(JoinKind::Right),
            "CROSS JOIN" => Some(JoinKind::Cross),
            "STRAIGHT_JOIN" => Some(JoinKind::Straight),
            "NATURAL JOIN" => Some(JoinKind::Natural),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Join => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
            JoinKind::Straight => "STRAIGHT_JOIN",
            JoinKind::Natural => "NATURAL JOIN",
        }
    }

    /// Returns true for kinds whose pairing rule is implicit.
    pub fn forbids_constraint(&self) -> bool {
        matches!(self, JoinKind::Cross | JoinKind::Natural)
    }

    /// Returns true for outer kinds.
    pub fn requires_constraint(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Right)
    }
}

/// Combinator between two select blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SetOperationKind {
    Union,
    UnionAll,
    Except,
    Intersect,
}

impl SetOperationKind {
    /// Maps a normalised clause keyword to its set operation.
    pub fn from_keyword(keyword: &str) -> Option<SetOperationKind> {
        match keyword {
            "UNION" => Some(SetOperationKind::Union),
            "UNION ALL" => Some(SetOperationKind::UnionAll),
            "EXCEPT" => Some(SetOperationKind::Except),
            "INTERSECT" => Some(SetOperationKind::Intersect),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            SetOperationKind::Union => "UNION",
            SetOperationKind::UnionAll => "UNION ALL",
            SetOperationKind::Except => "EXCEPT",
            SetOperationKind::Intersect => "INTERSECT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_word() {
        assert_eq!(classify_word("select"), Some((TokenKind::ClauseKeyword, "SELECT")));
        assert_eq!(classify_word("And"), Some((TokenKind::Operator, "AND")));
        assert_eq!(classify_word("desc"), Some((TokenKind::ReservedWord, "DESC")));
        assert_eq!(classify_word("null"), Some((TokenKind::NullConstant, "NULL")));
        assert_eq!(classify_word("users"), None);
    }

    #[test]
    fn test_symbol_operators_longest_first() {
        for (i, op) in SYMBOL_OPERATORS.iter().enumerate() {
            for later in &SYMBOL_OPERATORS[i + 1..] {
                assert!(
                    !(later.len() > op.len() && later.starts_with(op)),
                    "{} shadows {}",
                    op,
                    later
                );
            }
        }
    }

    #[test]
    fn test_multi_word_prefixes() {
        assert!(starts_multi_word("order"));
        assert!(starts_multi_word("LEFT"));
        assert!(!starts_multi_word("JOIN"));
    }

    #[test]
    fn test_join_kind_keywords() {
        assert_eq!(JoinKind::from_keyword("LEFT OUTER JOIN"), Some(JoinKind::Left));
        assert_eq!(JoinKind::from_keyword("STRAIGHT_JOIN"), Some(JoinKind::Straight));
        assert_eq!(JoinKind::from_keyword("WHERE"), None);
        assert!(JoinKind::Natural.forbids_constraint());
        assert!(JoinKind::Right.requires_constraint());
    }

    #[test]
    fn test_set_operation_keywords() {
        assert_eq!(SetOperationKind::from_keyword("UNION ALL"), Some(SetOperationKind::UnionAll));
        assert_eq!(SetOperationKind::Intersect.keyword(), "INTERSECT");
    }
}
