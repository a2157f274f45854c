//! Recursive-descent parser producing a [`Query`] from tokens.
//!
//! The entry points are [`parse`] for an already tokenized statement and
//! [`parse_query`], which lexes first. Clause structure lives here;
//! expression precedence climbing lives in the `expr` submodule.
//!
//! Besides building the AST the parser resolves the names it can decide
//! without data: projection output names, `ORDER BY` aliases and ordinals,
//! and `HAVING` references to projection aliases.

mod expr;

use crate::ast::{
    ColumnRef, Compound, Expr, FromClause, JoinConstraint, JoinStep, LimitValue, ParamKey, Query,
    QueryTerm, SelectBlock, SelectItem, SortKey, SortTarget, Source, TableRef,
};
use crate::lexer::{self, JoinKind, SetOperationKind, Token, TokenKind};
use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use rowql_core::{ParseError, ParseErrorKind, Result};
use tracing::debug;

/// Lexes and parses query text.
///
/// Lex failures keep their own error kind, so the umbrella error is returned.
pub fn parse_query(source: &str) -> Result<Query> {
    let tokens = lexer::tokenize(source)?;
    let query = Parser::new(&tokens, source.len()).parse_statement()?;
    Ok(query)
}

/// Parses a complete token stream.
pub fn parse(tokens: &[Token]) -> core::result::Result<Query, ParseError> {
    let end = tokens.last().map_or(0, Token::end_offset);
    Parser::new(tokens, end).parse_statement()
}

type ParseResult<T> = core::result::Result<T, ParseError>;

/// A recursive-descent parser over a borrowed token slice.
pub struct Parser<'t> {
    tokens: &'t [Token],
    pos: usize,
    /// Offset reported for errors at end of input.
    end_offset: usize,
}

impl<'t> Parser<'t> {
    pub fn new(tokens: &'t [Token], end_offset: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            end_offset,
        }
    }

    /// Parses one statement, allowing a trailing `;`.
    pub fn parse_statement(&mut self) -> ParseResult<Query> {
        let query = self.parse_query_body()?;
        if self.peek().map_or(false, |t| t.is(TokenKind::Separator, ";")) {
            self.pos += 1;
        }
        if let Some(token) = self.peek() {
            return Err(leftover_error(token));
        }
        debug!(
            target: "rowql::parser",
            compounds = query.compounds.len(),
            order_keys = query.order_by.len(),
            "parsed query"
        );
        Ok(query)
    }

    // =======================================================================
    // Token helpers
    // =======================================================================

    fn peek(&self) -> Option<&'t Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&'t Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Option<&'t Token> {
        let token = self.tokens.get(self.pos)?;
        self.pos += 1;
        Some(token)
    }

    /// Offset of the next token, or of the end of input.
    fn next_offset(&self) -> usize {
        self.peek().map_or(self.end_offset, |t| t.start_offset)
    }

    fn check(&self, kind: TokenKind, value: &str) -> bool {
        self.peek().map_or(false, |t| t.is(kind, value))
    }

    fn eat(&mut self, kind: TokenKind, value: &str) -> bool {
        if self.check(kind, value) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_clause(&mut self, keyword: &str) -> Option<usize> {
        let offset = self.next_offset();
        self.eat(TokenKind::ClauseKeyword, keyword).then_some(offset)
    }

    fn eat_reserved(&mut self, word: &str) -> bool {
        self.eat(TokenKind::ReservedWord, word)
    }

    fn eat_operator(&mut self, op: &str) -> bool {
        self.eat(TokenKind::Operator, op)
    }

    fn eat_comma(&mut self) -> bool {
        self.eat(TokenKind::Separator, ",")
    }

    /// Error describing the next token (or end of input) as unexpected.
    fn unexpected(&self, expected: &str) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::unexpected(token.start_offset, expected, &token.raw),
            None => ParseError::unexpected_end(self.end_offset, expected),
        }
    }

    fn expect(&mut self, kind: TokenKind, value: &str) -> ParseResult<&'t Token> {
        match self.peek() {
            Some(token) if token.is(kind, value) => {
                self.pos += 1;
                Ok(token)
            }
            _ => Err(self.unexpected(value)),
        }
    }

    fn expect_open(&mut self) -> ParseResult<usize> {
        self.expect(TokenKind::Paren, "(").map(|t| t.start_offset)
    }

    /// Consumes the `)` matching the `(` at `open`.
    fn expect_close(&mut self, open: usize) -> ParseResult<()> {
        match self.peek() {
            Some(token) if token.is(TokenKind::Paren, ")") => {
                self.pos += 1;
                Ok(())
            }
            Some(token) if token.kind == TokenKind::ClauseKeyword => Err(ParseError::new(
                ParseErrorKind::OutOfOrderClause,
                token.start_offset,
                format!("unexpected {} before ')'", token.value),
            )),
            Some(_) => Err(self.unexpected("')'")),
            None => Err(ParseError::new(
                ParseErrorKind::UnbalancedParens,
                open,
                "'(' is never closed",
            )),
        }
    }

    /// Source text of tokens `from..to`, with single spaces where the
    /// source had a gap.
    fn span_text(&self, from: usize, to: usize) -> String {
        let mut text = String::new();
        for i in from..to {
            let token = &self.tokens[i];
            if i > from && token.start_offset > self.tokens[i - 1].end_offset() {
                text.push(' ');
            }
            text.push_str(&token.raw);
        }
        text
    }

    /// Identifier usable as an alias: a bare or quoted name, never a keyword.
    fn parse_alias(&mut self, required: bool) -> ParseResult<Option<String>> {
        let explicit = self.eat_reserved("AS");
        match self.peek() {
            Some(token) if token.kind == TokenKind::Identifier && !token.raw.ends_with(".*") => {
                self.pos += 1;
                Ok(Some(token.value.clone()))
            }
            Some(token) if explicit && token.kind == TokenKind::StringConstant => {
                self.pos += 1;
                Ok(Some(token.value.clone()))
            }
            _ if explicit || required => Err(self.unexpected("alias")),
            _ => Ok(None),
        }
    }

    // =======================================================================
    // Queries and set operations
    // =======================================================================

    /// `term { set_op term } [ORDER BY ...] [LIMIT ...] [OFFSET ...]`
    fn parse_query_body(&mut self) -> ParseResult<Query> {
        let head = self.parse_term()?;
        let mut arity = head.static_arity();
        let mut compounds = Vec::new();

        while let Some(token) = self.peek() {
            let op = match token.kind {
                TokenKind::ClauseKeyword => SetOperationKind::from_keyword(&token.value),
                _ => None,
            };
            let Some(op) = op else { break };
            self.pos += 1;
            let term = self.parse_term()?;
            match (arity, term.static_arity()) {
                (Some(left), Some(right)) if left != right => {
                    return Err(ParseError::new(
                        ParseErrorKind::SetArityMismatch,
                        token.start_offset,
                        format!(
                            "{} combines {} columns with {} columns",
                            op.keyword(),
                            left,
                            right
                        ),
                    ));
                }
                (None, known) => arity = known,
                _ => {}
            }
            compounds.push(Compound {
                op,
                term,
                offset: token.start_offset,
            });
        }

        let mut query = Query {
            head,
            compounds,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        };

        if self.eat_clause("ORDER BY").is_some() {
            loop {
                let key = self.parse_sort_key(&query)?;
                query.order_by.push(key);
                if !self.eat_comma() {
                    break;
                }
            }
        }

        if self.eat_clause("LIMIT").is_some() {
            let first = self.parse_limit_value()?;
            if self.eat_comma() {
                query.offset = Some(first);
                query.limit = Some(self.parse_limit_value()?);
            } else {
                query.limit = Some(first);
            }
        }
        if query.offset.is_none() && self.eat_clause("OFFSET").is_some() {
            query.offset = Some(self.parse_limit_value()?);
        }

        Ok(query)
    }

    /// A select block or a parenthesised query.
    fn parse_term(&mut self) -> ParseResult<QueryTerm> {
        if self.check(TokenKind::Paren, "(") {
            let open = self.expect_open()?;
            let inner = self.parse_query_body()?;
            self.expect_close(open)?;
            // A bare parenthesised block needs no nesting.
            let is_plain = inner.compounds.is_empty()
                && inner.order_by.is_empty()
                && inner.limit.is_none()
                && inner.offset.is_none();
            return Ok(if is_plain {
                inner.head
            } else {
                QueryTerm::Nested(Box::new(inner))
            });
        }
        let block = self.parse_select_block()?;
        Ok(QueryTerm::Select(Box::new(block)))
    }

    fn parse_limit_value(&mut self) -> ParseResult<LimitValue> {
        let token = self.advance().ok_or_else(|| {
            ParseError::unexpected_end(self.end_offset, "non-negative integer")
        })?;
        match token.kind {
            TokenKind::NumericConstant => token.value.parse::<u64>().map(LimitValue::Count).map_err(|_| {
                ParseError::new(
                    ParseErrorKind::InvalidLimit,
                    token.start_offset,
                    format!("'{}' is not a non-negative integer", token.raw),
                )
            }),
            TokenKind::Parameter => Ok(LimitValue::Parameter {
                key: parameter_key(token),
                offset: token.start_offset,
            }),
            _ => Err(ParseError::new(
                ParseErrorKind::InvalidLimit,
                token.start_offset,
                format!("expected non-negative integer or parameter, found '{}'", token.raw),
            )),
        }
    }

    fn parse_sort_key(&mut self, query: &Query) -> ParseResult<SortKey> {
        let offset = self.next_offset();
        let expr = self.parse_expr()?;
        let target = resolve_sort_target(expr, query, offset)?;

        let descending = if self.eat_reserved("DESC") {
            true
        } else {
            self.eat_reserved("ASC");
            false
        };
        let nulls_first = if self.eat_reserved("NULLS") {
            if self.eat_reserved("FIRST") {
                Some(true)
            } else if self.eat_reserved("LAST") {
                Some(false)
            } else {
                return Err(self.unexpected("FIRST or LAST"));
            }
        } else {
            None
        };

        Ok(SortKey {
            target,
            descending,
            nulls_first,
        })
    }

    // =======================================================================
    // Select blocks
    // =======================================================================

    fn parse_select_block(&mut self) -> ParseResult<SelectBlock> {
        self.expect(TokenKind::ClauseKeyword, "SELECT")?;
        let mut block = SelectBlock {
            distinct: self.eat_reserved("DISTINCT"),
            ..Default::default()
        };
        if !block.distinct {
            self.eat_reserved("ALL");
        }

        loop {
            let item = self.parse_select_item()?;
            block.projection.push(item);
            if !self.eat_comma() {
                break;
            }
        }

        if self.eat_clause("FROM").is_some() {
            block.from = Some(self.parse_from()?);
        }
        if self.eat_clause("WHERE").is_some() {
            block.filter = Some(self.parse_expr()?);
        }
        if self.eat_clause("GROUP BY").is_some() {
            loop {
                block.group_by.push(self.parse_expr()?);
                if !self.eat_comma() {
                    break;
                }
            }
        }
        if self.eat_clause("HAVING").is_some() {
            let mut having = self.parse_expr()?;
            substitute_aliases(&mut having, &block.projection);
            block.having = Some(having);
        }

        Ok(block)
    }

    fn parse_select_item(&mut self) -> ParseResult<SelectItem> {
        match self.peek() {
            Some(token) if token.is_operator("*") => {
                self.pos += 1;
                return Ok(SelectItem::Wildcard);
            }
            Some(token) if token.kind == TokenKind::Identifier && token.raw.ends_with(".*") => {
                self.pos += 1;
                let mut parts = lexer::identifier_parts(&token.raw);
                parts.pop();
                return Ok(SelectItem::QualifiedWildcard(parts.join(".")));
            }
            _ => {}
        }

        let start = self.pos;
        let expr = self.parse_expr()?;
        let end = self.pos;
        let alias = self.parse_alias(false)?;
        let name = match (&alias, &expr) {
            (Some(alias), _) => alias.clone(),
            (None, Expr::Column(ColumnRef { name, .. })) => name.clone(),
            (None, _) => self.span_text(start, end),
        };
        Ok(SelectItem::Expr { expr, alias, name })
    }

    fn parse_from(&mut self) -> ParseResult<FromClause> {
        let base = self.parse_table_ref()?;
        let mut joins = Vec::new();

        loop {
            let Some(token) = self.peek() else { break };
            if token.is(TokenKind::Separator, ",") {
                self.pos += 1;
                joins.push(JoinStep {
                    kind: JoinKind::Cross,
                    table: self.parse_table_ref()?,
                    constraint: JoinConstraint::None,
                    offset: token.start_offset,
                });
                continue;
            }
            let kind = match token.kind {
                TokenKind::ClauseKeyword => JoinKind::from_keyword(&token.value),
                _ => None,
            };
            let Some(kind) = kind else { break };
            self.pos += 1;
            joins.push(self.parse_join_step(kind, token.start_offset)?);
        }

        Ok(FromClause { base, joins })
    }

    fn parse_join_step(&mut self, kind: JoinKind, offset: usize) -> ParseResult<JoinStep> {
        let table = self.parse_table_ref()?;
        let constraint_offset = self.next_offset();

        let constraint = if self.eat_reserved("ON") {
            JoinConstraint::On(self.parse_expr()?)
        } else if self.eat_reserved("USING") {
            let open = self.expect_open()?;
            let mut columns = Vec::new();
            loop {
                match self.peek() {
                    Some(token) if token.kind == TokenKind::Identifier => {
                        self.pos += 1;
                        columns.push(token.value.clone());
                    }
                    _ => return Err(self.unexpected("column name")),
                }
                if !self.eat_comma() {
                    break;
                }
            }
            self.expect_close(open)?;
            JoinConstraint::Using(columns)
        } else {
            JoinConstraint::None
        };

        let has_constraint = !matches!(constraint, JoinConstraint::None);
        if kind.forbids_constraint() && has_constraint {
            return Err(ParseError::new(
                ParseErrorKind::AmbiguousJoin,
                constraint_offset,
                format!("{} does not take ON or USING", kind.keyword()),
            ));
        }
        if kind.requires_constraint() && !has_constraint {
            return Err(ParseError::new(
                ParseErrorKind::AmbiguousJoin,
                offset,
                format!("{} requires ON or USING", kind.keyword()),
            ));
        }

        Ok(JoinStep {
            kind,
            table,
            constraint,
            offset,
        })
    }

    fn parse_table_ref(&mut self) -> ParseResult<TableRef> {
        match self.peek() {
            Some(token) if token.is(TokenKind::Paren, "(") => {
                let open = self.expect_open()?;
                let query = self.parse_query_body()?;
                self.expect_close(open)?;
                let alias = self.parse_alias(true)?;
                Ok(TableRef {
                    source: Source::Subquery(Box::new(query)),
                    alias,
                })
            }
            Some(token) if token.kind == TokenKind::Identifier && !token.raw.ends_with(".*") => {
                self.pos += 1;
                let alias = self.parse_alias(false)?;
                Ok(TableRef {
                    source: Source::Table(token.value.clone()),
                    alias,
                })
            }
            _ => Err(self.unexpected("table name or subquery")),
        }
    }
}

/// Classifies a token left over after a complete statement.
fn leftover_error(token: &Token) -> ParseError {
    match token.kind {
        TokenKind::Paren if token.value == ")" => ParseError::new(
            ParseErrorKind::UnbalancedParens,
            token.start_offset,
            "')' has no matching '('",
        ),
        // Every clause keyword that could still follow has been consumed.
        TokenKind::ClauseKeyword => ParseError::new(
            ParseErrorKind::OutOfOrderClause,
            token.start_offset,
            format!("{} cannot appear here", token.value),
        ),
        _ => ParseError::new(
            ParseErrorKind::UnknownClause,
            token.start_offset,
            format!("'{}' does not start a clause", token.raw),
        ),
    }
}

fn parameter_key(token: &Token) -> ParamKey {
    match (&token.parameter_name, token.parameter_offset) {
        (Some(name), _) => ParamKey::Named(name.clone()),
        (None, Some(ordinal)) => ParamKey::Positional(ordinal),
        (None, None) => ParamKey::Positional(0),
    }
}

/// Select items of the term whose names a query's output carries.
fn head_items(term: &QueryTerm) -> &[SelectItem] {
    match term {
        QueryTerm::Select(block) => &block.projection,
        QueryTerm::Nested(query) => head_items(&query.head),
    }
}

/// Output position of `name`, unless a wildcard precedes the match.
fn output_position(items: &[SelectItem], name: &str, alias_only: bool) -> Option<usize> {
    for (i, item) in items.iter().enumerate() {
        let SelectItem::Expr { alias, name: output, .. } = item else {
            return None;
        };
        let hit = if alias_only {
            alias.as_deref() == Some(name)
        } else {
            output == name
        };
        if hit {
            return Some(i);
        }
    }
    None
}

fn resolve_sort_target(expr: Expr, query: &Query, offset: usize) -> ParseResult<SortTarget> {
    let items = head_items(&query.head);
    let compound = !query.compounds.is_empty();

    match &expr {
        Expr::Literal(rowql_core::Value::Int64(n)) => {
            let known = items.iter().take_while(|i| matches!(i, SelectItem::Expr { .. })).count();
            if *n < 1 || (known == items.len() && *n as usize > known) {
                return Err(ParseError::unexpected(
                    offset,
                    "ORDER BY position within the select list",
                    &format!("{}", n),
                ));
            }
            let index = (*n - 1) as usize;
            if index < known {
                return Ok(SortTarget::Position(index));
            }
            // Past a wildcard: resolved against the output at run time.
            Ok(SortTarget::Expr(expr))
        }
        Expr::Column(ColumnRef {
            qualifier: None,
            name,
        }) => {
            let position = output_position(items, name, true)
                .or_else(|| compound.then(|| output_position(items, name, false)).flatten());
            Ok(match position {
                Some(i) => SortTarget::Position(i),
                None => SortTarget::Expr(expr),
            })
        }
        // Compound output is sorted by output column only.
        _ if compound => Ok(SortTarget::Expr(expr)),
        _ => {
            let mut expr = expr;
            substitute_aliases(&mut expr, items);
            Ok(SortTarget::Expr(expr))
        }
    }
}

/// Replaces bare references to projection aliases with the aliased expression.
fn substitute_aliases(expr: &mut Expr, items: &[SelectItem]) {
    let replacement = match &*expr {
        Expr::Column(ColumnRef {
            qualifier: None,
            name,
        }) => items.iter().find_map(|item| match item {
            SelectItem::Expr {
                expr,
                alias: Some(alias),
                ..
            } if alias == name => Some(expr.clone()),
            _ => None,
        }),
        _ => None,
    };
    match replacement {
        Some(aliased) => *expr = aliased,
        None => expr.for_each_child_mut(|child| substitute_aliases(child, items)),
    }
}
