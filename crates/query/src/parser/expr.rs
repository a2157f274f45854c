//! Expression parsing by precedence climbing.
//!
//! Levels, lowest first: `OR`/`XOR`, `AND`, prefix `NOT`, comparisons
//! (including `IS`, `BETWEEN`, `IN`, `LIKE`), additive and shifts,
//! multiplicative and `||`, prefix sign, primary.
//!
//! Prefix `NOT` binds looser than comparison, unlike the prefix sign:
//! `NOT a = 1` is `NOT (a = 1)`, never `(NOT a) = 1`. Write `(NOT a) = 1`
//! to negate the operand alone.

use super::{parameter_key, ParseResult, Parser};
use crate::ast::{AggregateFunc, BinaryOp, CaseBranch, ColumnRef, Expr, UnaryOp};
use crate::lexer::{self, Token, TokenKind};
use alloc::boxed::Box;
use alloc::vec::Vec;
use rowql_core::{ParseError, Value};

fn comparison_op(token: &Token) -> Option<BinaryOp> {
    if token.kind != TokenKind::Operator {
        return None;
    }
    Some(match token.value.as_str() {
        "=" | "==" => BinaryOp::Eq,
        "<=>" => BinaryOp::NullSafeEq,
        "<>" | "!=" => BinaryOp::Ne,
        "<" => BinaryOp::Lt,
        "<=" => BinaryOp::Le,
        ">" => BinaryOp::Gt,
        ">=" => BinaryOp::Ge,
        _ => return None,
    })
}

fn additive_op(token: &Token) -> Option<BinaryOp> {
    if token.kind != TokenKind::Operator {
        return None;
    }
    Some(match token.value.as_str() {
        "+" => BinaryOp::Add,
        "-" => BinaryOp::Sub,
        "<<" => BinaryOp::ShiftLeft,
        ">>" => BinaryOp::ShiftRight,
        _ => return None,
    })
}

fn multiplicative_op(token: &Token) -> Option<BinaryOp> {
    if token.kind != TokenKind::Operator {
        return None;
    }
    Some(match token.value.as_str() {
        "*" => BinaryOp::Mul,
        "/" => BinaryOp::Div,
        "%" | "MOD" => BinaryOp::Mod,
        "DIV" => BinaryOp::IntDiv,
        "||" => BinaryOp::Concat,
        _ => return None,
    })
}

fn numeric_literal(token: &Token) -> ParseResult<Value> {
    let text = token.value.as_str();
    let is_float = text.contains(|c| matches!(c, '.' | 'e' | 'E'));
    if !is_float {
        if let Ok(i) = text.parse::<i64>() {
            return Ok(Value::Int64(i));
        }
    }
    // Integers beyond i64 degrade to floats.
    text.parse::<f64>()
        .map(Value::Float64)
        .map_err(|_| ParseError::unexpected(token.start_offset, "numeric literal", &token.raw))
}

impl<'t> Parser<'t> {
    pub(super) fn parse_expr(&mut self) -> ParseResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_and()?;
        loop {
            let op = if self.eat_operator("OR") {
                BinaryOp::Or
            } else if self.eat_operator("XOR") {
                BinaryOp::Xor
            } else {
                break;
            };
            let right = self.parse_and()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_not()?;
        while self.eat_operator("AND") {
            let right = self.parse_not()?;
            left = Expr::and(left, right);
        }
        Ok(left)
    }

    fn parse_not(&mut self) -> ParseResult<Expr> {
        if !self.eat_operator("NOT") {
            return self.parse_comparison();
        }
        Ok(match self.parse_not()? {
            Expr::Exists { query, negated } => Expr::Exists {
                query,
                negated: !negated,
            },
            operand => Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(operand),
            },
        })
    }

    fn parse_comparison(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_additive()?;
        while let Some(token) = self.peek() {
            if let Some(op) = comparison_op(token) {
                self.pos += 1;
                let right = self.parse_additive()?;
                left = Expr::binary(left, op, right);
                continue;
            }
            if token.is_operator("IS") {
                self.pos += 1;
                let negated = self.eat_operator("NOT");
                self.expect(TokenKind::NullConstant, "NULL")?;
                left = Expr::IsNull {
                    expr: Box::new(left),
                    negated,
                };
                continue;
            }

            // `NOT` here only prefixes BETWEEN / IN / LIKE.
            let negated = token.is_operator("NOT")
                && self.peek_at(1).map_or(false, |next| {
                    next.is_operator("BETWEEN") || next.is_operator("IN") || next.is_operator("LIKE")
                });
            let keyword = if negated { self.peek_at(1) } else { Some(token) };
            let Some(keyword) = keyword.filter(|k| k.kind == TokenKind::Operator) else {
                break;
            };
            left = match keyword.value.as_str() {
                "BETWEEN" => {
                    self.pos += 1 + negated as usize;
                    let low = self.parse_additive()?;
                    self.expect(TokenKind::Operator, "AND")?;
                    let high = self.parse_additive()?;
                    Expr::Between {
                        expr: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                        negated,
                    }
                }
                "IN" => {
                    self.pos += 1 + negated as usize;
                    self.parse_in(left, negated)?
                }
                "LIKE" => {
                    self.pos += 1 + negated as usize;
                    let pattern = self.parse_additive()?;
                    Expr::Like {
                        expr: Box::new(left),
                        pattern: Box::new(pattern),
                        negated,
                    }
                }
                _ => break,
            };
        }
        Ok(left)
    }

    fn parse_in(&mut self, left: Expr, negated: bool) -> ParseResult<Expr> {
        let open = self.expect_open()?;
        let is_subquery = self.check(TokenKind::ClauseKeyword, "SELECT")
            || (self.check(TokenKind::Paren, "(")
                && self.peek_at(1).map_or(false, |t| t.is_clause("SELECT")));
        if is_subquery {
            let query = self.parse_query_body()?;
            self.expect_close(open)?;
            return Ok(Expr::InSubquery {
                expr: Box::new(left),
                query: Box::new(query),
                negated,
            });
        }

        let mut list = Vec::new();
        loop {
            list.push(self.parse_expr()?);
            if !self.eat_comma() {
                break;
            }
        }
        self.expect_close(open)?;
        Ok(Expr::InList {
            expr: Box::new(left),
            list,
            negated,
        })
    }

    fn parse_additive(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        while let Some(op) = self.peek().and_then(additive_op) {
            self.pos += 1;
            let right = self.parse_multiplicative()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expr> {
        let mut left = self.parse_unary()?;
        while let Some(op) = self.peek().and_then(multiplicative_op) {
            self.pos += 1;
            let right = self.parse_unary()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> ParseResult<Expr> {
        let op = if self.eat_operator("-") {
            UnaryOp::Neg
        } else if self.eat_operator("+") {
            UnaryOp::Plus
        } else {
            return self.parse_primary();
        };
        let operand = self.parse_unary()?;
        Ok(Expr::Unary {
            op,
            expr: Box::new(operand),
        })
    }

    fn parse_primary(&mut self) -> ParseResult<Expr> {
        let Some(token) = self.peek() else {
            return Err(self.unexpected("expression"));
        };

        match token.kind {
            TokenKind::NumericConstant => {
                self.pos += 1;
                numeric_literal(token).map(Expr::Literal)
            }
            TokenKind::StringConstant => {
                self.pos += 1;
                Ok(Expr::Literal(Value::String(token.value.clone())))
            }
            TokenKind::NullConstant => {
                self.pos += 1;
                Ok(Expr::Literal(Value::Null))
            }
            TokenKind::Parameter => {
                self.pos += 1;
                Ok(Expr::Parameter {
                    key: parameter_key(token),
                    offset: token.start_offset,
                })
            }
            TokenKind::FunctionName => {
                self.pos += 1;
                self.parse_function(token)
            }
            TokenKind::Identifier if !token.raw.ends_with(".*") => {
                self.pos += 1;
                let mut parts = lexer::identifier_parts(&token.raw);
                let name = parts.pop().unwrap_or_default();
                let qualifier = (!parts.is_empty()).then(|| parts.join("."));
                Ok(Expr::Column(ColumnRef { qualifier, name }))
            }
            TokenKind::Paren if token.value == "(" => {
                self.pos += 1;
                let inner = self.parse_expr()?;
                self.expect_close(token.start_offset)?;
                Ok(inner)
            }
            TokenKind::ReservedWord => match token.value.as_str() {
                "TRUE" | "FALSE" => {
                    self.pos += 1;
                    Ok(Expr::Literal(Value::Boolean(token.value == "TRUE")))
                }
                "CASE" => {
                    self.pos += 1;
                    self.parse_case()
                }
                "EXISTS" => {
                    self.pos += 1;
                    let open = self.expect_open()?;
                    let query = self.parse_query_body()?;
                    self.expect_close(open)?;
                    Ok(Expr::Exists {
                        query: Box::new(query),
                        negated: false,
                    })
                }
                _ => Err(self.unexpected("expression")),
            },
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_function(&mut self, token: &Token) -> ParseResult<Expr> {
        let name = token.value.to_ascii_uppercase();
        let open = self.expect_open()?;

        if let Some(func) = AggregateFunc::from_name(&name) {
            let distinct = self.eat_reserved("DISTINCT");
            if !distinct {
                self.eat_reserved("ALL");
            }
            let count_star = func == AggregateFunc::Count
                && !distinct
                && self.check(TokenKind::Operator, "*")
                && self.peek_at(1).map_or(false, |t| t.is(TokenKind::Paren, ")"));
            let arg = if count_star {
                self.pos += 1;
                None
            } else {
                Some(Box::new(self.parse_expr()?))
            };
            self.expect_close(open)?;
            return Ok(Expr::Aggregate {
                func,
                arg,
                distinct,
            });
        }

        let mut args = Vec::new();
        if !self.check(TokenKind::Paren, ")") {
            loop {
                args.push(self.parse_expr()?);
                if !self.eat_comma() {
                    break;
                }
            }
        }
        self.expect_close(open)?;
        Ok(Expr::Function { name, args })
    }

    /// `CASE [operand] WHEN .. THEN .. [ELSE ..] END`, after `CASE`.
    fn parse_case(&mut self) -> ParseResult<Expr> {
        let operand = if self.check(TokenKind::ReservedWord, "WHEN") {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };

        let mut branches = Vec::new();
        while self.eat_reserved("WHEN") {
            let when = self.parse_expr()?;
            self.expect(TokenKind::ReservedWord, "THEN")?;
            let then = self.parse_expr()?;
            branches.push(CaseBranch { when, then });
        }
        if branches.is_empty() {
            return Err(self.unexpected("WHEN"));
        }

        let else_result = if self.eat_reserved("ELSE") {
            Some(Box::new(self.parse_expr()?))
        } else {
            None
        };
        self.expect(TokenKind::ReservedWord, "END")?;

        Ok(Expr::Case {
            operand,
            branches,
            else_result,
        })
    }
}
