//! JOIN algorithm implementations.
//!
//! The left input streams; the right input is materialised once (the join
//! build) and probed for every left row. A [`JoinProbe`] decides which right
//! rows pair with a left row, and [`JoinStream`] turns those matches into
//! output rows, padding with nulls for outer joins.

mod hash;
mod nested;

pub use hash::HashJoin;
pub use nested::NestedLoopJoin;

use crate::ast::BinaryOp;
use crate::executor::eval::CExpr;
use crate::executor::operator::RowStream;
use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;
use rowql_core::{EvalError, Row};

/// Finds the right rows that pair with one left row.
pub trait JoinProbe {
    /// Appends the indices of matching right rows, in right-row order.
    fn probe(&self, left: &Row, right: &[Row], out: &mut Vec<usize>) -> Result<(), EvalError>;
}

/// Which side of a join keeps its unmatched rows.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OuterSide {
    None,
    Left,
    Right,
}

/// Equality keys and remaining conditions of a join predicate.
#[derive(Debug, Default, PartialEq)]
pub struct EquiKeys {
    /// Key expressions over the left row.
    pub left: Vec<CExpr>,
    /// Key expressions over the right row alone.
    pub right: Vec<CExpr>,
    /// Conjuncts that are not `left = right` equalities.
    pub residual: Vec<CExpr>,
}

/// Splits a join condition over `left ++ right` rows into hashable
/// equalities and a residual.
pub fn split_equi_keys(condition: CExpr, left_width: usize) -> EquiKeys {
    let mut conjuncts = Vec::new();
    condition.into_conjuncts(&mut conjuncts);

    let side = |e: &CExpr| match e.column_span() {
        Some((_, hi)) if hi < left_width => Some(false),
        Some((lo, _)) if lo >= left_width => Some(true),
        _ => None,
    };

    let mut keys = EquiKeys::default();
    for conjunct in conjuncts {
        match conjunct {
            CExpr::Binary {
                left,
                op: BinaryOp::Eq,
                right,
            } => match (side(&*left), side(&*right)) {
                (Some(false), Some(true)) => {
                    let mut r = *right;
                    r.rebase(left_width);
                    keys.left.push(*left);
                    keys.right.push(r);
                }
                (Some(true), Some(false)) => {
                    let mut l = *left;
                    l.rebase(left_width);
                    keys.left.push(*right);
                    keys.right.push(l);
                }
                _ => keys.residual.push(CExpr::Binary {
                    left,
                    op: BinaryOp::Eq,
                    right,
                }),
            },
            other => keys.residual.push(other),
        }
    }
    keys
}

/// Streams the output of one join step.
pub struct JoinStream<'a> {
    left: RowStream<'a>,
    right: Vec<Row>,
    probe: Box<dyn JoinProbe + 'a>,
    outer: OuterSide,
    left_width: usize,
    right_width: usize,
    /// Right rows matched so far; only tracked for right outer joins.
    matched: Vec<bool>,
    pending: VecDeque<Row>,
    matches: Vec<usize>,
    left_done: bool,
    unmatched_cursor: usize,
    row_number: usize,
}

impl<'a> JoinStream<'a> {
    pub fn new(
        left: RowStream<'a>,
        left_width: usize,
        right: Vec<Row>,
        right_width: usize,
        probe: Box<dyn JoinProbe + 'a>,
        outer: OuterSide,
    ) -> Self {
        let matched = match outer {
            OuterSide::Right => vec![false; right.len()],
            _ => Vec::new(),
        };
        Self {
            left,
            right,
            probe,
            outer,
            left_width,
            right_width,
            matched,
            pending: VecDeque::new(),
            matches: Vec::new(),
            left_done: false,
            unmatched_cursor: 0,
            row_number: 0,
        }
    }

    fn pair(&mut self, left: Row) -> Result<(), EvalError> {
        self.matches.clear();
        self.probe.probe(&left, &self.right, &mut self.matches)?;
        for &i in &self.matches {
            if self.outer == OuterSide::Right {
                self.matched[i] = true;
            }
            self.pending.push_back(Row::concat(&left, &self.right[i]));
        }
        if self.matches.is_empty() && self.outer == OuterSide::Left {
            self.pending
                .push_back(Row::concat(&left, &Row::nulls(self.right_width)));
        }
        Ok(())
    }

    fn next_unmatched_right(&mut self) -> Option<Row> {
        while self.unmatched_cursor < self.right.len() {
            let i = self.unmatched_cursor;
            self.unmatched_cursor += 1;
            if !self.matched[i] {
                return Some(Row::concat(&Row::nulls(self.left_width), &self.right[i]));
            }
        }
        None
    }
}

impl<'a> Iterator for JoinStream<'a> {
    type Item = Result<Row, EvalError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Some(Ok(row));
            }
            if self.left_done {
                return match self.outer {
                    OuterSide::Right => self.next_unmatched_right().map(Ok),
                    _ => None,
                };
            }
            match self.left.next() {
                Some(Ok(left)) => {
                    self.row_number += 1;
                    if let Err(e) = self.pair(left) {
                        self.left_done = true;
                        self.pending.clear();
                        self.unmatched_cursor = self.right.len();
                        return Some(Err(e.at_row(self.row_number)));
                    }
                }
                Some(Err(e)) => return Some(Err(e)),
                None => self.left_done = true,
            }
        }
    }
}
