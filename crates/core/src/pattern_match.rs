//! SQL LIKE pattern matching.
//!
//! Two wildcards:
//! - `%` matches zero or more characters
//! - `_` matches exactly one character
//!
//! A backslash makes the next pattern character literal (`\%`, `\_`, `\\`).
//! Matching is **case-sensitive** and operates on Unicode scalar values.

use alloc::vec::Vec;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Piece {
    Any,
    One,
    Char(char),
}

fn compile(pattern: &str) -> Vec<Piece> {
    let mut pieces = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        let piece = match c {
            '%' => Piece::Any,
            '_' => Piece::One,
            '\\' => Piece::Char(chars.next().unwrap_or('\\')),
            other => Piece::Char(other),
        };
        // Runs of % collapse into one.
        if piece == Piece::Any && pieces.last() == Some(&Piece::Any) {
            continue;
        }
        pieces.push(piece);
    }
    pieces
}

/// SQL LIKE pattern matching.
///
/// ```
/// use rowql_core::pattern_match::like;
/// assert!(like("hello", "h%o"));
/// assert!(like("hello", "_ello"));
/// assert!(like("50%", "50\\%"));
/// assert!(!like("hello", "world"));
/// ```
pub fn like(value: &str, pattern: &str) -> bool {
    let v: Vec<char> = value.chars().collect();
    let p = compile(pattern);

    // Greedy scan with a single backtrack point at the last `%`.
    let (mut vi, mut pi) = (0usize, 0usize);
    let mut backtrack: Option<(usize, usize)> = None;
    while vi < v.len() {
        match p.get(pi) {
            Some(Piece::Any) => {
                backtrack = Some((pi, vi));
                pi += 1;
                continue;
            }
            Some(Piece::One) => {
                vi += 1;
                pi += 1;
                continue;
            }
            Some(Piece::Char(c)) if *c == v[vi] => {
                vi += 1;
                pi += 1;
                continue;
            }
            _ => {}
        }
        match backtrack {
            Some((star, matched)) => {
                pi = star + 1;
                vi = matched + 1;
                backtrack = Some((star, matched + 1));
            }
            None => return false,
        }
    }
    p[pi..].iter().all(|piece| *piece == Piece::Any)
}
