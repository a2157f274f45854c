//! Column layout of the rows flowing through a select block.
//!
//! A row is a flat `Vec<Value>`; the layout records which slice of it
//! belongs to which source so column references can be resolved to
//! positions once, before any row is read.

use crate::ast::ColumnRef;
use crate::executor::operator::RowStream;
use alloc::format;
use alloc::string::String;
use alloc::vec::Vec;
use rowql_core::EvalError;

/// Columns contributed by one source of a select block.
#[derive(Clone, Debug, PartialEq)]
pub struct SourceColumns {
    /// Alias or table name.
    pub name: String,
    pub columns: Vec<String>,
    /// Position of the first column in the joined row.
    pub offset: usize,
    /// True when the source held no rows, so its columns are unknown.
    pub empty: bool,
}

/// Result of resolving a column reference against a layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolved {
    Index(usize),
    /// A column of an empty source: reads as null.
    Phantom,
}

/// Positions of every column visible in a select block.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Layout {
    sources: Vec<SourceColumns>,
    /// `USING` / `NATURAL` columns; a bare reference resolves here first.
    merged: Vec<(String, usize)>,
    width: usize,
}

impl Layout {
    /// Layout of a block without `FROM`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Layout of a single source.
    pub fn single(name: impl Into<String>, columns: Vec<String>, empty: bool) -> Self {
        let width = columns.len();
        Self {
            sources: alloc::vec![SourceColumns {
                name: name.into(),
                columns,
                offset: 0,
                empty,
            }],
            merged: Vec::new(),
            width,
        }
    }

    /// Number of values in a row of this layout.
    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn sources(&self) -> &[SourceColumns] {
        &self.sources
    }

    /// Appends `right` after `self`. `merged` lists columns that a bare
    /// reference resolves to unambiguously from now on.
    pub fn join(mut self, right: Layout, merged: Vec<(String, usize)>) -> Layout {
        let shift = self.width;
        self.sources.extend(right.sources.into_iter().map(|mut s| {
            s.offset += shift;
            s
        }));
        self.merged.extend(right.merged.into_iter().map(|(n, i)| (n, i + shift)));
        self.merged.extend(merged);
        self.width += right.width;
        self
    }

    /// Returns true if any source exposes a column with this name.
    pub fn has_column(&self, name: &str) -> bool {
        self.merged.iter().any(|(n, _)| n == name)
            || self
                .sources
                .iter()
                .any(|s| s.columns.iter().any(|c| c == name))
    }

    /// Resolves a column reference to a row position.
    pub fn resolve(&self, column: &ColumnRef) -> Result<Resolved, EvalError> {
        match &column.qualifier {
            Some(qualifier) => self.resolve_qualified(qualifier, &column.name),
            None => self.resolve_bare(&column.name),
        }
    }

    fn resolve_qualified(&self, qualifier: &str, name: &str) -> Result<Resolved, EvalError> {
        let mut candidates = self.sources.iter().filter(|s| s.name == qualifier);
        let source = match (candidates.next(), candidates.next()) {
            (Some(source), None) => source,
            (Some(_), Some(_)) => {
                return Err(EvalError::ambiguous_column(&format!("{}.{}", qualifier, name)))
            }
            (None, _) => return Err(EvalError::unknown_column(&format!("{}.{}", qualifier, name))),
        };
        match source.columns.iter().position(|c| c == name) {
            Some(i) => Ok(Resolved::Index(source.offset + i)),
            None if source.empty => Ok(Resolved::Phantom),
            None => Err(EvalError::unknown_column(&format!("{}.{}", qualifier, name))),
        }
    }

    fn resolve_bare(&self, name: &str) -> Result<Resolved, EvalError> {
        if let Some((_, index)) = self.merged.iter().find(|(n, _)| n == name) {
            return Ok(Resolved::Index(*index));
        }
        let mut found = None;
        for source in &self.sources {
            if let Some(i) = source.columns.iter().position(|c| c == name) {
                if found.is_some() {
                    return Err(EvalError::ambiguous_column(name));
                }
                found = Some(source.offset + i);
            }
        }
        match found {
            Some(index) => Ok(Resolved::Index(index)),
            None if self.sources.iter().any(|s| s.empty) => Ok(Resolved::Phantom),
            None => Err(EvalError::unknown_column(name)),
        }
    }

    /// Output columns for `*`: `source.column` over several sources,
    /// `column` over one.
    pub fn wildcard(&self) -> Vec<(String, usize)> {
        let qualify = self.sources.len() > 1;
        self.sources
            .iter()
            .flat_map(|s| {
                s.columns.iter().enumerate().map(move |(i, c)| {
                    let name = if qualify {
                        format!("{}.{}", s.name, c)
                    } else {
                        c.clone()
                    };
                    (name, s.offset + i)
                })
            })
            .collect()
    }

    /// Output columns for `source.*`.
    pub fn source_wildcard(&self, source: &str) -> Result<Vec<(String, usize)>, EvalError> {
        let found = self
            .sources
            .iter()
            .find(|s| s.name == source)
            .ok_or_else(|| EvalError::unknown_column(&format!("{}.*", source)))?;
        Ok(found
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), found.offset + i))
            .collect())
    }
}

/// A layout together with the lazy stream of rows that follow it.
pub struct Relation<'a> {
    pub layout: Layout,
    pub rows: RowStream<'a>,
}

impl<'a> Relation<'a> {
    pub fn new(layout: Layout, rows: RowStream<'a>) -> Self {
        Self { layout, rows }
    }
}
