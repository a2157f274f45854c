//! Set operation executor.

use crate::lexer::SetOperationKind;
use alloc::vec::Vec;
use hashbrown::HashSet;
use rowql_core::Row;

/// Removes duplicate rows, keeping first appearances in order.
///
/// Only the first `width` values take part in the comparison, so hidden
/// sort columns do not keep duplicates apart.
pub fn distinct_rows(rows: Vec<Row>, width: usize) -> Vec<Row> {
    let mut seen = HashSet::with_capacity(rows.len());
    rows.into_iter()
        .filter(|row| {
            let values = row.values();
            seen.insert(values[..width.min(values.len())].to_vec())
        })
        .collect()
}

/// Combines two materialised sides of a set operation.
///
/// `UNION ALL` is normally chained lazily by the caller; it is handled here
/// too so every kind has one entry point.
pub struct SetOperationExecutor {
    op: SetOperationKind,
}

impl SetOperationExecutor {
    pub fn new(op: SetOperationKind) -> Self {
        Self { op }
    }

    pub fn execute(&self, left: Vec<Row>, right: Vec<Row>) -> Vec<Row> {
        match self.op {
            SetOperationKind::UnionAll => {
                let mut rows = left;
                rows.extend(right);
                rows
            }
            SetOperationKind::Union => {
                let mut rows = left;
                rows.extend(right);
                let width = rows.first().map_or(0, Row::len);
                distinct_rows(rows, width)
            }
            SetOperationKind::Intersect => self.filter_left(left, &right, true),
            SetOperationKind::Except => self.filter_left(left, &right, false),
        }
    }

    /// Distinct left rows whose presence on the right equals `present`.
    fn filter_left(&self, left: Vec<Row>, right: &[Row], present: bool) -> Vec<Row> {
        let right: HashSet<&Row> = right.iter().collect();
        let width = left.first().map_or(0, Row::len);
        let kept = left
            .into_iter()
            .filter(|row| right.contains(row) == present)
            .collect();
        distinct_rows(kept, width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use rowql_core::Value;

    fn rows(values: &[i64]) -> Vec<Row> {
        values.iter().map(|v| Row::new(vec![Value::Int64(*v)])).collect()
    }

    #[test]
    fn test_union_dedups() {
        let result = SetOperationExecutor::new(SetOperationKind::Union).execute(rows(&[1, 2, 1]), rows(&[2, 3]));
        assert_eq!(result, rows(&[1, 2, 3]));
    }

    #[test]
    fn test_union_all_concatenates() {
        let result = SetOperationExecutor::new(SetOperationKind::UnionAll).execute(rows(&[1, 1]), rows(&[1]));
        assert_eq!(result, rows(&[1, 1, 1]));
    }

    #[test]
    fn test_intersect() {
        let result =
            SetOperationExecutor::new(SetOperationKind::Intersect).execute(rows(&[3, 1, 2, 1]), rows(&[1, 3]));
        assert_eq!(result, rows(&[3, 1]));
    }

    #[test]
    fn test_except() {
        let result = SetOperationExecutor::new(SetOperationKind::Except).execute(rows(&[1, 2, 1, 4]), rows(&[2]));
        assert_eq!(result, rows(&[1, 4]));
    }

    #[test]
    fn test_numeric_domain_and_nulls_dedup() {
        let left = vec![
            Row::new(vec![Value::Int64(1)]),
            Row::new(vec![Value::Null]),
        ];
        let right = vec![
            Row::new(vec![Value::Float64(1.0)]),
            Row::new(vec![Value::Null]),
        ];
        let result = SetOperationExecutor::new(SetOperationKind::Union).execute(left.clone(), right);
        assert_eq!(result, left);
    }

    #[test]
    fn test_distinct_ignores_hidden_columns() {
        let input = vec![
            Row::new(vec![Value::Int64(1), Value::Int64(9)]),
            Row::new(vec![Value::Int64(1), Value::Int64(8)]),
        ];
        assert_eq!(distinct_rows(input, 1).len(), 1);
    }
}
