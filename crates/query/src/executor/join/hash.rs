//! Hash Join implementation.

use super::{EquiKeys, JoinProbe};
use crate::executor::eval::{CExpr, Evaluator};
use alloc::vec::Vec;
use core::cmp::Ordering;
use hashbrown::HashMap;
use rowql_core::{EvalError, Row, Value};

/// Bit per comparison domain seen among build keys.
fn domain(value: &Value) -> u8 {
    match value {
        Value::Boolean(_) => 1,
        Value::Int64(_) | Value::Float64(_) => 2,
        Value::String(_) => 4,
        Value::Null => 0,
    }
}

/// Hash Join executor.
///
/// Build phase: hash every right row by its key values.
/// Probe phase: hash the left row's keys and check the residual condition
/// on the rows of the matching bucket.
///
/// Rows with a null key never match, as under `=`. A probe key whose
/// domain differs from some build key of the same position is compared
/// pairwise against every build row instead, so numeric strings meet
/// numbers and incomparable keys fail with `TypeMismatch`.
pub struct HashJoin<'e> {
    left_keys: Vec<CExpr>,
    /// Residual condition over `left ++ right`.
    residual: Option<CExpr>,
    table: HashMap<Vec<Value>, Vec<u32>>,
    /// Key values per right row; `None` where a key is null.
    keys: Vec<Option<Vec<Value>>>,
    /// Per key position, the domains present on the build side.
    domains: Vec<u8>,
    evaluator: Evaluator<'e>,
}

impl<'e> HashJoin<'e> {
    /// Builds the hash table over the right rows.
    pub fn build(keys: EquiKeys, right: &[Row], evaluator: Evaluator<'e>) -> Result<Self, EvalError> {
        let EquiKeys {
            left: left_keys,
            right: right_keys,
            residual,
        } = keys;
        let mut table: HashMap<Vec<Value>, Vec<u32>> = HashMap::with_capacity(right.len());
        let mut built = Vec::with_capacity(right.len());
        let mut domains = alloc::vec![0u8; right_keys.len()];

        for (idx, row) in right.iter().enumerate() {
            let key = right_keys
                .iter()
                .map(|k| evaluator.eval(k, row))
                .collect::<Result<Vec<_>, _>>()?;
            if key.iter().any(Value::is_null) {
                built.push(None);
                continue;
            }
            for (bits, value) in domains.iter_mut().zip(&key) {
                *bits |= domain(value);
            }
            table.entry(key.clone()).or_default().push(idx as u32);
            built.push(Some(key));
        }

        Ok(Self {
            left_keys,
            residual: if residual.is_empty() {
                None
            } else {
                Some(CExpr::conjunction(residual))
            },
            table,
            keys: built,
            domains,
            evaluator,
        })
    }

    fn keys_equal(&self, left: &[Value], right: &[Value]) -> Result<bool, EvalError> {
        for (l, r) in left.iter().zip(right) {
            if self.evaluator.compare(l, r)? != Some(Ordering::Equal) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn residual_holds(&self, left: &Row, right: &Row) -> Result<bool, EvalError> {
        match &self.residual {
            Some(condition) => self.evaluator.test(condition, &Row::concat(left, right)),
            None => Ok(true),
        }
    }
}

impl JoinProbe for HashJoin<'_> {
    fn probe(&self, left: &Row, right: &[Row], out: &mut Vec<usize>) -> Result<(), EvalError> {
        let key = self
            .left_keys
            .iter()
            .map(|k| self.evaluator.eval(k, left))
            .collect::<Result<Vec<_>, _>>()?;
        if key.iter().any(Value::is_null) {
            return Ok(());
        }

        let mixed = key
            .iter()
            .zip(&self.domains)
            .any(|(value, bits)| bits & !domain(value) != 0);
        if mixed {
            for (idx, built) in self.keys.iter().enumerate() {
                if let Some(built) = built {
                    if self.keys_equal(&key, built)? && self.residual_holds(left, &right[idx])? {
                        out.push(idx);
                    }
                }
            }
            return Ok(());
        }

        let bucket = match self.table.get(key.as_slice()) {
            Some(bucket) => bucket,
            None => return Ok(()),
        };
        for &idx in bucket {
            let idx = idx as usize;
            if self.residual_holds(left, &right[idx])? {
                out.push(idx);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;
    use crate::context::ExecutionOptions;
    use alloc::vec;
    use rowql_core::EvalErrorKind;

    fn keys() -> EquiKeys {
        EquiKeys {
            left: vec![CExpr::Column(0)],
            right: vec![CExpr::Column(0)],
            residual: vec![],
        }
    }

    #[test]
    fn test_build_skips_null_keys() {
        let options = ExecutionOptions::default();
        let right = vec![
            Row::new(vec![Value::Int64(1)]),
            Row::new(vec![Value::Null]),
            Row::new(vec![Value::Int64(1)]),
        ];
        let join = HashJoin::build(keys(), &right, Evaluator::new(&options)).unwrap();
        assert_eq!(join.table.values().map(Vec::len).sum::<usize>(), 2);

        let mut out = Vec::new();
        join.probe(&Row::new(vec![Value::Float64(1.0)]), &right, &mut out).unwrap();
        assert_eq!(out, vec![0, 2]);

        out.clear();
        join.probe(&Row::new(vec![Value::Null]), &right, &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_residual_condition() {
        let options = ExecutionOptions::default();
        let right = vec![
            Row::new(vec![Value::Int64(1), Value::Int64(5)]),
            Row::new(vec![Value::Int64(1), Value::Int64(50)]),
        ];
        let mut k = keys();
        // left row is (key, limit); right columns start at 2.
        k.residual = vec![CExpr::binary(CExpr::Column(3), BinaryOp::Lt, CExpr::Column(1))];
        let join = HashJoin::build(k, &right, Evaluator::new(&options)).unwrap();
        let mut out = Vec::new();
        join.probe(&Row::new(vec![Value::Int64(1), Value::Int64(10)]), &right, &mut out)
            .unwrap();
        assert_eq!(out, vec![0]);
    }

    #[test]
    fn test_numeric_string_keys_match_numbers() {
        let options = ExecutionOptions::default();
        let right = vec![
            Row::new(vec![Value::from("1")]),
            Row::new(vec![Value::Int64(2)]),
            Row::new(vec![Value::Float64(1.0)]),
        ];
        let join = HashJoin::build(keys(), &right, Evaluator::new(&options)).unwrap();
        let mut out = Vec::new();
        join.probe(&Row::new(vec![Value::Int64(1)]), &right, &mut out).unwrap();
        assert_eq!(out, vec![0, 2]);

        out.clear();
        join.probe(&Row::new(vec![Value::from("2")]), &right, &mut out).unwrap();
        assert_eq!(out, vec![1]);
    }

    #[test]
    fn test_cross_domain_probe_fails() {
        let options = ExecutionOptions::default();
        let right = vec![Row::new(vec![Value::from("one")])];
        let join = HashJoin::build(keys(), &right, Evaluator::new(&options)).unwrap();
        let mut out = Vec::new();
        let err = join
            .probe(&Row::new(vec![Value::Int64(1)]), &right, &mut out)
            .unwrap_err();
        assert_eq!(err.kind, EvalErrorKind::TypeMismatch);
    }
}
