//! Aggregate executor.

use crate::ast::AggregateFunc;
use crate::executor::eval::{CExpr, Evaluator};
use alloc::format;
use alloc::vec::Vec;
use core::cmp::Ordering;
use hashbrown::{HashMap, HashSet};
use libm::sqrt;
use rowql_core::{EvalError, Row, Value};

/// One aggregate call computed per group.
#[derive(Clone, Debug, PartialEq)]
pub struct AggregateSlot {
    pub func: AggregateFunc,
    /// `None` for `COUNT(*)`.
    pub arg: Option<CExpr>,
    pub distinct: bool,
}

#[derive(Debug)]
enum State {
    Count(i64),
    Sum(Option<Value>),
    Avg { sum: f64, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
    /// Welford's running mean and squared deviation.
    StdDev { count: i64, mean: f64, m2: f64 },
}

#[derive(Debug)]
struct Accumulator {
    state: State,
    seen: Option<HashSet<Value>>,
}

impl Accumulator {
    fn new(slot: &AggregateSlot) -> Self {
        let state = match slot.func {
            AggregateFunc::Count => State::Count(0),
            AggregateFunc::Sum => State::Sum(None),
            AggregateFunc::Avg => State::Avg { sum: 0.0, count: 0 },
            AggregateFunc::Min => State::Min(None),
            AggregateFunc::Max => State::Max(None),
            AggregateFunc::StdDev => State::StdDev {
                count: 0,
                mean: 0.0,
                m2: 0.0,
            },
        };
        Self {
            state,
            seen: slot.distinct.then(HashSet::new),
        }
    }

    /// Folds one input value in; `None` is a `COUNT(*)` row.
    fn update(&mut self, value: Option<Value>, func: AggregateFunc, eval: &Evaluator<'_>) -> Result<(), EvalError> {
        let value = match value {
            None => {
                if let State::Count(n) = &mut self.state {
                    *n += 1;
                }
                return Ok(());
            }
            Some(Value::Null) => return Ok(()),
            Some(v) => v,
        };
        if let Some(seen) = &mut self.seen {
            if !seen.insert(value.clone()) {
                return Ok(());
            }
        }
        match &mut self.state {
            State::Count(n) => *n += 1,
            State::Sum(total) => {
                let v = numeric(func, &value)?;
                *total = Some(match total.take() {
                    None => v,
                    Some(Value::Int64(a)) => match v {
                        Value::Int64(b) => a
                            .checked_add(b)
                            .map(Value::Int64)
                            .unwrap_or(Value::Float64(a as f64 + b as f64)),
                        other => Value::Float64(a as f64 + other.to_f64().unwrap_or(0.0)),
                    },
                    Some(acc) => Value::Float64(acc.to_f64().unwrap_or(0.0) + v.to_f64().unwrap_or(0.0)),
                });
            }
            State::Avg { sum, count } => {
                *sum += numeric(func, &value)?.to_f64().unwrap_or(0.0);
                *count += 1;
            }
            State::Min(current) => {
                let replace = match current {
                    None => true,
                    Some(c) => eval.compare(&value, c)? == Some(Ordering::Less),
                };
                if replace {
                    *current = Some(value);
                }
            }
            State::Max(current) => {
                let replace = match current {
                    None => true,
                    Some(c) => eval.compare(&value, c)? == Some(Ordering::Greater),
                };
                if replace {
                    *current = Some(value);
                }
            }
            State::StdDev { count, mean, m2 } => {
                let x = numeric(func, &value)?.to_f64().unwrap_or(0.0);
                *count += 1;
                let delta = x - *mean;
                *mean += delta / *count as f64;
                *m2 += delta * (x - *mean);
            }
        }
        Ok(())
    }

    fn finish(self) -> Value {
        match self.state {
            State::Count(n) => Value::Int64(n),
            State::Sum(total) => total.unwrap_or(Value::Null),
            State::Avg { count: 0, .. } => Value::Null,
            State::Avg { sum, count } => Value::Float64(sum / count as f64),
            State::Min(v) | State::Max(v) => v.unwrap_or(Value::Null),
            State::StdDev { count: 0, .. } => Value::Null,
            State::StdDev { count, m2, .. } => Value::Float64(sqrt(m2 / count as f64)),
        }
    }
}

fn numeric(func: AggregateFunc, value: &Value) -> Result<Value, EvalError> {
    value.coerce_numeric().ok_or_else(|| {
        EvalError::invalid_argument(
            func.name(),
            format!("{} expects numbers, got '{}'", func.name(), value),
        )
    })
}

/// Aggregate executor - partitions rows by key and folds each group.
///
/// Output rows are the group's first input row followed by one value per
/// aggregate slot, in first-appearance order of the groups.
pub struct AggregateExecutor<'e> {
    group_by: Vec<CExpr>,
    slots: Vec<AggregateSlot>,
    /// Width of input rows, used to pad the single group of an empty input.
    width: usize,
    evaluator: Evaluator<'e>,
}

impl<'e> AggregateExecutor<'e> {
    pub fn new(group_by: Vec<CExpr>, slots: Vec<AggregateSlot>, width: usize, evaluator: Evaluator<'e>) -> Self {
        Self {
            group_by,
            slots,
            width,
            evaluator,
        }
    }

    pub fn execute(&self, input: Vec<Row>) -> Result<Vec<Row>, EvalError> {
        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Row, Vec<Accumulator>)> = Vec::new();

        for (n, row) in input.into_iter().enumerate() {
            self.fold(&mut index, &mut groups, row)
                .map_err(|e| e.at_row(n + 1))?;
        }

        // Aggregates without GROUP BY always produce one row.
        if groups.is_empty() && self.group_by.is_empty() {
            groups.push((Row::nulls(self.width), self.fresh()));
        }

        Ok(groups
            .into_iter()
            .map(|(first, accumulators)| {
                let mut values = first.into_values();
                values.extend(accumulators.into_iter().map(Accumulator::finish));
                Row::new(values)
            })
            .collect())
    }

    fn fresh(&self) -> Vec<Accumulator> {
        self.slots.iter().map(Accumulator::new).collect()
    }

    fn fold(
        &self,
        index: &mut HashMap<Vec<Value>, usize>,
        groups: &mut Vec<(Row, Vec<Accumulator>)>,
        row: Row,
    ) -> Result<(), EvalError> {
        let key = self
            .group_by
            .iter()
            .map(|e| self.evaluator.eval(e, &row))
            .collect::<Result<Vec<_>, _>>()?;
        let group = match index.get(&key) {
            Some(&g) => g,
            None => {
                index.insert(key, groups.len());
                groups.push((row.clone(), self.fresh()));
                groups.len() - 1
            }
        };
        let accumulators = &mut groups[group].1;
        for (acc, slot) in accumulators.iter_mut().zip(&self.slots) {
            let value = match &slot.arg {
                Some(arg) => Some(self.evaluator.eval(arg, &row)?),
                None => None,
            };
            acc.update(value, slot.func, &self.evaluator)?;
        }
        Ok(())
    }
}
