//! Limit executor.

use crate::executor::operator::{Operator, RowStream};
use alloc::boxed::Box;

/// Limit executor - applies LIMIT and OFFSET to a stream.
///
/// Rows are pulled only until the limit is reached. Errors raised while
/// skipping the offset still end the query.
pub struct LimitExecutor {
    limit: Option<u64>,
    offset: u64,
}

impl LimitExecutor {
    pub fn new(limit: Option<u64>, offset: u64) -> Self {
        Self { limit, offset }
    }
}

impl<'a> Operator<'a> for LimitExecutor {
    fn execute(self, input: RowStream<'a>) -> RowStream<'a> {
        let mut skip = self.offset;
        let mut remaining = self.limit;
        let mut input = input;
        Box::new(core::iter::from_fn(move || {
            if remaining == Some(0) {
                return None;
            }
            loop {
                let row = input.next()?;
                if row.is_ok() && skip > 0 {
                    skip -= 1;
                    continue;
                }
                if row.is_ok() {
                    if let Some(n) = remaining.as_mut() {
                        *n -= 1;
                    }
                }
                return Some(row);
            }
        }))
    }
}
