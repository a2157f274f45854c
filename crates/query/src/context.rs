//! Execution options.
//!
//! Options are fixed for the duration of one execution and shared by every
//! stage of the pipeline.

use alloc::sync::Arc;
use core::cmp::Ordering;
use core::fmt;

/// A string ordering hook.
///
/// When configured, ordering comparisons and `=`-style comparisons between
/// two strings use it instead of byte order.
#[derive(Clone)]
pub struct Collation(Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>);

impl Collation {
    pub fn new(compare: impl Fn(&str, &str) -> Ordering + Send + Sync + 'static) -> Self {
        Self(Arc::new(compare))
    }

    /// ASCII case-insensitive ordering.
    pub fn ascii_case_insensitive() -> Self {
        Self::new(|a, b| {
            a.bytes()
                .map(|c| c.to_ascii_lowercase())
                .cmp(b.bytes().map(|c| c.to_ascii_lowercase()))
        })
    }

    #[inline]
    pub fn compare(&self, a: &str, b: &str) -> Ordering {
        (self.0)(a, b)
    }
}

impl fmt::Debug for Collation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Collation(..)")
    }
}

/// Runtime configuration of one execution.
#[derive(Clone, Debug)]
pub struct ExecutionOptions {
    /// String ordering hook; `None` compares strings by bytes.
    pub collation: Option<Collation>,
    /// Where nulls sort when a key has no `NULLS FIRST`/`NULLS LAST`.
    pub nulls_first: bool,
    /// Whether equi-joins may use hash joins. A collation disables them.
    pub hash_joins: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            collation: None,
            nulls_first: true,
            hash_joins: true,
        }
    }
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collation(mut self, collation: Collation) -> Self {
        self.collation = Some(collation);
        self
    }

    pub fn with_nulls_first(mut self, nulls_first: bool) -> Self {
        self.nulls_first = nulls_first;
        self
    }

    pub fn with_hash_joins(mut self, enabled: bool) -> Self {
        self.hash_joins = enabled;
        self
    }

    /// Returns true when equi-joins can be answered from a hash table.
    pub fn use_hash_joins(&self) -> bool {
        self.hash_joins && self.collation.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExecutionOptions::default();
        assert!(options.collation.is_none());
        assert!(options.nulls_first);
        assert!(options.use_hash_joins());
    }

    #[test]
    fn test_collation_disables_hash_joins() {
        let options = ExecutionOptions::new().with_collation(Collation::ascii_case_insensitive());
        assert!(options.hash_joins);
        assert!(!options.use_hash_joins());
    }

    #[test]
    fn test_ascii_case_insensitive() {
        let c = Collation::ascii_case_insensitive();
        assert_eq!(c.compare("Apple", "apple"), Ordering::Equal);
        assert_eq!(c.compare("apple", "Banana"), Ordering::Less);
        assert_eq!(c.compare("b", "A"), Ordering::Greater);
    }
}
