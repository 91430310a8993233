//! Optimistic concurrency primitives.

use crate::error::{InventoryError, InventoryResult};

/// Optimistic concurrency expectation against a product's version token.
///
/// Every successful commit bumps the product's version by one; a writer that
/// loses the race gets a `ConcurrencyConflict` and must retry the whole
/// operation against the refreshed state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Skip version checking (read-repair jobs, migrations).
    Any,
    /// Require the product row to be at an exact version.
    Exact(u64),
}

impl ExpectedVersion {
    pub fn matches(self, actual: u64) -> bool {
        match self {
            ExpectedVersion::Any => true,
            ExpectedVersion::Exact(v) => v == actual,
        }
    }

    pub fn check(self, actual: u64) -> InventoryResult<()> {
        if self.matches(actual) {
            Ok(())
        } else {
            Err(InventoryError::concurrency(format!(
                "version check failed (expected: {self:?}, actual: {actual})"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_matches_everything() {
        assert!(ExpectedVersion::Any.matches(0));
        assert!(ExpectedVersion::Any.matches(42));
    }

    #[test]
    fn exact_requires_exact() {
        assert!(ExpectedVersion::Exact(3).matches(3));
        assert!(!ExpectedVersion::Exact(3).matches(4));
        let err = ExpectedVersion::Exact(3).check(4).unwrap_err();
        assert!(err.is_retryable());
    }
}
