//! Separator computation for simple-prefix branch keys.
//!
//! When a leaf splits, the parent only needs *some* key `s` with
//! `last(left) < s <= first(right)`. Choosing the shortest such `s` keeps
//! branch records small and raises fanout.

use std::cmp::Ordering;
use std::fmt;

use crate::types::{Result, TreeError};

/// Computes the router stored in a branch when a leaf splits.
pub trait SeparatorStrategy: Send + Sync {
    /// Returns `s` with `low < s <= high` under the tree's key ordering.
    ///
    /// Called only with `low < high`.
    fn separator(&self, low: &[u8], high: &[u8]) -> Vec<u8>;

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

impl fmt::Debug for dyn SeparatorStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SeparatorStrategy").field(&self.name()).finish()
    }
}

/// Shortest prefix of `high` that still sorts above `low`.
///
/// Only valid for keys whose encoded form sorts bytewise, which holds for
/// every codec shipped with this crate.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShortestSeparator;

impl SeparatorStrategy for ShortestSeparator {
    fn separator(&self, low: &[u8], high: &[u8]) -> Vec<u8> {
        let common = common_prefix_len(low, high);
        let end = (common + 1).min(high.len());
        high[..end].to_vec()
    }

    fn name(&self) -> &str {
        "shortest"
    }
}

/// Length of the shared prefix of `a` and `b`.
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// Rejects separators that would misroute keys.
pub(crate) fn check_separator(
    sep: &[u8],
    low: &[u8],
    high: &[u8],
    cmp: fn(&[u8], &[u8]) -> Ordering,
) -> Result<()> {
    if cmp(low, sep) != Ordering::Less || cmp(sep, high) == Ordering::Greater {
        return Err(TreeError::Invalid(
            "separator strategy returned a key outside (low, high]",
        ));
    }
    Ok(())
}
