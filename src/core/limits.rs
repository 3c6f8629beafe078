//! Traversal and registry safety limits (normative defaults).

use serde::{Deserialize, Serialize};

/// Bounds on traversal depth and registry sizes.
///
/// Selection recursion is naturally finite (it follows the document, not
/// the store), so the depth limits are defense bounds, not correctness
/// requirements. The registry limits refuse work instead of degrading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub max_selection_depth: usize,
    pub max_fragment_depth: usize,
    pub max_optimistic_layers: usize,
    pub max_watchers: usize,
    pub max_snapshot_entries: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_selection_depth: 64,
            max_fragment_depth: 32,
            max_optimistic_layers: 64,
            max_watchers: 1_024,
            max_snapshot_entries: 200_000,
        }
    }
}
