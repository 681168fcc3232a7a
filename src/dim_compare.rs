use crate::item::KdItem;
use std::cmp::Ordering;

/// Stateless comparator that fixes one split axis and defers to the item's own
/// [`KdItem::compare_dim`]. Passed to `sort_by` when a subtree is partitioned around its
/// median during [`crate::kdt::Kdt`] construction.
#[derive(Debug, Clone, Copy)]
pub(crate) struct DimCompare(pub usize);

impl DimCompare {
    pub(crate) fn compare<T: KdItem>(&self, a: &T, b: &T) -> Ordering {
        a.compare_dim(b, self.0)
    }
}
