use std::cmp::Ordering;

/// The capability every item stored in a [`crate::kdt::Kdt`] or [`crate::bkdt::Bkdt`] must
/// provide: a deterministic, antisymmetric total order on each of `0..dim` axes.
///
/// `compare_dim(a, b, d)` must agree with `compare_dim(b, a, d).reverse()`, and two items are
/// considered equal by the index iff `compare_dim` returns `Ordering::Equal` on every axis.
pub trait KdItem {
    fn compare_dim(&self, other: &Self, dim: usize) -> Ordering;

    /// Equal on every axis in `0..dim`.
    fn equal_all_dims(&self, other: &Self, dim: usize) -> bool {
        (0..dim).all(|d| self.compare_dim(other, d) == Ordering::Equal)
    }
}

/// Extends [`KdItem`] with a per-axis scalar coordinate, required for Euclidean
/// nearest-neighbor search in [`crate::metric_kdt::MetricKdt`] / [`crate::metric_bkdt::MetricBkdt`].
pub trait MetricItem: KdItem {
    fn coord(&self, dim: usize) -> f64;
}
