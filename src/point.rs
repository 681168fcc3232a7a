use crate::item::{KdItem, MetricItem};
use std::cmp::Ordering;
use std::sync::Arc;

/// Minimal `KdItem`/`MetricItem` implementation over a shared `f64` coordinate slice. Exists for
/// tests and doctests; callers with a real item type are expected to implement `KdItem` (and,
/// for nearest-neighbor search, `MetricItem`) directly on it rather than convert through `Point`.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Point(Arc<[f64]>);

impl Point {
    pub fn new(coords: Vec<f64>) -> Self {
        Self(Arc::from(coords))
    }

    pub fn coords(&self) -> &[f64] {
        &self.0
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len() && self.0.iter().zip(other.0.iter()).all(|(a, b)| a == b)
    }
}

impl Eq for Point {}

impl KdItem for Point {
    fn compare_dim(&self, other: &Self, dim: usize) -> Ordering {
        self.0[dim]
            .partial_cmp(&other.0[dim])
            .expect("coordinates must not be NaN")
    }
}

impl MetricItem for Point {
    fn coord(&self, dim: usize) -> f64 {
        self.0[dim]
    }
}
