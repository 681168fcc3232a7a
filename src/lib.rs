//! Static and growing k-d tree indexes over generic per-dimension-comparable items.
//!
//! [`Kdt`] is a balanced, array-backed k-d tree built once from a bulk collection. [`Bkdt`]
//! wraps a cascade of `Kdt` slots behind the Bentley–Saxe logarithmic method so items can be
//! inserted one at a time with amortized-logarithmic cost instead of a full rebuild.
//! [`MetricKdt`]/[`MetricBkdt`] add nearest-neighbor search for items with a per-axis scalar
//! coordinate.
//!
//! Items opt in by implementing [`KdItem`] (and, for nearest-neighbor search, [`MetricItem`]).
//! [`Point`] is a small ready-made implementation for tests and quick prototyping.

pub mod bkdt;
pub mod dim_compare;
pub mod distance;
pub mod error;
pub mod item;
pub mod kdt;
pub mod metric_bkdt;
pub mod metric_kdt;
pub mod point;

pub use bkdt::Bkdt;
pub use error::Error;
pub use item::{KdItem, MetricItem};
pub use kdt::Kdt;
pub use metric_bkdt::MetricBkdt;
pub use metric_kdt::MetricKdt;
pub use point::Point;
