/// `Kdt` specialized for items with per-axis scalar coordinates, adding branch-and-bound
/// nearest-neighbor search over squared Euclidean distance.
use crate::distance::squared_distance;
use crate::error::Error;
use crate::item::MetricItem;
use crate::kdt::Kdt;

#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricKdt<T> {
    inner: Kdt<T>,
}

impl<T: MetricItem> MetricKdt<T> {
    pub fn new(dim: usize, items: Vec<T>) -> Result<Self, Error> {
        Ok(Self {
            inner: Kdt::new(dim, items)?,
        })
    }

    pub fn dim(&self) -> usize {
        self.inner.dim()
    }

    pub fn count(&self) -> usize {
        self.inner.count()
    }

    pub fn contains(&self, key: &T) -> bool {
        self.inner.contains(key)
    }

    pub fn get(&self, key: &T) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.get(key)
    }

    pub fn get_all(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.inner.get_all()
    }

    pub fn for_each<F: FnMut(&T) -> bool>(&self, cb: F) -> bool {
        self.inner.for_each(cb)
    }

    pub fn for_each_matching<F: FnMut(&T) -> bool>(&self, key: &T, cb: F) -> bool {
        self.inner.for_each_matching(key, cb)
    }

    pub fn for_each_range<F: FnMut(&T) -> bool>(
        &self,
        lo: Option<&T>,
        hi: Option<&T>,
        hi_inclusive: bool,
        cb: F,
    ) -> bool {
        self.inner.for_each_range(lo, hi, hi_inclusive, cb)
    }

    /// Hands ownership of the underlying values to a `MetricBkdt` slot merge.
    pub(crate) fn into_values(self) -> Vec<T> {
        self.inner.into_values()
    }

    pub(crate) fn values(&self) -> &[T] {
        self.inner.values()
    }

    /// The stored item closest to `query` by squared Euclidean distance, and that distance.
    /// `None` only when the tree holds no items, which construction already forbids, so this
    /// is really infallible, but kept as `Option` to mirror `get`'s "maybe nothing matched" shape.
    #[tracing::instrument(skip_all)]
    pub fn nearest_neighbor(&self, query: &T) -> Option<(T, f64)>
    where
        T: Clone,
    {
        let values = self.inner.values();
        if values.is_empty() {
            return None;
        }
        let dim = self.inner.dim();
        let query_coords = coords(query, dim);
        let mut best_idx = 0;
        let mut best_dist = f64::INFINITY;
        search(
            values,
            dim,
            &query_coords,
            0,
            values.len() - 1,
            0,
            &mut best_idx,
            &mut best_dist,
        );
        Some((values[best_idx].clone(), best_dist))
    }
}

fn coords<T: MetricItem>(item: &T, dim: usize) -> Vec<f64> {
    (0..dim).map(|d| item.coord(d)).collect()
}

#[allow(clippy::too_many_arguments)]
fn search<T: MetricItem>(
    values: &[T],
    dim: usize,
    query: &[f64],
    l: usize,
    r: usize,
    depth: usize,
    best_idx: &mut usize,
    best_dist: &mut f64,
) {
    let m = l + (r - l) / 2;
    let candidate = coords(&values[m], dim);
    let d = squared_distance(query, &candidate);
    if d < *best_dist {
        *best_dist = d;
        *best_idx = m;
    }

    let axis = depth % dim;
    let diff = query[axis] - candidate[axis];
    let go_left_first = diff <= 0.0;

    let has_left = l < m;
    let has_right = m + 1 <= r;

    let (near, far) = if go_left_first {
        (has_left.then(|| (l, m - 1)), has_right.then_some((m + 1, r)))
    } else {
        (has_right.then_some((m + 1, r)), has_left.then(|| (l, m - 1)))
    };

    if let Some((nl, nr)) = near {
        search(values, dim, query, nl, nr, depth + 1, best_idx, best_dist);
    }
    // The splitting hyperplane is only closer than the current best if its perpendicular
    // distance could hide a nearer point on the far side.
    if diff * diff < *best_dist {
        if let Some((fl, fr)) = far {
            search(values, dim, query, fl, fr, depth + 1, best_idx, best_dist);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;
    use pretty_assertions::assert_eq;

    fn p2(x: f64, y: f64) -> Point {
        Point::new(vec![x, y])
    }

    #[test]
    fn finds_the_closest_point_on_a_grid() {
        let items = (0..5)
            .flat_map(|x| (0..5).map(move |y| p2(x as f64, y as f64)))
            .collect::<Vec<_>>();
        let tree = MetricKdt::new(2, items).unwrap();
        let (nearest, dist) = tree.nearest_neighbor(&p2(2.1, 2.9)).unwrap();
        assert_eq!(nearest, p2(2.0, 3.0));
        assert!((dist - (0.1f64.powi(2) + 0.1f64.powi(2))).abs() < 1e-9);
    }

    #[test]
    fn exact_match_has_zero_distance() {
        let items = vec![p2(0.0, 0.0), p2(5.0, 5.0), p2(-3.0, 2.0)];
        let tree = MetricKdt::new(2, items).unwrap();
        let (nearest, dist) = tree.nearest_neighbor(&p2(5.0, 5.0)).unwrap();
        assert_eq!(nearest, p2(5.0, 5.0));
        assert_eq!(dist, 0.0);
    }

    #[test]
    fn single_item_tree_returns_that_item() {
        let tree = MetricKdt::new(2, vec![p2(1.0, 1.0)]).unwrap();
        let (nearest, dist) = tree.nearest_neighbor(&p2(100.0, 100.0)).unwrap();
        assert_eq!(nearest, p2(1.0, 1.0));
        assert!(dist > 0.0);
    }

    #[test]
    fn boundary_scenario_4() {
        // D=2, points {(0,0),(10,10),(3,4)}, query (1,1)
        let tree = MetricKdt::new(2, vec![p2(0.0, 0.0), p2(10.0, 10.0), p2(3.0, 4.0)]).unwrap();
        let (nearest, dist) = tree.nearest_neighbor(&p2(1.0, 1.0)).unwrap();
        assert_eq!(nearest, p2(0.0, 0.0));
        assert_eq!(dist, 2.0);
    }
}
