/// `Bkdt` specialized for items with per-axis scalar coordinates: the same buffer-plus-cascade
/// structure, but each slot is a `MetricKdt` so nearest-neighbor queries fan out across the
/// buffer (linear scan) and every occupied slot (branch-and-bound), keeping the overall closest.
use crate::error::Error;
use crate::item::MetricItem;
use crate::kdt;
use crate::metric_kdt::MetricKdt;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

const MAX_SLOTS: usize = 32;

#[derive(Debug)]
struct Inner<T> {
    pending: Vec<T>,
    slots: Vec<Option<MetricKdt<T>>>,
}

#[derive(Debug)]
pub struct MetricBkdt<T> {
    dim: usize,
    block_size: usize,
    inner: RwLock<Inner<T>>,
    count: AtomicUsize,
    enumerators: AtomicUsize,
}

struct EnumerationGuard<'a> {
    counter: &'a AtomicUsize,
}

impl<'a> EnumerationGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self { counter }
    }
}

impl Drop for EnumerationGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: MetricItem + Clone> MetricBkdt<T> {
    /// Block size used by [`MetricBkdt::new_default`] when the caller has no specific capacity
    /// in mind.
    pub const DEFAULT_BLOCK_SIZE: usize = 128;

    pub fn new(dim: usize, block_size: usize) -> Result<Self, Error> {
        if dim == 0 {
            return Err(Error::InvalidDimension);
        }
        if block_size < 2 {
            return Err(Error::InvalidBlockSize { found: block_size });
        }
        Ok(Self {
            dim,
            block_size,
            inner: RwLock::new(Inner {
                pending: Vec::with_capacity(block_size),
                slots: Vec::new(),
            }),
            count: AtomicUsize::new(0),
            enumerators: AtomicUsize::new(0),
        })
    }

    /// `MetricBkdt::new(dim, Self::DEFAULT_BLOCK_SIZE)`.
    pub fn new_default(dim: usize) -> Result<Self, Error> {
        Self::new(dim, Self::DEFAULT_BLOCK_SIZE)
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[tracing::instrument(skip_all)]
    pub fn insert(&self, item: T) -> Result<(), Error> {
        if self.enumerators.load(Ordering::Acquire) > 0 {
            return Err(Error::ConcurrentModification);
        }
        let mut guard = self.inner.write();
        guard.pending.push(item);
        if guard.pending.len() == self.block_size {
            // The new block will land at the first empty slot, cascading through every
            // contiguously-occupied slot below it. Find that landing index before draining
            // anything, so a would-be-too-deep cascade fails without touching `pending` or
            // `slots` at all.
            let mut k0 = 0;
            while k0 < guard.slots.len() && guard.slots[k0].is_some() {
                k0 += 1;
            }
            if k0 >= MAX_SLOTS {
                guard.pending.pop();
                return Err(Error::CapacityExceeded);
            }
            let block_items = std::mem::take(&mut guard.pending);
            let mut carry = Some(
                MetricKdt::new(self.dim, block_items)
                    .expect("a full block of block_size >= 2 items is never empty"),
            );
            let mut k = 0;
            while carry.is_some() {
                if k == guard.slots.len() {
                    guard.slots.push(None);
                }
                match guard.slots[k].take() {
                    None => {
                        guard.slots[k] = carry.take();
                    }
                    Some(existing) => {
                        let merged = existing
                            .into_values()
                            .into_iter()
                            .chain(carry.take().unwrap().into_values())
                            .collect::<Vec<_>>();
                        carry = Some(
                            MetricKdt::new(self.dim, merged)
                                .expect("merging two nonempty blocks is never empty"),
                        );
                        k += 1;
                    }
                }
            }
        }
        self.count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn contains(&self, key: &T) -> bool {
        let _guard = EnumerationGuard::enter(&self.enumerators);
        let inner = self.inner.read();
        if inner.pending.iter().any(|v| key.equal_all_dims(v, self.dim)) {
            return true;
        }
        inner.slots.iter().flatten().any(|slot| slot.contains(key))
    }

    pub fn get(&self, key: &T) -> Vec<T> {
        let _guard = EnumerationGuard::enter(&self.enumerators);
        let inner = self.inner.read();
        let mut out = inner
            .pending
            .iter()
            .filter(|v| key.equal_all_dims(*v, self.dim))
            .cloned()
            .collect::<Vec<_>>();
        for slot in inner.slots.iter().flatten() {
            out.extend(slot.get(key));
        }
        out
    }

    pub fn get_all(&self) -> Vec<T> {
        let _guard = EnumerationGuard::enter(&self.enumerators);
        let inner = self.inner.read();
        let mut out = inner.pending.clone();
        for slot in inner.slots.iter().flatten() {
            out.extend(slot.get_all());
        }
        out
    }

    pub fn for_each<F: FnMut(&T) -> bool>(&self, mut cb: F) -> bool {
        let _guard = EnumerationGuard::enter(&self.enumerators);
        let inner = self.inner.read();
        for v in &inner.pending {
            if cb(v) {
                return true;
            }
        }
        for slot in inner.slots.iter().flatten() {
            if slot.for_each(&mut cb) {
                return true;
            }
        }
        false
    }

    pub fn for_each_matching<F: FnMut(&T) -> bool>(&self, key: &T, mut cb: F) -> bool {
        let _guard = EnumerationGuard::enter(&self.enumerators);
        let inner = self.inner.read();
        for v in inner.pending.iter().filter(|v| key.equal_all_dims(*v, self.dim)) {
            if cb(v) {
                return true;
            }
        }
        for slot in inner.slots.iter().flatten() {
            if slot.for_each_matching(key, &mut cb) {
                return true;
            }
        }
        false
    }

    pub fn for_each_range<F: FnMut(&T) -> bool>(
        &self,
        lo: Option<&T>,
        hi: Option<&T>,
        hi_inclusive: bool,
        mut cb: F,
    ) -> bool {
        if let (Some(lo), Some(hi)) = (lo, hi) {
            for d in 0..self.dim {
                if lo.compare_dim(hi, d) == std::cmp::Ordering::Greater {
                    return false;
                }
            }
        }
        let _guard = EnumerationGuard::enter(&self.enumerators);
        let inner = self.inner.read();
        for v in inner
            .pending
            .iter()
            .filter(|v| kdt::in_range(*v, self.dim, lo, hi, hi_inclusive))
        {
            if cb(v) {
                return true;
            }
        }
        for slot in inner.slots.iter().flatten() {
            if slot.for_each_range(lo, hi, hi_inclusive, &mut cb) {
                return true;
            }
        }
        false
    }

    /// The stored item closest to `query` by squared Euclidean distance, across the pending
    /// buffer and every occupied slot. `None` only when the forest is empty.
    #[tracing::instrument(skip_all)]
    pub fn nearest_neighbor(&self, query: &T) -> Option<(T, f64)> {
        let _guard = EnumerationGuard::enter(&self.enumerators);
        let inner = self.inner.read();
        let mut best: Option<(T, f64)> = None;

        for v in &inner.pending {
            let d = crate::distance::squared_distance(
                &(0..self.dim).map(|i| query.coord(i)).collect::<Vec<_>>(),
                &(0..self.dim).map(|i| v.coord(i)).collect::<Vec<_>>(),
            );
            if best.as_ref().map(|(_, bd)| d < *bd).unwrap_or(true) {
                best = Some((v.clone(), d));
            }
        }

        for slot in inner.slots.iter().flatten() {
            if let Some((candidate, d)) = slot.nearest_neighbor(query) {
                if best.as_ref().map(|(_, bd)| d < *bd).unwrap_or(true) {
                    best = Some((candidate, d));
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;
    use pretty_assertions::assert_eq;

    fn p1(x: f64) -> Point {
        Point::new(vec![x])
    }

    #[test]
    fn nearest_neighbor_spans_buffer_and_slots() {
        let tree = MetricBkdt::new(1, 4).unwrap();
        for x in 0..10 {
            tree.insert(p1(x as f64)).unwrap();
        }
        let (nearest, dist) = tree.nearest_neighbor(&p1(6.4)).unwrap();
        assert_eq!(nearest, p1(6.0));
        assert!((dist - 0.16).abs() < 1e-9);
    }

    #[test]
    fn nearest_neighbor_before_any_cascade() {
        let tree = MetricBkdt::new(1, 4).unwrap();
        tree.insert(p1(1.0)).unwrap();
        tree.insert(p1(9.0)).unwrap();
        let (nearest, _) = tree.nearest_neighbor(&p1(2.0)).unwrap();
        assert_eq!(nearest, p1(1.0));
    }

    #[test]
    fn empty_forest_has_no_nearest_neighbor() {
        let tree = MetricBkdt::new(1, 4).unwrap();
        assert!(tree.nearest_neighbor(&p1(0.0)).is_none());
    }

    #[test]
    fn boundary_scenario_5() {
        // MetricBKDT(block=2), insert (0,0),(5,5),(1,1),(4,4); query (0.5, 0.5)
        fn p2(x: f64, y: f64) -> Point {
            Point::new(vec![x, y])
        }
        let tree = MetricBkdt::new(2, 2).unwrap();
        tree.insert(p2(0.0, 0.0)).unwrap();
        tree.insert(p2(5.0, 5.0)).unwrap();
        tree.insert(p2(1.0, 1.0)).unwrap();
        tree.insert(p2(4.0, 4.0)).unwrap();
        let (nearest, dist) = tree.nearest_neighbor(&p2(0.5, 0.5)).unwrap();
        assert_eq!(nearest, p2(0.0, 0.0));
        assert!((dist - 0.5).abs() < 1e-9);
    }
}
