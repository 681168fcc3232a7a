/// Growing k-d forest: a small mutable buffer plus a cascade of immutable `Kdt` slots, combined
/// by the Bentley–Saxe "logarithmic method" so that an insert touches `O(log(n/block_size))`
/// amortized items instead of rebuilding the whole index.
///
/// Slot `k` holds either nothing or exactly `block_size * 2^k` items. Inserting `block_size`
/// items into the buffer forms a new size-`block_size` block, which cascades: if slot 0 is
/// empty it lands there; otherwise slot 0's block merges with the new one into a size-`2 *
/// block_size` block that is offered to slot 1, and so on until an empty slot accepts it.
use crate::error::Error;
use crate::item::KdItem;
use crate::kdt::{self, Kdt};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Defensive cap on the slot cascade. Reaching it requires on the order of
/// `block_size * 2^32` items, far past what fits in memory (this only guards against the
/// theoretical case, not one this crate's tests can exercise).
const MAX_SLOTS: usize = 32;

#[derive(Debug)]
struct Inner<T> {
    pending: Vec<T>,
    slots: Vec<Option<Kdt<T>>>,
}

#[derive(Debug)]
pub struct Bkdt<T> {
    dim: usize,
    block_size: usize,
    inner: RwLock<Inner<T>>,
    count: AtomicUsize,
    enumerators: AtomicUsize,
}

/// Marks a read traversal as in progress for its lifetime, so a concurrent `insert` can detect
/// it and fail with [`Error::ConcurrentModification`] instead of racing the slot cascade.
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

impl<T: KdItem + Clone> Bkdt<T> {
    /// Block size used by [`Bkdt::new_default`] when the caller has no specific capacity in mind.
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

    /// `Bkdt::new(dim, Self::DEFAULT_BLOCK_SIZE)`.
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

    /// Appends `item`, cascading a new block through the slot table when the buffer fills.
    /// Errors rather than blocking if a `for_each`/`get`/range traversal is currently in
    /// progress on this index.
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
                Kdt::new(self.dim, block_items).expect("a full block of block_size >= 2 items is never empty"),
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
                            Kdt::new(self.dim, merged).expect("merging two nonempty blocks is never empty"),
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
        inner
            .slots
            .iter()
            .flatten()
            .any(|slot| slot.contains(key))
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

    /// Visit every stored item. `cb` returns `true` to cancel; the call returns `true` iff it
    /// was canceled.
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::point::Point;
    use pretty_assertions::assert_eq;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn p1(x: f64) -> Point {
        Point::new(vec![x])
    }

    #[test]
    fn rejects_small_block_size() {
        assert!(matches!(
            Bkdt::<Point>::new(1, 1),
            Err(Error::InvalidBlockSize { found: 1 })
        ));
    }

    #[test]
    fn buffers_until_a_full_block_then_cascades() {
        let tree = Bkdt::new(1, 4).unwrap();
        for x in 0..3 {
            tree.insert(p1(x as f64)).unwrap();
        }
        assert_eq!(tree.count(), 3);
        assert!(tree.get_all().len() == 3);

        tree.insert(p1(3.0)).unwrap();
        assert_eq!(tree.count(), 4);
        // a full block just cascaded into slot 0
        assert_eq!(tree.get_all().len(), 4);
        assert!(tree.contains(&p1(2.0)));
    }

    #[test]
    fn repeated_cascades_merge_slots_upward() {
        let tree = Bkdt::new(1, 2).unwrap();
        for x in 0..8 {
            tree.insert(p1(x as f64)).unwrap();
        }
        // 8 items at block_size 2 cascades 2 -> 4 -> 8, landing fully merged in slot 2
        assert_eq!(tree.count(), 8);
        let mut all = tree.get_all();
        all.sort_by(|a, b| a.compare_dim(b, 0));
        let want = (0..8).map(|x| p1(x as f64)).collect::<Vec<_>>();
        assert_eq!(all, want);
    }

    #[test]
    fn random_inserts_are_all_retrievable() {
        let mut rng = StdRng::seed_from_u64(42);
        let tree = Bkdt::new(1, 3).unwrap();
        let mut inserted = Vec::new();
        for _ in 0..100 {
            let x: f64 = rng.gen_range(-1000.0..1000.0);
            tree.insert(p1(x)).unwrap();
            inserted.push(p1(x));
        }
        assert_eq!(tree.count(), 100);
        for item in &inserted {
            assert!(tree.contains(item));
        }
        let mut all = tree.get_all();
        all.sort_by(|a, b| a.compare_dim(b, 0));
        inserted.sort_by(|a, b| a.compare_dim(b, 0));
        assert_eq!(all, inserted);
    }

    #[test]
    fn range_query_spans_buffer_and_slots() {
        let tree = Bkdt::new(1, 4).unwrap();
        for x in 0..10 {
            tree.insert(p1(x as f64)).unwrap();
        }
        let mut seen = Vec::new();
        tree.for_each_range(Some(&p1(3.0)), Some(&p1(7.0)), true, |v| {
            seen.push(v.clone());
            false
        });
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn duplicate_insert_cascades_into_a_slot_boundary_scenario() {
        // scenario 1: D=2, insert (0,0),(1,1),(0,0) into BKDT(block=2)
        fn p2(x: f64, y: f64) -> Point {
            Point::new(vec![x, y])
        }
        let tree = Bkdt::new(2, 2).unwrap();
        tree.insert(p2(0.0, 0.0)).unwrap();
        tree.insert(p2(1.0, 1.0)).unwrap();
        tree.insert(p2(0.0, 0.0)).unwrap();
        assert_eq!(tree.count(), 3);
        assert_eq!(tree.get(&p2(0.0, 0.0)).len(), 2);
        assert!(tree.contains(&p2(1.0, 1.0)));
    }

    #[test]
    fn insert_fails_while_a_for_each_is_mid_traversal() {
        let tree = Bkdt::new(1, 4).unwrap();
        for x in 0..10 {
            tree.insert(p1(x as f64)).unwrap();
        }
        let mut result = None;
        tree.for_each(|_| {
            result = Some(tree.insert(p1(99.0)));
            true
        });
        assert!(matches!(result, Some(Err(Error::ConcurrentModification))));
    }

    #[test]
    fn new_default_uses_the_documented_default_block_size() {
        assert_eq!(Bkdt::<Point>::DEFAULT_BLOCK_SIZE, 128);
        let tree = Bkdt::<Point>::new_default(1).unwrap();
        assert_eq!(tree.block_size(), 128);
    }

    #[test]
    fn boundary_scenario_6_range_matches_brute_force() {
        fn p2(x: f64, y: f64) -> Point {
            Point::new(vec![x, y])
        }
        let mut rng = StdRng::seed_from_u64(7);
        let tree = Bkdt::new(2, 4).unwrap();
        let mut inserted = Vec::new();
        for _ in 0..100 {
            let x: f64 = rng.gen_range(-50.0..50.0);
            let y: f64 = rng.gen_range(-50.0..50.0);
            let item = p2(x, y);
            tree.insert(item.clone()).unwrap();
            inserted.push(item);
        }
        for item in &inserted {
            assert!(tree.contains(item));
        }
        let mut all = tree.get_all();
        all.sort_by(|a, b| a.compare_dim(b, 0).then(a.compare_dim(b, 1)));
        let mut want = inserted.clone();
        want.sort_by(|a, b| a.compare_dim(b, 0).then(a.compare_dim(b, 1)));
        assert_eq!(all, want);

        let lo = p2(-10.0, -10.0);
        let hi = p2(10.0, 10.0);
        let mut seen = Vec::new();
        tree.for_each_range(Some(&lo), Some(&hi), true, |v| {
            seen.push(v.clone());
            false
        });
        let mut brute: Vec<Point> = inserted
            .iter()
            .filter(|v| crate::kdt::in_range(*v, 2, Some(&lo), Some(&hi), true))
            .cloned()
            .collect();
        seen.sort_by(|a, b| a.compare_dim(b, 0).then(a.compare_dim(b, 1)));
        brute.sort_by(|a, b| a.compare_dim(b, 0).then(a.compare_dim(b, 1)));
        assert_eq!(seen, brute);
    }
}
