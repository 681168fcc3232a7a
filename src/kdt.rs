/// Static k-d tree: built once from a bulk collection via recursive median-of-sort, then
/// read-only. Supports exact-match retrieval, range iteration and containment test.
///
/// Duplicate keys are preserved. Correctness in the presence of duplicates on the split axis
/// hinges on the "dirty" bit recorded per median during construction, see the module-level
/// discussion in `find_first_equal` below before touching the traversal gates.
use crate::dim_compare::DimCompare;
use crate::error::Error;
use crate::item::KdItem;
use std::cmp::Ordering;

#[derive(Debug)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Kdt<T> {
    dim: usize,
    values: Vec<T>,
    dirty: Vec<bool>,
}

impl<T: KdItem> Kdt<T> {
    /// Build a balanced k-d layout over `items`. `dim` is the number of axes each item is
    /// compared on; `depth mod dim` picks the split axis at every level.
    #[tracing::instrument(skip_all)]
    pub fn new(dim: usize, items: Vec<T>) -> Result<Self, Error> {
        if dim == 0 {
            return Err(Error::InvalidDimension);
        }
        if items.is_empty() {
            return Err(Error::EmptyConstruction);
        }
        let n = items.len();
        let mut values = items;
        let mut dirty = vec![false; n];
        build(&mut values, &mut dirty, 0, n - 1, 0, dim);
        Ok(Self { dim, values, dirty })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn count(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` as soon as any stored item equals `key` on every axis.
    pub fn contains(&self, key: &T) -> bool {
        let mut found = false;
        visit_exact(
            &self.values,
            &self.dirty,
            self.dim,
            key,
            0,
            self.values.len() - 1,
            0,
            &mut |_| {
                found = true;
                true
            },
        );
        found
    }

    /// All stored items equal to `key`, as owned clones. Each call is an independent traversal.
    pub fn get(&self, key: &T) -> Vec<T>
    where
        T: Clone,
    {
        let mut out = Vec::new();
        self.for_each_matching(key, |v| {
            out.push(v.clone());
            false
        });
        out
    }

    /// Every stored item, as owned clones. Each call is an independent traversal.
    pub fn get_all(&self) -> Vec<T>
    where
        T: Clone,
    {
        let mut out = Vec::new();
        self.for_each(|v| {
            out.push(v.clone());
            false
        });
        out
    }

    /// Visit every stored item equal to `key`. `cb` returns `true` to cancel; the call returns
    /// `true` iff it was canceled.
    pub fn for_each_matching<F: FnMut(&T) -> bool>(&self, key: &T, mut cb: F) -> bool {
        visit_exact(
            &self.values,
            &self.dirty,
            self.dim,
            key,
            0,
            self.values.len() - 1,
            0,
            &mut cb,
        )
    }

    /// Visit every stored item, unconditionally. `cb` returns `true` to cancel.
    pub fn for_each<F: FnMut(&T) -> bool>(&self, cb: F) -> bool {
        self.for_each_range(None, None, true, cb)
    }

    /// Visit every stored item `v` with `lo <= v` and (`v <= hi` if `hi_inclusive` else `v <
    /// hi`). A missing bound is unconstrained on that side. `cb` returns `true` to cancel.
    pub fn for_each_range<F: FnMut(&T) -> bool>(
        &self,
        lo: Option<&T>,
        hi: Option<&T>,
        hi_inclusive: bool,
        mut cb: F,
    ) -> bool {
        if let (Some(lo), Some(hi)) = (lo, hi) {
            for d in 0..self.dim {
                if lo.compare_dim(hi, d) == Ordering::Greater {
                    return false;
                }
            }
        }
        visit_range(
            &self.values,
            &self.dirty,
            self.dim,
            lo,
            hi,
            hi_inclusive,
            0,
            self.values.len() - 1,
            0,
            &mut cb,
        )
    }

    /// Hands ownership of the underlying values to a `Bkdt` slot merge.
    pub(crate) fn into_values(self) -> Vec<T> {
        self.values
    }

    pub(crate) fn values(&self) -> &[T] {
        &self.values
    }
}

/// Recursive median-of-sort build. `[l, r]` is inclusive; `dirty` is set only at the indices
/// this call finalizes as medians (its own recursive calls never revisit them).
fn build<T: KdItem>(values: &mut [T], dirty: &mut [bool], l: usize, r: usize, depth: usize, dim: usize) {
    let d = depth % dim;
    values[l..=r].sort_by(|a, b| DimCompare(d).compare(a, b));
    let m = l + (r - l) / 2;
    let f = find_first_equal(values, m, l as isize, r as isize, d);
    dirty[m] = f < m as isize;
    if l < m {
        build(values, dirty, l, m - 1, depth + 1, dim);
    }
    if m + 1 <= r {
        build(values, dirty, m + 1, r, depth + 1, dim);
    }
}

/// Least index in `[l, r]` equal to `values[key_idx]` on axis `d`, or `-1` if none. A binary
/// search that, on hitting an equal midpoint, recurses left to find the earliest one (needed
/// because the subtree may carry several duplicates of the split key).
fn find_first_equal<T: KdItem>(values: &[T], key_idx: usize, l0: isize, r0: isize, d: usize) -> isize {
    let (mut l, mut r) = (l0, r0);
    let mut last_m: isize = -1;
    let mut last_c = Ordering::Equal;
    while r >= l {
        let m = l + (r - l) / 2;
        let c = values[key_idx].compare_dim(&values[m as usize], d);
        last_m = m;
        last_c = c;
        match c {
            Ordering::Less => {
                if r == m {
                    break;
                }
                r = m;
            }
            Ordering::Greater => {
                l = m + 1;
            }
            Ordering::Equal => {
                let i = find_first_equal(values, key_idx, l, m - 1, d);
                return if i >= l && i <= m - 1 { i } else { m };
            }
        }
    }
    if last_c == Ordering::Greater {
        -1
    } else {
        last_m
    }
}

#[allow(clippy::too_many_arguments)]
fn visit_exact<T: KdItem, F: FnMut(&T) -> bool>(
    values: &[T],
    dirty: &[bool],
    dim: usize,
    key: &T,
    l: usize,
    r: usize,
    depth: usize,
    cb: &mut F,
) -> bool {
    let m = l + (r - l) / 2;
    if key.equal_all_dims(&values[m], dim) && cb(&values[m]) {
        return true;
    }
    let d = depth % dim;
    let c = key.compare_dim(&values[m], d);
    if c != Ordering::Less && m + 1 <= r && visit_exact(values, dirty, dim, key, m + 1, r, depth + 1, cb) {
        return true;
    }
    if (c == Ordering::Less || (c == Ordering::Equal && dirty[m]))
        && l < m
        && visit_exact(values, dirty, dim, key, l, m - 1, depth + 1, cb)
    {
        return true;
    }
    false
}

pub(crate) fn in_range<T: KdItem>(v: &T, dim: usize, lo: Option<&T>, hi: Option<&T>, hi_inclusive: bool) -> bool {
    for d in 0..dim {
        if let Some(lo) = lo {
            if v.compare_dim(lo, d) == Ordering::Less {
                return false;
            }
        }
        if let Some(hi) = hi {
            let c = v.compare_dim(hi, d);
            let out_of_range = if hi_inclusive {
                c == Ordering::Greater
            } else {
                c != Ordering::Less
            };
            if out_of_range {
                return false;
            }
        }
    }
    true
}

#[allow(clippy::too_many_arguments)]
fn visit_range<T: KdItem, F: FnMut(&T) -> bool>(
    values: &[T],
    dirty: &[bool],
    dim: usize,
    lo: Option<&T>,
    hi: Option<&T>,
    hi_inclusive: bool,
    l: usize,
    r: usize,
    depth: usize,
    cb: &mut F,
) -> bool {
    let m = l + (r - l) / 2;
    if in_range(&values[m], dim, lo, hi, hi_inclusive) && cb(&values[m]) {
        return true;
    }
    let d = depth % dim;
    let c_hi = hi.map(|h| h.compare_dim(&values[m], d));
    let c_lo = lo.map(|lo_| lo_.compare_dim(&values[m], d));
    if c_hi != Some(Ordering::Less)
        && m + 1 <= r
        && visit_range(values, dirty, dim, lo, hi, hi_inclusive, m + 1, r, depth + 1, cb)
    {
        return true;
    }
    let duplicate_fix = dirty[m] && c_hi == Some(Ordering::Equal);
    if (c_lo != Some(Ordering::Greater) || duplicate_fix)
        && l < m
        && visit_range(values, dirty, dim, lo, hi, hi_inclusive, l, m - 1, depth + 1, cb)
    {
        return true;
    }
    false
}
