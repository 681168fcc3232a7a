use pulp::{Arch, Simd, WithSimd};

/// SQUARED EUCLIDEAN DISTANCE
///
/// Nearest-neighbor search only ever needs distances compared against each other, never an
/// absolute magnitude, so the `sqrt` from the textbook Euclidean distance is skipped (it's
/// monotonic and would not change which candidate wins).
struct SquaredEuclideanDistance<'a> {
    first: &'a [f64],
    second: &'a [f64],
}

impl WithSimd for SquaredEuclideanDistance<'_> {
    type Output = f64;

    #[inline(always)]
    fn with_simd<S: Simd>(self, simd: S) -> Self::Output {
        let (first_head, first_tail) = S::as_simd_f64s(self.first);
        let (second_head, second_tail) = S::as_simd_f64s(self.second);

        let mut sum_of_squares = simd.splat_f64s(0.0);

        for (&coord_first, &coord_second) in first_head.iter().zip(second_head) {
            let diff = simd.sub_f64s(coord_first, coord_second);
            sum_of_squares = simd.mul_add_f64s(diff, diff, sum_of_squares);
        }

        let mut total = simd.reduce_sum_f64s(sum_of_squares);

        total += first_tail
            .iter()
            .zip(second_tail)
            .map(|(&x, &y)| {
                let diff = x - y;
                diff * diff
            })
            .sum::<f64>();

        total
    }
}

/// Squared Euclidean distance between two equal-length coordinate slices. Panics if the slices
/// differ in length, since callers only ever compare coordinates drawn from the same item type.
#[tracing::instrument(skip_all)]
pub(crate) fn squared_distance(first: &[f64], second: &[f64]) -> f64 {
    assert_eq!(
        first.len(),
        second.len(),
        "coordinate slices must have the same length"
    );

    let arch = Arch::new();
    arch.dispatch(SquaredEuclideanDistance { first, second })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn matches_scalar_computation() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let b = [2.0, 2.0, 1.0, 4.0, 0.0];
        let expected: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
        assert_eq!(squared_distance(&a, &b), expected);
    }

    #[test]
    fn zero_for_identical_points() {
        let a = [1.0, -2.0, 3.5];
        assert_eq!(squared_distance(&a, &a), 0.0);
    }
}
