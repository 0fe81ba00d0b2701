use std::cmp::Ordering;

use num_traits::Float;

/// The upper median of `values`, reordering them in place. Zero when empty.
pub(crate) fn median<T: Float>(values: &mut [T]) -> T {
    if values.is_empty() {
        return T::zero();
    }

    let mid = values.len() / 2;

    let (_, median, _) = values.select_nth_unstable_by(mid, |a, b| {
        a.partial_cmp(b).unwrap_or(Ordering::Equal)
    });

    *median
}
