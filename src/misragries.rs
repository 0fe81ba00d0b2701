use std::collections::HashMap;

use crate::{MemoryUsage, SamplingError};

/// Misra-Gries summary giving an upper bound on the largest coordinate.
///
/// At most `capacity - 1` counters are kept between updates. Whenever the
/// number of tracked indices reaches `capacity`, the smallest counter is
/// subtracted from every counter and remembered in `removed`. Each purge
/// takes the same amount away from `capacity` counters, so `removed` never
/// exceeds `total_positive_weight / capacity`, and
/// `true_max <= query_max() <= true_max + total_positive_weight / capacity`.
///
/// Negative weight changes are accepted; a counter driven to zero or below
/// is dropped at the next purge. Only a positive minimum is subtracted, so
/// `removed` never decreases and keeps bounding every dropped index.
#[derive(Debug, Clone)]
pub struct MisraGries {
    capacity: usize,
    removed:  i64,
    counters: HashMap<u64, i64>,
}

impl MisraGries {
    pub fn new(capacity: usize) -> Result<Self, SamplingError> {
        if capacity < 1 {
            return Err(SamplingError::InvalidDimensions);
        }

        Ok(MisraGries {
            capacity,
            removed: 0,
            counters: HashMap::with_capacity(capacity),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of tracked indices.
    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }

    pub fn update(&mut self, index: u64, diff: i64) {
        *self.counters.entry(index).or_insert(0) += diff;

        if self.counters.len() >= self.capacity {
            self.purge();
        }
    }

    /// Upper bound on the largest coordinate, untracked ones included.
    pub fn query_max(&self) -> i64 {
        self.counters.values().copied().max().unwrap_or(0).max(0) + self.removed
    }

    fn purge(&mut self) {
        let min = match self.counters.values().copied().min() {
            Some(min) => min,
            None => return,
        };

        if min > 0 {
            self.counters.values_mut().for_each(|c| *c -= min);
            self.removed += min;
        }

        self.counters.retain(|_, c| *c > 0);
    }
}

impl MemoryUsage for MisraGries {
    fn memory_used(&self) -> usize {
        // Hash map entries cost a key, a value and roughly two words of
        // table overhead.
        3 + 4 * self.capacity
    }
}
