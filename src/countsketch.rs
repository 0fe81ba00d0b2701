use std::sync::Arc;

use crate::median::median;
use crate::{Context, HashFunction, MemoryUsage, SamplingError};

/// A Count-Sketch over real-valued turnstile updates.
///
/// Every row hashes an index to a bucket and a sign. A row's estimate of a
/// coordinate is the signed content of its bucket, which is unbiased; the
/// sketch reports the median over rows. With `columns = 3 / epsilon^2` and
/// `rows = ln(1 / delta)` an estimate is within `epsilon * ||f||_2` of the
/// true weight with probability at least `1 - delta`.
///
/// Clones share the hash functions of the original and, like
/// [`CountSketch::empty_like`], do not account for their memory.
#[derive(Debug)]
pub struct CountSketch {
    width:       usize,
    counts:      Vec<f64>,
    hashers:     Vec<Arc<dyn HashFunction>>,
    owns_hashes: bool,
}

impl CountSketch {
    pub fn new(
        context: &mut Context,
        epsilon: f64,
        delta: f64,
    ) -> Result<Self, SamplingError> {
        if !(epsilon > 0.0 && epsilon < 1.0) {
            return Err(SamplingError::InvalidParameter {
                name:  "epsilon",
                value: epsilon,
            });
        }
        if !(delta > 0.0 && delta < 1.0) {
            return Err(SamplingError::InvalidParameter {
                name:  "delta",
                value: delta,
            });
        }

        Self::with_dimensions(
            context,
            (3.0 / (epsilon * epsilon)).ceil() as usize,
            (1.0 / delta).ln().ceil().max(1.0) as usize,
        )
    }

    pub fn with_dimensions(
        context: &mut Context,
        width: usize,
        depth: usize,
    ) -> Result<Self, SamplingError> {
        if width < 1 || depth < 1 || width > (u64::MAX / 2) as usize {
            return Err(SamplingError::InvalidDimensions);
        }

        Ok(CountSketch {
            width,
            counts: vec![0.0; width * depth],
            hashers: (0..depth).map(|_| context.new_hash()).collect(),
            owns_hashes: true,
        })
    }

    /// An empty sketch sharing this sketch's hash functions, and therefore
    /// mergeable with it.
    pub fn empty_like(&self) -> Self {
        CountSketch {
            width:       self.width,
            counts:      vec![0.0; self.counts.len()],
            hashers:     self.hashers.clone(),
            owns_hashes: false,
        }
    }

    pub fn columns(&self) -> usize {
        self.width
    }

    pub fn rows(&self) -> usize {
        self.hashers.len()
    }

    pub fn update(&mut self, index: u64, diff: f64) {
        for row in 0..self.hashers.len() {
            let (cell, sign) = self.locate(row, index);

            self.counts[cell] += sign * diff;
        }
    }

    pub fn query(&self, index: u64) -> f64 {
        let mut estimates: Vec<f64> = (0..self.hashers.len())
            .map(|row| {
                let (cell, sign) = self.locate(row, index);

                self.counts[cell] * sign
            })
            .collect();

        median(&mut estimates)
    }

    /// Estimates the `p`-norm of the summarized vector.
    pub fn norm(&self, p: f64) -> f64 {
        let mut sums: Vec<f64> = self
            .counts
            .chunks(self.width)
            .map(|row| row.iter().map(|c| c.abs().powf(p)).sum())
            .collect();

        median(&mut sums).powf(1.0 / p)
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|c| *c == 0.0)
    }

    pub fn merge(&mut self, other: &CountSketch) -> Result<(), SamplingError> {
        self.check_compatible_with(other)?;

        self.counts
            .iter_mut()
            .zip(other.counts.iter())
            .for_each(|(x, y)| *x += *y);

        Ok(())
    }

    pub fn clear(&mut self) {
        self.counts.iter_mut().for_each(|x| *x = 0.0);
    }

    pub fn check_compatible_with(
        &self,
        other: &CountSketch,
    ) -> Result<(), SamplingError> {
        if self.width != other.width || self.counts.len() != other.counts.len()
        {
            return Err(SamplingError::IncompatibleDimensions);
        }
        if !self
            .hashers
            .iter()
            .zip(other.hashers.iter())
            .all(|(a, b)| Arc::ptr_eq(a, b))
        {
            return Err(SamplingError::IncompatibleHashers);
        }

        Ok(())
    }

    /// One hash over `2 * width` values gives both the bucket and the sign.
    #[inline]
    fn locate(&self, row: usize, index: u64) -> (usize, f64) {
        let h = self.hashers[row].to_range(index, 2 * self.width as u64);
        let sign = if h & 1 == 1 { 1.0 } else { -1.0 };

        (row * self.width + (h >> 1) as usize, sign)
    }
}

impl Clone for CountSketch {
    fn clone(&self) -> Self {
        CountSketch {
            width:       self.width,
            counts:      self.counts.clone(),
            hashers:     self.hashers.clone(),
            owns_hashes: false,
        }
    }
}

impl MemoryUsage for CountSketch {
    fn memory_used(&self) -> usize {
        let mut words = 4 + self.counts.len() + self.hashers.len();

        if self.owns_hashes {
            words += self.hashers.iter().map(|h| h.memory_used()).sum::<usize>();
        }

        words
    }
}
