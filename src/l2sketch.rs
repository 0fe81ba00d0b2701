use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;

use crate::median::median;
use crate::{Context, HashFunction, MemoryUsage, SamplingError};

/// Estimates the L2 norm of a turnstile-updated vector.
///
/// Each cell is a random Gaussian projection of the vector. The Gaussian
/// coefficients of an index are regenerated from a generator seeded with
/// the index's hash, so no per-index state is stored. The absolute value of
/// a cell is distributed as `||f||_2 * |N(0, 1)|`, whose median is
/// `||f||_2 / INV_BETA`.
///
/// Clones share the original's hash function and do not account for it.
#[derive(Debug)]
pub struct L2Sketch {
    cells:       Vec<f64>,
    hasher:      Arc<dyn HashFunction>,
    owns_hasher: bool,
}

impl L2Sketch {
    /// One over the median of `|N(0, 1)|`.
    pub const INV_BETA: f64 = 1.482_602_218_505_601_8;

    pub fn new(
        context: &mut Context,
        relative_error: f64,
    ) -> Result<Self, SamplingError> {
        if !(relative_error > 0.0 && relative_error < 1.0) {
            return Err(SamplingError::InvalidParameter {
                name:  "relative error",
                value: relative_error,
            });
        }

        let cells = (8.0 * (1.0 / relative_error).ln()).ceil().max(1.0) as usize;

        Ok(L2Sketch {
            cells:       vec![0.0; cells],
            hasher:      context.new_hash(),
            owns_hasher: true,
        })
    }

    /// An empty sketch sharing this sketch's hash function, and therefore
    /// mergeable with it.
    pub fn empty_like(&self) -> Self {
        L2Sketch {
            cells:       vec![0.0; self.cells.len()],
            hasher:      Arc::clone(&self.hasher),
            owns_hasher: false,
        }
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| *c == 0.0)
    }

    pub fn update(&mut self, index: u64, diff: f64) {
        let mut rng = ChaCha8Rng::seed_from_u64(self.hasher.to_u64(index));

        for cell in self.cells.iter_mut() {
            let z: f64 = rng.sample(StandardNormal);

            *cell += z * diff;
        }
    }

    pub fn query(&self) -> f64 {
        let mut abs: Vec<f64> = self.cells.iter().map(|c| c.abs()).collect();

        Self::INV_BETA * median(&mut abs)
    }

    pub fn merge(&mut self, other: &L2Sketch) -> Result<(), SamplingError> {
        if self.cells.len() != other.cells.len() {
            return Err(SamplingError::IncompatibleDimensions);
        }
        if !Arc::ptr_eq(&self.hasher, &other.hasher) {
            return Err(SamplingError::IncompatibleHashers);
        }

        self.cells
            .iter_mut()
            .zip(other.cells.iter())
            .for_each(|(x, y)| *x += *y);

        Ok(())
    }
}

impl Clone for L2Sketch {
    fn clone(&self) -> Self {
        L2Sketch {
            cells:       self.cells.clone(),
            hasher:      Arc::clone(&self.hasher),
            owns_hasher: false,
        }
    }
}

impl MemoryUsage for L2Sketch {
    fn memory_used(&self) -> usize {
        let words = 4 + self.cells.len();

        if self.owns_hasher {
            words + self.hasher.memory_used()
        } else {
            words
        }
    }
}
