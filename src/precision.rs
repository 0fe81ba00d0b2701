use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;

use ordered_float::OrderedFloat;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, trace};

use crate::{
    Accuracy, Context, CountSketch, HashFunction, L2Sketch, MemoryUsage,
    Sample, Sampler, SamplingError,
};

/// Approximate L2 sampler based on precision sampling.
///
/// Each replica scales coordinate `i` by `1 / sqrt(u_i)`, with `u_i` a
/// uniform "precision" regenerated from the index's hash, and summarizes
/// the scaled vector in a [`CountSketch`]. A coordinate ends up dominating
/// the scaled vector roughly when `u_i < f_i^2 / ||f||_2^2`, which makes
/// the dominating coordinate an approximate L2 sample. The replica accepts
/// its largest estimate only if it clearly stands out from the rest.
#[derive(Debug, Clone)]
pub struct PrecisionSampler {
    n:           u64,
    epsilon:     f64,
    top_size:    usize,
    subsamplers: Vec<Subsampler>,
    norm_sketch: L2Sketch,
}

#[derive(Debug, Clone)]
struct Subsampler {
    precision_hash: Arc<dyn HashFunction>,
    sketch:         CountSketch,
}

/// An estimate keyed by its magnitude.
type Candidate = (OrderedFloat<f64>, u64, OrderedFloat<f64>);

impl Subsampler {
    fn precision(&self, index: u64) -> f64 {
        let mut rng = ChaCha8Rng::seed_from_u64(self.precision_hash.to_u64(index));

        // Uniform in (0, 1].
        1.0 - rng.gen::<f64>()
    }

    fn update(&mut self, index: u64, weight: f64) {
        let scaled = weight / self.precision(index).sqrt();

        self.sketch.update(index, scaled);
    }

    fn query(&self, n: u64, top_size: usize, epsilon: f64, norm: f64) -> Option<Sample> {
        let mut heap: BinaryHeap<Reverse<Candidate>> =
            BinaryHeap::with_capacity(top_size + 1);
        let mut tail = 0.0;

        for index in 0..n {
            let estimate = self.sketch.query(index);

            heap.push(Reverse((
                OrderedFloat(estimate.abs()),
                index,
                OrderedFloat(estimate),
            )));

            if heap.len() > top_size {
                if let Some(Reverse((_, _, OrderedFloat(evicted)))) = heap.pop() {
                    tail += evicted * evicted;
                }
            }
        }

        let tail = tail.sqrt();
        let Reverse((_, index, OrderedFloat(peak))) =
            heap.into_iter().max_by_key(|Reverse(c)| c.0)?;

        if tail >= (epsilon * top_size as f64).sqrt() * norm
            || peak.abs() <= norm / epsilon.sqrt()
        {
            trace!(index, peak, tail, norm, "precision replica rejected");

            return None;
        }

        Some(Sample {
            index,
            weight: peak * self.precision(index).sqrt(),
        })
    }
}

impl MemoryUsage for Subsampler {
    fn memory_used(&self) -> usize {
        2 + self.precision_hash.memory_used() + self.sketch.memory_used()
    }
}

impl PrecisionSampler {
    pub fn new(
        context: &mut Context,
        n: u64,
        accuracy: &Accuracy,
    ) -> Result<Self, SamplingError> {
        accuracy.validate()?;

        if n < 1 {
            return Err(SamplingError::InvalidDimensions);
        }

        let epsilon = accuracy.relative_error;
        let log_n = (n as f64).ln().max(1.0);

        let top_size = (50.0 * log_n / epsilon).round().max(1.0) as usize;
        let rows = log_n.round().max(1.0) as usize;
        let columns = (6.0 * top_size as f64 / log_n).round().max(1.0) as usize;
        let replicas = (4.0 / epsilon).round().max(1.0) as usize;

        let subsamplers = (0..replicas)
            .map(|_| -> Result<Subsampler, SamplingError> {
                Ok(Subsampler {
                    precision_hash: context.new_hash(),
                    sketch:         CountSketch::with_dimensions(context, columns, rows)?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let norm_sketch = L2Sketch::new(context, epsilon.min(0.5))?;

        debug!(n, replicas, rows, columns, top_size, "built precision sampler");

        Ok(PrecisionSampler {
            n,
            epsilon,
            top_size,
            subsamplers,
            norm_sketch,
        })
    }

    pub fn replicas(&self) -> usize {
        self.subsamplers.len()
    }

    /// Estimate of the L2 norm of the stream.
    pub fn norm(&self) -> f64 {
        self.norm_sketch.query()
    }
}

impl Sampler for PrecisionSampler {
    fn p(&self) -> f64 {
        2.0
    }

    fn update(&mut self, index: u64, weight: i64) -> Result<(), SamplingError> {
        if index >= self.n {
            return Err(SamplingError::IndexOutOfRange { index, n: self.n });
        }

        let weight = weight as f64;

        self.norm_sketch.update(index, weight);

        for subsampler in self.subsamplers.iter_mut() {
            subsampler.update(index, weight);
        }

        Ok(())
    }

    fn query(&mut self) -> Option<Sample> {
        let norm = self.norm();

        self.subsamplers
            .iter()
            .find_map(|s| s.query(self.n, self.top_size, self.epsilon, norm))
    }

    fn query_all(&mut self) -> Vec<Option<Sample>> {
        let norm = self.norm();

        self.subsamplers
            .iter()
            .map(|s| s.query(self.n, self.top_size, self.epsilon, norm))
            .collect()
    }
}

impl MemoryUsage for PrecisionSampler {
    fn memory_used(&self) -> usize {
        5 + self.subsamplers.len()
            + self.norm_sketch.memory_used()
            + self
                .subsamplers
                .iter()
                .map(|s| s.memory_used())
                .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::hash;

    fn accuracy(epsilon: f64) -> Accuracy {
        Accuracy::new(epsilon, 0.01, 0.01).unwrap()
    }

    #[test]
    fn test_new() {
        let mut context = Context::from_seed(0, hash::murmur);

        let s = PrecisionSampler::new(&mut context, 1000, &accuracy(0.25)).unwrap();

        assert_eq!(s.replicas(), 16);
        assert_eq!(s.top_size, 1382);
        assert_eq!(s.subsamplers[0].sketch.rows(), 7);
        assert_eq!(s.p(), 2.0);

        let tiny = PrecisionSampler::new(&mut context, 1, &accuracy(0.5)).unwrap();

        assert_eq!(tiny.subsamplers[0].sketch.rows(), 1);
    }

    #[test]
    fn test_precision() {
        let mut context = Context::from_seed(1, hash::murmur);

        let s = PrecisionSampler::new(&mut context, 100, &accuracy(0.5)).unwrap();
        let sub = &s.subsamplers[0];

        for i in 0..100 {
            let u = sub.precision(i);

            assert!(u > 0.0 && u <= 1.0);
            assert_eq!(u, sub.precision(i));
        }
    }

    #[test]
    fn test_empty() {
        let mut context = Context::from_seed(2, hash::murmur);

        let mut s = PrecisionSampler::new(&mut context, 50, &accuracy(0.5)).unwrap();

        assert_eq!(s.query(), None);
    }

    #[test]
    fn test_single() {
        let mut successes = Vec::new();

        for seed in 0..5 {
            let mut context = Context::from_seed(seed, hash::murmur);

            let mut s =
                PrecisionSampler::new(&mut context, 64, &accuracy(0.25)).unwrap();

            s.update(17, 40).unwrap();

            successes.extend(s.query_all().into_iter().flatten());
        }

        assert!(!successes.is_empty());

        for sample in successes {
            assert_eq!(sample.index, 17);
            assert!((sample.weight - 40.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_out_of_range() {
        let mut context = Context::from_seed(4, hash::murmur);

        let mut s = PrecisionSampler::new(&mut context, 8, &accuracy(0.5)).unwrap();

        assert_eq!(
            s.update(8, 1),
            Err(SamplingError::IndexOutOfRange { index: 8, n: 8 })
        );
    }
}
