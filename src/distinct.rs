use std::sync::Arc;

use tracing::{debug, trace};

use crate::{
    Accuracy, Context, HashFunction, MemoryUsage, Sample, Sampler,
    SamplingError, SparseRecoverer,
};

/// L0 sampler: returns a uniformly random coordinate of the support.
///
/// Each replica subsamples the domain geometrically, level `l` keeping an
/// index with probability `2^-l`, and runs a [`SparseRecoverer`] per level.
/// Some level is likely to retain exactly one coordinate of the support,
/// which that level's recoverer then reports exactly.
#[derive(Debug, Clone)]
pub struct DistinctSampler {
    n:           u64,
    subsamplers: Vec<Subsampler>,
}

#[derive(Debug, Clone)]
struct Subsampler {
    hasher: Arc<dyn HashFunction>,
    levels: Vec<SparseRecoverer>,
}

impl Subsampler {
    fn new(context: &mut Context, n: u64, log2n: u32) -> Result<Self, SamplingError> {
        let levels = (0..=log2n)
            .map(|_| SparseRecoverer::new(context, n))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Subsampler {
            hasher: context.new_hash(),
            levels,
        })
    }

    fn update(&mut self, index: u64, weight: i64) -> Result<(), SamplingError> {
        let log2n = (self.levels.len() - 1) as u32;

        self.levels[0].update(index, weight)?;

        let mut bits = self.hasher.to_bits(index, log2n);
        let mut level = 1;

        while bits & 1 == 1 {
            self.levels[level].update(index, weight)?;
            bits >>= 1;
            level += 1;
        }

        Ok(())
    }

    fn query(&self) -> Option<Sample> {
        self.levels
            .iter()
            .filter_map(|level| level.query())
            .find(|recovery| recovery.weight != 0)
            .map(|recovery| Sample {
                index:  recovery.index,
                weight: recovery.weight as f64,
            })
    }
}

impl MemoryUsage for Subsampler {
    fn memory_used(&self) -> usize {
        2 + self.levels.len()
            + self.hasher.memory_used()
            + self.levels.iter().map(|l| l.memory_used()).sum::<usize>()
    }
}

impl DistinctSampler {
    pub fn new(
        context: &mut Context,
        n: u64,
        accuracy: &Accuracy,
    ) -> Result<Self, SamplingError> {
        accuracy.validate()?;

        if n < 1 {
            return Err(SamplingError::InvalidDimensions);
        }

        // A replica succeeds with probability at least 1/4.
        let replicas = (accuracy.failure_probability.ln() / 0.75f64.ln())
            .ceil()
            .max(1.0) as usize;

        Self::with_replicas(context, n, replicas)
    }

    pub fn with_replicas(
        context: &mut Context,
        n: u64,
        replicas: usize,
    ) -> Result<Self, SamplingError> {
        if n < 1 || replicas < 1 {
            return Err(SamplingError::InvalidDimensions);
        }

        let log2n = 64 - (n - 1).leading_zeros();

        let subsamplers = (0..replicas)
            .map(|_| Subsampler::new(context, n, log2n))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(n, replicas, levels = log2n + 1, "built distinct sampler");

        Ok(DistinctSampler { n, subsamplers })
    }

    pub fn replicas(&self) -> usize {
        self.subsamplers.len()
    }
}

impl Sampler for DistinctSampler {
    fn p(&self) -> f64 {
        0.0
    }

    fn update(&mut self, index: u64, weight: i64) -> Result<(), SamplingError> {
        if index >= self.n {
            return Err(SamplingError::IndexOutOfRange { index, n: self.n });
        }

        for subsampler in self.subsamplers.iter_mut() {
            subsampler.update(index, weight)?;
        }

        Ok(())
    }

    fn query(&mut self) -> Option<Sample> {
        let sample = self.subsamplers.iter().find_map(Subsampler::query);

        if sample.is_none() {
            trace!(replicas = self.subsamplers.len(), "distinct sampler failed");
        }

        sample
    }

    fn query_all(&mut self) -> Vec<Option<Sample>> {
        self.subsamplers.iter().map(Subsampler::query).collect()
    }
}

impl MemoryUsage for DistinctSampler {
    fn memory_used(&self) -> usize {
        2 + self.subsamplers.len()
            + self
                .subsamplers
                .iter()
                .map(|s| s.memory_used())
                .sum::<usize>()
    }
}
