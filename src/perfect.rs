use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;
use tracing::{debug, trace};

use crate::{
    Accuracy, Context, MemoryUsage, MisraGries, Sample, Sampler, SamplingError,
};

/// L2 sampler for insertion-only streams whose output distribution converges
/// to exactly `f_i^2 / ||f||_2^2`.
///
/// The stream is viewed as a sequence of unit steps. Every replica keeps one
/// step chosen uniformly at random, as in reservoir sampling, and anchors to
/// the index that step belongs to, so an index is anchored with probability
/// `f_i / ||f||_1`. Instead of flipping a coin at every step, the replica
/// jumps straight to its next activation step `ceil(t / u)` with `u`
/// uniform.
///
/// After the anchoring step, `c` further steps of the anchored index are
/// counted; `c` is uniform in `[0, f_i)`. Accepting with probability
/// `(2c + 1) / (2 * max_j f_j - 1)` sums over `c` to `f_i^2`, so an accepted
/// replica returns `i` with probability proportional to `f_i^2`. The maximum
/// weight is bounded from above by a [`MisraGries`] summary.
///
/// Running counts are kept only for anchored indices, in a table of
/// reference-counted records.
#[derive(Debug, Clone)]
pub struct TrulyPerfectL2Sampler {
    n:           u64,
    step:        u64,
    rng:         ChaChaRng,
    subsamplers: Vec<Subsampler>,
    schedule:    BinaryHeap<Reverse<(u64, usize)>>,
    counters:    HashMap<u64, Counter>,
    max_weight:  MisraGries,
}

#[derive(Debug, Clone)]
struct Subsampler {
    anchor:     Option<u64>,
    snapshot:   i64,
    activation: u64,
}

#[derive(Debug, Clone, PartialEq)]
struct Counter {
    count: i64,
    refs:  usize,
}

impl TrulyPerfectL2Sampler {
    pub fn new(
        context: &mut Context,
        n: u64,
        accuracy: &Accuracy,
    ) -> Result<Self, SamplingError> {
        accuracy.validate()?;

        if n < 1 {
            return Err(SamplingError::InvalidDimensions);
        }

        // A replica accepts with probability at least 1 / sqrt(n).
        let replicas = ((n as f64).sqrt() * (1.0 / accuracy.failure_probability).ln())
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

        let subsamplers = vec![
            Subsampler {
                anchor:     None,
                snapshot:   0,
                activation: 1,
            };
            replicas
        ];

        let schedule = (0..replicas).map(|id| Reverse((1, id))).collect();

        debug!(n, replicas, "built truly perfect L2 sampler");

        Ok(TrulyPerfectL2Sampler {
            n,
            step: 0,
            rng: ChaChaRng::seed_from_u64(context.random()),
            subsamplers,
            schedule,
            counters: HashMap::new(),
            max_weight: MisraGries::new(replicas)?,
        })
    }

    pub fn replicas(&self) -> usize {
        self.subsamplers.len()
    }

    /// Number of indices currently anchored by at least one replica.
    pub fn anchored(&self) -> usize {
        self.counters.len()
    }

    fn next_activation(&self) -> u64 {
        self.schedule
            .peek()
            .map(|Reverse((activation, _))| *activation)
            .unwrap_or(u64::MAX)
    }

    /// Moves the replica's anchor to `index`, keeping the counter table's
    /// reference counts exact.
    fn reanchor(&mut self, id: usize, index: u64) {
        let previous = self.subsamplers[id].anchor;

        if previous == Some(index) {
            return;
        }

        if let Some(previous) = previous {
            let released = match self.counters.get_mut(&previous) {
                Some(counter) => {
                    counter.refs -= 1;
                    counter.refs == 0
                },
                None => false,
            };

            if released {
                self.counters.remove(&previous);
            }
        }

        if let Some(counter) = self.counters.get_mut(&index) {
            counter.refs += 1;
        }

        self.subsamplers[id].anchor = Some(index);
    }

    fn activate(&mut self, id: usize, index: u64, count: i64) {
        self.reanchor(id, index);

        let mut activation = self.subsamplers[id].activation;

        while activation <= self.step && activation < u64::MAX {
            self.subsamplers[id].snapshot = count - (self.step - activation) as i64;

            // The replica keeps step t with probability 1 / t, so the next
            // step it keeps after `activation` is `ceil(activation / u)`.
            let u: f64 = self.rng.gen();
            let next = (activation as f64 / u).ceil();

            activation = if next.is_finite() && next < u64::MAX as f64 {
                (next as u64).max(activation + 1)
            } else {
                u64::MAX
            };
        }

        trace!(id, index, activation, "replica re-anchored");

        self.subsamplers[id].activation = activation;
        self.schedule.push(Reverse((activation, id)));
    }
}

impl Sampler for TrulyPerfectL2Sampler {
    fn p(&self) -> f64 {
        2.0
    }

    fn update(&mut self, index: u64, weight: i64) -> Result<(), SamplingError> {
        if index >= self.n {
            return Err(SamplingError::IndexOutOfRange { index, n: self.n });
        }
        if weight < 0 {
            return Err(SamplingError::NegativeWeight(weight));
        }
        if weight == 0 {
            return Ok(());
        }

        self.step = self.step.saturating_add(weight as u64);
        self.max_weight.update(index, weight);

        if let Some(counter) = self.counters.get_mut(&index) {
            counter.count += weight;
        } else if self.next_activation() <= self.step {
            self.counters.insert(index, Counter { count: weight, refs: 0 });
        } else {
            return Ok(());
        }

        let count = self.counters[&index].count;

        while self.next_activation() <= self.step {
            if let Some(Reverse((_, id))) = self.schedule.pop() {
                self.activate(id, index, count);
            }
        }

        Ok(())
    }

    fn query(&mut self) -> Option<Sample> {
        let ceiling = 2 * self.max_weight.query_max() - 1;

        if ceiling < 1 {
            return None;
        }

        for id in 0..self.subsamplers.len() {
            if let Some(sample) = self.try_accept(id, ceiling) {
                return Some(sample);
            }
        }

        trace!(ceiling, "truly perfect L2 sampler failed");

        None
    }

    fn query_all(&mut self) -> Vec<Option<Sample>> {
        let ceiling = 2 * self.max_weight.query_max() - 1;

        if ceiling < 1 {
            return vec![None; self.subsamplers.len()];
        }

        (0..self.subsamplers.len())
            .map(|id| self.try_accept(id, ceiling))
            .collect()
    }
}

impl TrulyPerfectL2Sampler {
    /// Rejection step of replica `id` against the weight ceiling
    /// `2 * max_weight - 1`.
    fn try_accept(&mut self, id: usize, ceiling: i64) -> Option<Sample> {
        let subsampler = &self.subsamplers[id];
        let index = subsampler.anchor?;
        let since = self.counters.get(&index)?.count - subsampler.snapshot;
        let weight = 2 * since + 1;

        if (self.rng.gen_range(0, ceiling) as i64) < weight {
            Some(Sample {
                index,
                weight: (since + 1) as f64,
            })
        } else {
            None
        }
    }
}

impl MemoryUsage for TrulyPerfectL2Sampler {
    fn memory_used(&self) -> usize {
        let replicas = self.subsamplers.len();

        // Per replica: its own three words, a heap entry and, at most, one
        // counter record with its table overhead.
        6 + 3 * replicas + 2 * replicas + 4 * replicas + self.max_weight.memory_used()
    }
}
