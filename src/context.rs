use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaChaRng;

use crate::hash::{self, HashFactory, HashFunction};

/// A source of randomness and hash functions.
///
/// Structures draw their random parameters from a context when they are
/// built and never afterwards, so a context seeded with a fixed value
/// reproduces the same structures.
pub struct Context {
    rng:           ChaChaRng,
    hasher:        HashFactory,
    static_hashes: HashMap<u32, Arc<dyn HashFunction>>,
}

impl Context {
    pub fn new(hasher: HashFactory) -> Self {
        Context {
            rng: ChaChaRng::from_entropy(),
            hasher,
            static_hashes: HashMap::new(),
        }
    }

    pub fn from_seed(seed: u64, hasher: HashFactory) -> Self {
        Context {
            rng: ChaChaRng::seed_from_u64(seed),
            hasher,
            static_hashes: HashMap::new(),
        }
    }

    /// A uniformly random `u64`.
    pub fn random(&mut self) -> u64 {
        self.rng.gen::<u64>()
    }

    /// A uniformly random value in `[0, bound)`.
    ///
    /// `gen_range` rejects draws outside the largest multiple of `bound`,
    /// so there is no modulo bias.
    ///
    /// # Panics
    ///
    /// If `bound` is zero.
    pub fn random_below(&mut self, bound: u64) -> u64 {
        assert!(bound > 0, "bound must be positive");

        self.rng.gen_range(0, bound)
    }

    /// A uniformly random real in `[0, 1)`.
    pub fn random_real(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// A freshly parametrised hash function.
    pub fn new_hash(&mut self) -> Arc<dyn HashFunction> {
        let hasher = self.hasher;

        hasher(self)
    }

    /// The hash function memoized under `key`.
    ///
    /// Repeated calls with the same key return the same instance, which is
    /// what makes structures built from this context mergeable.
    pub fn static_hash(&mut self, key: u32) -> Arc<dyn HashFunction> {
        if let Some(hash) = self.static_hashes.get(&key) {
            return Arc::clone(hash);
        }

        let hash = self.new_hash();
        self.static_hashes.insert(key, Arc::clone(&hash));

        hash
    }
}

impl Default for Context {
    fn default() -> Self {
        Context::new(hash::murmur)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("static_hashes", &self.static_hashes.len())
            .finish()
    }
}
