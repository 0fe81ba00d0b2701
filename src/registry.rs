use std::collections::HashMap;
use std::fmt;

use crate::hash::{self, HashFactory};
use crate::{
    Accuracy, Context, DistinctSampler, PrecisionSampler, Sampler,
    SamplingError, TrulyPerfectL2Sampler,
};

pub type BoxedSampler = Box<dyn Sampler + Send>;

/// Builds a sampler over the domain `[0, n)`.
pub type SamplerFactory =
    fn(&mut Context, u64, &Accuracy) -> Result<BoxedSampler, SamplingError>;

/// Samplers and hash families by name.
#[derive(Clone)]
pub struct Registry {
    samplers: HashMap<String, SamplerFactory>,
    hashes:   HashMap<String, HashFactory>,
}

fn distinct(
    context: &mut Context,
    n: u64,
    accuracy: &Accuracy,
) -> Result<BoxedSampler, SamplingError> {
    Ok(Box::new(DistinctSampler::new(context, n, accuracy)?))
}

fn precision(
    context: &mut Context,
    n: u64,
    accuracy: &Accuracy,
) -> Result<BoxedSampler, SamplingError> {
    Ok(Box::new(PrecisionSampler::new(context, n, accuracy)?))
}

fn truly_perfect_l2(
    context: &mut Context,
    n: u64,
    accuracy: &Accuracy,
) -> Result<BoxedSampler, SamplingError> {
    Ok(Box::new(TrulyPerfectL2Sampler::new(context, n, accuracy)?))
}

impl Registry {
    /// A registry without any entries.
    pub fn empty() -> Self {
        Registry {
            samplers: HashMap::new(),
            hashes:   HashMap::new(),
        }
    }

    pub fn register_sampler(&mut self, name: &str, factory: SamplerFactory) {
        self.samplers.insert(name.to_owned(), factory);
    }

    pub fn register_hash(&mut self, name: &str, factory: HashFactory) {
        self.hashes.insert(name.to_owned(), factory);
    }

    pub fn sampler(&self, name: &str) -> Result<SamplerFactory, SamplingError> {
        self.samplers
            .get(name)
            .copied()
            .ok_or_else(|| SamplingError::UnknownSampler(name.to_owned()))
    }

    pub fn hash(&self, name: &str) -> Result<HashFactory, SamplingError> {
        self.hashes
            .get(name)
            .copied()
            .ok_or_else(|| SamplingError::UnknownHash(name.to_owned()))
    }

    /// Registered sampler names, sorted.
    pub fn sampler_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.samplers.keys().map(String::as_str).collect();

        names.sort_unstable();
        names
    }

    /// Registered hash names, sorted.
    pub fn hash_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.hashes.keys().map(String::as_str).collect();

        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("samplers", &self.sampler_names())
            .field("hashes", &self.hash_names())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        let mut registry = Registry::empty();

        registry.register_sampler("distinct", distinct);
        registry.register_sampler("precision", precision);
        registry.register_sampler("truly-perfect-l2", truly_perfect_l2);

        registry.register_hash("linear", hash::linear);
        registry.register_hash("multiply-shift", hash::multiply_shift);
        registry.register_hash("murmur", hash::murmur);
        registry.register_hash("tabulation", hash::tabulation);

        registry
    }
}
