//! Sketches and samplers for vectors observed through turnstile streams.
//!
//! A turnstile stream is a sequence of `(index, weight_change)` updates to an
//! implicit frequency vector that is too large to store. The structures in
//! this crate keep small randomized summaries of that vector and answer
//! approximate queries about it.
//!
//! Primitives:
//!
//! * [`SparseRecoverer`] recovers a vector with exactly one non-zero
//!   coordinate.
//! * [`CountSketch`] estimates single coordinates and norms.
//! * [`L2Sketch`] estimates the L2 norm.
//! * [`MisraGries`] bounds the maximum coordinate from above.
//!
//! Samplers, returning a coordinate with probability proportional to
//! `|weight|^p`:
//!
//! * [`DistinctSampler`], `p = 0`.
//! * [`PrecisionSampler`], `p = 2`, approximate.
//! * [`TrulyPerfectL2Sampler`], `p = 2`, exact up to a vanishing bias.
//!
//! Every randomized structure draws its parameters from a [`Context`], which
//! also decides the hash family in use.

use thiserror::Error;

mod context;
mod countsketch;
mod distinct;
pub mod hash;
mod l2sketch;
mod median;
mod misragries;
mod perfect;
mod precision;
mod recovery;
mod registry;
mod sampler;

pub use context::Context;
pub use countsketch::CountSketch;
pub use distinct::DistinctSampler;
pub use hash::{HashFactory, HashFunction};
pub use l2sketch::L2Sketch;
pub use misragries::MisraGries;
pub use perfect::TrulyPerfectL2Sampler;
pub use precision::PrecisionSampler;
pub use recovery::{Recovery, SparseRecoverer};
pub use registry::{BoxedSampler, Registry, SamplerFactory};
pub use sampler::{Accuracy, MemoryUsage, Sample, Sampler};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SamplingError {
    #[error("index {index} outside of domain [0, {n}).")]
    IndexOutOfRange { index: u64, n: u64 },
    #[error("invalid dimensions.")]
    InvalidDimensions,
    #[error("prime {prime} too small for domain size {n}.")]
    PrimeTooSmall { prime: u64, n: u64 },
    #[error("incompatible hashers.")]
    IncompatibleHashers,
    #[error("incompatible dimensions.")]
    IncompatibleDimensions,
    #[error("invalid {name}: {value}.")]
    InvalidParameter { name: &'static str, value: f64 },
    #[error("negative weight change {0} in an insertion-only stream.")]
    NegativeWeight(i64),
    #[error("unknown sampler `{0}`.")]
    UnknownSampler(String),
    #[error("unknown hash `{0}`.")]
    UnknownHash(String),
}
