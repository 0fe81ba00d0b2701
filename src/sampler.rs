use serde::{Deserialize, Serialize};

use crate::SamplingError;

/// Memory accounting in 8-byte words: one `u64`, `f64` or reference each.
///
/// Owned children are included, shared hash functions are not. Structures
/// whose usage grows report their upper limit.
pub trait MemoryUsage {
    fn memory_used(&self) -> usize;
}

/// A sampled coordinate together with an estimate of its weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub index:  u64,
    pub weight: f64,
}

/// Returns a coordinate of a turnstile-updated vector with probability
/// (approximately) proportional to `|weight|^p`.
///
/// A sampler is built from independent replicas. `query` returns the first
/// replica's success, `query_all` every replica's outcome, so that a caller
/// can aggregate many samples from a single pass over the stream.
pub trait Sampler: MemoryUsage {
    /// The exponent `p` of the sampled distribution.
    fn p(&self) -> f64;

    fn update(&mut self, index: u64, weight: i64) -> Result<(), SamplingError>;

    /// `None` is an expected statistical failure, not an error.
    fn query(&mut self) -> Option<Sample>;

    fn query_all(&mut self) -> Vec<Option<Sample>>;
}

/// Accuracy parameters shared by all samplers. Each sampler reads only the
/// ones it needs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Accuracy {
    pub relative_error:      f64,
    pub absolute_error:      f64,
    pub failure_probability: f64,
}

impl Accuracy {
    pub fn new(
        relative_error: f64,
        absolute_error: f64,
        failure_probability: f64,
    ) -> Result<Self, SamplingError> {
        let accuracy = Accuracy {
            relative_error,
            absolute_error,
            failure_probability,
        };

        accuracy.validate()?;

        Ok(accuracy)
    }

    pub fn validate(&self) -> Result<(), SamplingError> {
        let params = [
            ("relative error", self.relative_error),
            ("absolute error", self.absolute_error),
            ("failure probability", self.failure_probability),
        ];

        for &(name, value) in params.iter() {
            if !(value > 0.0 && value < 1.0) {
                return Err(SamplingError::InvalidParameter { name, value });
            }
        }

        Ok(())
    }
}

impl Default for Accuracy {
    fn default() -> Self {
        Accuracy {
            relative_error:      0.01,
            absolute_error:      0.01,
            failure_probability: 0.01,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Accuracy::default().validate().is_ok());

        assert_eq!(
            Accuracy::new(0.0, 0.1, 0.1).err(),
            Some(SamplingError::InvalidParameter {
                name:  "relative error",
                value: 0.0,
            })
        );

        assert!(Accuracy::new(0.5, 0.1, 1.0).is_err());
        assert!(Accuracy::new(0.5, f64::NAN, 0.1).is_err());
        assert!(Accuracy::new(0.5, 0.1, 0.1).is_ok());
    }

    #[test]
    fn test_deserialize_partial() {
        let accuracy: Accuracy =
            serde_json::from_str(r#"{"relative_error": 0.25}"#).unwrap();

        assert_eq!(accuracy.relative_error, 0.25);
        assert_eq!(accuracy.failure_probability, 0.01);

        let sample: Sample =
            serde_json::from_str(r#"{"index": 3, "weight": -2.5}"#).unwrap();

        assert_eq!(sample, Sample { index: 3, weight: -2.5 });
    }
}
