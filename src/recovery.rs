use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::{Context, MemoryUsage, SamplingError};

/// An exactly recovered coordinate and its accumulated weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recovery {
    pub index:  u64,
    pub weight: i64,
}

/// Detects and recovers a vector whose support is a single coordinate.
///
/// Keeps the exact sum of weights `S`, the exact index-weighted sum `Z` and
/// the fingerprint `V = sum(w_i * r^i) mod P` for a random point `r`. When
/// the support is exactly `{i}`, `Z / S = i` and `V = S * r^i mod P`. Any
/// other support passes the same check with probability at most `n / P`,
/// an error the structure cannot detect.
#[derive(Debug, Clone)]
pub struct SparseRecoverer {
    n:           u64,
    prime:       u64,
    point:       u64,
    sum:         i128,
    weighted:    i128,
    fingerprint: u64,
}

impl SparseRecoverer {
    /// The Mersenne prime `2^61 - 1`.
    pub const DEFAULT_PRIME: u64 = (1 << 61) - 1;

    pub fn new(context: &mut Context, n: u64) -> Result<Self, SamplingError> {
        Self::with_prime(context, n, Self::DEFAULT_PRIME)
    }

    pub fn with_prime(
        context: &mut Context,
        n: u64,
        prime: u64,
    ) -> Result<Self, SamplingError> {
        if n < 1 || prime >= 1 << 63 {
            return Err(SamplingError::InvalidDimensions);
        }
        if prime <= n {
            return Err(SamplingError::PrimeTooSmall { prime, n });
        }

        Ok(SparseRecoverer {
            n,
            prime,
            point: context.random_below(prime - 1) + 1,
            sum: 0,
            weighted: 0,
            fingerprint: 0,
        })
    }

    pub fn update(&mut self, index: u64, diff: i64) -> Result<(), SamplingError> {
        if index >= self.n {
            return Err(SamplingError::IndexOutOfRange { index, n: self.n });
        }

        let diff = i128::from(diff);

        self.sum += diff;
        self.weighted += diff * i128::from(index);

        let term = self.mul_mod(self.reduce(diff), self.pow_mod(index));
        self.fingerprint = (self.fingerprint + term) % self.prime;

        Ok(())
    }

    /// Recovers the single non-zero coordinate.
    ///
    /// An all-zero state yields `Recovery { index: 0, weight: 0 }`, which
    /// means "certainly empty" and is distinct from `None`, "not a single
    /// coordinate".
    pub fn query(&self) -> Option<Recovery> {
        if self.sum == 0 && self.weighted == 0 && self.fingerprint == 0 {
            return Some(Recovery { index: 0, weight: 0 });
        }
        if self.sum == 0 || self.weighted % self.sum != 0 {
            return None;
        }

        let index = u64::try_from(self.weighted / self.sum).ok()?;

        if index >= self.n {
            return None;
        }
        if self.fingerprint != self.mul_mod(self.reduce(self.sum), self.pow_mod(index))
        {
            return None;
        }

        Some(Recovery {
            index,
            weight: i64::try_from(self.sum).ok()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.sum == 0 && self.weighted == 0 && self.fingerprint == 0
    }

    #[inline]
    fn reduce(&self, x: i128) -> u64 {
        x.rem_euclid(i128::from(self.prime)) as u64
    }

    #[inline]
    fn mul_mod(&self, a: u64, b: u64) -> u64 {
        (u128::from(a) * u128::from(b) % u128::from(self.prime)) as u64
    }

    /// `point^exp mod prime` by repeated squaring.
    fn pow_mod(&self, mut exp: u64) -> u64 {
        let (mut base, mut acc) = (self.point, 1);

        while exp > 0 {
            if exp & 1 == 1 {
                acc = self.mul_mod(acc, base);
            }
            base = self.mul_mod(base, base);
            exp >>= 1;
        }

        acc
    }
}

impl MemoryUsage for SparseRecoverer {
    fn memory_used(&self) -> usize {
        // Two words for each of the i128 sums.
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::hash;

    fn recoverer(n: u64) -> SparseRecoverer {
        SparseRecoverer::new(&mut Context::from_seed(11, hash::murmur), n)
            .unwrap()
    }

    #[test]
    fn test_new() {
        let mut context = Context::from_seed(1, hash::murmur);

        assert_eq!(
            SparseRecoverer::new(&mut context, 0).err(),
            Some(SamplingError::InvalidDimensions)
        );

        assert_eq!(
            SparseRecoverer::with_prime(&mut context, 100, 97).err(),
            Some(SamplingError::PrimeTooSmall { prime: 97, n: 100 })
        );

        assert!(SparseRecoverer::with_prime(&mut context, 96, 97).is_ok());
    }

    #[test]
    fn test_empty() {
        let mut rec = recoverer(16);

        assert!(rec.is_empty());
        assert_eq!(rec.query(), Some(Recovery { index: 0, weight: 0 }));

        rec.update(5, 3).unwrap();
        rec.update(5, -3).unwrap();

        assert!(rec.is_empty());
        assert_eq!(rec.query(), Some(Recovery { index: 0, weight: 0 }));
    }

    #[test]
    fn test_singleton() {
        let mut rec = recoverer(1000);

        rec.update(17, 4).unwrap();

        assert_eq!(rec.query(), Some(Recovery { index: 17, weight: 4 }));

        rec.update(17, 6).unwrap();

        assert_eq!(rec.query(), Some(Recovery { index: 17, weight: 10 }));
    }

    #[test]
    fn test_negative_singleton() {
        let mut rec = recoverer(1000);

        rec.update(999, -7).unwrap();

        assert_eq!(rec.query(), Some(Recovery { index: 999, weight: -7 }));
    }

    #[test]
    fn test_collapsing_stream() {
        let mut rec = recoverer(1000);

        rec.update(1, 5).unwrap();
        rec.update(300, 2).unwrap();
        rec.update(7, 9).unwrap();
        rec.update(1, -5).unwrap();
        rec.update(7, -9).unwrap();

        assert_eq!(rec.query(), Some(Recovery { index: 300, weight: 2 }));
    }

    #[test]
    fn test_two_coordinates() {
        let mut rec = recoverer(1000);

        // Z / S = 2 is a valid index, only the fingerprint rejects it.
        rec.update(1, 1).unwrap();
        rec.update(3, 1).unwrap();

        assert_eq!(rec.query(), None);

        let mut rec = recoverer(1000);

        rec.update(2, 1).unwrap();
        rec.update(3, 1).unwrap();

        assert_eq!(rec.query(), None);
    }

    #[test]
    fn test_zero_sum_support() {
        let mut rec = recoverer(1000);

        rec.update(2, 1).unwrap();
        rec.update(3, -1).unwrap();

        assert_eq!(rec.query(), None);
    }

    #[test]
    fn test_out_of_range() {
        let mut rec = recoverer(10);

        assert_eq!(
            rec.update(10, 1),
            Err(SamplingError::IndexOutOfRange { index: 10, n: 10 })
        );
        assert!(rec.is_empty());
    }

    #[test]
    fn test_pow_mod() {
        let mut rec = recoverer(10);
        rec.point = 3;

        assert_eq!(rec.pow_mod(0), 1);
        assert_eq!(rec.pow_mod(4), 81);

        rec.prime = 7;

        assert_eq!(rec.pow_mod(6), 1);
    }

    #[test]
    fn test_false_positive_rate() {
        let (n, prime) = (10, 11);
        let trials = 2000;
        let mut false_positives = 0;

        for seed in 0..trials {
            let mut context = Context::from_seed(seed, hash::murmur);
            let mut rec = SparseRecoverer::with_prime(&mut context, n, prime).unwrap();

            // Support {2, 6} looks like index 4 with weight 2.
            rec.update(2, 1).unwrap();
            rec.update(6, 1).unwrap();

            if let Some(recovery) = rec.query() {
                assert_eq!(recovery, Recovery { index: 4, weight: 2 });
                false_positives += 1;
            }
        }

        // r^2 (r^2 - 1)^2 = 0 mod 11 only for r = 1 and r = 10.
        let rate = false_positives as f64 / trials as f64;

        assert!(rate > 0.1 && rate < 0.3, "{}", rate);
        assert!(rate <= n as f64 / prime as f64);
    }

    #[test]
    fn test_no_false_positive_with_large_prime() {
        for seed in 0..200 {
            let mut context = Context::from_seed(seed, hash::murmur);
            let mut rec = SparseRecoverer::new(&mut context, 10).unwrap();

            rec.update(2, 1).unwrap();
            rec.update(6, 1).unwrap();

            assert_eq!(rec.query(), None);
        }
    }
}
