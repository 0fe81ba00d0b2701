//! Hash families used to map stream indices to buckets, signs and seeds.
//!
//! All families only promise statistical independence, nothing stronger.
//! Each one is parametrised by random coefficients drawn from a [`Context`]
//! once, at construction.

use std::fmt;
use std::sync::Arc;

use crate::Context;

/// Builds a freshly parametrised hash function from a context.
pub type HashFactory = fn(&mut Context) -> Arc<dyn HashFunction>;

/// A deterministic map from `u64` to `u64`.
pub trait HashFunction: fmt::Debug + Send + Sync {
    /// Hashes to the widest range the function supports.
    fn to_u64(&self, x: u64) -> u64;

    /// Hashes to `[0, bound)`. `bound` must be positive.
    fn to_range(&self, x: u64, bound: u64) -> u64 {
        self.to_u64(x) % bound
    }

    /// Hashes to a `bits`-wide value, `bits <= 64`.
    fn to_bits(&self, x: u64, bits: u32) -> u64 {
        self.to_u64(x) & low_mask(bits)
    }

    /// Hashes to `-1` or `+1`.
    fn to_sign(&self, x: u64) -> i64 {
        self.to_bits(x, 1) as i64 * 2 - 1
    }

    /// Memory held by the function, in 8-byte words.
    fn memory_used(&self) -> usize;
}

#[inline]
fn low_mask(bits: u32) -> u64 {
    match bits {
        0 => 0,
        b if b >= 64 => u64::MAX,
        b => u64::MAX >> (64 - b),
    }
}

pub fn linear(context: &mut Context) -> Arc<dyn HashFunction> {
    Arc::new(LinearHash::random(context))
}

pub fn multiply_shift(context: &mut Context) -> Arc<dyn HashFunction> {
    Arc::new(MultiplyShiftHash::random(context))
}

pub fn murmur(context: &mut Context) -> Arc<dyn HashFunction> {
    Arc::new(MurmurHash::random(context))
}

pub fn tabulation(context: &mut Context) -> Arc<dyn HashFunction> {
    Arc::new(TabulationHash::random(context))
}

/// Pairwise independent `(a * x + b) mod P` over the Mersenne prime
/// `P = 2^61 - 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearHash {
    a: u64,
    b: u64,
}

impl LinearHash {
    pub const PRIME: u64 = (1 << 61) - 1;

    pub fn new(a: u64, b: u64) -> Self {
        LinearHash {
            a: a % Self::PRIME,
            b: b % Self::PRIME,
        }
    }

    pub fn random(context: &mut Context) -> Self {
        let a = context.random_below(Self::PRIME - 1) + 1;
        let b = context.random_below(Self::PRIME - 1) + 1;

        LinearHash { a, b }
    }
}

impl HashFunction for LinearHash {
    fn to_u64(&self, x: u64) -> u64 {
        let h = u128::from(self.a) * u128::from(x % Self::PRIME)
            + u128::from(self.b);

        (h % u128::from(Self::PRIME)) as u64
    }

    fn memory_used(&self) -> usize {
        2
    }
}

/// Multiply-shift hashing in wrapping 64-bit arithmetic. Fast, but the low
/// bits of `a * x + b` are weak, so ranges are taken from the high bits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiplyShiftHash {
    a: u64,
    b: u64,
}

impl MultiplyShiftHash {
    pub fn new(a: u64, b: u64) -> Self {
        MultiplyShiftHash { a: a | 1, b }
    }

    pub fn random(context: &mut Context) -> Self {
        Self::new(context.random(), context.random())
    }
}

impl HashFunction for MultiplyShiftHash {
    fn to_u64(&self, x: u64) -> u64 {
        self.a.wrapping_mul(x).wrapping_add(self.b)
    }

    fn to_range(&self, x: u64, bound: u64) -> u64 {
        self.to_u64(x).reverse_bits() % bound
    }

    fn to_bits(&self, x: u64, bits: u32) -> u64 {
        match bits {
            0 => 0,
            b if b >= 64 => self.to_u64(x),
            b => self.to_u64(x) >> (64 - b),
        }
    }

    fn memory_used(&self) -> usize {
        2
    }
}

/// Seeded MurmurHash3 (x86, 32-bit) applied to the bytes of a `u64`.
///
/// The 64-bit output concatenates a round over `x` and a round over `!x`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MurmurHash {
    seed: u32,
}

impl MurmurHash {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    pub fn new(seed: u32) -> Self {
        MurmurHash { seed }
    }

    pub fn random(context: &mut Context) -> Self {
        Self::new(context.random() as u32)
    }

    #[inline]
    fn scramble(k: u32) -> u32 {
        k.wrapping_mul(Self::C1)
            .rotate_left(15)
            .wrapping_mul(Self::C2)
    }

    /// Hashes the significant bytes of `x` into 32 bits.
    pub fn to_u32(&self, mut x: u64) -> u32 {
        let len = 8 - x.leading_zeros() / 8;
        let mut h = self.seed;

        if x >> 32 != 0 {
            h ^= Self::scramble(x as u32);
            h = h.rotate_left(13).wrapping_mul(5).wrapping_add(0xe654_6b64);
            x >>= 32;
        }
        h ^= Self::scramble(x as u32);
        h ^= len;

        h ^= h >> 16;
        h = h.wrapping_mul(0x85eb_ca6b);
        h ^= h >> 13;
        h = h.wrapping_mul(0xc2b2_ae35);
        h ^= h >> 16;

        h
    }
}

impl HashFunction for MurmurHash {
    fn to_u64(&self, x: u64) -> u64 {
        (u64::from(self.to_u32(x)) << 32) | u64::from(self.to_u32(!x))
    }

    fn to_range(&self, x: u64, bound: u64) -> u64 {
        if bound > u64::from(u32::MAX) {
            self.to_u64(x) % bound
        } else {
            u64::from(self.to_u32(x)) % bound
        }
    }

    fn to_bits(&self, x: u64, bits: u32) -> u64 {
        if bits > 32 {
            self.to_u64(x) & low_mask(bits)
        } else {
            u64::from(self.to_u32(x)) & low_mask(bits)
        }
    }

    fn memory_used(&self) -> usize {
        1
    }
}

/// Simple tabulation hashing: `x` is split into bytes, each byte selects a
/// random word from its own table and the words are XORed together.
#[derive(Clone, PartialEq, Eq)]
pub struct TabulationHash {
    tables: Vec<[u64; TABLE_SIZE]>,
}

const CHAR_BITS: u32 = 8;
const TABLE_SIZE: usize = 1 << CHAR_BITS;
const CHARS: usize = (64 / CHAR_BITS) as usize;

impl TabulationHash {
    pub fn random(context: &mut Context) -> Self {
        let tables = (0..CHARS)
            .map(|_| {
                let mut table = [0u64; TABLE_SIZE];
                table.iter_mut().for_each(|e| *e = context.random());
                table
            })
            .collect();

        TabulationHash { tables }
    }
}

impl fmt::Debug for TabulationHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TabulationHash")
            .field("chars", &self.tables.len())
            .field("char_bits", &CHAR_BITS)
            .finish()
    }
}

impl HashFunction for TabulationHash {
    fn to_u64(&self, mut x: u64) -> u64 {
        let mask = (TABLE_SIZE - 1) as u64;
        let mut h = 0;

        for table in &self.tables {
            h ^= table[(x & mask) as usize];
            x >>= CHAR_BITS;
        }

        h
    }

    fn memory_used(&self) -> usize {
        1 + self.tables.len() * TABLE_SIZE
    }
}
