//! Deterministic byte-stream generators used to expand public pads from
//! seeds, plus the sampling routines shared by the LWE and RLWE layers.
//! Both variants produce identical streams for identical seeds on every
//! platform, so seeds can be exchanged in public parameters.

use hkdf::Hkdf;
use rand_chacha::ChaCha20Rng;
use rand_core::{OsRng, RngCore, SeedableRng};
use sha2::Sha256;

use crate::params::PrngType;

pub const SEED_LEN: usize = 32;

pub type Seed = [u8; SEED_LEN];

const HKDF_BLOCK_LEN: usize = 1024;

/// HKDF-SHA256 output stream: the seed is the input keying material and
/// 1KB blocks are derived with a running counter as the info string.
pub struct HkdfPrng {
  hk: Hkdf<Sha256>,
  counter: u64,
  buf: [u8; HKDF_BLOCK_LEN],
  pos: usize,
}

impl HkdfPrng {
  fn new(seed: &Seed) -> Self {
    Self {
      hk: Hkdf::<Sha256>::new(None, seed),
      counter: 0,
      buf: [0u8; HKDF_BLOCK_LEN],
      pos: HKDF_BLOCK_LEN,
    }
  }

  fn refill(&mut self) {
    let info = self.counter.to_le_bytes();
    // 1KB is far below the HKDF output limit of 255 * 32 bytes.
    self
      .hk
      .expand(&info, &mut self.buf)
      .expect("hkdf expand within output limit");
    self.counter += 1;
    self.pos = 0;
  }

  fn fill_bytes(&mut self, dest: &mut [u8]) {
    let mut written = 0;
    while written < dest.len() {
      if self.pos == HKDF_BLOCK_LEN {
        self.refill();
      }
      let take = (dest.len() - written).min(HKDF_BLOCK_LEN - self.pos);
      dest[written..written + take]
        .copy_from_slice(&self.buf[self.pos..self.pos + take]);
      self.pos += take;
      written += take;
    }
  }
}

/// A deterministic generator expanded from a 32-byte seed.
pub enum Prng {
  Hkdf(HkdfPrng),
  ChaCha(ChaCha20Rng),
}

impl Prng {
  pub fn from_seed(prng_type: PrngType, seed: &Seed) -> Self {
    match prng_type {
      PrngType::Hkdf => Prng::Hkdf(HkdfPrng::new(seed)),
      PrngType::ChaCha => Prng::ChaCha(ChaCha20Rng::from_seed(*seed)),
    }
  }

  /// Returns a generator keyed with fresh OS entropy, for secrets and
  /// errors that never need to be re-derived.
  pub fn fresh(prng_type: PrngType) -> Self {
    Self::from_seed(prng_type, &generate_seed())
  }

  pub fn fill_bytes(&mut self, dest: &mut [u8]) {
    match self {
      Prng::Hkdf(inner) => inner.fill_bytes(dest),
      Prng::ChaCha(inner) => inner.fill_bytes(dest),
    }
  }

  pub fn next_u32(&mut self) -> u32 {
    let mut bytes = [0u8; 4];
    self.fill_bytes(&mut bytes);
    u32::from_le_bytes(bytes)
  }

  pub fn next_u64(&mut self) -> u64 {
    let mut bytes = [0u8; 8];
    self.fill_bytes(&mut bytes);
    u64::from_le_bytes(bytes)
  }

  /// Uniform value in [0, bound) by masked rejection sampling.
  pub fn uniform_below(&mut self, bound: u64) -> u64 {
    debug_assert!(bound > 1);
    let mask = u64::MAX >> (bound - 1).leading_zeros();
    loop {
      let v = self.next_u64() & mask;
      if v < bound {
        return v;
      }
    }
  }

  /// Uniform ternary value in {-1, 0, 1} by 2-bit rejection sampling.
  pub fn ternary(&mut self) -> i64 {
    loop {
      let mut byte = [0u8; 1];
      self.fill_bytes(&mut byte);
      match byte[0] & 0b11 {
        0 => return -1,
        1 => return 0,
        2 => return 1,
        _ => continue,
      }
    }
  }

  /// Centered binomial sample of the given variance, as the difference of
  /// two popcounts over 2 * variance bits each.
  pub fn centered_binomial(&mut self, variance: usize) -> i64 {
    debug_assert!(variance > 0 && variance <= 16);
    let k = 2 * variance as u32;
    let bits = self.next_u64();
    let mask = (1u64 << k) - 1;
    let a = (bits & mask).count_ones() as i64;
    let b = ((bits >> k) & mask).count_ones() as i64;
    a - b
  }
}

/// Draws a fresh seed from the operating system generator.
pub fn generate_seed() -> Seed {
  let mut seed = [0u8; SEED_LEN];
  OsRng.fill_bytes(&mut seed);
  seed
}
