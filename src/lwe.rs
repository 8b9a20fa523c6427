//! Symmetric LWE over the modulus 2^32, realized with native u32
//! wraparound: deterministic pad expansion, ternary keys, in-place
//! encryption against a shared pad, and rounding-based error removal.

use crate::errors::{ErrorInvalidArgument, ResultBoxedError};
use crate::prng::Prng;

pub type LweVector = Vec<u32>;
/// Row-major matrix over the LWE modulus.
pub type LweMatrix = Vec<Vec<u32>>;

/// Deterministically fills a rows x cols matrix from the generator.
pub fn expand_pad(rows: usize, cols: usize, prng: &mut Prng) -> LweMatrix {
  (0..rows)
    .map(|_| (0..cols).map(|_| prng.next_u32()).collect())
    .collect()
}

/// Inner product of two u32 vectors with wraparound.
pub fn vec_mult(row: &[u32], col: &[u32]) -> u32 {
  debug_assert_eq!(row.len(), col.len());
  let mut acc = 0u32;
  for (a, b) in row.iter().zip(col.iter()) {
    acc = acc.wrapping_add(a.wrapping_mul(*b));
  }
  acc
}

/// A ternary LWE secret with entries in {0, 1, 2^32 - 1}.
#[derive(Clone, Debug)]
pub struct SymmetricLweKey {
  key: Vec<u32>,
}

impl SymmetricLweKey {
  pub fn sample(dim: usize, prng: &mut Prng) -> Self {
    let key = (0..dim).map(|_| prng.ternary() as u32).collect();
    Self { key }
  }

  pub fn key(&self) -> &[u32] {
    &self.key
  }

  /// Encrypts the plaintext vector in place against the shared pad:
  /// values[r] = pad[r] . s + (values[r] << log_scale) + e_r.
  pub fn encrypt_from_pad_in_place(
    &self,
    values: &mut [u32],
    pad: &[Vec<u32>],
    log_scale: usize,
    error_variance: usize,
    prng: &mut Prng,
  ) -> ResultBoxedError<()> {
    if pad.len() != values.len() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "pad height does not match plaintext length",
      )));
    }
    for (value, pad_row) in values.iter_mut().zip(pad.iter()) {
      if pad_row.len() != self.key.len() {
        return Err(Box::new(ErrorInvalidArgument::new(
          "pad width does not match key dimension",
        )));
      }
      let mask = vec_mult(pad_row, &self.key);
      let error = prng.centered_binomial(error_variance) as u32;
      *value = mask
        .wrapping_add(*value << log_scale)
        .wrapping_add(error);
    }
    Ok(())
  }
}

/// Rounds each entry to the nearest multiple of Delta = 2^log_delta and
/// divides, leaving the plaintext. Correct whenever |error| < Delta / 2.
pub fn remove_error_in_place(values: &mut [u32], log_delta: usize) {
  let half = 1u32 << (log_delta - 1);
  let mask = (1u64 << (32 - log_delta)) as u32 - 1;
  for value in values.iter_mut() {
    *value = (value.wrapping_add(half) >> log_delta) & mask;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::PrngType;
  use crate::prng::SEED_LEN;

  const DIM: usize = 64;
  const LOG_DELTA: usize = 24; // 8 plaintext bits

  #[test]
  fn pad_expansion_is_deterministic() {
    let seed = [17u8; SEED_LEN];
    let mut a = Prng::from_seed(PrngType::Hkdf, &seed);
    let mut b = Prng::from_seed(PrngType::Hkdf, &seed);
    assert_eq!(expand_pad(16, DIM, &mut a), expand_pad(16, DIM, &mut b));
  }

  #[test]
  fn encrypt_then_strip_key_and_error() {
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[18u8; SEED_LEN]);
    let key = SymmetricLweKey::sample(DIM, &mut prng);
    let pad = expand_pad(32, DIM, &mut prng);
    let plaintext: Vec<u32> = (0..32).map(|i| (i * 7) % 256).collect();

    let mut values = plaintext.clone();
    key
      .encrypt_from_pad_in_place(&mut values, &pad, LOG_DELTA, 8, &mut prng)
      .unwrap();

    // subtract pad . s, then round the error away
    for (v, pad_row) in values.iter_mut().zip(pad.iter()) {
      *v = v.wrapping_sub(vec_mult(pad_row, key.key()));
    }
    remove_error_in_place(&mut values, LOG_DELTA);
    assert_eq!(values, plaintext);
  }

  #[test]
  fn encrypt_rejects_mismatched_pad() {
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[19u8; SEED_LEN]);
    let key = SymmetricLweKey::sample(DIM, &mut prng);
    let pad = expand_pad(8, DIM, &mut prng);
    let mut values = vec![0u32; 16];
    assert!(key
      .encrypt_from_pad_in_place(&mut values, &pad, LOG_DELTA, 8, &mut prng)
      .is_err());
  }

  #[test]
  fn remove_error_handles_negative_noise() {
    // m = 0 with a small negative error wraps around the modulus
    let mut values = vec![0u32.wrapping_sub(3), (5u32 << LOG_DELTA) + 7];
    remove_error_in_place(&mut values, LOG_DELTA);
    assert_eq!(values, vec![0, 5]);
  }
}
