//! Modular integer arithmetic in Montgomery form, CRT interpolation across
//! an RNS basis, and balanced modulus conversion.

use crate::errors::{ErrorInternalArithmetic, ErrorInvalidArgument, ResultBoxedError};
use crate::prng::Prng;

/// Montgomery arithmetic for an odd modulus below 2^63, with R = 2^64.
/// Values handled by `mul`, `pow` and friends live in the Montgomery
/// domain; `to_mont` / `from_mont` convert at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub struct MontgomeryContext {
  modulus: u64,
  // R^2 mod q, used to enter the Montgomery domain.
  r2: u64,
  // -q^{-1} mod 2^64.
  neg_inv: u64,
  // R mod q, the Montgomery representation of 1.
  one: u64,
}

impl MontgomeryContext {
  pub fn new(modulus: u64) -> ResultBoxedError<Self> {
    if modulus < 3 || modulus % 2 == 0 || modulus >= (1u64 << 63) {
      return Err(Box::new(ErrorInvalidArgument::new(
        "modulus must be an odd integer in (2, 2^63)",
      )));
    }
    // Newton iteration for q^{-1} mod 2^64; five rounds double the
    // precision from the 2^3-correct seed to full width.
    let mut inv = modulus;
    for _ in 0..5 {
      inv = inv.wrapping_mul(2u64.wrapping_sub(modulus.wrapping_mul(inv)));
    }
    debug_assert_eq!(modulus.wrapping_mul(inv), 1);
    let neg_inv = inv.wrapping_neg();
    let r2 = (((1u128 << 64) % modulus as u128).pow(2) % modulus as u128) as u64;
    let one = ((1u128 << 64) % modulus as u128) as u64;
    Ok(Self {
      modulus,
      r2,
      neg_inv,
      one,
    })
  }

  pub fn modulus(&self) -> u64 {
    self.modulus
  }

  /// The Montgomery representation of 1.
  pub fn one(&self) -> u64 {
    self.one
  }

  fn redc(&self, t: u128) -> u64 {
    let m = (t as u64).wrapping_mul(self.neg_inv);
    let reduced = ((t + m as u128 * self.modulus as u128) >> 64) as u64;
    if reduced >= self.modulus {
      reduced - self.modulus
    } else {
      reduced
    }
  }

  pub fn to_mont(&self, x: u64) -> u64 {
    debug_assert!(x < self.modulus);
    self.redc(x as u128 * self.r2 as u128)
  }

  pub fn from_mont(&self, x: u64) -> u64 {
    self.redc(x as u128)
  }

  pub fn mul(&self, a: u64, b: u64) -> u64 {
    self.redc(a as u128 * b as u128)
  }

  pub fn add(&self, a: u64, b: u64) -> u64 {
    let sum = a + b;
    if sum >= self.modulus {
      sum - self.modulus
    } else {
      sum
    }
  }

  pub fn sub(&self, a: u64, b: u64) -> u64 {
    if a >= b {
      a - b
    } else {
      a + self.modulus - b
    }
  }

  pub fn neg(&self, a: u64) -> u64 {
    if a == 0 {
      0
    } else {
      self.modulus - a
    }
  }

  pub fn pow(&self, base: u64, mut exp: u64) -> u64 {
    let mut acc = self.one;
    let mut cur = base;
    while exp > 0 {
      if exp & 1 == 1 {
        acc = self.mul(acc, cur);
      }
      cur = self.mul(cur, cur);
      exp >>= 1;
    }
    acc
  }

  /// Multiplicative inverse for prime moduli, via Fermat.
  pub fn inv(&self, a: u64) -> u64 {
    self.pow(a, self.modulus - 2)
  }

  /// Imports a small signed integer as a plain (non-Montgomery) residue.
  pub fn from_signed(&self, v: i64) -> u64 {
    let m = self.modulus as i64;
    let r = v % m;
    if r < 0 {
      (r + m) as u64
    } else {
      r as u64
    }
  }

  /// Draws a uniform residue from the generator. A uniform value is
  /// uniform in either domain, so the result is used directly as a
  /// Montgomery-domain value.
  pub fn sample_uniform(&self, prng: &mut Prng) -> u64 {
    prng.uniform_below(self.modulus)
  }
}

/// Precomputed CRT interpolation data for a basis of coprime moduli whose
/// product fits u128.
#[derive(Clone, Debug)]
pub struct CrtContext {
  moduli: Vec<u64>,
  monts: Vec<MontgomeryContext>,
  product: u128,
  p_hats: Vec<u128>,
  // \hat{p}_i^{-1} mod p_i, in the Montgomery domain of p_i.
  p_hat_invs: Vec<u64>,
}

impl CrtContext {
  pub fn new(moduli: &[u64]) -> ResultBoxedError<Self> {
    if moduli.is_empty() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "CRT basis must not be empty",
      )));
    }
    let mut product: u128 = 1;
    for &m in moduli {
      product = product.checked_mul(m as u128).ok_or_else(|| {
        Box::new(ErrorInternalArithmetic::new("CRT modulus product overflows"))
          as Box<dyn std::error::Error>
      })?;
    }
    let mut monts = Vec::with_capacity(moduli.len());
    let mut p_hats = Vec::with_capacity(moduli.len());
    let mut p_hat_invs = Vec::with_capacity(moduli.len());
    for &m in moduli {
      let mont = MontgomeryContext::new(m)?;
      let p_hat = product / m as u128;
      let p_hat_red = (p_hat % m as u128) as u64;
      if p_hat_red == 0 {
        return Err(Box::new(ErrorInvalidArgument::new(
          "CRT moduli must be pairwise coprime",
        )));
      }
      let inv = mont.inv(mont.to_mont(p_hat_red));
      p_hats.push(p_hat);
      p_hat_invs.push(inv);
      monts.push(mont);
    }
    Ok(Self {
      moduli: moduli.to_vec(),
      monts,
      product,
      p_hats,
      p_hat_invs,
    })
  }

  pub fn product(&self) -> u128 {
    self.product
  }

  pub fn moduli(&self) -> &[u64] {
    &self.moduli
  }

  /// Lifts plain residues to the integer in [0, product) they represent.
  pub fn interpolate(&self, residues: &[u64]) -> u128 {
    debug_assert_eq!(residues.len(), self.moduli.len());
    let mut acc: u128 = 0;
    for (i, &r) in residues.iter().enumerate() {
      let mont = &self.monts[i];
      // (r * \hat{p}_i^{-1} mod p_i) * \hat{p}_i <= product, so the sum
      // is reduced after every term to stay within u128.
      let scaled = mont.from_mont(mont.mul(mont.to_mont(r), self.p_hat_invs[i]));
      acc = (acc + scaled as u128 * self.p_hats[i]) % self.product;
    }
    acc
  }
}

/// Balanced modulus conversion: lifts `x` mod `from` into the symmetric
/// interval around zero, then reduces into [0, to).
pub fn convert_modulus(x: u128, from: u128, to: u128, from_half: u128) -> u128 {
  debug_assert!(x < from);
  if x >= from_half {
    let neg = (from - x) % to;
    if neg == 0 {
      0
    } else {
      to - neg
    }
  } else {
    x % to
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::PrngType;
  use crate::prng::SEED_LEN;

  const Q0: u64 = 35184371884033;
  const Q1: u64 = 35184371703809;

  #[test]
  fn montgomery_round_trip_and_mul() {
    let mont = MontgomeryContext::new(Q0).unwrap();
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[5u8; SEED_LEN]);
    for _ in 0..200 {
      let a = prng.uniform_below(Q0);
      let b = prng.uniform_below(Q0);
      let am = mont.to_mont(a);
      let bm = mont.to_mont(b);
      assert_eq!(mont.from_mont(am), a);
      let expected = ((a as u128 * b as u128) % Q0 as u128) as u64;
      assert_eq!(mont.from_mont(mont.mul(am, bm)), expected);
    }
  }

  #[test]
  fn montgomery_inverse() {
    let mont = MontgomeryContext::new(Q1).unwrap();
    for x in [2u64, 65537, Q1 - 1].iter() {
      let xm = mont.to_mont(*x);
      assert_eq!(mont.mul(xm, mont.inv(xm)), mont.one());
    }
  }

  #[test]
  fn montgomery_rejects_even_modulus() {
    assert!(MontgomeryContext::new(1 << 20).is_err());
  }

  #[test]
  fn signed_import_wraps() {
    let mont = MontgomeryContext::new(2056193).unwrap();
    assert_eq!(mont.from_signed(-1), 2056192);
    assert_eq!(mont.from_signed(-2056193), 0);
    assert_eq!(mont.from_signed(5), 5);
  }

  #[test]
  fn crt_interpolation_recovers_value() {
    let crt = CrtContext::new(&[2056193, 1990657]).unwrap();
    let p = crt.product();
    for &x in &[0u128, 1, 12345678901, p - 1] {
      let residues = vec![
        (x % 2056193) as u64,
        (x % 1990657) as u64,
      ];
      assert_eq!(crt.interpolate(&residues), x);
    }
  }

  #[test]
  fn crt_identity_through_lwe_modulus() {
    // values bounded by half the product round-trip through the residue
    // representation and balanced conversion back to mod 2^32
    let ts = [2056193u64, 1990657];
    let crt = CrtContext::new(&ts).unwrap();
    let p = crt.product();
    let q_lwe: u128 = 1 << 32;
    for &v in &[0u32, 1, 77, u32::MAX, u32::MAX - 12345, 1 << 31] {
      // balanced lift of v mod 2^32
      let signed = if (v as u128) >= q_lwe / 2 {
        v as i64 - (1i64 << 32)
      } else {
        v as i64
      };
      let residues: Vec<u64> = ts
        .iter()
        .map(|&t| {
          let m = t as i64;
          (((signed % m) + m) % m) as u64
        })
        .collect();
      let lifted = crt.interpolate(&residues);
      let back = convert_modulus(lifted, p, q_lwe, p / 2);
      assert_eq!(back as u32, v);
    }
  }

  #[test]
  fn convert_modulus_balances() {
    assert_eq!(convert_modulus(9, 10, 7, 5), 6); // 9 - 10 = -1 -> 6 mod 7
    assert_eq!(convert_modulus(3, 10, 7, 5), 3);
    assert_eq!(convert_modulus(5, 10, 7, 5), 2); // -5 -> 2 mod 7
  }
}
