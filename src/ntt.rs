//! Negacyclic number-theoretic transforms over NTT-friendly prime moduli.
//!
//! The forward transform maps coefficients of f in Z_q[X]/(X^N + 1) to the
//! evaluation vector f(psi^(2j+1)) for j = 0..N in natural order, where psi
//! is a primitive 2N-th root of unity. Keeping evaluations in natural odd
//! order lets the slot encoder address them by exponent directly.

use crate::errors::{ErrorInternalArithmetic, ResultBoxedError};
use crate::modarith::MontgomeryContext;

#[derive(Clone, Debug)]
pub struct NttContext {
  mont: MontgomeryContext,
  n: usize,
  // psi^i and psi^{-i}, Montgomery domain, used to fold the negacyclic
  // twist into a cyclic transform of size N.
  psi_pows: Vec<u64>,
  psi_inv_pows: Vec<u64>,
  // w^i and w^{-i} for w = psi^2, the cyclic twiddles.
  w_pows: Vec<u64>,
  w_inv_pows: Vec<u64>,
  n_inv: u64,
}

impl NttContext {
  pub fn new(modulus: u64, log_n: usize) -> ResultBoxedError<Self> {
    let mont = MontgomeryContext::new(modulus)?;
    let n = 1usize << log_n;
    if (modulus - 1) % (2 * n as u64) != 0 {
      return Err(Box::new(ErrorInternalArithmetic::new(
        "modulus does not support a negacyclic transform of this size",
      )));
    }
    let psi = find_primitive_root(&mont, n as u64)?;
    let psi_inv = mont.inv(psi);
    let w = mont.mul(psi, psi);
    let w_inv = mont.inv(w);

    let mut psi_pows = Vec::with_capacity(n);
    let mut psi_inv_pows = Vec::with_capacity(n);
    let mut w_pows = Vec::with_capacity(n);
    let mut w_inv_pows = Vec::with_capacity(n);
    let (mut p, mut pi, mut c, mut ci) =
      (mont.one(), mont.one(), mont.one(), mont.one());
    for _ in 0..n {
      psi_pows.push(p);
      psi_inv_pows.push(pi);
      w_pows.push(c);
      w_inv_pows.push(ci);
      p = mont.mul(p, psi);
      pi = mont.mul(pi, psi_inv);
      c = mont.mul(c, w);
      ci = mont.mul(ci, w_inv);
    }
    let n_inv = mont.inv(mont.to_mont(n as u64));
    Ok(Self {
      mont,
      n,
      psi_pows,
      psi_inv_pows,
      w_pows,
      w_inv_pows,
      n_inv,
    })
  }

  pub fn mont(&self) -> &MontgomeryContext {
    &self.mont
  }

  pub fn n(&self) -> usize {
    self.n
  }

  /// In-place forward transform of Montgomery-domain coefficients.
  pub fn forward(&self, a: &mut [u64]) {
    debug_assert_eq!(a.len(), self.n);
    for (c, psi) in a.iter_mut().zip(self.psi_pows.iter()) {
      *c = self.mont.mul(*c, *psi);
    }
    self.cyclic(a, &self.w_pows);
  }

  /// In-place inverse transform back to Montgomery-domain coefficients.
  pub fn backward(&self, a: &mut [u64]) {
    debug_assert_eq!(a.len(), self.n);
    self.cyclic(a, &self.w_inv_pows);
    for (c, psi_inv) in a.iter_mut().zip(self.psi_inv_pows.iter()) {
      *c = self.mont.mul(self.mont.mul(*c, self.n_inv), *psi_inv);
    }
  }

  // Iterative Cooley-Tukey transform: bit-reversal permutation followed by
  // butterflies, producing evaluations at w^j in natural order.
  fn cyclic(&self, a: &mut [u64], twiddles: &[u64]) {
    let n = self.n;
    let mut j = 0usize;
    for i in 1..n {
      let mut bit = n >> 1;
      while j & bit != 0 {
        j ^= bit;
        bit >>= 1;
      }
      j |= bit;
      if i < j {
        a.swap(i, j);
      }
    }
    let mut length = 2;
    while length <= n {
      let step = n / length;
      for start in (0..n).step_by(length) {
        for k in 0..length / 2 {
          let w = twiddles[k * step];
          let u = a[start + k];
          let v = self.mont.mul(a[start + k + length / 2], w);
          a[start + k] = self.mont.add(u, v);
          a[start + k + length / 2] = self.mont.sub(u, v);
        }
      }
      length <<= 1;
    }
  }
}

// Searches small candidates c and returns c^((q-1)/2N) once it has order
// exactly 2N, i.e. its N-th power is -1.
fn find_primitive_root(
  mont: &MontgomeryContext,
  n: u64,
) -> ResultBoxedError<u64> {
  let q = mont.modulus();
  let exp = (q - 1) / (2 * n);
  let minus_one = mont.to_mont(q - 1);
  for c in 2..1000u64 {
    let psi = mont.pow(mont.to_mont(c), exp);
    if mont.pow(psi, n) == minus_one {
      return Ok(psi);
    }
  }
  Err(Box::new(ErrorInternalArithmetic::new(
    "no primitive 2N-th root of unity found",
  )))
}
