//! Polynomials in Rq = Zq[X]/(X^N + 1) under a residue number system, and
//! the per-plaintext-modulus context holding transforms, the slot encoder,
//! the gadget, and the Galois automorphism tables.

use itertools::izip;

use crate::errors::{
  ErrorInternalArithmetic, ErrorInvalidArgument, ResultBoxedError,
};
use crate::modarith::CrtContext;
use crate::ntt::NttContext;
use crate::params::RlweParameters;
use crate::prng::Prng;

/// Fixed Galois automorphism exponent. Its powers enumerate half of the odd
/// residues mod 2N, giving a rotation group of N/2 slots.
pub const GALOIS_GENERATOR: usize = 5;

/// Gadget data for one RNS basis: per-level balanced digit decomposition
/// with per-level bases, and the CRT-lifted gadget constants.
#[derive(Clone, Debug)]
pub struct RnsGadget {
  // (log base, digit count) per ciphertext modulus level.
  levels: Vec<(usize, usize)>,
  dim: usize,
  // constants[j][l]: residue of the j-th gadget entry mod q_l, Montgomery.
  constants: Vec<Vec<u64>>,
}

impl RnsGadget {
  /// Total number of gadget digits across all levels.
  pub fn dim(&self) -> usize {
    self.dim
  }

  /// Montgomery residues of the j-th gadget constant, one per level.
  pub fn constant(&self, j: usize) -> &[u64] {
    &self.constants[j]
  }
}

/// Shared computation context for one LinPIR instance: the ciphertext
/// modulus chain `qs` with a plaintext modulus `t`.
#[derive(Debug)]
pub struct RnsContext {
  n: usize,
  q_ntts: Vec<NttContext>,
  q_crt: CrtContext,
  big_q: u128,
  t: u64,
  t_ntt: NttContext,
  num_slots: usize,
  // Evaluation index carrying slot (0, u) resp. (1, u).
  slot_index: Vec<usize>,
  slot_index_conj: Vec<usize>,
  // floor(Q/t) mod q_l, Montgomery.
  delta: Vec<u64>,
  gadget: RnsGadget,
  // Index map and sign of X -> X^g on coefficient vectors.
  auto_index: Vec<usize>,
  auto_sign: Vec<bool>,
  error_variance: usize,
}

impl RnsContext {
  pub fn new(params: &RlweParameters, t: u64) -> ResultBoxedError<Self> {
    let n = params.ring_dim();
    let mut q_ntts = Vec::with_capacity(params.qs.len());
    for &q in &params.qs {
      q_ntts.push(NttContext::new(q, params.log_n)?);
    }
    let q_crt = CrtContext::new(&params.qs)?;
    let big_q = q_crt.product();
    if big_q.checked_mul(t as u128).is_none() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "ciphertext modulus product times plaintext modulus overflows",
      )));
    }
    let t_ntt = NttContext::new(t, params.log_n)?;

    let num_slots = n / 2;
    let (slot_index, slot_index_conj) = slot_maps(n);
    let (auto_index, auto_sign) = automorphism_map(n, GALOIS_GENERATOR);

    let delta_int = big_q / t as u128;
    let delta = q_ntts
      .iter()
      .map(|ntt| {
        let m = ntt.mont();
        m.to_mont((delta_int % m.modulus() as u128) as u64)
      })
      .collect();

    let gadget = build_gadget(&params.qs, &params.gadget_log_bs, big_q, &q_ntts)?;

    Ok(Self {
      n,
      q_ntts,
      q_crt,
      big_q,
      t,
      t_ntt,
      num_slots,
      slot_index,
      slot_index_conj,
      delta,
      gadget,
      auto_index,
      auto_sign,
      error_variance: params.error_variance,
    })
  }

  pub fn n(&self) -> usize {
    self.n
  }

  pub fn num_moduli(&self) -> usize {
    self.q_ntts.len()
  }

  pub fn modulus_transforms(&self) -> &[NttContext] {
    &self.q_ntts
  }

  pub fn plaintext_modulus(&self) -> u64 {
    self.t
  }

  pub fn num_slots(&self) -> usize {
    self.num_slots
  }

  pub fn gadget(&self) -> &RnsGadget {
    &self.gadget
  }

  pub fn error_variance(&self) -> usize {
    self.error_variance
  }

  pub fn delta(&self) -> &[u64] {
    &self.delta
  }

  /// Packs values into the slots of orbit 0, zero elsewhere, and returns
  /// the plain coefficient vector of the plaintext polynomial mod t.
  pub fn encode_slots(&self, slots: &[u64]) -> Vec<u64> {
    debug_assert!(slots.len() <= self.num_slots);
    let mont = self.t_ntt.mont();
    let mut evals = vec![0u64; self.n];
    for (u, &v) in slots.iter().enumerate() {
      evals[self.slot_index[u]] = mont.to_mont(v);
    }
    self.t_ntt.backward(&mut evals);
    evals.iter().map(|&c| mont.from_mont(c)).collect()
  }

  /// Reads the orbit-0 slot values of a plain coefficient vector mod t.
  pub fn decode_slots(&self, poly: &[u64]) -> Vec<u64> {
    debug_assert_eq!(poly.len(), self.n);
    let mont = self.t_ntt.mont();
    let mut evals: Vec<u64> = poly.iter().map(|&c| mont.to_mont(c)).collect();
    self.t_ntt.forward(&mut evals);
    (0..self.num_slots)
      .map(|u| mont.from_mont(evals[self.slot_index[u]]))
      .collect()
  }

  /// Lifts a plain mod-t coefficient vector into the full RNS basis with
  /// balanced representatives, returning the polynomial in NTT form.
  pub fn lift_balanced(&self, poly_mod_t: &[u64]) -> RnsPolynomial {
    let half = self.t / 2;
    let signed: Vec<i64> = poly_mod_t
      .iter()
      .map(|&c| {
        if c > half {
          c as i64 - self.t as i64
        } else {
          c as i64
        }
      })
      .collect();
    let mut poly = RnsPolynomial::from_signed_coeffs(self, &signed);
    poly.ntt_forward(self);
    poly
  }

  /// BFV decryption scaling: rounds (t/Q) * coefficient and reduces mod t.
  /// Input must be in coefficient form.
  pub fn scale_round_to_t(&self, poly: &RnsPolynomial) -> Vec<u64> {
    debug_assert!(!poly.ntt_form);
    let half_q = self.big_q / 2;
    let mut residues = vec![0u64; self.num_moduli()];
    (0..self.n)
      .map(|i| {
        for (r, level, ntt) in
          izip!(residues.iter_mut(), poly.coeffs.iter(), self.q_ntts.iter())
        {
          *r = ntt.mont().from_mont(level[i]);
        }
        let x = self.q_crt.interpolate(&residues);
        (((x * self.t as u128 + half_q) / self.big_q) % self.t as u128) as u64
      })
      .collect()
  }

  /// Balanced base-B digit decomposition of a coefficient-form polynomial,
  /// level by level; every digit is emitted as a full RNS polynomial.
  pub fn gadget_decompose(&self, poly: &RnsPolynomial) -> Vec<RnsPolynomial> {
    debug_assert!(!poly.ntt_form);
    let mut out = Vec::with_capacity(self.gadget.dim);
    for (level, &(log_b, digits)) in self.gadget.levels.iter().enumerate() {
      let mont = self.q_ntts[level].mont();
      let base = 1i64 << log_b;
      let mut digit_coeffs = vec![vec![0i64; self.n]; digits];
      for i in 0..self.n {
        let mut u = mont.from_mont(poly.coeffs[level][i]) as i64;
        for digit in digit_coeffs.iter_mut() {
          let mut r = u % base;
          if r >= base / 2 {
            r -= base;
          }
          u = (u - r) / base;
          digit[i] = r;
        }
        debug_assert_eq!(u, 0);
      }
      for digit in &digit_coeffs {
        out.push(RnsPolynomial::from_signed_coeffs(self, digit));
      }
    }
    out
  }
}

/// A polynomial stored as Montgomery-domain residues, one row per
/// ciphertext modulus, in either coefficient or evaluation (NTT) form.
#[derive(Clone, Debug, PartialEq)]
pub struct RnsPolynomial {
  coeffs: Vec<Vec<u64>>,
  ntt_form: bool,
}

impl RnsPolynomial {
  pub fn zero(ctx: &RnsContext, ntt_form: bool) -> Self {
    Self {
      coeffs: vec![vec![0u64; ctx.n]; ctx.num_moduli()],
      ntt_form,
    }
  }

  /// Rebuilds a polynomial from serialized residue rows.
  pub fn from_raw(
    ctx: &RnsContext,
    coeffs: Vec<Vec<u64>>,
    ntt_form: bool,
  ) -> ResultBoxedError<Self> {
    if coeffs.len() != ctx.num_moduli()
      || coeffs.iter().any(|row| row.len() != ctx.n)
    {
      return Err(Box::new(ErrorInvalidArgument::new(
        "serialized polynomial has wrong dimensions",
      )));
    }
    for (row, ntt) in coeffs.iter().zip(ctx.q_ntts.iter()) {
      if row.iter().any(|&c| c >= ntt.mont().modulus()) {
        return Err(Box::new(ErrorInvalidArgument::new(
          "serialized polynomial residue out of range",
        )));
      }
    }
    Ok(Self { coeffs, ntt_form })
  }

  /// Uniformly random polynomial derived from the generator. Uniform raw
  /// words are uniform Montgomery residues, so no conversion is needed.
  pub fn sample_uniform(ctx: &RnsContext, prng: &mut Prng) -> Self {
    let coeffs = ctx
      .q_ntts
      .iter()
      .map(|ntt| {
        let mont = ntt.mont();
        (0..ctx.n).map(|_| mont.sample_uniform(prng)).collect()
      })
      .collect();
    Self {
      coeffs,
      ntt_form: false,
    }
  }

  /// Error polynomial with centered binomial coefficients.
  pub fn sample_error(ctx: &RnsContext, prng: &mut Prng) -> Self {
    let signed: Vec<i64> = (0..ctx.n)
      .map(|_| prng.centered_binomial(ctx.error_variance))
      .collect();
    Self::from_signed_coeffs(ctx, &signed)
  }

  /// Imports small signed coefficients into every level.
  pub fn from_signed_coeffs(ctx: &RnsContext, signed: &[i64]) -> Self {
    debug_assert_eq!(signed.len(), ctx.n);
    let coeffs = ctx
      .q_ntts
      .iter()
      .map(|ntt| {
        let mont = ntt.mont();
        signed
          .iter()
          .map(|&v| mont.to_mont(mont.from_signed(v)))
          .collect()
      })
      .collect();
    Self {
      coeffs,
      ntt_form: false,
    }
  }

  pub fn is_ntt_form(&self) -> bool {
    self.ntt_form
  }

  pub fn coeff_rows(&self) -> &[Vec<u64>] {
    &self.coeffs
  }

  pub fn into_coeff_rows(self) -> Vec<Vec<u64>> {
    self.coeffs
  }

  pub fn ntt_forward(&mut self, ctx: &RnsContext) {
    debug_assert!(!self.ntt_form);
    for (row, ntt) in self.coeffs.iter_mut().zip(ctx.q_ntts.iter()) {
      ntt.forward(row);
    }
    self.ntt_form = true;
  }

  pub fn ntt_backward(&mut self, ctx: &RnsContext) {
    debug_assert!(self.ntt_form);
    for (row, ntt) in self.coeffs.iter_mut().zip(ctx.q_ntts.iter()) {
      ntt.backward(row);
    }
    self.ntt_form = false;
  }

  pub fn add_in_place(&mut self, other: &RnsPolynomial, ctx: &RnsContext) {
    debug_assert_eq!(self.ntt_form, other.ntt_form);
    for (row, other_row, ntt) in
      izip!(self.coeffs.iter_mut(), other.coeffs.iter(), ctx.q_ntts.iter())
    {
      let mont = ntt.mont();
      for (c, o) in row.iter_mut().zip(other_row.iter()) {
        *c = mont.add(*c, *o);
      }
    }
  }

  pub fn sub_in_place(&mut self, other: &RnsPolynomial, ctx: &RnsContext) {
    debug_assert_eq!(self.ntt_form, other.ntt_form);
    for (row, other_row, ntt) in
      izip!(self.coeffs.iter_mut(), other.coeffs.iter(), ctx.q_ntts.iter())
    {
      let mont = ntt.mont();
      for (c, o) in row.iter_mut().zip(other_row.iter()) {
        *c = mont.sub(*c, *o);
      }
    }
  }

  pub fn negate_in_place(&mut self, ctx: &RnsContext) {
    for (row, ntt) in self.coeffs.iter_mut().zip(ctx.q_ntts.iter()) {
      let mont = ntt.mont();
      for c in row.iter_mut() {
        *c = mont.neg(*c);
      }
    }
  }

  /// self += a * b, all three in NTT form.
  pub fn fma_in_place(
    &mut self,
    a: &RnsPolynomial,
    b: &RnsPolynomial,
    ctx: &RnsContext,
  ) {
    debug_assert!(self.ntt_form && a.ntt_form && b.ntt_form);
    for (row, a_row, b_row, ntt) in izip!(
      self.coeffs.iter_mut(),
      a.coeffs.iter(),
      b.coeffs.iter(),
      ctx.q_ntts.iter()
    ) {
      let mont = ntt.mont();
      for (c, x, y) in izip!(row.iter_mut(), a_row.iter(), b_row.iter()) {
        *c = mont.add(*c, mont.mul(*x, *y));
      }
    }
  }

  /// Pointwise product with `other`, both in NTT form.
  pub fn mul_pointwise(
    &self,
    other: &RnsPolynomial,
    ctx: &RnsContext,
  ) -> RnsPolynomial {
    let mut out = RnsPolynomial::zero(ctx, true);
    out.fma_in_place(self, other, ctx);
    out
  }

  /// Multiplies every coefficient of level l by the Montgomery-domain
  /// constant `consts[l]`.
  pub fn scale_by_level_constants(
    &self,
    consts: &[u64],
    ctx: &RnsContext,
  ) -> RnsPolynomial {
    debug_assert_eq!(consts.len(), ctx.num_moduli());
    let coeffs = izip!(self.coeffs.iter(), consts.iter(), ctx.q_ntts.iter())
      .map(|(row, &k, ntt)| {
        let mont = ntt.mont();
        row.iter().map(|&c| mont.mul(c, k)).collect()
      })
      .collect();
    RnsPolynomial {
      coeffs,
      ntt_form: self.ntt_form,
    }
  }

  /// Applies the Galois automorphism X -> X^g to a coefficient-form
  /// polynomial.
  pub fn substitute(&self, ctx: &RnsContext) -> RnsPolynomial {
    debug_assert!(!self.ntt_form);
    let mut out = RnsPolynomial::zero(ctx, false);
    for (out_row, row, ntt) in
      izip!(out.coeffs.iter_mut(), self.coeffs.iter(), ctx.q_ntts.iter())
    {
      let mont = ntt.mont();
      for (i, &c) in row.iter().enumerate() {
        out_row[ctx.auto_index[i]] = if ctx.auto_sign[i] { c } else { mont.neg(c) };
      }
    }
    out
  }
}

// Slot (0, u) lives at the evaluation point psi^(g^u), slot (1, u) at
// psi^(-g^u); evaluations are indexed by j with exponent 2j + 1.
fn slot_maps(n: usize) -> (Vec<usize>, Vec<usize>) {
  let two_n = 2 * n;
  let mut fwd = Vec::with_capacity(n / 2);
  let mut conj = Vec::with_capacity(n / 2);
  let mut e = 1usize;
  for _ in 0..n / 2 {
    fwd.push((e - 1) / 2);
    conj.push((two_n - e - 1) / 2);
    e = e * GALOIS_GENERATOR % two_n;
  }
  (fwd, conj)
}

// Index and sign maps of X^i -> X^(i k) mod (X^N + 1) for odd k.
fn automorphism_map(n: usize, k: usize) -> (Vec<usize>, Vec<bool>) {
  debug_assert!(k % 2 == 1);
  let two_n = 2 * n;
  let mut index = Vec::with_capacity(n);
  let mut sign = Vec::with_capacity(n);
  for i in 0..n {
    let mut to = i * k % two_n;
    let mut positive = true;
    if to >= n {
      to -= n;
      positive = false;
    }
    index.push(to);
    sign.push(positive);
  }
  (index, sign)
}

fn build_gadget(
  qs: &[u64],
  gadget_log_bs: &[usize],
  big_q: u128,
  q_ntts: &[NttContext],
) -> ResultBoxedError<RnsGadget> {
  let mut levels = Vec::with_capacity(qs.len());
  let mut constants = Vec::new();
  for (i, (&q, &log_b)) in qs.iter().zip(gadget_log_bs.iter()).enumerate() {
    let bits = 64 - q.leading_zeros() as usize;
    let digits = (bits + log_b - 1) / log_b;
    levels.push((log_b, digits));

    // CRT factor selecting level i: q_hat_i * (q_hat_i^{-1} mod q_i).
    let q_hat = big_q / q as u128;
    let mont = q_ntts[i].mont();
    let q_hat_red = (q_hat % q as u128) as u64;
    if q_hat_red == 0 {
      return Err(Box::new(ErrorInternalArithmetic::new(
        "ciphertext moduli must be pairwise coprime",
      )));
    }
    let q_hat_inv = mont.from_mont(mont.inv(mont.to_mont(q_hat_red)));
    let factor = q_hat
      .checked_mul(q_hat_inv as u128)
      .map(|v| v % big_q)
      .ok_or_else(|| {
        Box::new(ErrorInternalArithmetic::new("gadget factor overflows"))
          as Box<dyn std::error::Error>
      })?;
    for j in 0..digits {
      let entry = factor
        .checked_mul(1u128 << (log_b * j))
        .map(|v| v % big_q)
        .ok_or_else(|| {
          Box::new(ErrorInternalArithmetic::new("gadget entry overflows"))
            as Box<dyn std::error::Error>
        })?;
      let residues = q_ntts
        .iter()
        .map(|ntt| {
          let m = ntt.mont();
          m.to_mont((entry % m.modulus() as u128) as u64)
        })
        .collect();
      constants.push(residues);
    }
  }
  let dim = constants.len();
  Ok(RnsGadget {
    levels,
    dim,
    constants,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::params::test_params;
  use crate::params::PrngType;
  use crate::prng::SEED_LEN;

  fn context() -> RnsContext {
    let params = test_params::default().linpir_params;
    RnsContext::new(&params, params.ts[0]).unwrap()
  }

  #[test]
  fn slot_encode_decode_round_trip() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[11u8; SEED_LEN]);
    let slots: Vec<u64> =
      (0..ctx.num_slots()).map(|_| prng.uniform_below(t)).collect();
    let poly = ctx.encode_slots(&slots);
    assert_eq!(ctx.decode_slots(&poly), slots);
  }

  #[test]
  fn substitution_rotates_slots() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[12u8; SEED_LEN]);
    let slots: Vec<u64> =
      (0..ctx.num_slots()).map(|_| prng.uniform_below(t)).collect();
    // substitution on the plaintext transform directly: encode, apply the
    // automorphism map mod t, decode
    let poly = ctx.encode_slots(&slots);
    let (index, sign) = automorphism_map(ctx.n(), GALOIS_GENERATOR);
    let mut rotated = vec![0u64; ctx.n()];
    for (i, &c) in poly.iter().enumerate() {
      rotated[index[i]] = if sign[i] { c } else { (t - c) % t };
    }
    let expected: Vec<u64> = (0..ctx.num_slots())
      .map(|u| slots[(u + 1) % ctx.num_slots()])
      .collect();
    assert_eq!(ctx.decode_slots(&rotated), expected);
  }

  #[test]
  fn slotwise_product_via_polynomial_product() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    let t_mont = crate::modarith::MontgomeryContext::new(t).unwrap();
    let t_ntt = crate::ntt::NttContext::new(t, 8).unwrap();
    let mut prng = Prng::from_seed(PrngType::Hkdf, &[13u8; SEED_LEN]);
    let a: Vec<u64> = (0..ctx.num_slots()).map(|_| prng.uniform_below(t)).collect();
    let b: Vec<u64> = (0..ctx.num_slots()).map(|_| prng.uniform_below(t)).collect();
    let mut pa: Vec<u64> =
      ctx.encode_slots(&a).iter().map(|&c| t_mont.to_mont(c)).collect();
    let mut pb: Vec<u64> =
      ctx.encode_slots(&b).iter().map(|&c| t_mont.to_mont(c)).collect();
    t_ntt.forward(&mut pa);
    t_ntt.forward(&mut pb);
    let mut prod: Vec<u64> =
      pa.iter().zip(pb.iter()).map(|(x, y)| t_mont.mul(*x, *y)).collect();
    t_ntt.backward(&mut prod);
    let plain: Vec<u64> = prod.iter().map(|&c| t_mont.from_mont(c)).collect();
    let expected: Vec<u64> = a
      .iter()
      .zip(b.iter())
      .map(|(x, y)| ((*x as u128 * *y as u128) % t as u128) as u64)
      .collect();
    assert_eq!(ctx.decode_slots(&plain), expected);
  }

  #[test]
  fn gadget_decomposition_reconstructs() {
    let ctx = context();
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[14u8; SEED_LEN]);
    let poly = RnsPolynomial::sample_uniform(&ctx, &mut prng);
    let digits = ctx.gadget_decompose(&poly);
    assert_eq!(digits.len(), ctx.gadget().dim());

    // recombine digit * gadget constant and compare on every level
    let mut acc = RnsPolynomial::zero(&ctx, false);
    for (j, digit) in digits.iter().enumerate() {
      let consts = ctx.gadget().constant(j);
      for (level, ntt) in ctx.modulus_transforms().iter().enumerate() {
        let mont = ntt.mont();
        for i in 0..ctx.n() {
          let term = mont.mul(digit.coeff_rows()[level][i], consts[level]);
          acc.coeffs[level][i] = mont.add(acc.coeffs[level][i], term);
        }
      }
    }
    assert_eq!(acc.coeffs, poly.coeffs);
  }

  #[test]
  fn lift_balanced_matches_plaintext() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    // lift then reduce the first level back mod t for a few coefficients
    let mut poly_t = vec![0u64; ctx.n()];
    poly_t[0] = 1;
    poly_t[1] = t - 1;
    poly_t[2] = t / 2;
    let mut lifted = ctx.lift_balanced(&poly_t);
    lifted.ntt_backward(&ctx);
    let mont = ctx.modulus_transforms()[0].mont();
    let q = mont.modulus();
    assert_eq!(mont.from_mont(lifted.coeff_rows()[0][0]), 1);
    assert_eq!(mont.from_mont(lifted.coeff_rows()[0][1]), q - 1);
    let expect_half = (t / 2) as u64;
    assert_eq!(mont.from_mont(lifted.coeff_rows()[0][2]), expect_half);
  }

  #[test]
  fn serialization_shape_is_checked() {
    let ctx = context();
    let bad = vec![vec![0u64; ctx.n()]; 1];
    assert!(RnsPolynomial::from_raw(&ctx, bad, false).is_err());
  }
}
