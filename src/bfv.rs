//! Symmetric RNS-BFV encryption with seed-expanded random pads, plus the
//! Galois key machinery for key-switched slot rotations.
//!
//! Ciphertexts are handled as their two halves separately: the "a" halves
//! are deterministic expansions of public seeds, so only "b" halves are
//! computed against client secrets and only they travel on the wire. The
//! rotation pipeline is split the same way: `rotate_pad` evolves the public
//! half (and caches the gadget digits driving the key switch), `rotate_b`
//! replays the matching evolution on the secret half.

use crate::prng::Prng;
use crate::rns::{RnsContext, RnsPolynomial};

/// A ternary RLWE secret, kept both as signed coefficients and in NTT form
/// over the ciphertext modulus chain.
pub struct BfvSecretKey {
  coeff_poly: RnsPolynomial,
  ntt_poly: RnsPolynomial,
}

impl BfvSecretKey {
  pub fn sample(ctx: &RnsContext, prng: &mut Prng) -> Self {
    let signed: Vec<i64> = (0..ctx.n()).map(|_| prng.ternary()).collect();
    let coeff_poly = RnsPolynomial::from_signed_coeffs(ctx, &signed);
    let mut ntt_poly = coeff_poly.clone();
    ntt_poly.ntt_forward(ctx);
    Self {
      coeff_poly,
      ntt_poly,
    }
  }

  pub fn ntt_poly(&self) -> &RnsPolynomial {
    &self.ntt_poly
  }

  fn substituted(&self, ctx: &RnsContext) -> RnsPolynomial {
    self.coeff_poly.substitute(ctx)
  }
}

/// Encrypts a plaintext polynomial (plain mod-t coefficients) against the
/// given pad: b = -(a * s) + Delta * m + e. Returns the coefficient-form
/// "b" half only; the pad is the caller's to re-derive.
pub fn encrypt_b_half(
  ctx: &RnsContext,
  sk: &BfvSecretKey,
  pad: &RnsPolynomial,
  plaintext: &[u64],
  prng: &mut Prng,
) -> RnsPolynomial {
  let t = ctx.plaintext_modulus();
  let half = t / 2;
  let signed: Vec<i64> = plaintext
    .iter()
    .map(|&c| {
      if c > half {
        c as i64 - t as i64
      } else {
        c as i64
      }
    })
    .collect();
  let mut body = RnsPolynomial::from_signed_coeffs(ctx, &signed)
    .scale_by_level_constants(ctx.delta(), ctx);
  body.add_in_place(&RnsPolynomial::sample_error(ctx, prng), ctx);
  body.ntt_forward(ctx);

  let mut pad_hat = pad.clone();
  pad_hat.ntt_forward(ctx);
  body.sub_in_place(&pad_hat.mul_pointwise(sk.ntt_poly(), ctx), ctx);
  body.ntt_backward(ctx);
  body
}

/// Decrypts from the "b" half and the NTT-form "a" half:
/// round(t/Q * (b + a*s)) mod t.
pub fn decrypt_with_pad(
  ctx: &RnsContext,
  sk: &BfvSecretKey,
  b: &RnsPolynomial,
  a_hat: &RnsPolynomial,
) -> Vec<u64> {
  let mut phase = b.clone();
  phase.ntt_forward(ctx);
  phase.add_in_place(&a_hat.mul_pointwise(sk.ntt_poly(), ctx), ctx);
  phase.ntt_backward(ctx);
  ctx.scale_round_to_t(&phase)
}

/// Generates the "b" halves of the Galois key for X -> X^g: one gadget
/// encryption of sigma(s) per digit, against the seed-expanded "a" pads.
/// Returned in NTT form.
pub fn generate_galois_key_b(
  ctx: &RnsContext,
  sk: &BfvSecretKey,
  gk_pads: &[RnsPolynomial],
  prng: &mut Prng,
) -> Vec<RnsPolynomial> {
  debug_assert_eq!(gk_pads.len(), ctx.gadget().dim());
  let s_sub = sk.substituted(ctx);
  let mut out = Vec::with_capacity(gk_pads.len());
  for (j, pad) in gk_pads.iter().enumerate() {
    let mut body = s_sub.scale_by_level_constants(ctx.gadget().constant(j), ctx);
    body.add_in_place(&RnsPolynomial::sample_error(ctx, prng), ctx);
    body.ntt_forward(ctx);
    let mut pad_hat = pad.clone();
    pad_hat.ntt_forward(ctx);
    body.sub_in_place(&pad_hat.mul_pointwise(sk.ntt_poly(), ctx), ctx);
    out.push(body);
  }
  out
}

/// Advances the public half of the rotation chain: applies the
/// automorphism to the pad, decomposes it, and folds it with the Galois
/// key "a" halves. Also returns the NTT-form digits, which drive the same
/// step on ciphertext "b" halves.
pub fn rotate_pad(
  ctx: &RnsContext,
  pad: &RnsPolynomial,
  gk_a_hats: &[RnsPolynomial],
) -> (RnsPolynomial, Vec<RnsPolynomial>) {
  let mut digits = ctx.gadget_decompose(&pad.substitute(ctx));
  for digit in digits.iter_mut() {
    digit.ntt_forward(ctx);
  }
  let mut acc = RnsPolynomial::zero(ctx, true);
  for (digit, gk_a) in digits.iter().zip(gk_a_hats.iter()) {
    acc.fma_in_place(digit, gk_a, ctx);
  }
  acc.ntt_backward(ctx);
  (acc, digits)
}

/// Advances the secret half of the rotation chain using the cached digits
/// of the matching pad step: b' = sigma(b) + sum_j digits_j * gk_b_j.
pub fn rotate_b(
  ctx: &RnsContext,
  b: &RnsPolynomial,
  digits: &[RnsPolynomial],
  gk_b_hats: &[RnsPolynomial],
) -> RnsPolynomial {
  let mut acc = RnsPolynomial::zero(ctx, true);
  for (digit, gk_b) in digits.iter().zip(gk_b_hats.iter()) {
    acc.fma_in_place(digit, gk_b, ctx);
  }
  acc.ntt_backward(ctx);
  let mut out = b.substitute(ctx);
  out.add_in_place(&acc, ctx);
  out
}
