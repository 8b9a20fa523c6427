//! Wire representations of the protocol messages. Everything round-trips
//! through bincode; polynomials travel as per-modulus coefficient residues
//! in Montgomery form.

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInvalidArgument, ResultBoxedError};
use crate::prng::Seed;
use crate::rns::{RnsContext, RnsPolynomial};

/// Length-L list of length-N coefficient residue vectors, little-endian
/// words in Montgomery form; the consumer must hold the matching modulus
/// list to decode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SerializedRnsPolynomial {
  pub coeff_vectors: Vec<Vec<u64>>,
}

impl SerializedRnsPolynomial {
  /// Serializes a coefficient-form polynomial.
  pub fn from_polynomial(
    poly: &RnsPolynomial,
  ) -> ResultBoxedError<SerializedRnsPolynomial> {
    if poly.is_ntt_form() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "polynomials are serialized in coefficient form",
      )));
    }
    Ok(SerializedRnsPolynomial {
      coeff_vectors: poly.coeff_rows().to_vec(),
    })
  }

  /// Rebuilds the coefficient-form polynomial, validating its shape
  /// against the context.
  pub fn to_polynomial(
    &self,
    ctx: &RnsContext,
  ) -> ResultBoxedError<RnsPolynomial> {
    RnsPolynomial::from_raw(ctx, self.coeff_vectors.clone(), false)
  }
}

/// Public parameters published by the server after preprocessing: the pad
/// seeds, plus the query-independent "a" halves of the LinPIR response
/// ciphertexts (indexed by plaintext modulus, batch element, shard, and
/// response ciphertext), which let clients decrypt "b"-only responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServerPublicParams {
  pub prng_seed_lwe_query_pad: Seed,
  pub prng_seed_linpir_ct_pads: Vec<Seed>,
  pub prng_seed_linpir_gk_pad: Seed,
  pub linpir_response_pads: Vec<Vec<Vec<Vec<SerializedRnsPolynomial>>>>,
}

impl ServerPublicParams {
  pub fn to_bytes(&self) -> ResultBoxedError<Vec<u8>> {
    Ok(bincode::serialize(self)?)
  }

  pub fn from_bytes(bytes: &[u8]) -> ResultBoxedError<Self> {
    Ok(bincode::deserialize(bytes)?)
  }
}

/// A batched client request: LWE query ciphertexts (one per index), the
/// "b" halves of the LinPIR query ciphertexts (plaintext-modulus-major,
/// then batch element, then chunk), and the "b" halves of the Galois key
/// (one per gadget digit).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HintlessPirRequest {
  pub ct_query_vector: Vec<Vec<u32>>,
  pub linpir_ct_bs: Vec<SerializedRnsPolynomial>,
  pub linpir_gk_bs: Vec<SerializedRnsPolynomial>,
}

impl HintlessPirRequest {
  pub fn to_bytes(&self) -> ResultBoxedError<Vec<u8>> {
    Ok(bincode::serialize(self)?)
  }

  pub fn from_bytes(bytes: &[u8]) -> ResultBoxedError<Self> {
    Ok(bincode::deserialize(bytes)?)
  }
}

/// The encrypted inner products of one LinPIR instance for one batch
/// element: response ciphertext "b" halves, shard-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinPirResponse {
  pub ct_inner_products: Vec<SerializedRnsPolynomial>,
}

/// The server answer: raw SimplePIR vectors (batch-element-major, then
/// shard) and LinPIR responses (plaintext-modulus-major, then batch
/// element).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HintlessPirResponse {
  pub ct_records: Vec<Vec<u32>>,
  pub linpir_responses: Vec<LinPirResponse>,
}

impl HintlessPirResponse {
  pub fn to_bytes(&self) -> ResultBoxedError<Vec<u8>> {
    Ok(bincode::serialize(self)?)
  }

  pub fn from_bytes(bytes: &[u8]) -> ResultBoxedError<Self> {
    Ok(bincode::deserialize(bytes)?)
  }
}
