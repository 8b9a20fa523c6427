//! The LinPIR subprotocol: homomorphic matrix-vector products between a
//! public matrix and an RLWE-encrypted vector, via the diagonal method.
//!
//! One instance runs per plaintext modulus. The database preprocesses its
//! matrix into NTT-form generalized diagonals; the server preprocesses the
//! query-independent halves of the computation (rotation pads, their gadget
//! digits, and the response pads) so that each request only touches "b"
//! halves. Clients decrypt responses against the published response pads.

use std::sync::Arc;

use rayon::prelude::*;

use crate::bfv::{
  decrypt_with_pad, encrypt_b_half, generate_galois_key_b, rotate_b, rotate_pad,
  BfvSecretKey,
};
use crate::errors::{
  ErrorInvalidArgument, ErrorPreconditionFailed, ResultBoxedError,
};
use crate::params::PrngType;
use crate::prng::{Prng, Seed};
use crate::rns::{RnsContext, RnsPolynomial};

/// Expands the ciphertext pads of one instance: one polynomial per batch
/// element and chunk, drawn batch-major from the seed stream.
pub fn expand_ct_pads(
  ctx: &RnsContext,
  prng_type: PrngType,
  seed: &Seed,
  batch_size: usize,
  chunks: usize,
) -> Vec<Vec<RnsPolynomial>> {
  let mut prng = Prng::from_seed(prng_type, seed);
  (0..batch_size)
    .map(|_| {
      (0..chunks)
        .map(|_| RnsPolynomial::sample_uniform(ctx, &mut prng))
        .collect()
    })
    .collect()
}

/// Expands the Galois key pads, one per gadget digit.
pub fn expand_gk_pads(
  ctx: &RnsContext,
  prng_type: PrngType,
  seed: &Seed,
) -> Vec<RnsPolynomial> {
  let mut prng = Prng::from_seed(prng_type, seed);
  (0..ctx.gadget().dim())
    .map(|_| RnsPolynomial::sample_uniform(ctx, &mut prng))
    .collect()
}

/// Number of query ciphertexts needed per batch element for a vector of
/// the given dimension.
pub fn chunks_per_element(ctx: &RnsContext, dim: usize) -> usize {
  (dim + ctx.num_slots() - 1) / ctx.num_slots()
}

/// A plaintext matrix preprocessed for the diagonal method under one
/// plaintext modulus.
pub struct LinPirDatabase {
  num_rows: usize,
  num_cols: usize,
  // min(num_cols, slot count): diagonals and rotations per chunk.
  diags_per_chunk: usize,
  chunks: usize,
  cts_per_shard: usize,
  // diag_polys[chunk][ct][d], NTT form over the ciphertext moduli.
  diag_polys: Vec<Vec<Vec<RnsPolynomial>>>,
}

impl LinPirDatabase {
  /// Preprocesses `rows` (residues mod the context's plaintext modulus)
  /// into per-diagonal NTT polynomials. Rows pack block-by-block into
  /// response ciphertexts of one slot ring each.
  pub fn new(
    ctx: &RnsContext,
    rows: &[Vec<u64>],
    rows_per_block: usize,
  ) -> ResultBoxedError<Self> {
    let num_rows = rows.len();
    if num_rows == 0 {
      return Err(Box::new(ErrorInvalidArgument::new(
        "matrix must have at least one row",
      )));
    }
    let num_cols = rows[0].len();
    if num_cols == 0 || rows.iter().any(|r| r.len() != num_cols) {
      return Err(Box::new(ErrorInvalidArgument::new(
        "matrix rows must be non-empty and of equal length",
      )));
    }
    let slots = ctx.num_slots();
    if num_rows % rows_per_block != 0 || rows_per_block > slots {
      return Err(Box::new(ErrorInvalidArgument::new(
        "matrix height must be a multiple of rows_per_block, at most one slot ring per block",
      )));
    }
    if num_cols % slots != 0 && slots % num_cols != 0 {
      return Err(Box::new(ErrorInvalidArgument::new(
        "matrix width must be a multiple or a divisor of the slot count",
      )));
    }
    let diags_per_chunk = num_cols.min(slots);
    let chunks = (num_cols + slots - 1) / slots;
    let cts_per_shard = (num_rows + slots - 1) / slots;
    let blocks_per_ct = slots / rows_per_block;

    let mut diag_polys = Vec::with_capacity(chunks);
    for chunk in 0..chunks {
      let col_base = chunk * slots;
      let per_ct: Vec<Vec<RnsPolynomial>> = (0..cts_per_shard)
        .into_par_iter()
        .map(|ct| {
          (0..diags_per_chunk)
            .map(|d| {
              let mut slot_values = vec![0u64; slots];
              // fill block by block; diagonal d of a block at slot
              // offset o carries column (o + i + d) mod diags_per_chunk
              for block in 0..blocks_per_ct {
                for i in 0..rows_per_block {
                  let u = block * rows_per_block + i;
                  let row = ct * slots + u;
                  if row >= num_rows {
                    break;
                  }
                  let col = col_base + (u + d) % diags_per_chunk;
                  if col < num_cols {
                    slot_values[u] = rows[row][col];
                  }
                }
              }
              ctx.lift_balanced(&ctx.encode_slots(&slot_values))
            })
            .collect()
        })
        .collect();
      diag_polys.push(per_ct);
    }
    Ok(Self {
      num_rows,
      num_cols,
      diags_per_chunk,
      chunks,
      cts_per_shard,
      diag_polys,
    })
  }

  pub fn num_rows(&self) -> usize {
    self.num_rows
  }

  pub fn num_cols(&self) -> usize {
    self.num_cols
  }

  pub fn cts_per_shard(&self) -> usize {
    self.cts_per_shard
  }
}

// Query-independent preprocessed state of a server instance.
struct Preprocessed {
  // digit_cache[elt][chunk][step][digit], NTT form: the gadget digits of
  // the substituted rotation pads, driving the "b" rotation chain.
  digit_cache: Vec<Vec<Vec<Vec<RnsPolynomial>>>>,
  // response_pads[elt][shard][ct], NTT form: the "a" halves of response
  // ciphertexts, published with the server public parameters.
  response_pads: Vec<Vec<Vec<RnsPolynomial>>>,
}

/// Server side of one LinPIR instance: holds the preprocessed matrices of
/// every shard and answers encrypted queries with "b"-only responses.
pub struct LinPirServer {
  ctx: Arc<RnsContext>,
  databases: Vec<LinPirDatabase>,
  batch_size: usize,
  chunks: usize,
  diags_per_chunk: usize,
  prng_type: PrngType,
  ct_pad_seed: Seed,
  gk_pad_seed: Seed,
  state: Option<Preprocessed>,
}

impl LinPirServer {
  pub fn new(
    ctx: Arc<RnsContext>,
    databases: Vec<LinPirDatabase>,
    batch_size: usize,
    prng_type: PrngType,
    ct_pad_seed: Seed,
    gk_pad_seed: Seed,
  ) -> ResultBoxedError<Self> {
    if databases.is_empty() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "server requires at least one database",
      )));
    }
    let num_cols = databases[0].num_cols;
    let chunks = databases[0].chunks;
    let diags_per_chunk = databases[0].diags_per_chunk;
    if databases
      .iter()
      .any(|db| db.num_cols != num_cols || db.chunks != chunks)
    {
      return Err(Box::new(ErrorInvalidArgument::new(
        "all databases must share the query dimension",
      )));
    }
    Ok(Self {
      ctx,
      databases,
      batch_size,
      chunks,
      diags_per_chunk,
      prng_type,
      ct_pad_seed,
      gk_pad_seed,
      state: None,
    })
  }

  /// Expands all pads and precomputes the rotation digit caches and the
  /// response pads. Must run once before `handle_request`.
  pub fn preprocess(&mut self) -> ResultBoxedError<()> {
    let ctx = &*self.ctx;
    let ct_pads = expand_ct_pads(
      ctx,
      self.prng_type,
      &self.ct_pad_seed,
      self.batch_size,
      self.chunks,
    );
    let gk_pads = expand_gk_pads(ctx, self.prng_type, &self.gk_pad_seed);
    let gk_a_hats: Vec<RnsPolynomial> = gk_pads
      .into_iter()
      .map(|mut pad| {
        pad.ntt_forward(ctx);
        pad
      })
      .collect();

    let per_element: Vec<_> = ct_pads
      .into_par_iter()
      .map(|element_pads| {
        let mut element_digits = Vec::with_capacity(self.chunks);
        let mut rotated_pad_hats = Vec::with_capacity(self.chunks);
        for pad in element_pads {
          let mut steps = Vec::with_capacity(self.diags_per_chunk - 1);
          let mut pad_hats = Vec::with_capacity(self.diags_per_chunk);
          let mut current = pad;
          let mut current_hat = current.clone();
          current_hat.ntt_forward(ctx);
          pad_hats.push(current_hat);
          for _ in 0..self.diags_per_chunk - 1 {
            let (next, digits) = rotate_pad(ctx, &current, &gk_a_hats);
            steps.push(digits);
            let mut next_hat = next.clone();
            next_hat.ntt_forward(ctx);
            pad_hats.push(next_hat);
            current = next;
          }
          element_digits.push(steps);
          rotated_pad_hats.push(pad_hats);
        }
        // fold the rotated pads with every database's diagonals: these
        // are the "a" halves of the response ciphertexts
        let response_pads = self
          .databases
          .iter()
          .map(|db| {
            (0..db.cts_per_shard)
              .map(|ct| {
                let mut acc = RnsPolynomial::zero(ctx, true);
                for chunk in 0..self.chunks {
                  for (d, pad_hat) in rotated_pad_hats[chunk].iter().enumerate()
                  {
                    acc.fma_in_place(&db.diag_polys[chunk][ct][d], pad_hat, ctx);
                  }
                }
                acc
              })
              .collect::<Vec<_>>()
          })
          .collect::<Vec<_>>();
        (element_digits, response_pads)
      })
      .collect();

    let mut digit_cache = Vec::with_capacity(self.batch_size);
    let mut response_pads = Vec::with_capacity(self.batch_size);
    for (digits, pads) in per_element {
      digit_cache.push(digits);
      response_pads.push(pads);
    }
    self.state = Some(Preprocessed {
      digit_cache,
      response_pads,
    });
    Ok(())
  }

  pub fn is_preprocessed(&self) -> bool {
    self.state.is_some()
  }

  /// The query-independent "a" halves of response ciphertexts, indexed by
  /// batch element, shard, and response ciphertext.
  pub fn response_pads(
    &self,
  ) -> ResultBoxedError<&Vec<Vec<Vec<RnsPolynomial>>>> {
    match &self.state {
      Some(state) => Ok(&state.response_pads),
      None => Err(Box::new(ErrorPreconditionFailed::new(
        "server has not been preprocessed",
      ))),
    }
  }

  /// Homomorphically computes matrix * vector for every database. Takes
  /// the "b" halves of the query ciphertexts (per element, per chunk) and
  /// of the Galois key; returns coefficient-form response "b" halves
  /// indexed by element, shard, and response ciphertext.
  pub fn handle_request(
    &self,
    ct_bs: &[Vec<RnsPolynomial>],
    gk_bs: &[RnsPolynomial],
  ) -> ResultBoxedError<Vec<Vec<Vec<RnsPolynomial>>>> {
    let state = self.state.as_ref().ok_or_else(|| {
      Box::new(ErrorPreconditionFailed::new(
        "server has not been preprocessed",
      )) as Box<dyn std::error::Error>
    })?;
    if ct_bs.is_empty() || ct_bs.len() > self.batch_size {
      return Err(Box::new(ErrorInvalidArgument::new(
        "request batch size out of range",
      )));
    }
    if ct_bs.iter().any(|bs| bs.len() != self.chunks) {
      return Err(Box::new(ErrorInvalidArgument::new(
        "wrong number of query ciphertexts per batch element",
      )));
    }
    if gk_bs.len() != self.ctx.gadget().dim() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "wrong number of Galois key components",
      )));
    }
    let gk_b_hats = gk_bs;
    let ctx = &*self.ctx;

    let results: Vec<Vec<Vec<RnsPolynomial>>> = ct_bs
      .par_iter()
      .enumerate()
      .map(|(elt, element_bs)| {
        // rotation chain on the "b" halves, reused across all shards
        let mut rotated_b_hats = Vec::with_capacity(self.chunks);
        for (chunk, b0) in element_bs.iter().enumerate() {
          let mut hats = Vec::with_capacity(self.diags_per_chunk);
          let mut current = b0.clone();
          let mut current_hat = current.clone();
          current_hat.ntt_forward(ctx);
          hats.push(current_hat);
          for step in 0..self.diags_per_chunk - 1 {
            let digits = &state.digit_cache[elt][chunk][step];
            let next = rotate_b(ctx, &current, digits, gk_b_hats);
            let mut next_hat = next.clone();
            next_hat.ntt_forward(ctx);
            hats.push(next_hat);
            current = next;
          }
          rotated_b_hats.push(hats);
        }
        let per_db = self
          .databases
          .iter()
          .map(|db| {
            (0..db.cts_per_shard)
              .map(|ct| {
                let mut acc = RnsPolynomial::zero(ctx, true);
                for chunk in 0..self.chunks {
                  for (d, b_hat) in rotated_b_hats[chunk].iter().enumerate() {
                    acc.fma_in_place(&db.diag_polys[chunk][ct][d], b_hat, ctx);
                  }
                }
                acc.ntt_backward(ctx);
                acc
              })
              .collect::<Vec<_>>()
          })
          .collect::<Vec<_>>();
        per_db
      })
      .collect();
    Ok(results)
  }
}

/// Client side of one LinPIR instance: encrypts query vectors, emits the
/// Galois key, and decrypts responses against the published response pads.
pub struct LinPirClient {
  ctx: Arc<RnsContext>,
  batch_size: usize,
  secret_dim: usize,
  chunks: usize,
  prng_type: PrngType,
  ct_pads: Vec<Vec<RnsPolynomial>>,
  gk_pads: Vec<RnsPolynomial>,
  // [elt][shard][ct], NTT form, from the server public parameters.
  response_pads: Vec<Vec<Vec<RnsPolynomial>>>,
}

impl LinPirClient {
  pub fn new(
    ctx: Arc<RnsContext>,
    batch_size: usize,
    secret_dim: usize,
    prng_type: PrngType,
    ct_pad_seed: &Seed,
    gk_pad_seed: &Seed,
    response_pads: Vec<Vec<Vec<RnsPolynomial>>>,
  ) -> ResultBoxedError<Self> {
    if response_pads.len() != batch_size {
      return Err(Box::new(ErrorInvalidArgument::new(
        "response pads do not cover the configured batch size",
      )));
    }
    let chunks = chunks_per_element(&ctx, secret_dim);
    let ct_pads =
      expand_ct_pads(&ctx, prng_type, ct_pad_seed, batch_size, chunks);
    let gk_pads = expand_gk_pads(&ctx, prng_type, gk_pad_seed);
    Ok(Self {
      ctx,
      batch_size,
      secret_dim,
      chunks,
      prng_type,
      ct_pads,
      gk_pads,
      response_pads,
    })
  }

  /// Encrypts one query vector per batch element in the replicated slot
  /// layout, returning the "b" halves (per element, per chunk).
  pub fn encrypt_query(
    &self,
    secrets_mod_t: &[Vec<u64>],
    sk: &BfvSecretKey,
    prng: &mut Prng,
  ) -> ResultBoxedError<Vec<Vec<RnsPolynomial>>> {
    if secrets_mod_t.is_empty() || secrets_mod_t.len() > self.batch_size {
      return Err(Box::new(ErrorInvalidArgument::new(
        "query batch size out of range",
      )));
    }
    if secrets_mod_t.iter().any(|s| s.len() != self.secret_dim) {
      return Err(Box::new(ErrorInvalidArgument::new(
        "query vector has wrong dimension",
      )));
    }
    let ctx = &*self.ctx;
    let slots = ctx.num_slots();
    let reps = self.secret_dim.min(slots);
    let mut out = Vec::with_capacity(secrets_mod_t.len());
    for (elt, secret) in secrets_mod_t.iter().enumerate() {
      let mut element_bs = Vec::with_capacity(self.chunks);
      for chunk in 0..self.chunks {
        let base = chunk * slots;
        let slot_values: Vec<u64> = (0..slots)
          .map(|u| {
            let col = base + (u % reps);
            if col < self.secret_dim {
              secret[col]
            } else {
              0
            }
          })
          .collect();
        let plaintext = ctx.encode_slots(&slot_values);
        element_bs.push(encrypt_b_half(
          ctx,
          sk,
          &self.ct_pads[elt][chunk],
          &plaintext,
          prng,
        ));
      }
      out.push(element_bs);
    }
    Ok(out)
  }

  /// The "b" halves of the Galois key, shared by every instance built on
  /// the same ciphertext moduli and Galois key pad seed.
  pub fn generate_galois_key(
    &self,
    sk: &BfvSecretKey,
    prng: &mut Prng,
  ) -> Vec<RnsPolynomial> {
    generate_galois_key_b(&self.ctx, sk, &self.gk_pads, prng)
  }

  /// Decrypts the response of one batch element: per shard, decrypts each
  /// response ciphertext against its response pad, decodes the slots, and
  /// concatenates blocks up to `num_rows`. Returns residues mod t.
  pub fn recover(
    &self,
    response_bs: &[Vec<RnsPolynomial>],
    sk: &BfvSecretKey,
    elt: usize,
    num_rows: usize,
  ) -> ResultBoxedError<Vec<Vec<u64>>> {
    if elt >= self.batch_size {
      return Err(Box::new(ErrorInvalidArgument::new(
        "batch element out of range",
      )));
    }
    let pads = &self.response_pads[elt];
    if response_bs.len() != pads.len() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "response has unexpected number of shards",
      )));
    }
    let ctx = &*self.ctx;
    let mut out = Vec::with_capacity(response_bs.len());
    for (shard_bs, shard_pads) in response_bs.iter().zip(pads.iter()) {
      if shard_bs.len() != shard_pads.len() {
        return Err(Box::new(ErrorInvalidArgument::new(
          "response has unexpected number of ciphertexts",
        )));
      }
      let mut rows = Vec::with_capacity(num_rows);
      for (b, pad_hat) in shard_bs.iter().zip(shard_pads.iter()) {
        let plaintext = decrypt_with_pad(ctx, sk, b, pad_hat);
        rows.extend(ctx.decode_slots(&plaintext));
      }
      rows.truncate(num_rows);
      out.push(rows);
    }
    Ok(out)
  }

  pub fn prng_type(&self) -> PrngType {
    self.prng_type
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::modarith::convert_modulus;
  use crate::params::test_params;
  use crate::prng::{generate_seed, SEED_LEN};

  const DIM: usize = 64;
  const ROWS: usize = 8;

  fn context() -> Arc<RnsContext> {
    let params = test_params::default().linpir_params;
    Arc::new(RnsContext::new(&params, params.ts[0]).unwrap())
  }

  fn random_matrix(prng: &mut Prng, t: u64, rows: usize, cols: usize) -> Vec<Vec<u64>> {
    (0..rows)
      .map(|_| (0..cols).map(|_| prng.uniform_below(t)).collect())
      .collect()
  }

  fn schoolbook_product(matrix: &[Vec<u64>], secret: &[u64], t: u64) -> Vec<u64> {
    matrix
      .iter()
      .map(|row| {
        row
          .iter()
          .zip(secret.iter())
          .fold(0u128, |acc, (&m, &s)| {
            (acc + m as u128 * s as u128) % t as u128
          }) as u64
      })
      .collect()
  }

  // One-element protocol run over a single matrix, returning the
  // recovered rows mod t.
  fn round_trip(
    ctx: &Arc<RnsContext>,
    matrix: &[Vec<u64>],
    secret: &[u64],
    rows_per_block: usize,
  ) -> Vec<u64> {
    let db = LinPirDatabase::new(ctx, matrix, rows_per_block).unwrap();
    let num_rows = db.num_rows();
    let ct_seed = generate_seed();
    let gk_seed = generate_seed();
    let mut server = LinPirServer::new(
      Arc::clone(ctx),
      vec![db],
      1,
      PrngType::ChaCha,
      ct_seed,
      gk_seed,
    )
    .unwrap();
    server.preprocess().unwrap();

    let client = LinPirClient::new(
      Arc::clone(ctx),
      1,
      secret.len(),
      PrngType::ChaCha,
      &ct_seed,
      &gk_seed,
      server.response_pads().unwrap().clone(),
    )
    .unwrap();

    let mut enc_prng = Prng::fresh(PrngType::ChaCha);
    let mut sk_prng = Prng::from_seed(PrngType::ChaCha, &generate_seed());
    let sk = BfvSecretKey::sample(ctx, &mut sk_prng);
    let ct_bs = client
      .encrypt_query(&[secret.to_vec()], &sk, &mut enc_prng)
      .unwrap();
    let gk_bs = client.generate_galois_key(&sk, &mut enc_prng);

    let responses = server.handle_request(&ct_bs, &gk_bs).unwrap();
    let mut recovered = client.recover(&responses[0], &sk, 0, num_rows).unwrap();
    recovered.remove(0)
  }

  #[test]
  fn matrix_vector_product_round_trip() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[31u8; SEED_LEN]);
    let matrix = random_matrix(&mut prng, t, ROWS, DIM);
    let secret: Vec<u64> = (0..DIM).map(|_| prng.uniform_below(3)).collect();

    let recovered = round_trip(&ctx, &matrix, &secret, ROWS);
    assert_eq!(recovered, schoolbook_product(&matrix, &secret, t));
  }

  #[test]
  fn two_row_blocks_pack_into_one_response_ciphertext() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[34u8; SEED_LEN]);
    // twice rows_per_block: both blocks land in the same ciphertext, the
    // second at slot offset rows_per_block
    let rows = 2 * ROWS;
    let matrix = random_matrix(&mut prng, t, rows, DIM);
    let secret: Vec<u64> = (0..DIM).map(|_| prng.uniform_below(3)).collect();

    let db = LinPirDatabase::new(&ctx, &matrix, ROWS).unwrap();
    assert_eq!(db.cts_per_shard(), 1);

    let recovered = round_trip(&ctx, &matrix, &secret, ROWS);
    assert_eq!(recovered, schoolbook_product(&matrix, &secret, t));
  }

  #[test]
  fn secret_tiles_across_two_query_ciphertexts() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    // twice the slot count: the query needs two chunks, and the matrix
    // columns split across them
    let dim = 2 * ctx.num_slots();
    assert_eq!(chunks_per_element(&ctx, dim), 2);
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[35u8; SEED_LEN]);
    let matrix = random_matrix(&mut prng, t, ROWS, dim);
    let secret: Vec<u64> = (0..dim).map(|_| prng.uniform_below(3)).collect();

    let recovered = round_trip(&ctx, &matrix, &secret, ROWS);
    assert_eq!(recovered, schoolbook_product(&matrix, &secret, t));
  }

  #[test]
  fn handles_lwe_sized_values_balanced() {
    // entries near the LWE modulus reduce balanced, matching the hint
    // projection used by the outer protocol
    let ctx = context();
    let t = ctx.plaintext_modulus();
    let q_lwe: u128 = 1 << 32;
    let raw: Vec<u32> = (0..DIM as u32).map(|j| j.wrapping_mul(0x9e3779b9)).collect();
    let matrix: Vec<Vec<u64>> = (0..ROWS)
      .map(|i| {
        raw
          .iter()
          .map(|&v| {
            convert_modulus(
              v.wrapping_add(i as u32) as u128,
              q_lwe,
              t as u128,
              q_lwe / 2,
            ) as u64
          })
          .collect()
      })
      .collect();
    let db = LinPirDatabase::new(&ctx, &matrix, ROWS).unwrap();
    assert_eq!(db.cts_per_shard(), 1);
  }

  #[test]
  fn server_requires_preprocessing() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    let mut prng = Prng::from_seed(PrngType::Hkdf, &[32u8; SEED_LEN]);
    let matrix = random_matrix(&mut prng, t, ROWS, DIM);
    let db = LinPirDatabase::new(&ctx, &matrix, ROWS).unwrap();
    let server = LinPirServer::new(
      Arc::clone(&ctx),
      vec![db],
      1,
      PrngType::Hkdf,
      generate_seed(),
      generate_seed(),
    )
    .unwrap();
    assert!(server.response_pads().is_err());
    assert!(server.handle_request(&[], &[]).is_err());
  }

  #[test]
  fn rejects_malformed_queries() {
    let ctx = context();
    let t = ctx.plaintext_modulus();
    let mut prng = Prng::from_seed(PrngType::ChaCha, &[33u8; SEED_LEN]);
    let matrix = random_matrix(&mut prng, t, ROWS, DIM);
    let db = LinPirDatabase::new(&ctx, &matrix, ROWS).unwrap();
    let ct_seed = generate_seed();
    let gk_seed = generate_seed();
    let mut server = LinPirServer::new(
      Arc::clone(&ctx),
      vec![db],
      1,
      PrngType::ChaCha,
      ct_seed,
      gk_seed,
    )
    .unwrap();
    server.preprocess().unwrap();

    // batch larger than configured
    let b = RnsPolynomial::zero(&ctx, false);
    let too_many = vec![vec![b.clone()], vec![b.clone()]];
    assert!(server.handle_request(&too_many, &[]).is_err());

    // wrong galois key size
    let one = vec![vec![b.clone()]];
    assert!(server.handle_request(&one, &[b.clone()]).is_err());
  }
}
