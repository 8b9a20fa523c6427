//! The public entry points of the protocol: a `Server` owning the sharded
//! database and the LinPIR instances, and a `Client` that issues batched
//! retrieval requests and recovers records from the answers.

use std::sync::Arc;

use crate::bfv::BfvSecretKey;
use crate::db::{reconstruct_record, PirDatabase};
use crate::errors::{
  ErrorInvalidArgument, ErrorPreconditionFailed, ResultBoxedError,
};
use crate::linpir::{LinPirClient, LinPirDatabase, LinPirServer};
use crate::lwe::{expand_pad, remove_error_in_place, LweMatrix, SymmetricLweKey};
use crate::modarith::{convert_modulus, CrtContext};
use crate::params::Parameters;
use crate::prng::{generate_seed, Prng, Seed};
use crate::rns::RnsContext;
use crate::serialize::{
  HintlessPirRequest, HintlessPirResponse, LinPirResponse,
  SerializedRnsPolynomial, ServerPublicParams,
};

const LWE_MODULUS: u128 = 1 << 32;
const LWE_MODULUS_HALF: u128 = 1 << 31;

fn build_contexts(params: &Parameters) -> ResultBoxedError<Vec<Arc<RnsContext>>> {
  params
    .linpir_params
    .ts
    .iter()
    .map(|&t| Ok(Arc::new(RnsContext::new(&params.linpir_params, t)?)))
    .collect()
}

// Balanced projection of an LWE-modulus value into a plaintext modulus.
fn project_mod_t(value: u32, t: u64) -> u64 {
  convert_modulus(value as u128, LWE_MODULUS, t as u128, LWE_MODULUS_HALF) as u64
}

/// The server half of the protocol. Owns the database; `preprocess` seals
/// it and prepares every LinPIR instance, after which `public_params` and
/// `handle_request` become available.
pub struct Server {
  params: Parameters,
  database: PirDatabase,
  prng_seed_lwe_query_pad: Seed,
  prng_seed_linpir_ct_pads: Vec<Seed>,
  prng_seed_linpir_gk_pad: Seed,
  contexts: Vec<Arc<RnsContext>>,
  linpir_servers: Vec<LinPirServer>,
}

impl Server {
  /// Creates a server with an empty database.
  pub fn new(params: &Parameters) -> ResultBoxedError<Self> {
    let database = PirDatabase::new(params)?;
    Self::with_database(params, database)
  }

  /// Creates a server around an existing database.
  pub fn with_database(
    params: &Parameters,
    database: PirDatabase,
  ) -> ResultBoxedError<Self> {
    params.validate()?;
    let contexts = build_contexts(params)?;
    let prng_seed_linpir_ct_pads =
      (0..params.linpir_params.ts.len()).map(|_| generate_seed()).collect();
    Ok(Self {
      params: params.clone(),
      database,
      prng_seed_lwe_query_pad: generate_seed(),
      prng_seed_linpir_ct_pads,
      prng_seed_linpir_gk_pad: generate_seed(),
      contexts,
      linpir_servers: Vec::new(),
    })
  }

  /// Creates a server with a database filled with random records.
  pub fn with_random_database(params: &Parameters) -> ResultBoxedError<Self> {
    let database = PirDatabase::random(params)?;
    Self::with_database(params, database)
  }

  pub fn database(&self) -> &PirDatabase {
    &self.database
  }

  pub fn database_mut(&mut self) -> &mut PirDatabase {
    &mut self.database
  }

  /// Expands the LWE pad, computes the hint matrices, and preprocesses one
  /// LinPIR instance per plaintext modulus over the hint projections.
  /// Idempotent: the seeds are fixed at construction, and a repeated call
  /// recomputes identical hints. New state is installed only after every
  /// step has succeeded.
  pub fn preprocess(&mut self) -> ResultBoxedError<()> {
    let mut pad_prng =
      Prng::from_seed(self.params.prng_type, &self.prng_seed_lwe_query_pad);
    let pad = expand_pad(
      self.params.db_cols,
      self.params.lwe_secret_dim,
      &mut pad_prng,
    );
    self.database.update_lwe_query_pad(pad)?;
    self.database.update_hints()?;

    let mut servers = Vec::with_capacity(self.contexts.len());
    for (k, ctx) in self.contexts.iter().enumerate() {
      let t = ctx.plaintext_modulus();
      let hints = self.database.hints()?;
      let mut databases = Vec::with_capacity(hints.len());
      for hint in hints {
        let rows: Vec<Vec<u64>> = hint
          .iter()
          .map(|row| row.iter().map(|&h| project_mod_t(h, t)).collect())
          .collect();
        databases.push(LinPirDatabase::new(
          ctx,
          &rows,
          self.params.linpir_params.rows_per_block,
        )?);
      }
      let mut server = LinPirServer::new(
        Arc::clone(ctx),
        databases,
        self.params.batch_size,
        self.params.prng_type,
        self.prng_seed_linpir_ct_pads[k],
        self.prng_seed_linpir_gk_pad,
      )?;
      server.preprocess()?;
      servers.push(server);
    }
    self.linpir_servers = servers;
    Ok(())
  }

  /// The public parameters a client needs: the pad seeds and the
  /// query-independent response pads of every LinPIR instance.
  pub fn public_params(&self) -> ResultBoxedError<ServerPublicParams> {
    if self.linpir_servers.is_empty() {
      return Err(Box::new(ErrorPreconditionFailed::new(
        "server has not been preprocessed",
      )));
    }
    let mut linpir_response_pads = Vec::with_capacity(self.linpir_servers.len());
    for (server, ctx) in self.linpir_servers.iter().zip(self.contexts.iter()) {
      let pads = server.response_pads()?;
      let mut per_elt = Vec::with_capacity(pads.len());
      for shards in pads {
        let mut per_shard = Vec::with_capacity(shards.len());
        for cts in shards {
          let mut per_ct = Vec::with_capacity(cts.len());
          for pad in cts {
            let mut coeff = pad.clone();
            coeff.ntt_backward(ctx);
            per_ct.push(SerializedRnsPolynomial::from_polynomial(&coeff)?);
          }
          per_shard.push(per_ct);
        }
        per_elt.push(per_shard);
      }
      linpir_response_pads.push(per_elt);
    }
    Ok(ServerPublicParams {
      prng_seed_lwe_query_pad: self.prng_seed_lwe_query_pad,
      prng_seed_linpir_ct_pads: self.prng_seed_linpir_ct_pads.clone(),
      prng_seed_linpir_gk_pad: self.prng_seed_linpir_gk_pad,
      linpir_response_pads,
    })
  }

  /// Answers a batched request: the raw SimplePIR products per query
  /// ciphertext and shard, and the encrypted hint products per plaintext
  /// modulus and batch element.
  pub fn handle_request(
    &self,
    request: &HintlessPirRequest,
  ) -> ResultBoxedError<HintlessPirResponse> {
    if self.linpir_servers.is_empty() {
      return Err(Box::new(ErrorPreconditionFailed::new(
        "server has not been preprocessed",
      )));
    }
    let num_ts = self.contexts.len();
    let chunks = self.linpir_chunks();
    let total = request.linpir_ct_bs.len();
    if total == 0 || total % (num_ts * chunks) != 0 {
      return Err(Box::new(ErrorInvalidArgument::new(
        "request has unexpected number of LinPIR ciphertexts",
      )));
    }
    let batch = total / (num_ts * chunks);
    if batch > self.params.batch_size {
      return Err(Box::new(ErrorInvalidArgument::new(
        "request batch exceeds the configured batch size",
      )));
    }
    if !request.ct_query_vector.is_empty()
      && request.ct_query_vector.len() != batch
    {
      return Err(Box::new(ErrorInvalidArgument::new(
        "request LWE query count does not match the batch",
      )));
    }

    // raw SimplePIR answers
    let mut ct_records = Vec::new();
    for query in &request.ct_query_vector {
      let products = self.database.inner_product_with(query)?;
      ct_records.extend(products);
    }

    // galois key, shared across instances
    let ctx0 = &self.contexts[0];
    let mut gk_hats = Vec::with_capacity(request.linpir_gk_bs.len());
    for gk_b in &request.linpir_gk_bs {
      let mut poly = gk_b.to_polynomial(ctx0)?;
      poly.ntt_forward(ctx0);
      gk_hats.push(poly);
    }

    let mut linpir_responses = Vec::with_capacity(num_ts * batch);
    for (k, server) in self.linpir_servers.iter().enumerate() {
      let ctx = &self.contexts[k];
      let base = k * batch * chunks;
      let mut ct_bs = Vec::with_capacity(batch);
      for i in 0..batch {
        let mut element = Vec::with_capacity(chunks);
        for c in 0..chunks {
          element
            .push(request.linpir_ct_bs[base + i * chunks + c].to_polynomial(ctx)?);
        }
        ct_bs.push(element);
      }
      let results = server.handle_request(&ct_bs, &gk_hats)?;
      for per_shard in results {
        let mut ct_inner_products = Vec::new();
        for cts in per_shard {
          for b in cts {
            ct_inner_products.push(SerializedRnsPolynomial::from_polynomial(&b)?);
          }
        }
        linpir_responses.push(LinPirResponse { ct_inner_products });
      }
    }

    Ok(HintlessPirResponse {
      ct_records,
      linpir_responses,
    })
  }

  fn linpir_chunks(&self) -> usize {
    crate::linpir::chunks_per_element(&self.contexts[0], self.params.lwe_secret_dim)
  }
}

/// Per-request client state, returned by `generate_request` and consumed
/// by `recover_record`, so several requests can be in flight on one
/// client.
pub struct PendingRequest {
  row_idx: Vec<usize>,
  col_idx: Vec<usize>,
  prng_seed_linpir_sk: Seed,
  batch: usize,
}

impl PendingRequest {
  pub fn batch_size(&self) -> usize {
    self.batch
  }

  /// Matrix coordinates of the requested indices; empty for key-based
  /// requests.
  pub fn coordinates(&self) -> Vec<(usize, usize)> {
    self
      .row_idx
      .iter()
      .zip(self.col_idx.iter())
      .map(|(&row, &col)| (row, col))
      .collect()
  }
}

/// The client half of the protocol, built from the server public
/// parameters.
pub struct Client {
  params: Parameters,
  contexts: Vec<Arc<RnsContext>>,
  linpir_clients: Vec<LinPirClient>,
  lwe_query_pad: LweMatrix,
  plaintext_crt: CrtContext,
}

impl Client {
  pub fn new(
    params: &Parameters,
    public_params: &ServerPublicParams,
  ) -> ResultBoxedError<Self> {
    params.validate()?;
    let num_ts = params.linpir_params.ts.len();
    if public_params.prng_seed_linpir_ct_pads.len() != num_ts
      || public_params.linpir_response_pads.len() != num_ts
    {
      return Err(Box::new(ErrorInvalidArgument::new(
        "public parameters do not match the number of plaintext moduli",
      )));
    }
    let contexts = build_contexts(params)?;
    let mut linpir_clients = Vec::with_capacity(num_ts);
    for (k, ctx) in contexts.iter().enumerate() {
      let mut response_pads =
        Vec::with_capacity(public_params.linpir_response_pads[k].len());
      for shards in &public_params.linpir_response_pads[k] {
        let mut per_shard = Vec::with_capacity(shards.len());
        for cts in shards {
          let mut per_ct = Vec::with_capacity(cts.len());
          for ser in cts {
            let mut pad = ser.to_polynomial(ctx)?;
            pad.ntt_forward(ctx);
            per_ct.push(pad);
          }
          per_shard.push(per_ct);
        }
        response_pads.push(per_shard);
      }
      linpir_clients.push(LinPirClient::new(
        Arc::clone(ctx),
        params.batch_size,
        params.lwe_secret_dim,
        params.prng_type,
        &public_params.prng_seed_linpir_ct_pads[k],
        &public_params.prng_seed_linpir_gk_pad,
        response_pads,
      )?);
    }
    let mut pad_prng = Prng::from_seed(
      params.prng_type,
      &public_params.prng_seed_lwe_query_pad,
    );
    let lwe_query_pad =
      expand_pad(params.db_cols, params.lwe_secret_dim, &mut pad_prng);
    let plaintext_crt = CrtContext::new(&params.linpir_params.ts)?;
    Ok(Self {
      params: params.clone(),
      contexts,
      linpir_clients,
      lwe_query_pad,
      plaintext_crt,
    })
  }

  /// Builds a batched retrieval request for the given record indices:
  /// per index, an LWE encryption of the scaled selection vector under a
  /// fresh key, plus the LinPIR encryptions of all those keys.
  pub fn generate_request(
    &self,
    indices: &[usize],
  ) -> ResultBoxedError<(HintlessPirRequest, PendingRequest)> {
    if indices.is_empty() || indices.len() > self.params.batch_size {
      return Err(Box::new(ErrorInvalidArgument::new(
        "batch size out of range",
      )));
    }
    let mut enc_prng = Prng::fresh(self.params.prng_type);
    let log_scale = self.params.log_scaling_factor();

    let mut row_idx = vec![0usize; indices.len()];
    let mut col_idx = vec![0usize; indices.len()];
    let mut lwe_secrets = Vec::with_capacity(indices.len());
    let mut ct_query_vector = Vec::with_capacity(indices.len());
    for (i, &index) in indices.iter().enumerate() {
      if index >= self.params.num_record_slots() {
        return Err(Box::new(ErrorInvalidArgument::new("index out of range")));
      }
      row_idx[i] = index / self.params.db_cols;
      col_idx[i] = index % self.params.db_cols;

      let key =
        SymmetricLweKey::sample(self.params.lwe_secret_dim, &mut enc_prng);
      let mut values = vec![0u32; self.params.db_cols];
      values[col_idx[i]] = 1;
      key.encrypt_from_pad_in_place(
        &mut values,
        &self.lwe_query_pad,
        log_scale,
        self.params.lwe_error_variance,
        &mut enc_prng,
      )?;
      ct_query_vector.push(values);
      lwe_secrets.push(key.key().to_vec());
    }

    let prng_seed_linpir_sk = generate_seed();
    let (linpir_ct_bs, linpir_gk_bs) =
      self.generate_linpir_parts(&lwe_secrets, &prng_seed_linpir_sk)?;
    let request = HintlessPirRequest {
      ct_query_vector,
      linpir_ct_bs,
      linpir_gk_bs,
    };
    let pending = PendingRequest {
      row_idx,
      col_idx,
      prng_seed_linpir_sk,
      batch: indices.len(),
    };
    Ok((request, pending))
  }

  /// Builds a request from caller-provided LWE secrets: only the LinPIR
  /// part is sent, and the answer carries the hint products of those
  /// secrets rather than database records.
  pub fn generate_query(
    &self,
    keys: &[Vec<u32>],
  ) -> ResultBoxedError<(HintlessPirRequest, PendingRequest)> {
    if keys.is_empty() || keys.len() > self.params.batch_size {
      return Err(Box::new(ErrorInvalidArgument::new(
        "batch size out of range",
      )));
    }
    if keys.iter().any(|k| k.len() != self.params.lwe_secret_dim) {
      return Err(Box::new(ErrorInvalidArgument::new(
        "key has wrong dimension",
      )));
    }
    let prng_seed_linpir_sk = generate_seed();
    let (linpir_ct_bs, linpir_gk_bs) =
      self.generate_linpir_parts(keys, &prng_seed_linpir_sk)?;
    let request = HintlessPirRequest {
      ct_query_vector: Vec::new(),
      linpir_ct_bs,
      linpir_gk_bs,
    };
    let pending = PendingRequest {
      row_idx: Vec::new(),
      col_idx: Vec::new(),
      prng_seed_linpir_sk,
      batch: keys.len(),
    };
    Ok((request, pending))
  }

  // Encrypts the secrets under every plaintext modulus and emits the
  // shared Galois key; the BFV secret is re-derived from the request seed
  // for every instance, so one key serves them all.
  fn generate_linpir_parts(
    &self,
    secrets: &[Vec<u32>],
    sk_seed: &Seed,
  ) -> ResultBoxedError<(Vec<SerializedRnsPolynomial>, Vec<SerializedRnsPolynomial>)>
  {
    let mut enc_prng = Prng::fresh(self.params.prng_type);
    let mut linpir_ct_bs = Vec::new();
    for (k, linpir_client) in self.linpir_clients.iter().enumerate() {
      let ctx = &self.contexts[k];
      let t = ctx.plaintext_modulus();
      let secrets_mod_t: Vec<Vec<u64>> = secrets
        .iter()
        .map(|s| s.iter().map(|&x| project_mod_t(x, t)).collect())
        .collect();
      let mut sk_prng = Prng::from_seed(self.params.prng_type, sk_seed);
      let sk = BfvSecretKey::sample(ctx, &mut sk_prng);
      let ct_bs = linpir_client.encrypt_query(&secrets_mod_t, &sk, &mut enc_prng)?;
      for element_bs in ct_bs {
        for b in element_bs {
          linpir_ct_bs.push(SerializedRnsPolynomial::from_polynomial(&b)?);
        }
      }
    }

    let ctx0 = &self.contexts[0];
    let mut sk_prng = Prng::from_seed(self.params.prng_type, sk_seed);
    let sk = BfvSecretKey::sample(ctx0, &mut sk_prng);
    let gk = self.linpir_clients[0].generate_galois_key(&sk, &mut enc_prng);
    let mut linpir_gk_bs = Vec::with_capacity(gk.len());
    for mut gk_b in gk {
      gk_b.ntt_backward(ctx0);
      linpir_gk_bs.push(SerializedRnsPolynomial::from_polynomial(&gk_b)?);
    }
    Ok((linpir_ct_bs, linpir_gk_bs))
  }

  /// Recovers the requested records from a response: decrypts the hint
  /// products, subtracts them from the raw answers at the requested rows,
  /// strips the LWE error, and reassembles the record bytes.
  pub fn recover_record(
    &self,
    pending: &PendingRequest,
    response: &HintlessPirResponse,
  ) -> ResultBoxedError<Vec<Vec<u8>>> {
    if pending.row_idx.len() != pending.batch {
      return Err(Box::new(ErrorInvalidArgument::new(
        "request was not generated from record indices",
      )));
    }
    let num_shards = self.params.num_shards();
    if response.ct_records.len() != pending.batch * num_shards {
      return Err(Box::new(ErrorInvalidArgument::new(
        "response has unexpected number of LWE vectors",
      )));
    }
    let decryption_parts = self.recover_decryption_parts(pending, response)?;

    let log_delta = self.params.log_scaling_factor();
    let mut records = Vec::with_capacity(pending.batch);
    for i in 0..pending.batch {
      let row = pending.row_idx[i];
      let mut values = Vec::with_capacity(num_shards);
      for j in 0..num_shards {
        let raw = &response.ct_records[i * num_shards + j];
        if raw.len() != self.params.db_rows {
          return Err(Box::new(ErrorInvalidArgument::new(
            "response vector has wrong length",
          )));
        }
        let mut noisy = [raw[row].wrapping_sub(decryption_parts[i][j][row])];
        remove_error_in_place(&mut noisy, log_delta);
        values.push(noisy[0]);
      }
      records.push(reconstruct_record(&values, &self.params));
    }
    Ok(records)
  }

  /// Returns the full decryption parts (hint times secret, mod 2^32) per
  /// batch element, shards concatenated.
  pub fn recover_ints(
    &self,
    pending: &PendingRequest,
    response: &HintlessPirResponse,
  ) -> ResultBoxedError<Vec<Vec<u32>>> {
    let decryption_parts = self.recover_decryption_parts(pending, response)?;
    Ok(
      decryption_parts
        .into_iter()
        .map(|shards| shards.into_iter().flatten().collect())
        .collect(),
    )
  }

  // Decrypts every LinPIR response, CRT-composes the residues across the
  // plaintext moduli, and converts balanced into the LWE modulus. Output
  // is indexed by batch element, shard, and database row.
  fn recover_decryption_parts(
    &self,
    pending: &PendingRequest,
    response: &HintlessPirResponse,
  ) -> ResultBoxedError<Vec<Vec<Vec<u32>>>> {
    let num_ts = self.contexts.len();
    let batch = pending.batch;
    if response.linpir_responses.len() != num_ts * batch {
      return Err(Box::new(ErrorInvalidArgument::new(
        "response has unexpected number of LinPIR answers",
      )));
    }
    let num_shards = self.params.num_shards();
    let db_rows = self.params.db_rows;

    // one BFV secret per instance, re-derived from the request seed
    let secret_keys: Vec<BfvSecretKey> = self
      .contexts
      .iter()
      .map(|ctx| {
        let mut sk_prng =
          Prng::from_seed(self.params.prng_type, &pending.prng_seed_linpir_sk);
        BfvSecretKey::sample(ctx, &mut sk_prng)
      })
      .collect();

    let product = self.plaintext_crt.product();
    let product_half = product / 2;
    let mut out = Vec::with_capacity(batch);
    for i in 0..batch {
      // residues[k][shard][row]
      let mut residues = Vec::with_capacity(num_ts);
      for k in 0..num_ts {
        let ctx = &self.contexts[k];
        let linpir_response = &response.linpir_responses[k * batch + i];
        let cts_per_shard =
          (db_rows + ctx.num_slots() - 1) / ctx.num_slots();
        if linpir_response.ct_inner_products.len() != num_shards * cts_per_shard
        {
          return Err(Box::new(ErrorInvalidArgument::new(
            "LinPIR response has unexpected number of ciphertexts",
          )));
        }
        let mut per_shard = Vec::with_capacity(num_shards);
        for j in 0..num_shards {
          let mut cts = Vec::with_capacity(cts_per_shard);
          for c in 0..cts_per_shard {
            cts.push(
              linpir_response.ct_inner_products[j * cts_per_shard + c]
                .to_polynomial(ctx)?,
            );
          }
          per_shard.push(cts);
        }
        residues.push(self.linpir_clients[k].recover(
          &per_shard,
          &secret_keys[k],
          i,
          db_rows,
        )?);
      }

      let mut element = Vec::with_capacity(num_shards);
      for j in 0..num_shards {
        let mut rows = Vec::with_capacity(db_rows);
        for r in 0..db_rows {
          let parts: Vec<u64> =
            (0..num_ts).map(|k| residues[k][j][r]).collect();
          let lifted = self.plaintext_crt.interpolate(&parts);
          rows.push(
            convert_modulus(lifted, product, LWE_MODULUS, product_half) as u32,
          );
        }
        element.push(rows);
      }
      out.push(element);
    }
    Ok(out)
  }
}
