use std::fs;
use std::io::BufReader;

use serde::{Deserialize, Serialize};

use crate::errors::{ErrorInvalidArgument, ResultBoxedError};

/// Number of bits of the LWE modulus. The modulus is 2^32, realized by
/// native u32 wraparound throughout the LWE layer.
pub const LWE_MODULUS_BIT_SIZE: usize = 32;

/// The deterministic generators used to expand public pads from seeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrngType {
  Hkdf,
  ChaCha,
}

/// Parameters of the RLWE instances backing the LinPIR subprotocol. One
/// instance runs per plaintext modulus in `ts`; all instances share the
/// ciphertext moduli `qs` and the Galois key.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RlweParameters {
  /// Ring degree is N = 2^log_n.
  pub log_n: usize,
  /// RNS ciphertext moduli, NTT-friendly primes (1 mod 2N).
  pub qs: Vec<u64>,
  /// Plaintext moduli, NTT-friendly primes (1 mod 2N).
  pub ts: Vec<u64>,
  /// Gadget base log per ciphertext modulus level.
  pub gadget_log_bs: Vec<usize>,
  /// Variance of the centered binomial error distribution.
  pub error_variance: usize,
  /// Rows of the hint matrix handled as one block.
  pub rows_per_block: usize,
}

impl RlweParameters {
  pub fn ring_dim(&self) -> usize {
    1 << self.log_n
  }

  /// Size of the rotation group of slots, i.e. the orbit of the Galois
  /// generator among the odd powers mod 2N.
  pub fn num_slots(&self) -> usize {
    self.ring_dim() / 2
  }
}

/// Protocol parameters, immutable once a server or client is created.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
  pub db_rows: usize,
  pub db_cols: usize,
  pub db_record_bit_size: usize,
  pub batch_size: usize,
  pub lwe_secret_dim: usize,
  pub lwe_modulus_bit_size: usize,
  pub lwe_plaintext_bit_size: usize,
  pub lwe_error_variance: usize,
  pub prng_type: PrngType,
  pub linpir_params: RlweParameters,
}

impl Parameters {
  /// Load parameters from a JSON file.
  pub fn from_json_file(path: &str) -> ResultBoxedError<Self> {
    let reader = BufReader::new(fs::File::open(path)?);
    let params: Parameters = serde_json::from_reader(reader)?;
    params.validate()?;
    Ok(params)
  }

  /// Writes the parameters as JSON to file.
  pub fn write_to_file(&self, path: &str) -> ResultBoxedError<()> {
    Ok(serde_json::to_writer(&fs::File::create(path)?, self)?)
  }

  pub fn validate(&self) -> ResultBoxedError<()> {
    if self.lwe_modulus_bit_size != LWE_MODULUS_BIT_SIZE {
      return Err(Box::new(ErrorInvalidArgument::new(
        "lwe_modulus_bit_size must be 32",
      )));
    }
    if self.lwe_plaintext_bit_size == 0
      || self.lwe_plaintext_bit_size >= LWE_MODULUS_BIT_SIZE
    {
      return Err(Box::new(ErrorInvalidArgument::new(
        "lwe_plaintext_bit_size must be in [1, 31]",
      )));
    }
    if self.db_rows == 0 || self.db_cols == 0 || self.db_record_bit_size == 0 {
      return Err(Box::new(ErrorInvalidArgument::new(
        "database dimensions must be positive",
      )));
    }
    if self.batch_size == 0 {
      return Err(Box::new(ErrorInvalidArgument::new(
        "batch_size must be positive",
      )));
    }
    let rlwe = &self.linpir_params;
    if rlwe.qs.is_empty() || rlwe.ts.is_empty() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "at least one ciphertext and one plaintext modulus is required",
      )));
    }
    if rlwe.gadget_log_bs.len() != rlwe.qs.len() {
      return Err(Box::new(ErrorInvalidArgument::new(
        "gadget_log_bs must have one entry per ciphertext modulus",
      )));
    }
    for &log_b in &rlwe.gadget_log_bs {
      if log_b == 0 || log_b > 32 {
        return Err(Box::new(ErrorInvalidArgument::new(
          "gadget base logs must be in [1, 32]",
        )));
      }
    }
    if rlwe.rows_per_block == 0 || self.db_rows % rlwe.rows_per_block != 0 {
      return Err(Box::new(ErrorInvalidArgument::new(
        "db_rows must be a positive multiple of rows_per_block",
      )));
    }
    let num_slots = rlwe.num_slots();
    if rlwe.rows_per_block > num_slots || num_slots % rlwe.rows_per_block != 0 {
      return Err(Box::new(ErrorInvalidArgument::new(
        "rows_per_block must divide the slot count",
      )));
    }
    if self.lwe_secret_dim == 0
      || (self.lwe_secret_dim % num_slots != 0
        && num_slots % self.lwe_secret_dim != 0)
    {
      return Err(Box::new(ErrorInvalidArgument::new(
        "lwe_secret_dim must be a multiple or a divisor of the slot count",
      )));
    }
    Ok(())
  }

  /// Number of p-bit slices each record is split into.
  pub fn num_shards(&self) -> usize {
    (self.db_record_bit_size + self.lwe_plaintext_bit_size - 1)
      / self.lwe_plaintext_bit_size
  }

  /// Number of records the database matrices can hold.
  pub fn num_record_slots(&self) -> usize {
    self.db_rows * self.db_cols
  }

  /// Length in bytes of a single record.
  pub fn record_byte_size(&self) -> usize {
    (self.db_record_bit_size + 7) / 8
  }

  /// log2 of the scaling factor Delta embedding plaintexts in the LWE
  /// modulus.
  pub fn log_scaling_factor(&self) -> usize {
    self.lwe_modulus_bit_size - self.lwe_plaintext_bit_size
  }
}

#[cfg(test)]
pub(crate) mod test_params {
  use super::*;

  /// Small but cryptographically well-formed parameters: the original
  /// production moduli with a reduced ring degree and database.
  pub fn default() -> Parameters {
    Parameters {
      db_rows: 8,
      db_cols: 8,
      db_record_bit_size: 8,
      batch_size: 4,
      lwe_secret_dim: 64,
      lwe_modulus_bit_size: 32,
      lwe_plaintext_bit_size: 8,
      lwe_error_variance: 8,
      prng_type: PrngType::Hkdf,
      linpir_params: RlweParameters {
        log_n: 8,
        qs: vec![35184371884033, 35184371703809],
        ts: vec![2056193, 1990657],
        gadget_log_bs: vec![16, 16],
        error_variance: 8,
        rows_per_block: 8,
      },
    }
  }

  /// Variant shaped like the production system: the hint matrix packs two
  /// row blocks into each response ciphertext, and the LWE secret tiles
  /// across two query ciphertexts per batch element.
  pub fn multi_block() -> Parameters {
    let mut params = default();
    params.db_rows = 16;
    params.batch_size = 2;
    params.lwe_secret_dim = 256;
    params
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn validate_accepts_default() {
    assert!(test_params::default().validate().is_ok());
  }

  #[test]
  fn validate_accepts_multi_block() {
    let params = test_params::multi_block();
    assert!(params.validate().is_ok());
    // two row blocks per slot ring, two chunks per secret
    assert_eq!(params.db_rows / params.linpir_params.rows_per_block, 2);
    assert_eq!(
      params.lwe_secret_dim / params.linpir_params.num_slots(),
      2
    );
  }

  #[test]
  fn validate_rejects_bad_modulus_size() {
    let mut params = test_params::default();
    params.lwe_modulus_bit_size = 64;
    assert!(params.validate().is_err());
  }

  #[test]
  fn validate_rejects_unaligned_blocks() {
    let mut params = test_params::default();
    params.linpir_params.rows_per_block = 3;
    assert!(params.validate().is_err());
  }

  #[test]
  fn validate_rejects_bad_secret_dim() {
    let mut params = test_params::default();
    params.lwe_secret_dim = 96;
    assert!(params.validate().is_err());
  }

  #[test]
  fn shard_count_rounds_up() {
    let mut params = test_params::default();
    params.db_record_bit_size = 9;
    assert_eq!(params.num_shards(), 2);
    params.db_record_bit_size = 16;
    assert_eq!(params.num_shards(), 2);
    params.db_record_bit_size = 17;
    assert_eq!(params.num_shards(), 3);
  }
}
