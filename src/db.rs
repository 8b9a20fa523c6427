use rayon::prelude::*;

use crate::errors::{
  ErrorInvalidArgument, ErrorPreconditionFailed, ResultBoxedError,
};
use crate::lwe::{vec_mult, LweMatrix, LweVector};
use crate::params::Parameters;
use crate::prng::Prng;
use crate::utils::format::*;

/// Splits a record into its per-shard plaintext values: the record bits,
/// little-endian, taken p bits at a time.
pub fn split_record(
  record: &[u8],
  params: &Parameters,
) -> ResultBoxedError<Vec<u32>> {
  if record.len() != params.record_byte_size() {
    return Err(Box::new(ErrorInvalidArgument::new(
      "record has wrong length",
    )));
  }
  let p = params.lwe_plaintext_bit_size;
  let mut bits = bytes_to_bits_le(record);
  bits.truncate(params.db_record_bit_size);
  Ok(
    (0..params.num_shards())
      .map(|s| {
        let end = ((s + 1) * p).min(bits.len());
        bits_to_u32_le(&bits[s * p..end])
      })
      .collect(),
  )
}

/// Reassembles a record from its per-shard plaintext values.
pub fn reconstruct_record(values: &[u32], params: &Parameters) -> Vec<u8> {
  let p = params.lwe_plaintext_bit_size;
  let mut bits = Vec::with_capacity(values.len() * p);
  for (s, &v) in values.iter().enumerate() {
    let width = p.min(params.db_record_bit_size - s * p);
    bits.extend(u32_to_bits_le(v, width));
  }
  bits.truncate(params.db_record_bit_size);
  let mut bytes = bits_to_bytes_le(&bits);
  bytes.resize(params.record_byte_size(), 0);
  bytes
}

/// The SimplePIR database: one data matrix per shard, with records stored
/// row-major, plus the hint matrices hint_s = data_s * A once the LWE
/// query pad has been installed.
#[derive(Clone, Debug)]
pub struct PirDatabase {
  params: Parameters,
  num_records: usize,
  data_matrices: Vec<LweMatrix>,
  hint_matrices: Vec<LweMatrix>,
  // set when hints were installed verbatim by the caller, in which case
  // update_hints leaves them untouched
  hints_external: bool,
  lwe_query_pad: Option<LweMatrix>,
}

impl PirDatabase {
  /// Returns an empty database for the given parameters.
  pub fn new(params: &Parameters) -> ResultBoxedError<Self> {
    params.validate()?;
    let data_matrices = (0..params.num_shards())
      .map(|_| vec![vec![0u32; params.db_cols]; params.db_rows])
      .collect();
    Ok(Self {
      params: params.clone(),
      num_records: 0,
      data_matrices,
      hint_matrices: Vec::new(),
      hints_external: false,
      lwe_query_pad: None,
    })
  }

  /// Returns a database filled to capacity with random records.
  pub fn random(params: &Parameters) -> ResultBoxedError<Self> {
    let mut db = Self::new(params)?;
    let mut prng = Prng::fresh(params.prng_type);
    for _ in 0..params.num_record_slots() {
      db.append(&generate_random_record(params, &mut prng))?;
    }
    Ok(db)
  }

  /// Appends a record at the next free row-major index.
  pub fn append(&mut self, record: &[u8]) -> ResultBoxedError<()> {
    if self.num_records >= self.params.num_record_slots() {
      return Err(Box::new(ErrorInvalidArgument::new("database is full")));
    }
    let values = split_record(record, &self.params)?;
    let row = self.num_records / self.params.db_cols;
    let col = self.num_records % self.params.db_cols;
    for (matrix, value) in self.data_matrices.iter_mut().zip(values) {
      matrix[row][col] = value;
    }
    self.num_records += 1;
    Ok(())
  }

  /// Reads back the record stored at the given index.
  pub fn record(&self, index: usize) -> ResultBoxedError<Vec<u8>> {
    if index >= self.num_records {
      return Err(Box::new(ErrorInvalidArgument::new("index out of range")));
    }
    let row = index / self.params.db_cols;
    let col = index % self.params.db_cols;
    let values: Vec<u32> =
      self.data_matrices.iter().map(|m| m[row][col]).collect();
    Ok(reconstruct_record(&values, &self.params))
  }

  /// Installs the LWE query pad "A" used for hint computation.
  pub fn update_lwe_query_pad(&mut self, pad: LweMatrix) -> ResultBoxedError<()> {
    if pad.len() != self.params.db_cols
      || pad.iter().any(|r| r.len() != self.params.lwe_secret_dim)
    {
      return Err(Box::new(ErrorInvalidArgument::new(
        "query pad has wrong dimensions",
      )));
    }
    self.lwe_query_pad = Some(pad);
    Ok(())
  }

  /// Recomputes hint_s = data_s * A mod 2^32 for every shard. A no-op if
  /// hints were installed externally via `set_hint`.
  pub fn update_hints(&mut self) -> ResultBoxedError<()> {
    if self.hints_external {
      return Ok(());
    }
    let pad = self.lwe_query_pad.as_ref().ok_or_else(|| {
      Box::new(ErrorPreconditionFailed::new("LWE query pad is not set"))
        as Box<dyn std::error::Error>
    })?;
    let dim = self.params.lwe_secret_dim;
    self.hint_matrices = self
      .data_matrices
      .iter()
      .map(|data| {
        data
          .par_iter()
          .map(|data_row| {
            (0..dim)
              .map(|j| {
                let mut acc = 0u32;
                for (value, pad_row) in data_row.iter().zip(pad.iter()) {
                  acc = acc.wrapping_add(value.wrapping_mul(pad_row[j]));
                }
                acc
              })
              .collect()
          })
          .collect()
      })
      .collect();
    Ok(())
  }

  /// Installs externally computed hints verbatim, one flat row-major
  /// matrix per shard.
  pub fn set_hint(&mut self, values: &[u32]) -> ResultBoxedError<()> {
    let rows = self.params.db_rows;
    let dim = self.params.lwe_secret_dim;
    let expected = self.params.num_shards() * rows * dim;
    if values.len() != expected {
      return Err(Box::new(ErrorInvalidArgument::new(
        "hint values have wrong length",
      )));
    }
    self.hint_matrices = values
      .chunks(rows * dim)
      .map(|shard| shard.chunks(dim).map(|row| row.to_vec()).collect())
      .collect();
    self.hints_external = true;
    Ok(())
  }

  /// Returns data_s * query mod 2^32 for every shard.
  pub fn inner_product_with(
    &self,
    query: &[u32],
  ) -> ResultBoxedError<Vec<LweVector>> {
    if query.len() != self.params.db_cols {
      return Err(Box::new(ErrorInvalidArgument::new(
        "query vector has wrong length",
      )));
    }
    Ok(
      self
        .data_matrices
        .iter()
        .map(|data| data.iter().map(|row| vec_mult(row, query)).collect())
        .collect(),
    )
  }

  pub fn hints(&self) -> ResultBoxedError<&[LweMatrix]> {
    if self.hint_matrices.is_empty() {
      return Err(Box::new(ErrorPreconditionFailed::new(
        "hints have not been computed",
      )));
    }
    Ok(&self.hint_matrices)
  }

  pub fn data(&self) -> &[LweMatrix] {
    &self.data_matrices
  }

  pub fn num_shards(&self) -> usize {
    self.data_matrices.len()
  }

  pub fn num_records(&self) -> usize {
    self.num_records
  }
}

/// A random record whose unused top bits are clear, so that storage and
/// retrieval round-trip bytewise.
pub fn generate_random_record(params: &Parameters, prng: &mut Prng) -> Vec<u8> {
  let mut record = vec![0u8; params.record_byte_size()];
  prng.fill_bytes(&mut record);
  let excess = record.len() * 8 - params.db_record_bit_size;
  if excess > 0 {
    let last = record.len() - 1;
    record[last] &= 0xffu8 >> excess;
  }
  record
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::lwe::expand_pad;
  use crate::params::test_params;

  fn record_for(i: usize) -> Vec<u8> {
    vec![((i * 37 + 11) % 256) as u8]
  }

  #[test]
  fn split_and_reconstruct_round_trip() {
    let cases = [(8usize, 8usize), (7, 8), (16, 8), (15, 7), (128, 8)];
    for &(record_bits, plaintext_bits) in cases.iter() {
      let mut params = test_params::default();
      params.db_record_bit_size = record_bits;
      params.lwe_plaintext_bit_size = plaintext_bits;
      let mut prng = Prng::fresh(params.prng_type);
      let record = generate_random_record(&params, &mut prng);
      let values = split_record(&record, &params).unwrap();
      assert_eq!(values.len(), params.num_shards());
      assert_eq!(reconstruct_record(&values, &params), record);
    }
  }

  #[test]
  fn append_and_read_back() {
    let params = test_params::default();
    let mut db = PirDatabase::new(&params).unwrap();
    for i in 0..params.num_record_slots() {
      db.append(&record_for(i)).unwrap();
    }
    assert_eq!(db.num_records(), 64);
    assert_eq!(db.record(0).unwrap(), record_for(0));
    assert_eq!(db.record(17).unwrap(), record_for(17));
    assert_eq!(db.record(63).unwrap(), record_for(63));
    assert!(db.record(64).is_err());
    assert!(db.append(&record_for(0)).is_err());
  }

  #[test]
  fn two_shard_records_split_correctly() {
    let mut params = test_params::default();
    params.db_record_bit_size = 16;
    let mut db = PirDatabase::new(&params).unwrap();
    let record = vec![65u8, 193u8];
    db.append(&record).unwrap();
    assert_eq!(db.num_shards(), 2);
    assert_eq!(db.data()[0][0][0], 65);
    assert_eq!(db.data()[1][0][0], 193);
    assert_eq!(db.record(0).unwrap(), record);
  }

  #[test]
  fn hints_match_elementwise_product() {
    let params = test_params::default();
    let mut db = PirDatabase::new(&params).unwrap();
    for i in 0..params.num_record_slots() {
      db.append(&record_for(i)).unwrap();
    }
    let mut prng = Prng::fresh(params.prng_type);
    let pad = expand_pad(params.db_cols, params.lwe_secret_dim, &mut prng);
    db.update_lwe_query_pad(pad.clone()).unwrap();
    db.update_hints().unwrap();

    let hints = db.hints().unwrap();
    for (data, hint) in db.data().iter().zip(hints.iter()) {
      for r in 0..params.db_rows {
        for j in 0..params.lwe_secret_dim {
          let mut acc = 0u32;
          for c in 0..params.db_cols {
            acc = acc.wrapping_add(data[r][c].wrapping_mul(pad[c][j]));
          }
          assert_eq!(hint[r][j], acc);
        }
      }
    }
  }

  #[test]
  fn external_hints_are_kept_verbatim() {
    let params = test_params::default();
    let mut db = PirDatabase::new(&params).unwrap();
    let rows = params.db_rows;
    let dim = params.lwe_secret_dim;
    let values: Vec<u32> = (0..rows * dim).map(|v| v as u32).collect();
    db.set_hint(&values).unwrap();
    // update_hints must not clobber externally installed hints
    db.update_hints().unwrap();
    let hints = db.hints().unwrap();
    assert_eq!(hints[0][1][2], (dim + 2) as u32);
  }

  #[test]
  fn inner_product_selects_a_column() {
    let params = test_params::default();
    let mut db = PirDatabase::new(&params).unwrap();
    for i in 0..params.num_record_slots() {
      db.append(&record_for(i)).unwrap();
    }
    let mut selector = vec![0u32; params.db_cols];
    selector[3] = 1;
    let products = db.inner_product_with(&selector).unwrap();
    for r in 0..params.db_rows {
      assert_eq!(products[0][r], db.data()[0][r][3]);
    }
  }
}
