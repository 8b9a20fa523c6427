use criterion::{criterion_group, criterion_main, BenchmarkGroup, Criterion};
use hintless_pir::api::{Client, Server};
use hintless_pir::params::{Parameters, PrngType, RlweParameters};

fn bench_params() -> Parameters {
  Parameters {
    db_rows: 64,
    db_cols: 64,
    db_record_bit_size: 8,
    batch_size: 1,
    lwe_secret_dim: 256,
    lwe_modulus_bit_size: 32,
    lwe_plaintext_bit_size: 8,
    lwe_error_variance: 8,
    prng_type: PrngType::Hkdf,
    linpir_params: RlweParameters {
      log_n: 9,
      qs: vec![35184371884033, 35184371703809],
      ts: vec![2056193, 1990657],
      gadget_log_bs: vec![16, 16],
      error_variance: 8,
      // four row blocks per response ciphertext, as in the full-size
      // instance
      rows_per_block: 16,
    },
  }
}

fn criterion_benchmark(c: &mut Criterion) {
  let params = bench_params();
  let mut group = c.benchmark_group("hintless_pir");
  group.sample_size(10);

  println!("Setting up server for benchmarking. This might take a while...");
  let mut server = Server::with_random_database(&params).unwrap();
  server.preprocess().unwrap();
  let public_params = server.public_params().unwrap();
  let client = Client::new(&params, &public_params).unwrap();
  println!("Setup complete, starting benchmarks");

  _bench_preprocess(&mut group, &params);
  _bench_online(&mut group, &params, &server, &client);
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);

fn _bench_preprocess(
  c: &mut BenchmarkGroup<criterion::measurement::WallTime>,
  params: &Parameters,
) {
  c.bench_function(
    format!(
      "server preprocess, rows: {}, cols: {}, dim: {}",
      params.db_rows, params.db_cols, params.lwe_secret_dim
    ),
    |b| {
      b.iter_with_setup(
        || Server::with_random_database(params).unwrap(),
        |mut server| server.preprocess().unwrap(),
      );
    },
  );
}

fn _bench_online(
  c: &mut BenchmarkGroup<criterion::measurement::WallTime>,
  params: &Parameters,
  server: &Server,
  client: &Client,
) {
  c.bench_function(
    format!("client generate request, dim: {}", params.lwe_secret_dim),
    |b| {
      b.iter(|| client.generate_request(&[10]).unwrap());
    },
  );

  let (request, pending) = client.generate_request(&[10]).unwrap();
  c.bench_function(
    format!(
      "server handle request, rows: {}, cols: {}",
      params.db_rows, params.db_cols
    ),
    |b| {
      b.iter(|| server.handle_request(&request).unwrap());
    },
  );

  let response = server.handle_request(&request).unwrap();
  c.bench_function("client recover record", |b| {
    b.iter(|| client.recover_record(&pending, &response).unwrap());
  });
}
