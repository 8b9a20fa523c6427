//! Hintless SimplePIR: single-server private information retrieval without
//! a client-side hint.
//!
//! The server answer to a SimplePIR query normally requires the client to
//! hold the hint matrix `data * A` ahead of time. Here the client instead
//! sends its LWE secret encrypted under RNS-BFV, and the server computes
//! the hint-times-secret products homomorphically (the LinPIR subprotocol,
//! using Galois rotations and the diagonal method), so the client only
//! downloads seeds and a few response pads. Decrypting the LinPIR answer,
//! CRT-composing it across plaintext moduli, and subtracting it from the
//! raw answer leaves the scaled record plus LWE noise, which rounding
//! removes.
//!
//! Entry points live in [`api`]: a [`api::Server`] owning the database and
//! a [`api::Client`] issuing batched requests.

pub mod api;
pub mod bfv;
pub mod db;
pub mod errors;
pub mod linpir;
pub mod lwe;
pub mod modarith;
pub mod ntt;
pub mod params;
pub mod prng;
pub mod rns;
pub mod serialize;
pub mod utils;
