//! # ragforge-core
//!
//! Shared, WASM-safe logic for ragforge: data models, the markdown
//! chunker, the vector-store abstraction, the embedding trait and its
//! pure vector math, k-means clustering over embeddings, and the
//! reciprocal-rank-fusion helpers used by the query pipeline.
//!
//! This crate contains no tokio, reqwest, filesystem I/O, or other
//! native-only dependencies. It compiles to both native targets and
//! `wasm32-unknown-unknown`.

pub mod chunk;
pub mod embedding;
pub mod kmeans;
pub mod models;
pub mod rrf;
pub mod store;
