//! Concrete [`ragforge_core::store::VectorStore`] implementations: an
//! in-memory reference store for tests and local experimentation, and a
//! generic REST client for a real external vector database.

pub mod http;
pub mod memory;
