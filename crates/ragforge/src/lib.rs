//! Application crate: config, I/O, and orchestration for the RAG
//! service built on top of `ragforge-core`'s pure models and
//! algorithms.

pub mod cache;
pub mod config;
pub mod enhancer;
pub mod error;
pub mod evaluator;
pub mod generator;
pub mod indexer;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod pathfinder;
pub mod resilience;
pub mod retriever;
pub mod server;
pub mod service;
pub mod summarizer;
pub mod treebuilder;
pub mod treeretriever;
pub mod vectorstore;
pub mod worker;
