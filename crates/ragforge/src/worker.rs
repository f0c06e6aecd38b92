//! Bounded background-worker pool for fire-and-forget jobs (tree
//! building, summarization) that shouldn't block the request that
//! triggered them.
//!
//! Grounded on the bounded `tokio::sync::mpsc` channel + `tokio::spawn`
//! pattern the corpus uses for background event handling (see
//! `shodh-rag`'s `FileWatcherManager`), generalized from a single
//! listener task to a fixed-size pool of them. Each worker awaits its
//! job through a nested `tokio::spawn`, so a panicking job surfaces as
//! an `Err` on that inner `JoinHandle` rather than taking the worker
//! down — Tokio already isolates task panics this way, with no need
//! for a manual `catch_unwind`.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

pub type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

pub struct WorkerPool {
    tx: mpsc::Sender<Job>,
}

impl WorkerPool {
    /// Spawns `workers` long-running tasks draining a shared channel
    /// of capacity `queue_size`.
    pub fn new(workers: usize, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_size);
        let rx = Arc::new(Mutex::new(rx));

        for id in 0..workers.max(1) {
            let rx = rx.clone();
            tokio::spawn(async move {
                loop {
                    let job = rx.lock().await.recv().await;
                    let Some(job) = job else { break };
                    if let Err(err) = tokio::spawn(job).await {
                        tracing::error!(worker = id, error = %err, "background job panicked");
                    }
                }
            });
        }

        WorkerPool { tx }
    }

    /// Enqueues `job`. Falls back to a direct `tokio::spawn` (no
    /// backpressure) when the pool's channel is full or has been shut
    /// down, so a burst of indexing work never drops a job.
    pub fn submit(&self, job: Job) {
        match self.tx.try_send(job) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(job)) => {
                tracing::warn!("worker pool saturated, spawning job directly");
                tokio::spawn(job);
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                tracing::warn!("worker pool shut down, spawning job directly");
                tokio::spawn(job);
            }
        }
    }
}
