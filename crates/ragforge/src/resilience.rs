//! Retry-with-backoff and circuit-breaker wrappers for LLM/vector-store
//! calls.
//!
//! The backoff schedule follows the same shape as the reference
//! provider's embedding retry loop (`1s, 2s, 4s, ...` capped), tuned by
//! config instead of hardcoded. The circuit breaker implements the
//! closed/open/half-open state machine: repeated failures open the
//! breaker, a cooldown transitions it to half-open, and a handful of
//! successful probes close it again.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::ResilienceConfig;

#[derive(Debug, thiserror::Error)]
pub enum ResilienceError<E> {
    #[error("circuit breaker is open")]
    CircuitOpen,
    #[error(transparent)]
    Inner(E),
}

/// Whether an error is worth retrying. Callers classify their own
/// error types; this trait keeps the retry loop generic.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

pub struct CircuitBreaker {
    max_failures: u32,
    timeout: Duration,
    half_open_max_calls: u32,
    state: Mutex<BreakerState>,
    failures: AtomicU32,
    half_open_calls: AtomicU32,
    half_open_successes: AtomicU32,
    last_failure_unix_ms: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, timeout: Duration, half_open_max_calls: u32) -> Self {
        CircuitBreaker {
            max_failures,
            timeout,
            half_open_max_calls: half_open_max_calls.max(1),
            state: Mutex::new(BreakerState::Closed),
            failures: AtomicU32::new(0),
            half_open_calls: AtomicU32::new(0),
            half_open_successes: AtomicU32::new(0),
            last_failure_unix_ms: AtomicU64::new(0),
        }
    }

    pub fn from_config(cfg: &ResilienceConfig) -> Self {
        CircuitBreaker::new(
            cfg.breaker_max_failures,
            Duration::from_secs(cfg.breaker_timeout_secs),
            cfg.breaker_half_open_max_calls,
        )
    }

    pub fn state(&self) -> BreakerState {
        *self.state.lock().unwrap()
    }

    /// Called before a guarded operation. Returns an error immediately
    /// if the breaker is open and the cooldown hasn't elapsed; flips to
    /// half-open and admits the probe otherwise.
    fn before_call(&self) -> Result<(), ()> {
        let mut state = self.state.lock().unwrap();
        match *state {
            BreakerState::Closed => Ok(()),
            BreakerState::HalfOpen => {
                if self.half_open_calls.fetch_add(1, Ordering::SeqCst) < self.half_open_max_calls {
                    Ok(())
                } else {
                    Err(())
                }
            }
            BreakerState::Open => {
                let elapsed_ms = now_unix_ms().saturating_sub(self.last_failure_unix_ms.load(Ordering::SeqCst));
                if elapsed_ms >= self.timeout.as_millis() as u64 {
                    *state = BreakerState::HalfOpen;
                    self.half_open_calls.store(1, Ordering::SeqCst);
                    self.half_open_successes.store(0, Ordering::SeqCst);
                    Ok(())
                } else {
                    Err(())
                }
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.state.lock().unwrap();
        match *state {
            BreakerState::Closed => {
                self.failures.store(0, Ordering::SeqCst);
            }
            BreakerState::HalfOpen => {
                let successes = self.half_open_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.half_open_max_calls {
                    *state = BreakerState::Closed;
                    self.failures.store(0, Ordering::SeqCst);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self) {
        let mut state = self.state.lock().unwrap();
        self.last_failure_unix_ms.store(now_unix_ms(), Ordering::SeqCst);
        match *state {
            BreakerState::Closed => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                if failures >= self.max_failures {
                    *state = BreakerState::Open;
                }
            }
            BreakerState::HalfOpen => {
                *state = BreakerState::Open;
            }
            BreakerState::Open => {}
        }
    }

    /// Run `op` under the breaker. Does not retry; pair with [`retry`]
    /// for the full resilience wrapper.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, ResilienceError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        if self.before_call().is_err() {
            return Err(ResilienceError::CircuitOpen);
        }
        match op().await {
            Ok(v) => {
                self.on_success();
                Ok(v)
            }
            Err(e) => {
                self.on_failure();
                Err(ResilienceError::Inner(e))
            }
        }
    }
}

/// Composes the breaker and the retry loop: the breaker gates
/// admission for the whole retried sequence and records only its
/// final outcome, so a string of transient retries doesn't trip it on
/// its own.
pub async fn call_with_resilience<F, Fut, T, E>(
    cfg: &ResilienceConfig,
    breaker: &CircuitBreaker,
    mut op: F,
) -> Result<T, ResilienceError<E>>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable,
{
    breaker.call(|| retry(cfg, &mut op)).await
}

fn now_unix_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Retry `op` up to `cfg.max_attempts` times with exponential backoff,
/// stopping early on a non-retryable error.
pub async fn retry<F, Fut, T, E>(cfg: &ResilienceConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: Retryable,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= cfg.max_attempts || !e.is_retryable() {
                    return Err(e);
                }
                let delay_ms = (cfg.initial_delay_ms as f64 * cfg.multiplier.powi((attempt - 1) as i32))
                    .min(cfg.max_delay_ms as f64) as u64;
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
