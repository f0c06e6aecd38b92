//! Prometheus metrics registry.
//!
//! Exposes exactly the stable metric names the service contract
//! promises callers, backed by the `prometheus` crate's own atomics so
//! concurrent query pipelines never contend on a shared lock for the
//! common increment path.

use prometheus::{
    Encoder, Gauge, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::llm::TokenUsage;
use crate::resilience::BreakerState;

pub struct Metrics {
    registry: Registry,
    pub queries_total: IntCounter,
    pub cache_hits_total: IntCounter,
    pub cache_misses_total: IntCounter,
    pub errors_total: IntCounter,
    pub retrieval_total: IntCounter,
    pub retrieval_duration_seconds_total: Gauge,
    pub llm_calls_total: IntCounterVec,
    pub llm_calls_duration_seconds_total: Gauge,
    pub llm_tokens_prompt_total: IntCounter,
    pub llm_tokens_completion_total: IntCounter,
    pub circuit_breaker_state: Gauge,
    pub documents_indexed_total: IntCounter,
    pub chunks_indexed_total: IntCounter,
    started_at: Instant,
    cache_hits_raw: AtomicU64,
    cache_total_raw: AtomicU64,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let queries_total = register_counter(&registry, "rag_queries_total", "Total queries served")?;
        let cache_hits_total =
            register_counter(&registry, "rag_queries_cache_hits_total", "Query cache hits")?;
        let cache_misses_total =
            register_counter(&registry, "rag_queries_cache_misses_total", "Query cache misses")?;
        let errors_total = register_counter(&registry, "rag_queries_errors_total", "Query errors")?;
        let retrieval_total = register_counter(&registry, "rag_retrieval_total", "Retrieval operations")?;
        let retrieval_duration_seconds_total = register_gauge(
            &registry,
            "rag_retrieval_duration_seconds_total",
            "Cumulative retrieval duration in seconds",
        )?;
        let llm_calls_total = register_counter_vec(
            &registry,
            "rag_llm_calls_total",
            "LLM calls by operation",
            &["operation"],
        )?;
        let llm_calls_duration_seconds_total = register_gauge(
            &registry,
            "rag_llm_calls_duration_seconds_total",
            "Cumulative LLM call duration in seconds",
        )?;
        let llm_tokens_prompt_total =
            register_counter(&registry, "rag_llm_tokens_prompt_total", "Prompt tokens consumed")?;
        let llm_tokens_completion_total = register_counter(
            &registry,
            "rag_llm_tokens_completion_total",
            "Completion tokens generated",
        )?;
        let circuit_breaker_state = register_gauge(
            &registry,
            "rag_circuit_breaker_state",
            "Circuit breaker state (0=closed,1=open,2=half-open)",
        )?;
        let documents_indexed_total =
            register_counter(&registry, "rag_documents_indexed_total", "Documents indexed")?;
        let chunks_indexed_total =
            register_counter(&registry, "rag_chunks_indexed_total", "Chunks indexed")?;

        Ok(Metrics {
            registry,
            queries_total,
            cache_hits_total,
            cache_misses_total,
            errors_total,
            retrieval_total,
            retrieval_duration_seconds_total,
            llm_calls_total,
            llm_calls_duration_seconds_total,
            llm_tokens_prompt_total,
            llm_tokens_completion_total,
            circuit_breaker_state,
            documents_indexed_total,
            chunks_indexed_total,
            started_at: Instant::now(),
            cache_hits_raw: AtomicU64::new(0),
            cache_total_raw: AtomicU64::new(0),
        })
    }

    pub fn record_cache_hit(&self) {
        self.cache_hits_total.inc();
        self.cache_hits_raw.fetch_add(1, Ordering::Relaxed);
        self.cache_total_raw.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cache_miss(&self) {
        self.cache_misses_total.inc();
        self.cache_total_raw.fetch_add(1, Ordering::Relaxed);
    }

    /// `rag_cache_hit_rate`, computed on demand rather than tracked as
    /// its own counter since it is a derived ratio, not an event count.
    pub fn cache_hit_rate(&self) -> f64 {
        let total = self.cache_total_raw.load(Ordering::Relaxed);
        if total == 0 {
            return 0.0;
        }
        self.cache_hits_raw.load(Ordering::Relaxed) as f64 / total as f64
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Records one LLM call of `operation` ("embed", "generate", ...)
    /// and adds its wall-clock duration to the cumulative gauge.
    pub fn record_llm_call(&self, operation: &str, duration: Duration) {
        self.llm_calls_total.with_label_values(&[operation]).inc();
        self.llm_calls_duration_seconds_total.add(duration.as_secs_f64());
    }

    pub fn record_token_usage(&self, usage: &TokenUsage) {
        self.llm_tokens_prompt_total.inc_by(usage.prompt_tokens);
        self.llm_tokens_completion_total.inc_by(usage.completion_tokens);
    }

    pub fn record_retrieval_duration(&self, duration: Duration) {
        self.retrieval_duration_seconds_total.add(duration.as_secs_f64());
    }

    pub fn record_breaker_state(&self, state: BreakerState) {
        let value = match state {
            BreakerState::Closed => 0.0,
            BreakerState::Open => 1.0,
            BreakerState::HalfOpen => 2.0,
        };
        self.circuit_breaker_state.set(value);
    }

    /// Render the registry plus the derived gauges in Prometheus text
    /// exposition format.
    pub fn export(&self) -> anyhow::Result<String> {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        let families = self.registry.gather();
        encoder.encode(&families, &mut buffer)?;
        let mut out = String::from_utf8(buffer)?;
        out.push_str(&format!(
            "# HELP rag_cache_hit_rate Query cache hit rate\n# TYPE rag_cache_hit_rate gauge\nrag_cache_hit_rate {}\n",
            self.cache_hit_rate()
        ));
        out.push_str(&format!(
            "# HELP rag_uptime_seconds Process uptime in seconds\n# TYPE rag_uptime_seconds gauge\nrag_uptime_seconds {}\n",
            self.uptime_seconds()
        ));
        Ok(out)
    }
}

fn register_counter(registry: &Registry, name: &str, help: &str) -> anyhow::Result<IntCounter> {
    let counter = IntCounter::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn register_counter_vec(
    registry: &Registry,
    name: &str,
    help: &str,
    labels: &[&str],
) -> anyhow::Result<IntCounterVec> {
    let counter = IntCounterVec::new(Opts::new(name, help), labels)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

fn register_gauge(registry: &Registry, name: &str, help: &str) -> anyhow::Result<Gauge> {
    let gauge = Gauge::with_opts(Opts::new(name, help))?;
    registry.register(Box::new(gauge.clone()))?;
    Ok(gauge)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_rate_tracks_hits_over_total() {
        let m = Metrics::new().unwrap();
        m.record_cache_hit();
        m.record_cache_hit();
        m.record_cache_miss();
        assert!((m.cache_hit_rate() - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn cache_hit_rate_zero_when_no_traffic() {
        let m = Metrics::new().unwrap();
        assert_eq!(m.cache_hit_rate(), 0.0);
    }

    #[test]
    fn record_llm_call_increments_count_and_duration() {
        let m = Metrics::new().unwrap();
        m.record_llm_call("embed", std::time::Duration::from_millis(500));
        m.record_llm_call("embed", std::time::Duration::from_millis(500));
        assert_eq!(m.llm_calls_total.with_label_values(&["embed"]).get(), 2);
        assert!((m.llm_calls_duration_seconds_total.get() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn record_token_usage_accumulates_prompt_and_completion_counts() {
        let m = Metrics::new().unwrap();
        m.record_token_usage(&crate::llm::TokenUsage { prompt_tokens: 10, completion_tokens: 5 });
        m.record_token_usage(&crate::llm::TokenUsage { prompt_tokens: 3, completion_tokens: 1 });
        assert_eq!(m.llm_tokens_prompt_total.get(), 13);
        assert_eq!(m.llm_tokens_completion_total.get(), 6);
    }

    #[test]
    fn record_breaker_state_maps_to_numeric_gauge() {
        let m = Metrics::new().unwrap();
        m.record_breaker_state(crate::resilience::BreakerState::Open);
        assert_eq!(m.circuit_breaker_state.get(), 1.0);
        m.record_breaker_state(crate::resilience::BreakerState::HalfOpen);
        assert_eq!(m.circuit_breaker_state.get(), 2.0);
        m.record_breaker_state(crate::resilience::BreakerState::Closed);
        assert_eq!(m.circuit_breaker_state.get(), 0.0);
    }

    #[test]
    fn export_contains_stable_metric_names() {
        let m = Metrics::new().unwrap();
        m.queries_total.inc();
        let text = m.export().unwrap();
        assert!(text.contains("rag_queries_total"));
        assert!(text.contains("rag_cache_hit_rate"));
        assert!(text.contains("rag_uptime_seconds"));
    }
}
