use prometheus::{Counter, CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RagCostError, Result};
use crate::pipeline::StageKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnMetrics {
    pub session_id: String,
    pub include_retrieval: bool,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub embedding_tokens: Option<u64>,
    pub cost_usd: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub turns: u64,
    pub stage_errors: u64,
    pub total_cost_usd: f64,
}

#[derive(Clone)]
pub struct MetricsCollector {
    registry: Arc<Registry>,
    turn_counter: Counter,
    tokens_input: Counter,
    tokens_output: Counter,
    tokens_embedding: Counter,
    cost_total: Counter,
    stage_latency: HistogramVec,
    stage_errors: CounterVec,
    active_runs: Gauge,
}

impl MetricsCollector {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let turn_counter = Counter::with_opts(
            Opts::new("rag_turns_total", "Total number of completed turns")
                .const_label("component", "simulator"),
        )?;
        let tokens_input = Counter::with_opts(Opts::new("rag_tokens_input_total", "Total input tokens"))?;
        let tokens_output = Counter::with_opts(Opts::new("rag_tokens_output_total", "Total output tokens"))?;
        let tokens_embedding = Counter::with_opts(Opts::new(
            "rag_tokens_embedding_total",
            "Total embedding tokens",
        ))?;
        let cost_total = Counter::with_opts(Opts::new("rag_cost_usd_total", "Total simulated cost in USD"))?;
        let stage_latency = HistogramVec::new(
            HistogramOpts::new("rag_stage_latency_seconds", "Simulated stage latency in seconds")
                .buckets(vec![0.1, 0.25, 0.5, 1.0, 1.5, 2.5, 5.0]),
            &["stage"],
        )?;
        let stage_errors = CounterVec::new(
            Opts::new("rag_stage_errors_total", "Stages that ended in error"),
            &["stage"],
        )?;
        let active_runs = Gauge::with_opts(Opts::new("rag_active_runs", "Pipeline runs in flight"))?;

        registry.register(Box::new(turn_counter.clone()))?;
        registry.register(Box::new(tokens_input.clone()))?;
        registry.register(Box::new(tokens_output.clone()))?;
        registry.register(Box::new(tokens_embedding.clone()))?;
        registry.register(Box::new(cost_total.clone()))?;
        registry.register(Box::new(stage_latency.clone()))?;
        registry.register(Box::new(stage_errors.clone()))?;
        registry.register(Box::new(active_runs.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            turn_counter,
            tokens_input,
            tokens_output,
            tokens_embedding,
            cost_total,
            stage_latency,
            stage_errors,
            active_runs,
        })
    }

    pub fn record_turn(&self, metrics: &TurnMetrics) {
        self.turn_counter.inc();
        self.tokens_input.inc_by(metrics.input_tokens as f64);
        self.tokens_output.inc_by(metrics.output_tokens as f64);
        if let Some(tokens) = metrics.embedding_tokens {
            self.tokens_embedding.inc_by(tokens as f64);
        }
        self.cost_total.inc_by(metrics.cost_usd);
    }

    pub fn observe_stage(&self, stage: StageKind, latency: Duration) {
        self.stage_latency
            .with_label_values(&[stage.as_str()])
            .observe(latency.as_secs_f64());
    }

    pub fn record_stage_error(&self, stage: StageKind) {
        self.stage_errors.with_label_values(&[stage.as_str()]).inc();
    }

    pub fn increment_active(&self) {
        self.active_runs.inc();
    }

    pub fn decrement_active(&self) {
        self.active_runs.dec();
    }

    /// Prometheus text exposition of every registered metric.
    pub fn export(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| RagCostError::Unknown(e.to_string()))
    }

    pub fn summary(&self) -> MetricsSummary {
        let stage_errors = StageKind::ORDER
            .iter()
            .map(|s| self.stage_errors.with_label_values(&[s.as_str()]).get() as u64)
            .sum();
        MetricsSummary {
            turns: self.turn_counter.get() as u64,
            stage_errors,
            total_cost_usd: self.cost_total.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_turn_and_export() {
        let metrics = MetricsCollector::new().unwrap();
        metrics.record_turn(&TurnMetrics {
            session_id: "s".to_string(),
            include_retrieval: true,
            input_tokens: 120,
            output_tokens: 80,
            embedding_tokens: Some(15),
            cost_usd: 0.002,
        });
        metrics.observe_stage(StageKind::Embed, Duration::from_millis(1200));
        metrics.record_stage_error(StageKind::Generate);

        let summary = metrics.summary();
        assert_eq!(summary.turns, 1);
        assert_eq!(summary.stage_errors, 1);
        assert!((summary.total_cost_usd - 0.002).abs() < 1e-12);

        let text = metrics.export().unwrap();
        assert!(text.contains("rag_tokens_input_total 120"));
        assert!(text.contains("rag_stage_latency_seconds_count{stage=\"embed\"} 1"));
    }
}
