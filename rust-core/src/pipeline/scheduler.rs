use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::Duration;

use super::stage::StageKind;

/// Suspends the pipeline between stages to stand in for model and
/// database latency.
#[async_trait]
pub trait LatencyScheduler: Send + Sync + Debug {
    async fn pause(&self, stage: StageKind, delay: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Default)]
pub struct TokioScheduler;

#[async_trait]
impl LatencyScheduler for TokioScheduler {
    async fn pause(&self, _stage: StageKind, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Returns immediately so a whole run completes without real delay.
#[derive(Debug, Clone, Default)]
pub struct ImmediateScheduler;

#[async_trait]
impl LatencyScheduler for ImmediateScheduler {
    async fn pause(&self, _stage: StageKind, _delay: Duration) {}
}

/// Simulated latency per stage, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageLatencies {
    pub embed_ms: u64,
    pub search_ms: u64,
    pub rank_ms: u64,
    pub prompt_ms: u64,
    pub generate_ms: u64,
}

impl StageLatencies {
    pub fn for_stage(&self, stage: StageKind) -> Duration {
        let ms = match stage {
            StageKind::Embed => self.embed_ms,
            StageKind::Search => self.search_ms,
            StageKind::Rank => self.rank_ms,
            StageKind::Prompt => self.prompt_ms,
            StageKind::Generate => self.generate_ms,
        };
        Duration::from_millis(ms)
    }

    pub fn total(&self) -> Duration {
        StageKind::ORDER
            .iter()
            .map(|s| self.for_stage(*s))
            .sum()
    }
}

impl Default for StageLatencies {
    fn default() -> Self {
        Self {
            embed_ms: 1200,
            search_ms: 800,
            rank_ms: 600,
            prompt_ms: 700,
            generate_ms: 1500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_latencies() {
        let latencies = StageLatencies::default();
        assert_eq!(latencies.for_stage(StageKind::Embed), Duration::from_millis(1200));
        assert_eq!(latencies.for_stage(StageKind::Generate), Duration::from_millis(1500));
        assert_eq!(latencies.total(), Duration::from_millis(4800));
    }

    #[tokio::test]
    async fn test_tokio_scheduler_waits_for_delay() {
        let start = tokio::time::Instant::now();
        TokioScheduler
            .pause(StageKind::Rank, Duration::from_millis(20))
            .await;
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_immediate_scheduler_does_not_wait() {
        let start = std::time::Instant::now();
        ImmediateScheduler
            .pause(StageKind::Generate, Duration::from_secs(30))
            .await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
