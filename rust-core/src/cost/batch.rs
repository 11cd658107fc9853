/// Embedding workload estimates (bulk corpus or query volume)

use serde::{Deserialize, Serialize};

use super::calculator::{validate_count, CostCalculator};
use super::pricing::EmbeddingModel;
use crate::error::{RagCostError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkloadScenario {
    /// Embed every record of the database once.
    Corpus,
    /// Embed incoming user queries.
    Query,
}

impl WorkloadScenario {
    pub fn item_label(&self) -> &'static str {
        match self {
            WorkloadScenario::Corpus => "records",
            WorkloadScenario::Query => "queries",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingWorkload {
    pub scenario: WorkloadScenario,
    pub tokens_per_item: u64,
    pub item_count: u64,
    pub model: EmbeddingModel,
}

impl EmbeddingWorkload {
    /// Build a workload from user-entered numbers; both must be at least 1.
    pub fn new(
        scenario: WorkloadScenario,
        tokens_per_item: i64,
        item_count: i64,
        model: EmbeddingModel,
    ) -> Result<Self> {
        let tokens_per_item = validate_count(tokens_per_item, "tokens_per_item")?;
        let item_count = validate_count(item_count, "item_count")?;
        if tokens_per_item == 0 || item_count == 0 {
            return Err(RagCostError::InvalidArgument(
                "tokens_per_item and item_count must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            scenario,
            tokens_per_item,
            item_count,
            model,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WorkloadEstimate {
    pub scenario: WorkloadScenario,
    pub total_tokens: u64,
    pub million_tokens: f64,
    pub total_cost: f64,
}

pub fn estimate_workload(
    calculator: &CostCalculator,
    workload: &EmbeddingWorkload,
) -> Result<WorkloadEstimate> {
    let total_tokens = workload
        .tokens_per_item
        .checked_mul(workload.item_count)
        .ok_or_else(|| RagCostError::InvalidArgument("workload token total overflows".to_string()))?;
    let total_cost = calculator.embedding_cost(total_tokens, workload.model)?;

    Ok(WorkloadEstimate {
        scenario: workload.scenario,
        total_tokens,
        million_tokens: total_tokens as f64 / 1_000_000.0,
        total_cost,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_corpus_workload() {
        let workload = EmbeddingWorkload::new(
            WorkloadScenario::Corpus,
            180,
            4000,
            EmbeddingModel::TextEmbedding3Small,
        )
        .unwrap();
        let estimate = estimate_workload(&CostCalculator::new(), &workload).unwrap();
        assert_eq!(estimate.total_tokens, 720_000);
        assert!((estimate.million_tokens - 0.72).abs() < 1e-12);
        assert!((estimate.total_cost - 0.0144).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_empty_or_negative_inputs() {
        let model = EmbeddingModel::TextEmbedding3Large;
        assert!(EmbeddingWorkload::new(WorkloadScenario::Query, 0, 10, model).is_err());
        assert!(EmbeddingWorkload::new(WorkloadScenario::Query, 10, -3, model).is_err());
    }

    #[test]
    fn test_overflow_is_invalid_argument() {
        let workload = EmbeddingWorkload {
            scenario: WorkloadScenario::Query,
            tokens_per_item: u64::MAX,
            item_count: 2,
            model: EmbeddingModel::TextEmbeddingAda002,
        };
        let err = estimate_workload(&CostCalculator::new(), &workload).unwrap_err();
        assert!(matches!(err, RagCostError::InvalidArgument(_)));
    }
}
