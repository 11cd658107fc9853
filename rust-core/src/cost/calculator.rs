use serde::{Deserialize, Serialize};

use super::pricing::{EmbeddingModel, GenerativeModel, PricingCatalog};
use crate::error::{RagCostError, Result};

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Embedding tokens and the model that priced them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmbeddingUsage {
    pub tokens: u64,
    pub model: EmbeddingModel,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub input_cost: f64,
    pub output_cost: f64,
    pub embedding_cost: f64,
    pub total_cost: f64,
}

impl CostBreakdown {
    fn new(input_cost: f64, output_cost: f64, embedding_cost: f64) -> Self {
        Self {
            input_cost,
            output_cost,
            embedding_cost,
            total_cost: input_cost + output_cost + embedding_cost,
        }
    }
}

pub struct CostCalculator {
    pricing_table: PricingCatalog,
}

impl CostCalculator {
    pub fn new() -> Self {
        Self {
            pricing_table: PricingCatalog::new(),
        }
    }

    pub fn with_catalog(pricing_table: PricingCatalog) -> Self {
        Self { pricing_table }
    }

    pub fn catalog(&self) -> &PricingCatalog {
        &self.pricing_table
    }

    /// Full breakdown for one request. Embedding cost is only charged when
    /// `include_embedding` is set and usage is supplied.
    pub fn cost(
        &self,
        input_tokens: u64,
        output_tokens: u64,
        model: GenerativeModel,
        embedding: Option<EmbeddingUsage>,
        include_embedding: bool,
    ) -> Result<CostBreakdown> {
        let rate = self.pricing_table.generative_rate(model)?;

        let embedding_cost = match embedding {
            Some(usage) if include_embedding => self.embedding_cost(usage.tokens, usage.model)?,
            _ => 0.0,
        };

        let input_cost = per_million(input_tokens) * rate.input_price_per_1m;
        let output_cost = per_million(output_tokens) * rate.output_price_per_1m;

        Ok(CostBreakdown::new(input_cost, output_cost, embedding_cost))
    }

    /// Same as [`cost`](Self::cost) but for counts from an untyped boundary.
    pub fn cost_from_raw(
        &self,
        input_tokens: i64,
        output_tokens: i64,
        model: GenerativeModel,
        embedding: Option<(i64, EmbeddingModel)>,
        include_embedding: bool,
    ) -> Result<CostBreakdown> {
        let input_tokens = validate_count(input_tokens, "input_tokens")?;
        let output_tokens = validate_count(output_tokens, "output_tokens")?;
        let embedding = embedding
            .map(|(tokens, model)| {
                validate_count(tokens, "embedding_tokens").map(|tokens| EmbeddingUsage { tokens, model })
            })
            .transpose()?;
        self.cost(input_tokens, output_tokens, model, embedding, include_embedding)
    }

    pub fn input_cost(&self, tokens: u64, model: GenerativeModel) -> Result<f64> {
        let rate = self.pricing_table.generative_rate(model)?;
        Ok(per_million(tokens) * rate.input_price_per_1m)
    }

    pub fn embedding_cost(&self, tokens: u64, model: EmbeddingModel) -> Result<f64> {
        let rate = self.pricing_table.embedding_rate(model)?;
        Ok(per_million(tokens) * rate.price_per_1m)
    }
}

impl Default for CostCalculator {
    fn default() -> Self {
        Self::new()
    }
}

fn per_million(tokens: u64) -> f64 {
    tokens as f64 / TOKENS_PER_UNIT
}

/// Reject negative counts before they reach any arithmetic.
pub fn validate_count(value: i64, field: &str) -> Result<u64> {
    u64::try_from(value).map_err(|_| {
        RagCostError::InvalidArgument(format!("{} must be non-negative, got {}", field, value))
    })
}

/// Float variant for counts parsed from loosely typed input.
pub fn validate_count_f64(value: f64, field: &str) -> Result<u64> {
    if !value.is_finite() {
        return Err(RagCostError::InvalidArgument(format!(
            "{} must be finite, got {}",
            field, value
        )));
    }
    if value < 0.0 {
        return Err(RagCostError::InvalidArgument(format!(
            "{} must be non-negative, got {}",
            field, value
        )));
    }
    if value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(RagCostError::InvalidArgument(format!(
            "{} must be a whole number, got {}",
            field, value
        )));
    }
    Ok(value as u64)
}
