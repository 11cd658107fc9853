/// Simulator configuration (TOML)

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};

use crate::cost::{EmbeddingModel, GenerativeModel, ModelId, ModelPricing, PricingCatalog};
use crate::error::{RagCostError, Result};
use crate::pipeline::{PipelineSettings, StageLatencies};
use crate::retrieval::CorpusIndex;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub store: String,
    pub namespace: String,
    pub reranker: String,
    /// JSON array of records replacing the built-in corpus.
    pub corpus_path: Option<PathBuf>,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        let settings = PipelineSettings::default();
        Self {
            top_k: settings.top_k,
            store: settings.store,
            namespace: settings.namespace,
            reranker: settings.reranker,
            corpus_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 800,
        }
    }
}

/// Rate override keyed by model id in `[pricing_overrides]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateOverride {
    Generative {
        input_price_per_1m: f64,
        output_price_per_1m: f64,
    },
    Embedding {
        price_per_1m: f64,
    },
}

impl From<RateOverride> for ModelPricing {
    fn from(rate: RateOverride) -> Self {
        match rate {
            RateOverride::Generative {
                input_price_per_1m,
                output_price_per_1m,
            } => ModelPricing::Generative {
                input_price_per_1m,
                output_price_per_1m,
            },
            RateOverride::Embedding { price_per_1m } => ModelPricing::Embedding { price_per_1m },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub default_model: GenerativeModel,
    pub default_embedding_model: EmbeddingModel,
    pub include_retrieval: bool,
    pub latencies: StageLatencies,
    pub retrieval: RetrievalConfig,
    pub generation: GenerationConfig,
    pub pricing_overrides: HashMap<String, RateOverride>,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            default_model: GenerativeModel::Gpt4o,
            default_embedding_model: EmbeddingModel::TextEmbedding3Small,
            include_retrieval: true,
            latencies: StageLatencies::default(),
            retrieval: RetrievalConfig::default(),
            generation: GenerationConfig::default(),
            pricing_overrides: HashMap::new(),
        }
    }
}

impl SimulatorConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: SimulatorConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let temperature = self.generation.temperature;
        if !temperature.is_finite() || !(0.0..=2.0).contains(&temperature) {
            return Err(RagCostError::InvalidConfig(format!(
                "generation.temperature must be within [0, 2], got {}",
                temperature
            )));
        }
        if self.retrieval.top_k == 0 {
            return Err(RagCostError::InvalidConfig(
                "retrieval.top_k must be at least 1".to_string(),
            ));
        }
        // surfaces unknown ids and bad rates
        self.pricing_catalog()?;
        Ok(())
    }

    /// Built-in catalog with `[pricing_overrides]` applied.
    pub fn pricing_catalog(&self) -> Result<PricingCatalog> {
        let mut catalog = PricingCatalog::new();
        for (id, rate) in &self.pricing_overrides {
            let model: ModelId = id.parse()?;
            catalog = catalog
                .with_override(model, (*rate).into())
                .map_err(|e| RagCostError::InvalidConfig(format!("pricing_overrides.{}: {}", id, e)))?;
        }
        Ok(catalog)
    }

    pub fn corpus(&self) -> Result<CorpusIndex> {
        match &self.retrieval.corpus_path {
            Some(path) => CorpusIndex::load(path),
            None => Ok(CorpusIndex::builtin()),
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            top_k: self.retrieval.top_k,
            store: self.retrieval.store.clone(),
            namespace: self.retrieval.namespace.clone(),
            reranker: self.retrieval.reranker.clone(),
            temperature: self.generation.temperature,
            max_tokens: self.generation.max_tokens,
            latencies: self.latencies,
        }
    }
}
