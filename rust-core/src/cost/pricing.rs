use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::error::{RagCostError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GenerativeModel {
    #[serde(rename = "gpt-4-1106")]
    Gpt4_1106,
    #[serde(rename = "gpt-4o")]
    Gpt4o,
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "o1-mini")]
    O1Mini,
    #[serde(rename = "o1")]
    O1,
    #[serde(rename = "claude-3.5-sonnet")]
    Claude35Sonnet,
    #[serde(rename = "claude-3.7-sonnet")]
    Claude37Sonnet,
}

impl GenerativeModel {
    pub const ALL: [GenerativeModel; 8] = [
        GenerativeModel::Gpt4_1106,
        GenerativeModel::Gpt4o,
        GenerativeModel::Gpt4oMini,
        GenerativeModel::Gpt35Turbo,
        GenerativeModel::O1Mini,
        GenerativeModel::O1,
        GenerativeModel::Claude35Sonnet,
        GenerativeModel::Claude37Sonnet,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            GenerativeModel::Gpt4_1106 => "gpt-4-1106",
            GenerativeModel::Gpt4o => "gpt-4o",
            GenerativeModel::Gpt4oMini => "gpt-4o-mini",
            GenerativeModel::Gpt35Turbo => "gpt-3.5-turbo",
            GenerativeModel::O1Mini => "o1-mini",
            GenerativeModel::O1 => "o1",
            GenerativeModel::Claude35Sonnet => "claude-3.5-sonnet",
            GenerativeModel::Claude37Sonnet => "claude-3.7-sonnet",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GenerativeModel::Gpt4_1106 => "GPT-4-1106",
            GenerativeModel::Gpt4o => "GPT-4o",
            GenerativeModel::Gpt4oMini => "GPT-4o-mini",
            GenerativeModel::Gpt35Turbo => "GPT-3.5-turbo",
            GenerativeModel::O1Mini => "o1-mini",
            GenerativeModel::O1 => "o1",
            GenerativeModel::Claude35Sonnet => "Claude 3.5 Sonnet",
            GenerativeModel::Claude37Sonnet => "Claude 3.7 Sonnet",
        }
    }
}

impl fmt::Display for GenerativeModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for GenerativeModel {
    type Err = RagCostError;

    fn from_str(s: &str) -> Result<Self> {
        GenerativeModel::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| RagCostError::UnknownModel(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmbeddingModel {
    #[serde(rename = "text-embedding-3-small")]
    TextEmbedding3Small,
    #[serde(rename = "text-embedding-3-large")]
    TextEmbedding3Large,
    #[serde(rename = "text-embedding-ada-002")]
    TextEmbeddingAda002,
}

impl EmbeddingModel {
    pub const ALL: [EmbeddingModel; 3] = [
        EmbeddingModel::TextEmbedding3Small,
        EmbeddingModel::TextEmbedding3Large,
        EmbeddingModel::TextEmbeddingAda002,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            EmbeddingModel::TextEmbedding3Small => "text-embedding-3-small",
            EmbeddingModel::TextEmbedding3Large => "text-embedding-3-large",
            EmbeddingModel::TextEmbeddingAda002 => "text-embedding-ada-002",
        }
    }

    /// Vector width reported in the embed stage detail.
    pub fn dimensions(&self) -> u32 {
        match self {
            EmbeddingModel::TextEmbedding3Small => 1536,
            _ => 3072,
        }
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for EmbeddingModel {
    type Err = RagCostError;

    fn from_str(s: &str) -> Result<Self> {
        EmbeddingModel::ALL
            .into_iter()
            .find(|m| m.id() == s)
            .ok_or_else(|| RagCostError::UnknownModel(s.to_string()))
    }
}

/// Any model the catalog can price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ModelId {
    Generative(GenerativeModel),
    Embedding(EmbeddingModel),
}

impl ModelId {
    pub fn id(&self) -> &'static str {
        match self {
            ModelId::Generative(m) => m.id(),
            ModelId::Embedding(m) => m.id(),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            ModelId::Generative(_) => ModelKind::Generative,
            ModelId::Embedding(_) => ModelKind::Embedding,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ModelId {
    type Err = RagCostError;

    fn from_str(s: &str) -> Result<Self> {
        if let Ok(model) = s.parse::<GenerativeModel>() {
            return Ok(ModelId::Generative(model));
        }
        s.parse::<EmbeddingModel>().map(ModelId::Embedding)
    }
}

impl From<GenerativeModel> for ModelId {
    fn from(model: GenerativeModel) -> Self {
        ModelId::Generative(model)
    }
}

impl From<EmbeddingModel> for ModelId {
    fn from(model: EmbeddingModel) -> Self {
        ModelId::Embedding(model)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Generative,
    Embedding,
}

/// Rates in currency units per 1M tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelPricing {
    Generative {
        input_price_per_1m: f64,
        output_price_per_1m: f64,
    },
    Embedding { price_per_1m: f64 },
}

impl ModelPricing {
    fn validate(&self, model: ModelId) -> Result<()> {
        let rates: &[f64] = match self {
            ModelPricing::Generative {
                input_price_per_1m,
                output_price_per_1m,
            } => &[*input_price_per_1m, *output_price_per_1m],
            ModelPricing::Embedding { price_per_1m } => &[*price_per_1m],
        };
        if rates.iter().any(|r| !r.is_finite() || *r < 0.0) {
            return Err(RagCostError::InvalidArgument(format!(
                "rate for {} must be a finite non-negative number",
                model
            )));
        }
        let matches_kind = matches!(
            (model, self),
            (ModelId::Generative(_), ModelPricing::Generative { .. })
                | (ModelId::Embedding(_), ModelPricing::Embedding { .. })
        );
        if !matches_kind {
            return Err(RagCostError::InvalidArgument(format!(
                "rate shape does not match model kind for {}",
                model
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GenerativeRate {
    pub input_price_per_1m: f64,
    pub output_price_per_1m: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EmbeddingRate {
    pub price_per_1m: f64,
}

/// A catalog row as shown in a model picker.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    pub id: ModelId,
    pub kind: ModelKind,
    pub label: &'static str,
    pub pricing: ModelPricing,
}

#[derive(Debug, Clone)]
pub struct PricingCatalog {
    prices: HashMap<ModelId, ModelPricing>,
}

impl PricingCatalog {
    /// Built-in rates, per 1M tokens.
    pub fn new() -> Self {
        let mut prices = HashMap::new();

        let generative = [
            (GenerativeModel::Gpt4_1106, 10.00, 30.00),
            (GenerativeModel::Gpt4o, 5.00, 15.00),
            (GenerativeModel::Gpt4oMini, 0.15, 0.60),
            (GenerativeModel::Gpt35Turbo, 0.50, 1.50),
            (GenerativeModel::O1Mini, 1.10, 4.40),
            (GenerativeModel::O1, 15.00, 60.00),
            (GenerativeModel::Claude35Sonnet, 3.00, 15.00),
            (GenerativeModel::Claude37Sonnet, 3.50, 18.00),
        ];
        for (model, input, output) in generative {
            prices.insert(
                ModelId::Generative(model),
                ModelPricing::Generative {
                    input_price_per_1m: input,
                    output_price_per_1m: output,
                },
            );
        }

        let embedding = [
            (EmbeddingModel::TextEmbedding3Small, 0.02),
            (EmbeddingModel::TextEmbedding3Large, 0.13),
            (EmbeddingModel::TextEmbeddingAda002, 0.10),
        ];
        for (model, rate) in embedding {
            prices.insert(
                ModelId::Embedding(model),
                ModelPricing::Embedding { price_per_1m: rate },
            );
        }

        Self { prices }
    }

    /// Catalog containing only the given rows. Models left out fail lookups
    /// with `UnknownModel`.
    pub fn from_entries<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ModelId, ModelPricing)>,
    {
        let mut prices = HashMap::new();
        for (model, pricing) in entries {
            pricing.validate(model)?;
            prices.insert(model, pricing);
        }
        Ok(Self { prices })
    }

    /// Replace the rate of a registered or new model.
    pub fn with_override(mut self, model: ModelId, pricing: ModelPricing) -> Result<Self> {
        pricing.validate(model)?;
        self.prices.insert(model, pricing);
        Ok(self)
    }

    pub fn rate_for(&self, model: ModelId) -> Result<ModelPricing> {
        self.prices
            .get(&model)
            .copied()
            .ok_or_else(|| RagCostError::UnknownModel(model.to_string()))
    }

    /// Look up a raw identifier as entered by a user.
    pub fn rate_for_id(&self, model_id: &str) -> Result<ModelPricing> {
        let model: ModelId = model_id.parse()?;
        self.rate_for(model)
    }

    pub fn generative_rate(&self, model: GenerativeModel) -> Result<GenerativeRate> {
        match self.rate_for(ModelId::Generative(model))? {
            ModelPricing::Generative {
                input_price_per_1m,
                output_price_per_1m,
            } => Ok(GenerativeRate {
                input_price_per_1m,
                output_price_per_1m,
            }),
            ModelPricing::Embedding { .. } => Err(RagCostError::UnknownModel(model.to_string())),
        }
    }

    pub fn embedding_rate(&self, model: EmbeddingModel) -> Result<EmbeddingRate> {
        match self.rate_for(ModelId::Embedding(model))? {
            ModelPricing::Embedding { price_per_1m } => Ok(EmbeddingRate { price_per_1m }),
            ModelPricing::Generative { .. } => Err(RagCostError::UnknownModel(model.to_string())),
        }
    }

    pub fn contains(&self, model: ModelId) -> bool {
        self.prices.contains_key(&model)
    }

    /// Registered models, generative first, in declaration order.
    pub fn entries(&self) -> Vec<ModelDescriptor> {
        let generative = GenerativeModel::ALL
            .into_iter()
            .map(|m| (ModelId::Generative(m), m.label()));
        let embedding = EmbeddingModel::ALL
            .into_iter()
            .map(|m| (ModelId::Embedding(m), m.id()));

        generative
            .chain(embedding)
            .filter_map(|(id, label)| {
                self.prices.get(&id).map(|pricing| ModelDescriptor {
                    id,
                    kind: id.kind(),
                    label,
                    pricing: *pricing,
                })
            })
            .collect()
    }
}

impl Default for PricingCatalog {
    fn default() -> Self {
        Self::new()
    }
}
