/// Staged RAG pipeline with per-stage token and cost accounting

pub mod stage;
pub mod scheduler;
pub mod prompt;
pub mod responder;

pub use stage::{Stage, StageBoard, StageDetail, StageKind, StageStatus, StageTransition};
pub use scheduler::{ImmediateScheduler, LatencyScheduler, StageLatencies, TokioScheduler};
pub use prompt::{build_prompt, BuiltPrompt};
pub use responder::{classify_query, respond, ResponseKind};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::cost::{CostBreakdown, CostCalculator, EmbeddingModel, EmbeddingUsage, GenerativeModel};
use crate::error::{RagCostError, Result};
use crate::retrieval::{CorpusIndex, Record, RELEVANCE_THRESHOLD};
use crate::tokens::TokenEstimator;

/// Knobs that shape stage details and latency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSettings {
    pub top_k: usize,
    pub store: String,
    pub namespace: String,
    pub reranker: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub latencies: StageLatencies,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            store: "Vector DB (simulated)".to_string(),
            namespace: "properties".to_string(),
            reranker: "Semantic".to_string(),
            temperature: 0.7,
            max_tokens: 800,
            latencies: StageLatencies::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnRequest<'q> {
    pub query: &'q str,
    pub model: GenerativeModel,
    pub embedding_model: EmbeddingModel,
}

/// Everything a finished run hands back for accounting.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub response: String,
    pub response_kind: ResponseKind,
    pub query_tokens: u64,
    /// Prompt tokens for a retrieval run, query tokens otherwise.
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub embedding_tokens: Option<u64>,
    pub cost: CostBreakdown,
    pub matched: Vec<Record>,
    pub prompt: Option<String>,
}

/// Live view of the in-flight run, published after every transition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSnapshot {
    pub running: bool,
    pub board: Option<StageBoard>,
}

pub struct PipelineStageMachine<'a> {
    calculator: &'a CostCalculator,
    corpus: &'a CorpusIndex,
    scheduler: &'a dyn LatencyScheduler,
    settings: &'a PipelineSettings,
    publisher: Option<&'a watch::Sender<RunSnapshot>>,
    estimator: TokenEstimator,
}

impl<'a> PipelineStageMachine<'a> {
    pub fn new(
        calculator: &'a CostCalculator,
        corpus: &'a CorpusIndex,
        scheduler: &'a dyn LatencyScheduler,
        settings: &'a PipelineSettings,
    ) -> Self {
        Self {
            calculator,
            corpus,
            scheduler,
            settings,
            publisher: None,
            estimator: TokenEstimator::new(),
        }
    }

    pub fn with_publisher(mut self, publisher: &'a watch::Sender<RunSnapshot>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Fail fast on models the catalog cannot price, before any stage moves.
    fn preflight(&self, request: &TurnRequest<'_>, include_embedding: bool) -> Result<()> {
        let catalog = self.calculator.catalog();
        catalog.generative_rate(request.model)?;
        if include_embedding {
            catalog.embedding_rate(request.embedding_model)?;
        }
        Ok(())
    }

    /// Run embed, search, rank, prompt and generate in order on `board`.
    ///
    /// A computation failure marks its stage `error`, leaves later stages
    /// `waiting` and returns [`RagCostError::StageFailed`].
    pub async fn run_retrieval(
        &self,
        request: TurnRequest<'_>,
        board: &mut StageBoard,
    ) -> Result<PipelineOutput> {
        self.preflight(&request, true)?;
        let latencies = &self.settings.latencies;
        let query = request.query;

        // embed
        let query_tokens = self.estimator.estimate(query);
        board.begin(
            StageKind::Embed,
            Some(StageDetail::Embed {
                model: request.embedding_model,
                dimensions: request.embedding_model.dimensions(),
            }),
        )?;
        self.publish(board, true);
        let embed_cost = self.guard(
            board,
            StageKind::Embed,
            self.calculator.embedding_cost(query_tokens, request.embedding_model),
        )?;
        board.record(StageKind::Embed, Some(query_tokens), Some(embed_cost));
        self.scheduler.pause(StageKind::Embed, latencies.for_stage(StageKind::Embed)).await;
        self.advance(board, StageKind::Embed)?;

        // search
        board.begin(
            StageKind::Search,
            Some(StageDetail::Search {
                store: self.settings.store.clone(),
                namespace: self.settings.namespace.clone(),
                corpus_size: self.corpus.len(),
                top_k: self.settings.top_k,
                include_metadata: true,
            }),
        )?;
        self.publish(board, true);
        self.scheduler.pause(StageKind::Search, latencies.for_stage(StageKind::Search)).await;
        let matched = self.corpus.search(query);
        self.advance(board, StageKind::Search)?;

        // rank reuses the filtered, sorted search results
        board.begin(
            StageKind::Rank,
            Some(StageDetail::Rank {
                score_threshold: RELEVANCE_THRESHOLD,
                reranker: self.settings.reranker.clone(),
                results_found: matched.len(),
            }),
        )?;
        self.publish(board, true);
        self.scheduler.pause(StageKind::Rank, latencies.for_stage(StageKind::Rank)).await;
        self.advance(board, StageKind::Rank)?;

        // prompt
        let built = build_prompt(query, &matched);
        let prompt_tokens = self.estimator.estimate(&built.text);
        board.begin(
            StageKind::Prompt,
            Some(StageDetail::Prompt {
                context_chars: built.context_chars,
                records: built.record_count,
            }),
        )?;
        board.record(StageKind::Prompt, Some(prompt_tokens), None);
        self.publish(board, true);
        self.scheduler.pause(StageKind::Prompt, latencies.for_stage(StageKind::Prompt)).await;
        self.advance(board, StageKind::Prompt)?;

        // generate: input cost is billed on the prompt, not the raw query
        board.begin(
            StageKind::Generate,
            Some(StageDetail::Generate {
                model: request.model,
                temperature: self.settings.temperature,
                max_tokens: self.settings.max_tokens,
            }),
        )?;
        self.publish(board, true);
        let (response_kind, response) = respond(query);
        let output_tokens = self.estimator.estimate(response);
        let cost = self.guard(
            board,
            StageKind::Generate,
            self.calculator.cost(
                prompt_tokens,
                output_tokens,
                request.model,
                Some(EmbeddingUsage {
                    tokens: query_tokens,
                    model: request.embedding_model,
                }),
                true,
            ),
        )?;
        self.scheduler.pause(StageKind::Generate, latencies.for_stage(StageKind::Generate)).await;
        board.record(StageKind::Generate, Some(output_tokens), Some(cost.output_cost));
        self.advance(board, StageKind::Generate)?;

        Ok(PipelineOutput {
            response: response.to_string(),
            response_kind,
            query_tokens,
            input_tokens: prompt_tokens,
            output_tokens,
            embedding_tokens: Some(query_tokens),
            cost,
            matched,
            prompt: Some(built.text),
        })
    }

    /// Input/output accounting only: no embedding, retrieval or prompt.
    pub async fn run_direct(&self, request: TurnRequest<'_>) -> Result<PipelineOutput> {
        self.preflight(&request, false)?;
        let query_tokens = self.estimator.estimate(request.query);
        let (response_kind, response) = respond(request.query);
        let output_tokens = self.estimator.estimate(response);
        let cost = self
            .calculator
            .cost(query_tokens, output_tokens, request.model, None, false)?;

        self.scheduler
            .pause(
                StageKind::Generate,
                self.settings.latencies.for_stage(StageKind::Generate),
            )
            .await;

        Ok(PipelineOutput {
            response: response.to_string(),
            response_kind,
            query_tokens,
            input_tokens: query_tokens,
            output_tokens,
            embedding_tokens: None,
            cost,
            matched: Vec::new(),
            prompt: None,
        })
    }

    fn advance(&self, board: &mut StageBoard, kind: StageKind) -> Result<()> {
        board.complete(kind)?;
        self.publish(board, kind != StageKind::Generate);
        Ok(())
    }

    fn guard<T>(&self, board: &mut StageBoard, kind: StageKind, result: Result<T>) -> Result<T> {
        match result {
            Ok(value) => Ok(value),
            Err(err) => {
                let message = err.to_string();
                board.fail(kind, message.clone())?;
                crate::log_stage!(warn, kind, error = %message, "stage failed");
                self.publish(board, false);
                Err(RagCostError::StageFailed { stage: kind, message })
            }
        }
    }

    fn publish(&self, board: &StageBoard, running: bool) {
        if let Some(tx) = self.publisher {
            tx.send_replace(RunSnapshot {
                running,
                board: Some(board.clone()),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cost::{ModelId, ModelPricing, PricingCatalog};
    use crate::tokens::estimate_tokens;

    fn request(query: &str) -> TurnRequest<'_> {
        TurnRequest {
            query,
            model: GenerativeModel::Gpt4o,
            embedding_model: EmbeddingModel::TextEmbedding3Small,
        }
    }

    #[tokio::test]
    async fn test_retrieval_run_completes_every_stage() {
        let calculator = CostCalculator::new();
        let corpus = CorpusIndex::builtin();
        let settings = PipelineSettings::default();
        let machine = PipelineStageMachine::new(&calculator, &corpus, &ImmediateScheduler, &settings);

        let mut board = StageBoard::new();
        let query = "2-bedroom near the beach in St Kilda";
        let output = machine.run_retrieval(request(query), &mut board).await.unwrap();

        assert!(board.is_finished());
        assert_eq!(output.response_kind, ResponseKind::BeachLocation);
        assert_eq!(output.embedding_tokens, Some(estimate_tokens(query)));
        assert_eq!(board.get(StageKind::Embed).tokens, Some(estimate_tokens(query)));

        let prompt = output.prompt.as_deref().unwrap();
        assert_eq!(output.input_tokens, estimate_tokens(prompt));
        assert_eq!(board.get(StageKind::Prompt).tokens, Some(output.input_tokens));
        assert_eq!(board.get(StageKind::Generate).cost, Some(output.cost.output_cost));
        assert_eq!(output.matched.len(), 4);
    }

    #[tokio::test]
    async fn test_transitions_follow_declared_order() {
        let calculator = CostCalculator::new();
        let corpus = CorpusIndex::builtin();
        let settings = PipelineSettings::default();
        let machine = PipelineStageMachine::new(&calculator, &corpus, &ImmediateScheduler, &settings);

        let mut board = StageBoard::new();
        machine.run_retrieval(request("parking?"), &mut board).await.unwrap();

        let expected: Vec<(StageKind, StageStatus)> = StageKind::ORDER
            .iter()
            .flat_map(|k| [(*k, StageStatus::Processing), (*k, StageStatus::Completed)])
            .collect();
        let observed: Vec<(StageKind, StageStatus)> =
            board.transitions().iter().map(|t| (t.stage, t.to)).collect();
        assert_eq!(observed, expected);
    }

    #[tokio::test]
    async fn test_unpriced_model_rejected_before_any_stage() {
        let catalog = PricingCatalog::from_entries([(
            ModelId::Embedding(EmbeddingModel::TextEmbedding3Small),
            ModelPricing::Embedding { price_per_1m: 0.02 },
        )])
        .unwrap();
        let calculator = CostCalculator::with_catalog(catalog);
        let corpus = CorpusIndex::builtin();
        let settings = PipelineSettings::default();
        let machine = PipelineStageMachine::new(&calculator, &corpus, &ImmediateScheduler, &settings);

        let mut board = StageBoard::new();
        let err = machine.run_retrieval(request("hi"), &mut board).await.unwrap_err();

        assert!(matches!(err, RagCostError::UnknownModel(_)));
        assert!(board.transitions().is_empty());
    }

    #[tokio::test]
    async fn test_guard_marks_stage_error() {
        let calculator = CostCalculator::new();
        let corpus = CorpusIndex::builtin();
        let settings = PipelineSettings::default();
        let machine = PipelineStageMachine::new(&calculator, &corpus, &ImmediateScheduler, &settings);

        let mut board = StageBoard::new();
        board.begin(StageKind::Embed, None).unwrap();
        let failed: Result<f64> = Err(RagCostError::Unknown("vector service unavailable".into()));
        let err = machine.guard(&mut board, StageKind::Embed, failed).unwrap_err();

        assert!(matches!(err, RagCostError::StageFailed { stage: StageKind::Embed, .. }));
        assert_eq!(board.get(StageKind::Embed).status, StageStatus::Error);
        for kind in &StageKind::ORDER[1..] {
            assert_eq!(board.get(*kind).status, StageStatus::Waiting);
        }
        assert!(board.begin(StageKind::Search, None).is_err());
    }

    #[tokio::test]
    async fn test_direct_run_skips_embedding() {
        let calculator = CostCalculator::new();
        let corpus = CorpusIndex::builtin();
        let settings = PipelineSettings::default();
        let machine = PipelineStageMachine::new(&calculator, &corpus, &ImmediateScheduler, &settings);

        let query = "any place with parking";
        let output = machine.run_direct(request(query)).await.unwrap();
        assert_eq!(output.input_tokens, estimate_tokens(query));
        assert_eq!(output.embedding_tokens, None);
        assert_eq!(output.cost.embedding_cost, 0.0);
        assert_eq!(output.response_kind, ResponseKind::Parking);
        assert!(output.prompt.is_none());
    }

    #[tokio::test]
    async fn test_publisher_sees_final_board() {
        let calculator = CostCalculator::new();
        let corpus = CorpusIndex::builtin();
        let settings = PipelineSettings::default();
        let (tx, rx) = watch::channel(RunSnapshot::default());
        let machine = PipelineStageMachine::new(&calculator, &corpus, &ImmediateScheduler, &settings)
            .with_publisher(&tx);

        let mut board = StageBoard::new();
        machine.run_retrieval(request("hello"), &mut board).await.unwrap();

        let snapshot = rx.borrow().clone();
        assert!(!snapshot.running);
        assert!(snapshot.board.unwrap().is_finished());
    }
}
