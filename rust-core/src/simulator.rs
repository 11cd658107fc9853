/// Chat simulation: turns a user message into a pipeline run and books the
/// result into the session.

use chrono::Utc;
use serde::Serialize;
use tokio::sync::watch;

use crate::config::SimulatorConfig;
use crate::cost::{CostCalculator, EmbeddingModel, GenerativeModel};
use crate::error::Result;
use crate::observability::{MetricsCollector, TurnMetrics};
use crate::pipeline::{
    LatencyScheduler, PipelineOutput, PipelineSettings, PipelineStageMachine, ResponseKind,
    RunSnapshot, StageStatus, TurnRequest,
};
use crate::retrieval::CorpusIndex;
use crate::session::{ChatMessage, LedgerEntry, Role, Session};
use crate::tokens::estimate_tokens;

/// Model choices and the retrieval toggle for one turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TurnSelection {
    pub model: GenerativeModel,
    pub embedding_model: EmbeddingModel,
    pub include_retrieval: bool,
}

impl TurnSelection {
    /// Resolve raw identifiers; unknown ids fail with `UnknownModel`.
    pub fn parse(model: &str, embedding_model: &str, include_retrieval: bool) -> Result<Self> {
        Ok(Self {
            model: model.parse()?,
            embedding_model: embedding_model.parse()?,
            include_retrieval,
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub response_kind: ResponseKind,
    pub assistant: ChatMessage,
    pub entry: LedgerEntry,
}

pub struct ChatSimulator {
    session: Session,
    calculator: CostCalculator,
    corpus: CorpusIndex,
    scheduler: Box<dyn LatencyScheduler>,
    settings: PipelineSettings,
    metrics: Option<MetricsCollector>,
    run_state: watch::Sender<RunSnapshot>,
}

impl ChatSimulator {
    pub fn new(
        calculator: CostCalculator,
        corpus: CorpusIndex,
        scheduler: Box<dyn LatencyScheduler>,
        settings: PipelineSettings,
    ) -> Self {
        let (run_state, _) = watch::channel(RunSnapshot::default());
        Self {
            session: Session::new(),
            calculator,
            corpus,
            scheduler,
            settings,
            metrics: None,
            run_state,
        }
    }

    pub fn from_config(config: &SimulatorConfig, scheduler: Box<dyn LatencyScheduler>) -> Result<Self> {
        config.validate()?;
        Ok(Self::new(
            CostCalculator::with_catalog(config.pricing_catalog()?),
            config.corpus()?,
            scheduler,
            config.pipeline_settings(),
        ))
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn calculator(&self) -> &CostCalculator {
        &self.calculator
    }

    pub fn metrics(&self) -> Option<&MetricsCollector> {
        self.metrics.as_ref()
    }

    /// True while a run is in flight; collaborators disable sending.
    pub fn is_busy(&self) -> bool {
        self.run_state.borrow().running
    }

    /// Live stage board updates for renderers.
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.run_state.subscribe()
    }

    /// Same as [`send`](Self::send) with raw model identifiers.
    pub async fn send_raw(
        &mut self,
        text: &str,
        model: &str,
        embedding_model: &str,
        include_retrieval: bool,
    ) -> Result<Option<TurnOutcome>> {
        let selection = TurnSelection::parse(model, embedding_model, include_retrieval)?;
        self.send(text, selection).await
    }

    /// Run one turn. Blank input is ignored and returns `Ok(None)`.
    ///
    /// Model errors are raised before anything is written to the session.
    /// On a stage error the user message stays in the transcript but no
    /// ledger entry is booked.
    pub async fn send(&mut self, text: &str, selection: TurnSelection) -> Result<Option<TurnOutcome>> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let catalog = self.calculator.catalog();
        catalog.generative_rate(selection.model)?;
        if selection.include_retrieval {
            catalog.embedding_rate(selection.embedding_model)?;
        }

        let user_tokens = estimate_tokens(text);
        let user_cost = self.calculator.input_cost(user_tokens, selection.model)?;
        self.session.push_message(ChatMessage {
            role: Role::User,
            content: text.to_string(),
            tokens: user_tokens,
            cost: user_cost,
            embedding_cost: None,
            timestamp: Utc::now(),
        });

        crate::log_turn!(
            info,
            self.session.session_id,
            model = %selection.model,
            retrieval = selection.include_retrieval,
            "turn started"
        );

        self.run_state.send_replace(RunSnapshot {
            running: true,
            board: None,
        });
        if let Some(metrics) = &self.metrics {
            metrics.increment_active();
        }

        let result = self.run_pipeline(text, selection).await;

        if let Some(metrics) = &self.metrics {
            metrics.decrement_active();
        }

        let outcome = match result {
            Ok(output) => self.book(output, selection),
            Err(err) => {
                if let (Some(metrics), Some(failed)) = (
                    &self.metrics,
                    self.session.stage_board().and_then(|b| b.failed_stage()),
                ) {
                    metrics.record_stage_error(failed);
                }
                crate::log_turn!(warn, self.session.session_id, error = %err, "turn failed");
                Err(err)
            }
        };
        self.run_state.send_modify(|state| state.running = false);
        outcome.map(Some)
    }

    async fn run_pipeline(&mut self, text: &str, selection: TurnSelection) -> Result<PipelineOutput> {
        let machine = PipelineStageMachine::new(
            &self.calculator,
            &self.corpus,
            self.scheduler.as_ref(),
            &self.settings,
        )
        .with_publisher(&self.run_state);
        let request = TurnRequest {
            query: text,
            model: selection.model,
            embedding_model: selection.embedding_model,
        };

        match self.session.reset_run(selection.include_retrieval) {
            Some(board) => machine.run_retrieval(request, board).await,
            None => machine.run_direct(request).await,
        }
    }

    /// Book a finished run. The ledger entry goes in before the assistant
    /// reply; a rejected entry leaves no reply behind.
    fn book(&mut self, output: PipelineOutput, selection: TurnSelection) -> Result<TurnOutcome> {
        let entry = LedgerEntry::from_cost(
            Utc::now(),
            output.input_tokens,
            output.output_tokens,
            output.embedding_tokens,
            &output.cost,
        );
        self.session.record(entry.clone())?;

        let assistant = ChatMessage {
            role: Role::Assistant,
            content: output.response,
            tokens: output.output_tokens,
            cost: output.cost.output_cost,
            embedding_cost: output.embedding_tokens.map(|_| output.cost.embedding_cost),
            timestamp: entry.timestamp,
        };
        self.session.push_message(assistant.clone());
        self.session.finish_retrieval(output.matched, output.prompt);

        if let Some(metrics) = &self.metrics {
            metrics.record_turn(&TurnMetrics {
                session_id: self.session.session_id.clone(),
                include_retrieval: selection.include_retrieval,
                input_tokens: entry.input_tokens,
                output_tokens: entry.output_tokens,
                embedding_tokens: entry.embedding_tokens,
                cost_usd: entry.total_cost,
            });
            for stage in self.session.stages() {
                if stage.status == StageStatus::Completed {
                    metrics.observe_stage(stage.kind, self.settings.latencies.for_stage(stage.kind));
                }
            }
        }

        let totals = self.session.totals();
        crate::log_turn!(
            info,
            self.session.session_id,
            input_tokens = entry.input_tokens,
            output_tokens = entry.output_tokens,
            total_cost = entry.total_cost,
            session_cost = totals.total_cost,
            "turn completed"
        );

        Ok(TurnOutcome {
            response_kind: output.response_kind,
            assistant,
            entry,
        })
    }
}

impl std::fmt::Debug for ChatSimulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSimulator")
            .field("session_id", &self.session.session_id)
            .field("turns", &self.session.ledger().len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}
