/// Stage records and their status lifecycle

use std::fmt;
use serde::{Deserialize, Serialize};

use crate::cost::pricing::{EmbeddingModel, GenerativeModel};
use crate::error::{RagCostError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Embed,
    Search,
    Rank,
    Prompt,
    Generate,
}

impl StageKind {
    /// Execution order of a pipeline run.
    pub const ORDER: [StageKind; 5] = [
        StageKind::Embed,
        StageKind::Search,
        StageKind::Rank,
        StageKind::Prompt,
        StageKind::Generate,
    ];

    pub fn index(&self) -> usize {
        match self {
            StageKind::Embed => 0,
            StageKind::Search => 1,
            StageKind::Rank => 2,
            StageKind::Prompt => 3,
            StageKind::Generate => 4,
        }
    }

    pub fn previous(&self) -> Option<StageKind> {
        match self.index() {
            0 => None,
            i => Some(StageKind::ORDER[i - 1]),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Embed => "embed",
            StageKind::Search => "search",
            StageKind::Rank => "rank",
            StageKind::Prompt => "prompt",
            StageKind::Generate => "generate",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            StageKind::Embed => "Embedding Query",
            StageKind::Search => "Vector Database Search",
            StageKind::Rank => "Ranking Results",
            StageKind::Prompt => "Building RAG Prompt",
            StageKind::Generate => "Generating Response",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            StageKind::Embed => "Converting query text into vector embeddings",
            StageKind::Search => "Searching for relevant record matches",
            StageKind::Rank => "Sorting results by relevance score",
            StageKind::Prompt => "Combining query with retrieved context",
            StageKind::Generate => "Using the language model to create the final answer",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Waiting,
    Processing,
    Completed,
    Error,
}

impl StageStatus {
    /// waiting -> processing -> completed | error; nothing else.
    pub fn can_transition_to(&self, next: StageStatus) -> bool {
        matches!(
            (self, next),
            (StageStatus::Waiting, StageStatus::Processing)
                | (StageStatus::Processing, StageStatus::Completed)
                | (StageStatus::Processing, StageStatus::Error)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Error)
    }

    pub fn label(&self) -> &'static str {
        match self {
            StageStatus::Waiting => "Pending",
            StageStatus::Processing => "In progress...",
            StageStatus::Completed => "Completed",
            StageStatus::Error => "Error",
        }
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageStatus::Waiting => "waiting",
            StageStatus::Processing => "processing",
            StageStatus::Completed => "completed",
            StageStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Per-stage metadata; each variant only carries what its stage reports.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum StageDetail {
    Embed {
        model: EmbeddingModel,
        dimensions: u32,
    },
    Search {
        store: String,
        namespace: String,
        corpus_size: usize,
        top_k: usize,
        include_metadata: bool,
    },
    Rank {
        score_threshold: f64,
        reranker: String,
        results_found: usize,
    },
    Prompt {
        context_chars: usize,
        records: usize,
    },
    Generate {
        model: GenerativeModel,
        temperature: f32,
        max_tokens: u32,
    },
}

impl StageDetail {
    pub fn kind(&self) -> StageKind {
        match self {
            StageDetail::Embed { .. } => StageKind::Embed,
            StageDetail::Search { .. } => StageKind::Search,
            StageDetail::Rank { .. } => StageKind::Rank,
            StageDetail::Prompt { .. } => StageKind::Prompt,
            StageDetail::Generate { .. } => StageKind::Generate,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Stage {
    pub kind: StageKind,
    pub title: &'static str,
    pub description: &'static str,
    pub status: StageStatus,
    pub tokens: Option<u64>,
    pub cost: Option<f64>,
    pub detail: Option<StageDetail>,
    pub error: Option<String>,
}

impl Stage {
    pub fn new(kind: StageKind) -> Self {
        Self {
            kind,
            title: kind.title(),
            description: kind.description(),
            status: StageStatus::Waiting,
            tokens: None,
            cost: None,
            detail: None,
            error: None,
        }
    }

    fn advance(&mut self, next: StageStatus) -> Result<StageTransition> {
        if !self.status.can_transition_to(next) {
            return Err(RagCostError::InvalidTransition {
                stage: self.kind,
                from: self.status,
                to: next,
            });
        }
        let transition = StageTransition {
            stage: self.kind,
            from: self.status,
            to: next,
        };
        self.status = next;
        Ok(transition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTransition {
    pub stage: StageKind,
    pub from: StageStatus,
    pub to: StageStatus,
}

/// The five stages of one run, indexed by [`StageKind::index`].
#[derive(Debug, Clone, Serialize)]
pub struct StageBoard {
    stages: [Stage; 5],
    transitions: Vec<StageTransition>,
}

impl StageBoard {
    pub fn new() -> Self {
        Self {
            stages: StageKind::ORDER.map(Stage::new),
            transitions: Vec::new(),
        }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn get(&self, kind: StageKind) -> &Stage {
        &self.stages[kind.index()]
    }

    /// Every status change applied to this board, in order.
    pub fn transitions(&self) -> &[StageTransition] {
        &self.transitions
    }

    pub fn is_finished(&self) -> bool {
        self.stages.iter().all(|s| s.status == StageStatus::Completed)
    }

    pub fn failed_stage(&self) -> Option<StageKind> {
        self.stages
            .iter()
            .find(|s| s.status == StageStatus::Error)
            .map(|s| s.kind)
    }

    /// Move a stage to processing. Its predecessor must already be completed.
    pub fn begin(&mut self, kind: StageKind, detail: Option<StageDetail>) -> Result<()> {
        if let Some(prev) = kind.previous() {
            if self.get(prev).status != StageStatus::Completed {
                return Err(RagCostError::InvalidTransition {
                    stage: kind,
                    from: self.get(kind).status,
                    to: StageStatus::Processing,
                });
            }
        }
        if let Some(detail) = &detail {
            debug_assert_eq!(detail.kind(), kind);
        }
        self.apply(kind, StageStatus::Processing)?;
        let stage = &mut self.stages[kind.index()];
        if detail.is_some() {
            stage.detail = detail;
        }
        Ok(())
    }

    /// Attach token and cost figures to a stage that is in flight.
    pub fn record(&mut self, kind: StageKind, tokens: Option<u64>, cost: Option<f64>) {
        let stage = &mut self.stages[kind.index()];
        if tokens.is_some() {
            stage.tokens = tokens;
        }
        if cost.is_some() {
            stage.cost = cost;
        }
    }

    pub fn set_detail(&mut self, kind: StageKind, detail: StageDetail) {
        self.stages[kind.index()].detail = Some(detail);
    }

    pub fn complete(&mut self, kind: StageKind) -> Result<()> {
        self.apply(kind, StageStatus::Completed)
    }

    pub fn fail(&mut self, kind: StageKind, message: impl Into<String>) -> Result<()> {
        self.apply(kind, StageStatus::Error)?;
        self.stages[kind.index()].error = Some(message.into());
        Ok(())
    }

    fn apply(&mut self, kind: StageKind, next: StageStatus) -> Result<()> {
        let transition = self.stages[kind.index()].advance(next)?;
        crate::log_stage!(debug, kind, from = %transition.from, to = %transition.to, "stage transition");
        self.transitions.push(transition);
        Ok(())
    }
}

impl Default for StageBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_lifecycle() {
        assert!(StageStatus::Waiting.can_transition_to(StageStatus::Processing));
        assert!(StageStatus::Processing.can_transition_to(StageStatus::Completed));
        assert!(StageStatus::Processing.can_transition_to(StageStatus::Error));
        assert!(!StageStatus::Completed.can_transition_to(StageStatus::Processing));
        assert!(!StageStatus::Waiting.can_transition_to(StageStatus::Completed));
        assert!(!StageStatus::Error.can_transition_to(StageStatus::Waiting));
    }

    #[test]
    fn test_board_starts_waiting_in_order() {
        let board = StageBoard::new();
        let kinds: Vec<StageKind> = board.stages().iter().map(|s| s.kind).collect();
        assert_eq!(kinds, StageKind::ORDER.to_vec());
        assert!(board.stages().iter().all(|s| s.status == StageStatus::Waiting));
    }

    #[test]
    fn test_cannot_start_before_predecessor_completes() {
        let mut board = StageBoard::new();
        let err = board.begin(StageKind::Search, None).unwrap_err();
        assert!(matches!(err, RagCostError::InvalidTransition { stage: StageKind::Search, .. }));

        board.begin(StageKind::Embed, None).unwrap();
        assert!(board.begin(StageKind::Search, None).is_err());
        board.complete(StageKind::Embed).unwrap();
        board.begin(StageKind::Search, None).unwrap();
    }

    #[test]
    fn test_completed_stage_cannot_regress() {
        let mut board = StageBoard::new();
        board.begin(StageKind::Embed, None).unwrap();
        board.complete(StageKind::Embed).unwrap();
        assert!(board.begin(StageKind::Embed, None).is_err());
        assert!(board.fail(StageKind::Embed, "late failure").is_err());
        assert_eq!(board.get(StageKind::Embed).status, StageStatus::Completed);
    }

    #[test]
    fn test_fail_records_message() {
        let mut board = StageBoard::new();
        board.begin(StageKind::Embed, None).unwrap();
        board.fail(StageKind::Embed, "boom").unwrap();
        assert_eq!(board.failed_stage(), Some(StageKind::Embed));
        assert_eq!(board.get(StageKind::Embed).error.as_deref(), Some("boom"));
        assert_eq!(board.transitions().len(), 2);
    }
}
