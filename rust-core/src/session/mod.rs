pub mod ledger;

pub use ledger::{LedgerEntry, SessionLedger, SessionTotals};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::pipeline::{Stage, StageBoard};
use crate::retrieval::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub tokens: u64,
    pub cost: f64,
    pub embedding_cost: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

/// All state of one simulated chat: transcript, the latest run's stages and
/// retrieval output, and the cost ledger.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    messages: Vec<ChatMessage>,
    board: Option<StageBoard>,
    matched: Vec<Record>,
    last_prompt: Option<String>,
    ledger: SessionLedger,
}

impl Session {
    pub fn new() -> Self {
        Self {
            session_id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            board: None,
            matched: Vec::new(),
            last_prompt: None,
            ledger: SessionLedger::new(),
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Stages of the latest retrieval run; empty when the last turn ran
    /// without retrieval.
    pub fn stages(&self) -> &[Stage] {
        self.board.as_ref().map(|b| b.stages()).unwrap_or(&[])
    }

    pub fn stage_board(&self) -> Option<&StageBoard> {
        self.board.as_ref()
    }

    pub fn matched_records(&self) -> &[Record] {
        &self.matched
    }

    pub fn last_prompt(&self) -> Option<&str> {
        self.last_prompt.as_deref()
    }

    pub fn ledger(&self) -> &SessionLedger {
        &self.ledger
    }

    pub fn totals(&self) -> SessionTotals {
        self.ledger.totals()
    }

    pub fn history(&self) -> &[LedgerEntry] {
        self.ledger.history()
    }

    pub(crate) fn push_message(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    /// Drop the previous run's stages and retrieval output.
    pub(crate) fn reset_run(&mut self, with_board: bool) -> Option<&mut StageBoard> {
        self.matched.clear();
        self.last_prompt = None;
        self.board = with_board.then(StageBoard::new);
        self.board.as_mut()
    }

    pub(crate) fn finish_retrieval(&mut self, matched: Vec<Record>, prompt: Option<String>) {
        self.matched = matched;
        self.last_prompt = prompt;
    }

    pub(crate) fn record(&mut self, entry: LedgerEntry) -> Result<()> {
        self.ledger.record(entry)
    }

    pub fn snapshot(&self) -> SessionSnapshot<'_> {
        SessionSnapshot {
            session_id: &self.session_id,
            messages: &self.messages,
            stages: self.stages(),
            matched_records: &self.matched,
            last_prompt: self.last_prompt(),
            totals: self.totals(),
            session_tokens: self.totals().session_tokens(),
            history: self.history(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.snapshot())?)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view handed to renderers.
#[derive(Debug, Serialize)]
pub struct SessionSnapshot<'a> {
    pub session_id: &'a str,
    pub messages: &'a [ChatMessage],
    pub stages: &'a [Stage],
    pub matched_records: &'a [Record],
    pub last_prompt: Option<&'a str>,
    pub totals: SessionTotals,
    pub session_tokens: u64,
    pub history: &'a [LedgerEntry],
}
