use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cost::CostBreakdown;
use crate::error::{RagCostError, Result};

/// One completed turn. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub timestamp: DateTime<Utc>,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub embedding_tokens: Option<u64>,
    pub input_cost: f64,
    pub output_cost: f64,
    pub embedding_cost: Option<f64>,
    pub total_cost: f64,
}

impl LedgerEntry {
    /// Embedding fields are set only when the turn embedded its query.
    pub fn from_cost(
        timestamp: DateTime<Utc>,
        input_tokens: u64,
        output_tokens: u64,
        embedding_tokens: Option<u64>,
        cost: &CostBreakdown,
    ) -> Self {
        Self {
            timestamp,
            input_tokens,
            output_tokens,
            embedding_tokens,
            input_cost: cost.input_cost,
            output_cost: cost.output_cost,
            embedding_cost: embedding_tokens.map(|_| cost.embedding_cost),
            total_cost: cost.total_cost,
        }
    }

    pub fn embedding_cost_or_zero(&self) -> f64 {
        self.embedding_cost.unwrap_or(0.0)
    }

    fn validate(&self) -> Result<()> {
        let costs = [
            self.input_cost,
            self.output_cost,
            self.embedding_cost_or_zero(),
            self.total_cost,
        ];
        if costs.iter().any(|c| !c.is_finite() || *c < 0.0) {
            return Err(RagCostError::InvalidArgument(
                "ledger costs must be finite and non-negative".to_string(),
            ));
        }
        let sum = self.input_cost + self.output_cost + self.embedding_cost_or_zero();
        if sum != self.total_cost {
            return Err(RagCostError::InvalidArgument(format!(
                "total cost {} does not equal component sum {}",
                self.total_cost, sum
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionTotals {
    pub turns: usize,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub embedding_tokens: u64,
    pub input_cost: f64,
    pub output_cost: f64,
    pub embedding_cost: f64,
    pub total_cost: f64,
}

impl SessionTotals {
    /// Totals recomputed from scratch over `entries`.
    pub fn fold<'a, I>(entries: I) -> Self
    where
        I: IntoIterator<Item = &'a LedgerEntry>,
    {
        entries.into_iter().fold(Self::default(), |acc, entry| {
            // fold over already-recorded entries cannot overflow
            acc.try_add(entry).unwrap_or(acc)
        })
    }

    /// Every token billed this session.
    pub fn session_tokens(&self) -> u64 {
        self.input_tokens
            .saturating_add(self.output_tokens)
            .saturating_add(self.embedding_tokens)
    }

    fn try_add(&self, entry: &LedgerEntry) -> Result<Self> {
        let overflow = || RagCostError::InvalidArgument("session token total overflows".to_string());
        Ok(Self {
            turns: self.turns + 1,
            input_tokens: self.input_tokens.checked_add(entry.input_tokens).ok_or_else(overflow)?,
            output_tokens: self.output_tokens.checked_add(entry.output_tokens).ok_or_else(overflow)?,
            embedding_tokens: self
                .embedding_tokens
                .checked_add(entry.embedding_tokens.unwrap_or(0))
                .ok_or_else(overflow)?,
            input_cost: self.input_cost + entry.input_cost,
            output_cost: self.output_cost + entry.output_cost,
            embedding_cost: self.embedding_cost + entry.embedding_cost_or_zero(),
            total_cost: self.total_cost + entry.total_cost,
        })
    }
}

/// Append-only turn history with running totals.
#[derive(Debug, Clone, Default)]
pub struct SessionLedger {
    entries: Vec<LedgerEntry>,
    totals: SessionTotals,
}

impl SessionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate, then append and bump the totals together. A rejected entry
    /// leaves the ledger untouched.
    pub fn record(&mut self, entry: LedgerEntry) -> Result<()> {
        entry.validate()?;
        let totals = self.totals.try_add(&entry)?;
        self.entries.push(entry);
        self.totals = totals;
        Ok(())
    }

    pub fn totals(&self) -> SessionTotals {
        self.totals
    }

    pub fn history(&self) -> &[LedgerEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
