/// Length-based token estimation

/// Approximate characters per token used by hosted model tokenizers.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Estimate token count (rough approximation: 1 token ≈ 4 characters, rounded up)
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    let chars = text.chars().count() as u64;
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// Stateless estimator handed to the pipeline so callers can swap the
/// approximation without touching stage code.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenEstimator;

impl TokenEstimator {
    pub fn new() -> Self {
        Self
    }

    pub fn estimate(&self, text: &str) -> u64 {
        estimate_tokens(text)
    }

    /// Estimate an optional text; absent text counts as zero tokens.
    pub fn estimate_opt(&self, text: Option<&str>) -> u64 {
        text.map(estimate_tokens).unwrap_or(0)
    }
}
