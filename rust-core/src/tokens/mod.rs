/// Token estimation

pub mod estimator;

pub use estimator::{estimate_tokens, TokenEstimator, CHARS_PER_TOKEN};
