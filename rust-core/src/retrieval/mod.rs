/// Simulated retrieval over a static corpus

pub mod corpus;

pub use corpus::{CorpusIndex, Record, RELEVANCE_THRESHOLD};
