pub mod tokens;
pub mod cost;
pub mod retrieval;
pub mod pipeline;
pub mod session;
pub mod simulator;
pub mod config;
pub mod error;
pub mod observability;

pub use cost::{CostBreakdown, CostCalculator, EmbeddingModel, GenerativeModel, PricingCatalog};
pub use config::SimulatorConfig;
pub use session::Session;
pub use simulator::{ChatSimulator, TurnOutcome, TurnSelection};
pub use error::{RagCostError, Result};
