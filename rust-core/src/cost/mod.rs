pub mod calculator;
pub mod pricing;
pub mod batch;

pub use calculator::{CostBreakdown, CostCalculator, EmbeddingUsage};
pub use pricing::{
    EmbeddingModel, GenerativeModel, ModelDescriptor, ModelId, ModelKind, ModelPricing,
    PricingCatalog,
};
pub use batch::{estimate_workload, EmbeddingWorkload, WorkloadEstimate, WorkloadScenario};
