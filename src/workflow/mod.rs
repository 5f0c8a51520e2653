pub mod decision;
pub mod review_ctx;
pub mod review_flow;

pub use decision::{DecisionEngine, PipelineState};
pub use review_ctx::PrCtx;
pub use review_flow::{PrReport, ReviewFlow};
