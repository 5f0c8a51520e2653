//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流程调度，是整个系统的"指挥中心"。
//!
//! ### `batch_processor` - 批量 PR 处理器
//! - 管理应用生命周期（初始化、运行、统计）
//! - 顺序处理 PR 列表，每个 PR 独立超时、独立失败
//! - PR 之间限流，响应取消信号
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (处理 Vec<PR 编号>)
//!     ↓
//! workflow::ReviewFlow (处理单个 PR)
//!     ↓
//! services (能力层：检测 / 校验 / 评审 / 压缩)
//!     ↓
//! clients (基础设施：GitHub / LLM)
//! ```

pub mod batch_processor;

pub use batch_processor::{App, BatchProcessor, BatchRunResult, PrEntry, PrOutcome};
