//! # PR Review Bot
//!
//! 自动评审 "30 Days of Solidity" 挑战仓库 PR 的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Clients）
//! - `clients/` - 外部协作方的 trait 与实现
//! - `SourceControl` / `GithubClient` - 拉取 PR、发布评审、打标签、合并
//! - `InferenceProvider` / `LlmClient` - 调用 LLM，只返回原始文本
//! - `fakes` - 内存假实现，测试和演练用
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，每个服务只有一种能力
//! - `DayDetector` - 五个检测器 + 全序合并，识别挑战天数
//! - `structure_validator` - 校验 `submissions/<子目录>/` 结构
//! - `FileReviewer` - 单文件评审（超时、重试、兜底分数）
//! - `ChallengeValidator` - 概念覆盖率
//! - `token_optimizer` - 去注释压缩代码
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个 PR"的完整处理流程
//! - `PrCtx` - 上下文封装（PR 编号 + 批次位置）
//! - `DecisionEngine` - 显式状态机和规则表
//! - `ReviewFlow` - 流程编排（检测 → 校验 → 评审 → 决策 → 发布）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量 PR 处理器，管理生命周期、限流、取消和统计
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{parse_pr_reference, ChallengeCatalog, PullRequest, ReviewAction, ReviewDecision};
pub use orchestrator::{App, BatchRunResult, PrOutcome};
pub use workflow::{PrCtx, ReviewFlow};
