//! 外部协作方的抽象
//!
//! 核心流程只依赖这两个 trait，GitHub 和 LLM 的具体实现可以替换成内存假实现

use async_trait::async_trait;

use crate::error::{HostError, InferenceError};
use crate::models::{DateRange, DayContext, PrSummary, PullRequest, ReviewDecision};

/// 代码托管平台
#[async_trait]
pub trait SourceControl: Send + Sync {
    /// 拉取 PR 元数据和改动文件内容
    async fn fetch_pr(&self, number: u64) -> Result<PullRequest, HostError>;

    /// 列出创建时间落在区间内的 PR（不论状态），按创建时间升序
    async fn list_prs(&self, range: &DateRange) -> Result<Vec<PrSummary>, HostError>;

    /// 发布评审意见
    async fn post_review(&self, number: u64, decision: &ReviewDecision) -> Result<(), HostError>;

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), HostError>;

    async fn merge_pr(&self, number: u64) -> Result<(), HostError>;
}

/// 单文件评审请求
#[derive(Debug, Clone, PartialEq)]
pub struct FileReviewRequest {
    pub path: String,
    /// 已压缩的代码
    pub content: String,
    pub context: DayContext,
}

/// 概念覆盖检查请求
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptCheckRequest {
    pub path: String,
    pub content: String,
    pub context: DayContext,
}

/// 推理服务
///
/// 只返回原始文本，解析、重试和超时由调用方负责
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn review_file(&self, request: &FileReviewRequest) -> Result<String, InferenceError>;

    async fn validate_concepts(
        &self,
        request: &ConceptCheckRequest,
    ) -> Result<String, InferenceError>;
}
