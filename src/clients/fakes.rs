//! 内存假实现（测试和 dry-run 演练用）
//!
//! `MemorySourceControl` 和 `ScriptedInference` 满足 trait 约定，不访问任何外部服务

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::clients::{ConceptCheckRequest, FileReviewRequest, InferenceProvider, SourceControl};
use crate::error::{HostError, InferenceError};
use crate::models::{select_in_range, DateRange, PrSummary, PullRequest, ReviewDecision};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// MemorySourceControl
// ---------------------------------------------------------------------------

/// 对假托管平台的一次写操作
#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Review { number: u64, event: String },
    Labels { number: u64, labels: Vec<String> },
    Merge { number: u64 },
}

/// 内存中的代码托管平台
#[derive(Debug, Default)]
pub struct MemorySourceControl {
    prs: Mutex<HashMap<u64, PullRequest>>,
    failing_posts: Mutex<HashSet<u64>>,
    calls: Mutex<Vec<HostCall>>,
}

impl MemorySourceControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, pr: PullRequest) {
        lock(&self.prs).insert(pr.number, pr);
    }

    /// 让某个 PR 的评审发布失败
    pub fn fail_posting_for(&self, number: u64) {
        lock(&self.failing_posts).insert(number);
    }

    /// 已记录的写操作，按发生顺序
    pub fn calls(&self) -> Vec<HostCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, number: u64) -> Vec<HostCall> {
        self.calls()
            .into_iter()
            .filter(|call| match call {
                HostCall::Review { number: n, .. }
                | HostCall::Labels { number: n, .. }
                | HostCall::Merge { number: n } => *n == number,
            })
            .collect()
    }

    fn not_found(endpoint: String) -> HostError {
        HostError::BadResponse {
            endpoint,
            status: 404,
            message: "Not Found".to_string(),
        }
    }
}

#[async_trait]
impl SourceControl for MemorySourceControl {
    async fn fetch_pr(&self, number: u64) -> Result<PullRequest, HostError> {
        lock(&self.prs)
            .get(&number)
            .cloned()
            .ok_or_else(|| Self::not_found(format!("pulls/{}", number)))
    }

    async fn list_prs(&self, range: &DateRange) -> Result<Vec<PrSummary>, HostError> {
        let summaries: Vec<PrSummary> = lock(&self.prs).values().map(PullRequest::summary).collect();
        Ok(select_in_range(summaries, range))
    }

    async fn post_review(&self, number: u64, decision: &ReviewDecision) -> Result<(), HostError> {
        if lock(&self.failing_posts).contains(&number) {
            return Err(HostError::BadResponse {
                endpoint: format!("pulls/{}/reviews", number),
                status: 502,
                message: "Bad Gateway".to_string(),
            });
        }
        lock(&self.calls).push(HostCall::Review {
            number,
            event: decision.action.review_event().to_string(),
        });
        Ok(())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), HostError> {
        lock(&self.calls).push(HostCall::Labels {
            number,
            labels: labels.to_vec(),
        });
        Ok(())
    }

    async fn merge_pr(&self, number: u64) -> Result<(), HostError> {
        if !lock(&self.prs).contains_key(&number) {
            return Err(Self::not_found(format!("pulls/{}/merge", number)));
        }
        lock(&self.calls).push(HostCall::Merge { number });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedInference
// ---------------------------------------------------------------------------

/// 按顺序返回预设响应的推理服务
///
/// 队列为空时返回默认响应
#[derive(Debug)]
pub struct ScriptedInference {
    reviews: Mutex<VecDeque<Result<String, InferenceError>>>,
    concepts: Mutex<VecDeque<Result<String, InferenceError>>>,
    default_review: String,
    review_calls: Mutex<usize>,
    concept_calls: Mutex<usize>,
}

impl Default for ScriptedInference {
    fn default() -> Self {
        Self::with_default_review(r#"{"quality_score": 8, "issues": [], "compiles": true}"#)
    }
}

impl ScriptedInference {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_review(response: impl Into<String>) -> Self {
        Self {
            reviews: Mutex::new(VecDeque::new()),
            concepts: Mutex::new(VecDeque::new()),
            default_review: response.into(),
            review_calls: Mutex::new(0),
            concept_calls: Mutex::new(0),
        }
    }

    pub fn push_review(&self, response: Result<String, InferenceError>) {
        lock(&self.reviews).push_back(response);
    }

    pub fn push_concepts(&self, response: Result<String, InferenceError>) {
        lock(&self.concepts).push_back(response);
    }

    pub fn review_calls(&self) -> usize {
        *lock(&self.review_calls)
    }

    pub fn concept_calls(&self) -> usize {
        *lock(&self.concept_calls)
    }
}

#[async_trait]
impl InferenceProvider for ScriptedInference {
    async fn review_file(&self, _request: &FileReviewRequest) -> Result<String, InferenceError> {
        *lock(&self.review_calls) += 1;
        lock(&self.reviews)
            .pop_front()
            .unwrap_or_else(|| Ok(self.default_review.clone()))
    }

    async fn validate_concepts(
        &self,
        _request: &ConceptCheckRequest,
    ) -> Result<String, InferenceError> {
        *lock(&self.concept_calls) += 1;
        lock(&self.concepts)
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}
