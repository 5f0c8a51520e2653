//! 单文件评审 - 业务能力层
//!
//! 只负责"给一个文件打分"能力：
//! - 调用推理服务（带超时、重试和退避）
//! - 解析响应中的 `quality_score`
//! - 解析失败时使用兜底分数，调用失败时标记为 `ReviewFailed`
//!
//! 这里不会向上抛出错误，任何失败都会变成一个 `FileReview`

use regex::Regex;
use serde_json::Value;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::clients::{ConceptCheckRequest, FileReviewRequest, InferenceProvider};
use crate::config::{Config, RetryPolicy};
use crate::error::InferenceError;
use crate::models::{DayContext, FileReview, ReviewStatus, TokenUsage};

fn fenced_json_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").expect("fenced regex"))
}

fn score_text_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?i)quality[_ ]score["']?\s*[:=]\s*(-?\d+(?:\.\d+)?)"#).expect("score regex")
    })
}

/// 解析后的评审结果
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedReview {
    pub score: f64,
    pub feedback: String,
    pub status: ReviewStatus,
}

/// 保留一位小数
fn round_score(score: f64) -> f64 {
    (score * 10.0).round() / 10.0
}

/// 依次尝试：围栏 JSON、裸 JSON 对象
fn extract_json(raw: &str) -> Option<Value> {
    if let Some(caps) = fenced_json_regex().captures(raw) {
        if let Ok(value) = serde_json::from_str::<Value>(&caps[1]) {
            return Some(value);
        }
    }

    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(&raw[start..=end]).ok()
}

fn json_score(value: &Value) -> Option<f64> {
    match value.get("quality_score")? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// 从 JSON 中整理出给学员看的反馈
fn json_feedback(value: &Value) -> String {
    let mut lines = Vec::new();

    if value.get("compiles").and_then(Value::as_bool) == Some(false) {
        lines.push("The code may not compile as written.".to_string());
    }

    if let Some(issues) = value.get("issues").and_then(Value::as_array) {
        lines.extend(
            issues
                .iter()
                .filter_map(|issue| match issue {
                    Value::String(s) => Some(s.trim().to_string()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .filter(|s| !s.is_empty())
                .map(|s| format!("- {}", s)),
        );
    }

    for key in ["summary", "feedback"] {
        if let Some(text) = value.get(key).and_then(Value::as_str) {
            let text = text.trim();
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
    }

    lines.join("\n")
}

/// 解析推理服务的原始响应
///
/// 解析不到分数或分数超出 [0, 10] 时返回 `fallback` 分，状态为 `Fallback`
pub fn parse_review_response(raw: &str, fallback: f64) -> ParsedReview {
    let json = extract_json(raw);

    let (score, feedback) = match json.as_ref().and_then(|v| json_score(v).map(|s| (s, v))) {
        Some((score, value)) => (Some(score), json_feedback(value)),
        None => {
            let score = score_text_regex()
                .captures(raw)
                .and_then(|caps| caps[1].parse::<f64>().ok());
            (score, raw.trim().to_string())
        }
    };

    match score {
        Some(score) if score.is_finite() && (0.0..=10.0).contains(&score) => ParsedReview {
            score: round_score(score),
            feedback,
            status: ReviewStatus::Reviewed,
        },
        Some(score) => ParsedReview {
            score: fallback,
            feedback: format!(
                "Automated review returned an out-of-range score ({}); a default score of {} was used.\n{}",
                score, fallback, feedback
            )
            .trim_end()
            .to_string(),
            status: ReviewStatus::Fallback,
        },
        None => ParsedReview {
            score: fallback,
            feedback: format!(
                "Automated review response could not be parsed; a default score of {} was used.",
                fallback
            ),
            status: ReviewStatus::Fallback,
        },
    }
}

/// 带超时和指数退避的调用
///
/// - 临时错误和超时最多尝试 `policy.max_attempts` 次
/// - 不可重试的错误立即返回
pub async fn call_with_retry<F, Fut>(
    policy: &RetryPolicy,
    call_timeout: Duration,
    label: &str,
    mut call: F,
) -> Result<String, InferenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String, InferenceError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        let result = match timeout(call_timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(InferenceError::Timeout {
                seconds: call_timeout.as_secs(),
            }),
        };

        match result {
            Ok(text) => return Ok(text),
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let backoff = policy.backoff_for(attempt);
                warn!(
                    "{} ⚠️ 第 {}/{} 次调用失败: {}，{:?} 后重试",
                    label, attempt, max_attempts, e, backoff
                );
                sleep(backoff).await;
                attempt += 1;
            }
            Err(e) => {
                warn!("{} ❌ 调用失败（第 {} 次）: {}", label, attempt, e);
                return Err(e);
            }
        }
    }
}

/// 单文件评审服务
///
/// 职责：
/// - 只处理单个文件
/// - 不关心 PR、标签和决策
pub struct FileReviewer {
    provider: Arc<dyn InferenceProvider>,
    retry: RetryPolicy,
    call_timeout: Duration,
    fallback_score: f64,
}

impl FileReviewer {
    pub fn new(
        provider: Arc<dyn InferenceProvider>,
        retry: RetryPolicy,
        call_timeout: Duration,
        fallback_score: f64,
    ) -> Self {
        Self {
            provider,
            retry,
            call_timeout,
            fallback_score,
        }
    }

    pub fn from_config(provider: Arc<dyn InferenceProvider>, config: &Config) -> Self {
        Self::new(
            provider,
            config.retry.clone(),
            Duration::from_secs(config.timeouts.inference_call),
            config.thresholds.fallback_score,
        )
    }

    /// 评审一个已压缩的文件
    pub async fn review(
        &self,
        path: &str,
        content: &str,
        tokens: TokenUsage,
        context: &DayContext,
    ) -> FileReview {
        let request = FileReviewRequest {
            path: path.to_string(),
            content: content.to_string(),
            context: context.clone(),
        };
        let label = format!("[{}]", path);

        let result = call_with_retry(&self.retry, self.call_timeout, &label, || {
            self.provider.review_file(&request)
        })
        .await;

        match result {
            Ok(raw) => {
                let parsed = parse_review_response(&raw, self.fallback_score);
                if parsed.status == ReviewStatus::Fallback {
                    warn!("{} ⚠️ 无法解析评分，使用兜底分数 {}", label, self.fallback_score);
                } else {
                    debug!("{} 评分: {}", label, parsed.score);
                }
                FileReview {
                    path: path.to_string(),
                    score: parsed.score,
                    feedback: parsed.feedback,
                    tokens,
                    status: parsed.status,
                }
            }
            Err(e) => FileReview {
                path: path.to_string(),
                score: 0.0,
                feedback: format!("Automated review could not be completed: {}", e),
                tokens,
                status: ReviewStatus::ReviewFailed,
            },
        }
    }

    /// 让推理服务检查概念覆盖，返回原始文本
    pub async fn check_concepts(
        &self,
        path: &str,
        content: &str,
        context: &DayContext,
    ) -> Result<String, InferenceError> {
        let request = ConceptCheckRequest {
            path: path.to_string(),
            content: content.to_string(),
            context: context.clone(),
        };
        let label = format!("[{} 概念检查]", path);

        call_with_retry(&self.retry, self.call_timeout, &label, || {
            self.provider.validate_concepts(&request)
        })
        .await
    }
}
