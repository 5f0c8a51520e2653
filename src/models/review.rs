use std::fmt;

/// 代码压缩前后的 token 估算
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub original: usize,
    pub optimized: usize,
}

impl TokenUsage {
    pub fn saved(&self) -> usize {
        self.original.saturating_sub(self.optimized)
    }

    /// 节省百分比
    pub fn percentage_saved(&self) -> f64 {
        if self.original == 0 {
            0.0
        } else {
            self.saved() as f64 / self.original as f64 * 100.0
        }
    }
}

impl std::ops::AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.original += rhs.original;
        self.optimized += rhs.optimized;
    }
}

/// 单个文件的评审状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    /// 正常评审
    Reviewed,
    /// LLM 响应无法解析，使用兜底分数
    Fallback,
    /// 重试耗尽或不可重试的错误，分数按 0 计
    ReviewFailed,
}

/// 单个文件的评审结果，创建后不再修改
#[derive(Debug, Clone, PartialEq)]
pub struct FileReview {
    pub path: String,
    /// [0, 10]，最多一位小数
    pub score: f64,
    pub feedback: String,
    pub tokens: TokenUsage,
    pub status: ReviewStatus,
}

impl FileReview {
    pub fn is_failed(&self) -> bool {
        self.status == ReviewStatus::ReviewFailed
    }

    /// 参与平均分计算的分数
    pub fn effective_score(&self) -> f64 {
        if self.is_failed() {
            0.0
        } else {
            self.score
        }
    }

    /// 文件名（路径最后一段）
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// 挑战概念覆盖结果
#[derive(Debug, Clone, PartialEq)]
pub struct ChallengeVerdict {
    /// [0, 1]
    pub coverage: f64,
    pub meets_threshold: bool,
    pub covered: Vec<String>,
    pub missing: Vec<String>,
}

impl ChallengeVerdict {
    /// 没有概念要求时自动满足
    pub fn satisfied() -> Self {
        Self {
            coverage: 1.0,
            meets_threshold: true,
            covered: Vec::new(),
            missing: Vec::new(),
        }
    }
}

/// 最终动作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReviewAction {
    Approve,
    RequestChanges,
    Reject,
}

impl ReviewAction {
    /// 动作对应的标签
    pub fn label(self) -> &'static str {
        match self {
            ReviewAction::Approve => "approved",
            ReviewAction::RequestChanges => "needs-fix",
            ReviewAction::Reject => "rejected",
        }
    }

    /// GitHub review event
    pub fn review_event(self) -> &'static str {
        match self {
            ReviewAction::Approve => "APPROVE",
            ReviewAction::RequestChanges => "REQUEST_CHANGES",
            ReviewAction::Reject => "COMMENT",
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewAction::Approve => "APPROVE",
            ReviewAction::RequestChanges => "REQUEST_CHANGES",
            ReviewAction::Reject => "REJECT",
        };
        f.write_str(s)
    }
}

/// 一个 PR 的最终决策
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewDecision {
    pub action: ReviewAction,
    pub aggregate_score: f64,
    /// 有序且不重复
    pub labels: Vec<String>,
    pub feedback: String,
    pub auto_merge: bool,
}

impl ReviewDecision {
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.iter().any(|l| l == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_usage_savings() {
        let mut usage = TokenUsage {
            original: 100,
            optimized: 60,
        };
        assert_eq!(usage.saved(), 40);
        assert!((usage.percentage_saved() - 40.0).abs() < 1e-9);

        usage += TokenUsage {
            original: 100,
            optimized: 100,
        };
        assert_eq!(usage.saved(), 40);
        assert_eq!(TokenUsage::default().percentage_saved(), 0.0);
    }

    #[test]
    fn test_failed_review_counts_as_zero() {
        let review = FileReview {
            path: "submissions/a/A.sol".to_string(),
            score: 9.0,
            feedback: String::new(),
            tokens: TokenUsage::default(),
            status: ReviewStatus::ReviewFailed,
        };
        assert_eq!(review.effective_score(), 0.0);
        assert_eq!(review.file_name(), "A.sol");
    }
}
