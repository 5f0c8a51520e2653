//! 决策引擎 - 流程层
//!
//! 显式状态机：
//!
//! ```text
//! Init ──check_structure──▶ RejectedStructure (终态)
//!   │
//!   └──────────────────────▶ StructureChecked ──record_reviews──▶ FilesReviewed
//!                                                                   │
//!                            Decided (终态) ◀──decide── ChallengeValidated ◀──record_verdict
//! ```
//!
//! 状态不对时调用任何转换都返回 `DecisionError::InvalidTransition`

use crate::config::Thresholds;
use crate::error::DecisionError;
use crate::models::{
    ChallengeVerdict, FileReview, ResolvedDay, ReviewAction, ReviewDecision, ReviewStatus,
};
use crate::services::structure_validator::StructureReport;

/// 单个 PR 流水线的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Init,
    StructureChecked,
    RejectedStructure,
    FilesReviewed,
    ChallengeValidated,
    Decided,
}

impl PipelineState {
    pub fn name(self) -> &'static str {
        match self {
            PipelineState::Init => "INIT",
            PipelineState::StructureChecked => "STRUCTURE_CHECKED",
            PipelineState::RejectedStructure => "REJECTED_STRUCTURE",
            PipelineState::FilesReviewed => "FILES_REVIEWED",
            PipelineState::ChallengeValidated => "CHALLENGE_VALIDATED",
            PipelineState::Decided => "DECIDED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::RejectedStructure | PipelineState::Decided)
    }
}

/// 规则表
///
/// | 条件 | 动作 |
/// |---|---|
/// | 结构不合法 | REJECT |
/// | 平均分 ≥ approve 且覆盖达标且没有失败文件 | APPROVE |
/// | 平均分 < reject | REJECT |
/// | 其他 | REQUEST_CHANGES |
pub fn decide(
    structure_valid: bool,
    aggregate: f64,
    meets_coverage: bool,
    any_review_failed: bool,
    thresholds: &Thresholds,
) -> ReviewAction {
    if !structure_valid {
        ReviewAction::Reject
    } else if aggregate >= thresholds.approve_score && meets_coverage && !any_review_failed {
        ReviewAction::Approve
    } else if aggregate < thresholds.reject_score {
        ReviewAction::Reject
    } else {
        ReviewAction::RequestChanges
    }
}

/// 平均分，失败文件按 0 计
///
/// 返回未舍入的均值，阈值比较必须用这个值。
/// 分数超出 [0, 10] 是上游缺陷，直接报错而不是截断
pub fn aggregate_score(reviews: &[FileReview]) -> Result<f64, DecisionError> {
    if reviews.is_empty() {
        return Err(DecisionError::NoReviews);
    }

    for review in reviews {
        if !review.score.is_finite() || !(0.0..=10.0).contains(&review.score) {
            return Err(DecisionError::ScoreOutOfRange {
                path: review.path.clone(),
                score: review.score,
            });
        }
    }

    let total: f64 = reviews.iter().map(FileReview::effective_score).sum();
    Ok(total / reviews.len() as f64)
}

/// 展示用分数：向下截断到一位小数，不会把未达标的均值显示成达标
pub fn display_score(score: f64) -> f64 {
    ((score * 10.0) + 1e-9).floor() / 10.0
}

/// 标签：`day-N`（已识别时）加动作标签，有序且不重复
pub fn build_labels(resolved: &ResolvedDay, action: ReviewAction) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for label in resolved
        .label()
        .into_iter()
        .chain(std::iter::once(action.label().to_string()))
    {
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

fn unresolved_note(resolved: &ResolvedDay) -> Option<&'static str> {
    matches!(resolved, ResolvedDay::Unresolved).then_some(
        "Note: we couldn't tell which day of the challenge this is for. Mention the day in the PR title (e.g. \"Day 3\") next time.",
    )
}

/// 结构校验失败时的反馈
pub fn structure_feedback(report: &StructureReport, resolved: &ResolvedDay) -> String {
    let mut body = String::from(
        "Quick heads up - your files need to be in a subfolder within submissions/, not directly in it.\n\n",
    );
    for issue in &report.issues {
        body.push_str(&format!("- {}\n", issue));
    }
    if let Some(note) = unresolved_note(resolved) {
        body.push_str(&format!("\n{}\n", note));
    }
    body.trim_end().to_string()
}

/// 评审完成后的反馈
pub fn build_feedback(
    action: ReviewAction,
    aggregate: f64,
    reviews: &[FileReview],
    verdict: &ChallengeVerdict,
    resolved: &ResolvedDay,
    thresholds: &Thresholds,
) -> String {
    let mut body = match action {
        ReviewAction::Approve => "Good job! Your code looks solid.\n".to_string(),
        ReviewAction::RequestChanges => {
            "Hey, good start! Just need to fix a couple things:\n\n".to_string()
        }
        ReviewAction::Reject => "This needs some work:\n\n".to_string(),
    };

    for review in reviews {
        match review.status {
            ReviewStatus::ReviewFailed => body.push_str(&format!(
                "- {}: we couldn't finish reviewing this file automatically, a maintainer will take a look.\n",
                review.file_name()
            )),
            ReviewStatus::Fallback => body.push_str(&format!(
                "- {}: the automated review was inconclusive (score: {}/10).\n",
                review.file_name(),
                review.score
            )),
            ReviewStatus::Reviewed if review.score < thresholds.approve_score => {
                let severity = if review.score < thresholds.reject_score {
                    "Critical quality issues"
                } else {
                    "Needs improvement"
                };
                body.push_str(&format!(
                    "- {}: {} (score: {}/10)\n",
                    review.file_name(),
                    severity,
                    review.score
                ));
                for line in review.feedback.lines().filter(|l| !l.trim().is_empty()) {
                    body.push_str(&format!("  {}\n", line.trim()));
                }
            }
            ReviewStatus::Reviewed => {}
        }
    }

    if !verdict.missing.is_empty() {
        body.push_str(&format!(
            "\nConcepts from today's challenge we couldn't spot yet: {}\n",
            verdict.missing.join(", ")
        ));
    }

    if let Some(note) = unresolved_note(resolved) {
        body.push_str(&format!("\n{}\n", note));
    }

    match action {
        ReviewAction::Approve => {}
        ReviewAction::RequestChanges => body.push_str("\nUpdate these and we're good."),
        ReviewAction::Reject => body.push_str("\nTake another look at the challenge requirements."),
    }

    body.push_str(&format!(
        "\n\nOverall score: {:.1}/10",
        display_score(aggregate)
    ));
    body.trim().to_string()
}

/// 单个 PR 的决策状态机
pub struct DecisionEngine {
    thresholds: Thresholds,
    resolved: ResolvedDay,
    state: PipelineState,
    reviews: Vec<FileReview>,
    verdict: Option<ChallengeVerdict>,
}

impl DecisionEngine {
    pub fn new(thresholds: Thresholds, resolved: ResolvedDay) -> Self {
        Self {
            thresholds,
            resolved,
            state: PipelineState::Init,
            reviews: Vec::new(),
            verdict: None,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn reviews(&self) -> &[FileReview] {
        &self.reviews
    }

    fn expect_state(&self, expected: PipelineState, event: &'static str) -> Result<(), DecisionError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(DecisionError::InvalidTransition {
                state: self.state.name(),
                event,
            })
        }
    }

    /// 结构校验
    ///
    /// 不合法时直接进入终态并返回 REJECT 决策
    pub fn check_structure(
        &mut self,
        report: &StructureReport,
    ) -> Result<Option<ReviewDecision>, DecisionError> {
        self.expect_state(PipelineState::Init, "check_structure")?;

        if report.valid {
            self.state = PipelineState::StructureChecked;
            return Ok(None);
        }

        self.state = PipelineState::RejectedStructure;
        let action = decide(false, 0.0, false, false, &self.thresholds);
        Ok(Some(ReviewDecision {
            action,
            aggregate_score: 0.0,
            labels: build_labels(&self.resolved, action),
            feedback: structure_feedback(report, &self.resolved),
            auto_merge: false,
        }))
    }

    /// 记录全部文件评审结果
    pub fn record_reviews(&mut self, reviews: Vec<FileReview>) -> Result<(), DecisionError> {
        self.expect_state(PipelineState::StructureChecked, "record_reviews")?;
        aggregate_score(&reviews)?;
        self.reviews = reviews;
        self.state = PipelineState::FilesReviewed;
        Ok(())
    }

    /// 记录概念覆盖结果
    pub fn record_verdict(&mut self, verdict: ChallengeVerdict) -> Result<(), DecisionError> {
        self.expect_state(PipelineState::FilesReviewed, "record_verdict")?;
        self.verdict = Some(verdict);
        self.state = PipelineState::ChallengeValidated;
        Ok(())
    }

    /// 生成最终决策
    pub fn decide(&mut self) -> Result<ReviewDecision, DecisionError> {
        self.expect_state(PipelineState::ChallengeValidated, "decide")?;
        let verdict = self.verdict.clone().unwrap_or_else(ChallengeVerdict::satisfied);

        let aggregate = aggregate_score(&self.reviews)?;
        let any_failed = self.reviews.iter().any(FileReview::is_failed);
        let action = decide(
            true,
            aggregate,
            verdict.meets_threshold,
            any_failed,
            &self.thresholds,
        );

        self.state = PipelineState::Decided;
        Ok(ReviewDecision {
            action,
            aggregate_score: aggregate,
            labels: build_labels(&self.resolved, action),
            feedback: build_feedback(
                action,
                aggregate,
                &self.reviews,
                &verdict,
                &self.resolved,
                &self.thresholds,
            ),
            auto_merge: action == ReviewAction::Approve,
        })
    }
}
