//! PR 评审流程 - 流程层
//!
//! 核心职责：定义"一个 PR"的完整处理流程
//!
//! 流程顺序：
//! 1. 拉取 PR → 检测天数
//! 2. 结构校验（不合法直接 REJECT）
//! 3. 逐个文件：压缩 → 评审（文件之间限流等待）
//! 4. 概念检查（可选）→ 覆盖率校验
//! 5. 决策 → 发布评审、标签、合并（dry-run 时跳过）

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::clients::{InferenceProvider, SourceControl};
use crate::config::{Config, Thresholds};
use crate::error::{AppResult, HostError};
use crate::models::{
    ChallengeCatalog, DayContext, FileReview, PullRequest, ResolvedDay, ReviewDecision,
    TokenUsage,
};
use crate::services::{
    token_optimizer, validate_structure, ChallengeValidator, DayDetector, FileReviewer,
};
use crate::workflow::decision::{display_score, DecisionEngine, PipelineState};
use crate::workflow::review_ctx::PrCtx;

/// 单个 PR 的处理结果
#[derive(Debug, Clone)]
pub struct PrReport {
    pub decision: ReviewDecision,
    pub resolved_day: ResolvedDay,
    /// 本 PR 所有文件的 token 统计
    pub tokens: TokenUsage,
    /// 流水线结束时的终态
    pub final_state: PipelineState,
    pub published: bool,
}

/// 压缩后的源码
struct OptimizedSource {
    path: String,
    code: String,
}

/// PR 评审流程
///
/// - 编排完整的 PR 处理流程
/// - 决定何时校验、何时评审、何时发布
/// - 只依赖业务能力（services）和协作方 trait
pub struct ReviewFlow {
    host: Arc<dyn SourceControl>,
    catalog: Arc<ChallengeCatalog>,
    detector: DayDetector,
    reviewer: FileReviewer,
    validator: ChallengeValidator,
    thresholds: Thresholds,
    file_delay: Duration,
    concept_check: bool,
    dry_run: bool,
}

impl ReviewFlow {
    /// 创建新的 PR 评审流程
    pub fn new(
        config: &Config,
        catalog: Arc<ChallengeCatalog>,
        host: Arc<dyn SourceControl>,
        inference: Arc<dyn InferenceProvider>,
        dry_run: bool,
    ) -> Self {
        Self {
            host,
            detector: DayDetector::new(catalog.clone(), config.thresholds.fuzzy_floor),
            catalog,
            reviewer: FileReviewer::from_config(inference, config),
            validator: ChallengeValidator::new(config.thresholds.coverage),
            thresholds: config.thresholds.clone(),
            file_delay: config.delays.file_delay(),
            concept_check: config.llm.concept_check,
            dry_run,
        }
    }

    pub async fn run(&self, ctx: &PrCtx) -> AppResult<PrReport> {
        // ========== 1. 拉取 PR ==========
        info!("{} 📥 正在拉取 PR 信息...", ctx);
        let pr = self.host.fetch_pr(ctx.pr_number).await?;
        info!(
            "{} ✓ 标题: \"{}\"，作者: {}，改动文件 {} 个",
            ctx,
            pr.title,
            pr.author,
            pr.files.len()
        );

        // ========== 2. 检测天数 ==========
        let resolved = self.detector.detect(&pr);
        match &resolved {
            ResolvedDay::Resolved { .. } => info!("{} 📅 识别结果: {}", ctx, resolved),
            ResolvedDay::Unresolved => warn!("{} ⚠️ 无法识别挑战天数，按无概念要求处理", ctx),
        }
        let context = self.catalog.context_for(&resolved);
        let mut engine = DecisionEngine::new(self.thresholds.clone(), resolved.clone());

        // ========== 3. 结构校验 ==========
        let structure = validate_structure(&pr.file_paths());
        if let Some(decision) = engine.check_structure(&structure)? {
            warn!("{} ❌ 目录结构不合法，共 {} 个问题", ctx, structure.issues.len());
            for issue in &structure.issues {
                warn!("{}    - {}", ctx, issue);
            }
            let published = self.publish(ctx, &decision).await?;
            return Ok(PrReport {
                decision,
                resolved_day: resolved,
                tokens: TokenUsage::default(),
                final_state: engine.state(),
                published,
            });
        }
        info!("{} ✓ 目录结构合法，待评审文件 {} 个", ctx, structure.reviewable.len());

        // ========== 4. 逐个评审 ==========
        let (reviews, sources, tokens) = self
            .review_files(ctx, &pr, &structure.reviewable, &context)
            .await;
        engine.record_reviews(reviews)?;

        // ========== 5. 概念覆盖 ==========
        let extra_evidence = self.concept_evidence(ctx, &sources, &context).await;
        let source_texts: Vec<&str> = sources.iter().map(|s| s.code.as_str()).collect();
        let verdict = self.validator.validate(
            engine.reviews(),
            &source_texts,
            &context.concepts,
            extra_evidence.as_deref(),
        );
        info!(
            "{} 📚 概念覆盖率: {:.0}% (缺少: {})",
            ctx,
            verdict.coverage * 100.0,
            if verdict.missing.is_empty() {
                "无".to_string()
            } else {
                verdict.missing.join(", ")
            }
        );
        engine.record_verdict(verdict)?;

        // ========== 6. 决策与发布 ==========
        let decision = engine.decide()?;
        info!(
            "{} ⚖️ 决策: {} (平均分 {:.1}，标签 {})",
            ctx,
            decision.action,
            display_score(decision.aggregate_score),
            decision.labels.join(", ")
        );

        let published = self.publish(ctx, &decision).await?;

        Ok(PrReport {
            decision,
            resolved_day: resolved,
            tokens,
            final_state: engine.state(),
            published,
        })
    }

    /// 依次评审每个文件，文件之间等待限流间隔
    async fn review_files(
        &self,
        ctx: &PrCtx,
        pr: &PullRequest,
        reviewable: &[String],
        context: &DayContext,
    ) -> (Vec<FileReview>, Vec<OptimizedSource>, TokenUsage) {
        let mut reviews = Vec::with_capacity(reviewable.len());
        let mut sources = Vec::with_capacity(reviewable.len());
        let mut tokens = TokenUsage::default();

        for (index, path) in reviewable.iter().enumerate() {
            let content = pr.file(path).map(|f| f.content.as_str()).unwrap_or_default();
            let (optimized, usage) = token_optimizer::optimize_with_usage(content);
            info!(
                "{} 🔍 [{}/{}] 评审 {} (token {} → {}，节省 {:.1}%)",
                ctx,
                index + 1,
                reviewable.len(),
                path,
                usage.original,
                usage.optimized,
                usage.percentage_saved()
            );

            let review = self.reviewer.review(path, &optimized, usage, context).await;
            if review.is_failed() {
                warn!("{} ⚠️ {} 评审失败: {}", ctx, path, review.feedback);
            } else {
                info!("{} ✓ {} 得分 {}/10", ctx, review.file_name(), review.score);
            }

            tokens += usage;
            reviews.push(review);
            sources.push(OptimizedSource {
                path: path.clone(),
                code: optimized,
            });

            if index + 1 < reviewable.len() && !self.file_delay.is_zero() {
                info!("{} ⏳ 等待 {:?} 后评审下一个文件...", ctx, self.file_delay);
                sleep(self.file_delay).await;
            }
        }

        (reviews, sources, tokens)
    }

    /// 用最大的文件请求 LLM 概念检查，失败只记录日志
    async fn concept_evidence(
        &self,
        ctx: &PrCtx,
        sources: &[OptimizedSource],
        context: &DayContext,
    ) -> Option<String> {
        if !self.concept_check || context.concepts.is_empty() {
            return None;
        }
        let main = sources.iter().max_by_key(|s| s.code.len())?;

        if !self.file_delay.is_zero() {
            sleep(self.file_delay).await;
        }

        info!("{} 🧠 对 {} 进行概念检查...", ctx, main.path);
        match self
            .reviewer
            .check_concepts(&main.path, &main.code, context)
            .await
        {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("{} ⚠️ 概念检查失败，忽略: {}", ctx, e);
                None
            }
        }
    }

    /// 发布评审、标签并在通过时合并
    ///
    /// 返回是否真的发布到了托管平台
    async fn publish(&self, ctx: &PrCtx, decision: &ReviewDecision) -> Result<bool, HostError> {
        if self.dry_run {
            info!("{} 🔍 DRY RUN - 不发布评审", ctx);
            return Ok(false);
        }

        info!("{} 📤 正在发布评审...", ctx);
        self.host.post_review(ctx.pr_number, decision).await?;
        self.host.add_labels(ctx.pr_number, &decision.labels).await?;
        info!("{} ✓ 评审和标签已发布", ctx);

        if decision.auto_merge {
            info!("{} 🔀 正在自动合并...", ctx);
            self.host.merge_pr(ctx.pr_number).await?;
            info!("{} ✅ 已合并", ctx);
        }

        Ok(true)
    }
}
