//! 批量 PR 处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责批量 PR 的调度和统计。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：校验配置、加载挑战目录、创建 GitHub 和 LLM 客户端
//! 2. **顺序处理**：逐个 PR 运行 `ReviewFlow`，每个 PR 有独立的超时
//! 3. **失败隔离**：单个 PR 的任何错误只记为该 PR 失败，批处理继续
//! 4. **限流**：PR 之间等待配置的间隔
//! 5. **取消**：每个 PR 开始前和等待期间检查取消信号
//! 6. **全局统计**：汇总决策数量和 token 节省
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单个 PR 的细节
//! - **单任务**：不并发，统计结果只在驱动任务上累加

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{error, info, warn};

use crate::clients::{GithubClient, InferenceProvider, LlmClient, SourceControl};
use crate::config::Config;
use crate::error::{AppResult, HostError};
use crate::models::{
    load_catalog, ChallengeCatalog, DateRange, ListingCounts, ReviewAction, TokenUsage,
};
use crate::utils::logging;
use crate::workflow::{PrCtx, PrReport, ReviewFlow};

/// 单个 PR 的最终结果
#[derive(Debug, Clone)]
pub enum PrOutcome {
    /// 到达终态（决策已生成，非 dry-run 时已发布）
    Decided(PrReport),
    /// 任何错误或超时
    Failed(String),
}

/// 批次中的一条记录
#[derive(Debug, Clone)]
pub struct PrEntry {
    pub pr_number: u64,
    pub outcome: PrOutcome,
}

/// 批处理结果
#[derive(Debug, Clone, Default)]
pub struct BatchRunResult {
    /// 按处理顺序
    pub entries: Vec<PrEntry>,
    pub approvals: usize,
    pub change_requests: usize,
    pub rejections: usize,
    pub failures: usize,
    /// 只统计已决策的 PR
    pub tokens: TokenUsage,
    pub cancelled: bool,
}

impl BatchRunResult {
    fn record(&mut self, pr_number: u64, outcome: PrOutcome) {
        match &outcome {
            PrOutcome::Decided(report) => {
                match report.decision.action {
                    ReviewAction::Approve => self.approvals += 1,
                    ReviewAction::RequestChanges => self.change_requests += 1,
                    ReviewAction::Reject => self.rejections += 1,
                }
                self.tokens += report.tokens;
            }
            PrOutcome::Failed(_) => self.failures += 1,
        }
        self.entries.push(PrEntry { pr_number, outcome });
    }

    pub fn decided(&self) -> usize {
        self.approvals + self.change_requests + self.rejections
    }

    /// 所有 PR 都到达终态且没有被取消
    pub fn all_decided(&self) -> bool {
        self.failures == 0 && !self.cancelled
    }

    pub fn entry(&self, pr_number: u64) -> Option<&PrEntry> {
        self.entries.iter().find(|e| e.pr_number == pr_number)
    }
}

/// 等待 `delay`，期间收到取消信号则提前返回 `true`
async fn wait_or_cancel(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    let pause = sleep(delay);
    tokio::pin!(pause);

    loop {
        tokio::select! {
            _ = &mut pause => return false,
            changed = cancel.changed() => match changed {
                Ok(()) if *cancel.borrow() => return true,
                Ok(()) => continue,
                // 发送端已关闭，不会再有取消
                Err(_) => {
                    (&mut pause).await;
                    return false;
                }
            },
        }
    }
}

/// 批量处理器
///
/// - 只做调度和统计，不做具体业务判断
/// - 持有唯一的 `ReviewFlow`，所有 PR 复用
pub struct BatchProcessor {
    flow: ReviewFlow,
    pr_delay: Duration,
    per_pr_timeout: Duration,
    log_file: Option<String>,
}

impl BatchProcessor {
    pub fn new(flow: ReviewFlow, config: &Config) -> Self {
        Self {
            flow,
            pr_delay: config.delays.pr_delay(),
            per_pr_timeout: Duration::from_secs(config.timeouts.per_pr),
            log_file: config.output_log_file.clone(),
        }
    }

    /// 顺序处理全部 PR
    pub async fn process_all(
        &self,
        pr_numbers: &[u64],
        mut cancel: watch::Receiver<bool>,
    ) -> BatchRunResult {
        let total = pr_numbers.len();
        let mut result = BatchRunResult::default();

        for (idx, &pr_number) in pr_numbers.iter().enumerate() {
            if *cancel.borrow() {
                warn!("🛑 收到取消信号，剩余 {} 个 PR 不再处理", total - idx);
                result.cancelled = true;
                break;
            }

            let ctx = PrCtx::new(pr_number, idx + 1, total);
            logging::log_pr_start(pr_number, ctx.position, total);

            let outcome = self.process_one(&ctx).await;
            self.write_log_line(pr_number, &outcome);
            result.record(pr_number, outcome);

            if !ctx.is_last() && !self.pr_delay.is_zero() {
                info!("⏳ 等待 {:?} 后处理下一个 PR...", self.pr_delay);
                if wait_or_cancel(self.pr_delay, &mut cancel).await {
                    warn!("🛑 等待期间收到取消信号，剩余 {} 个 PR 不再处理", total - idx - 1);
                    result.cancelled = true;
                    break;
                }
            }
        }

        result
    }

    async fn process_one(&self, ctx: &PrCtx) -> PrOutcome {
        match timeout(self.per_pr_timeout, self.flow.run(ctx)).await {
            Ok(Ok(report)) => {
                logging::log_pr_complete(ctx.pr_number, &report.decision, &report.tokens);
                PrOutcome::Decided(report)
            }
            Ok(Err(e)) => {
                error!("{} ❌ 处理过程中发生错误: {}", ctx, e);
                PrOutcome::Failed(e.to_string())
            }
            Err(_) => {
                let e = HostError::Timeout {
                    pr_number: ctx.pr_number,
                    seconds: self.per_pr_timeout.as_secs(),
                };
                error!("{} ❌ {}", ctx, e);
                PrOutcome::Failed(e.to_string())
            }
        }
    }

    fn write_log_line(&self, pr_number: u64, outcome: &PrOutcome) {
        let Some(path) = &self.log_file else {
            return;
        };
        let line = match outcome {
            PrOutcome::Decided(report) => {
                logging::pr_summary_line(pr_number, &report.decision, &report.tokens)
            }
            PrOutcome::Failed(reason) => format!("PR #{}: FAILED | {}", pr_number, reason),
        };
        if let Err(e) = logging::append_log_line(path, &line) {
            warn!("⚠️ 写入日志文件失败: {}", e);
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    dry_run: bool,
    host: Arc<dyn SourceControl>,
    processor: BatchProcessor,
}

impl App {
    /// 初始化应用
    ///
    /// 配置缺失或挑战目录无法加载时直接返回错误，不处理任何 PR
    pub async fn initialize(config: Config, dry_run: bool) -> AppResult<Self> {
        config.validate()?;

        let catalog = load_catalog(Path::new(&config.challenges_path)).await?;
        let host = GithubClient::new(
            &config.github,
            Duration::from_secs(config.timeouts.github_request),
        )?;
        let inference = LlmClient::new(&config.llm);

        if let Some(path) = &config.output_log_file {
            if let Err(e) = logging::init_log_file(path) {
                warn!("⚠️ {}", e);
            }
        }

        Ok(Self::with_clients(
            config,
            Arc::new(catalog),
            Arc::new(host),
            Arc::new(inference),
            dry_run,
        ))
    }

    /// 使用给定的协作方组装应用
    pub fn with_clients(
        config: Config,
        catalog: Arc<ChallengeCatalog>,
        host: Arc<dyn SourceControl>,
        inference: Arc<dyn InferenceProvider>,
        dry_run: bool,
    ) -> Self {
        let flow = ReviewFlow::new(&config, catalog, host.clone(), inference, dry_run);
        let processor = BatchProcessor::new(flow, &config);
        Self {
            config,
            dry_run,
            host,
            processor,
        }
    }

    /// 查找创建时间在区间内的 PR，返回按创建时间升序的编号
    pub async fn prs_in_range(&self, range: &DateRange) -> AppResult<Vec<u64>> {
        info!("🔎 正在查找 {} 创建的 PR...", range);
        let prs = self.host.list_prs(range).await?;
        logging::log_listing(range, &prs, &ListingCounts::from_summaries(&prs));
        Ok(prs.iter().map(|pr| pr.number).collect())
    }

    /// 运行应用主逻辑
    pub async fn run(&self, pr_numbers: &[u64], cancel: watch::Receiver<bool>) -> BatchRunResult {
        logging::log_startup(
            pr_numbers.len(),
            self.config.delays.between_prs,
            self.config.delays.between_files,
            self.dry_run,
        );

        let result = self.processor.process_all(pr_numbers, cancel).await;
        print_final_stats(&result, self.config.output_log_file.as_deref());
        result
    }
}

// ========== 日志辅助函数 ==========

fn print_final_stats(result: &BatchRunResult, log_file: Option<&str>) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 通过: {}", result.approvals);
    info!("⚠️ 需修改: {}", result.change_requests);
    info!("❌ 拒绝: {}", result.rejections);
    info!("💥 失败: {}", result.failures);
    info!(
        "💰 节省 token: {} ({:.1}%)",
        result.tokens.saved(),
        result.tokens.percentage_saved()
    );
    if result.cancelled {
        warn!("🛑 批处理被取消，已处理 {} 个 PR", result.entries.len());
    }
    for entry in result.entries.iter().filter_map(|e| match &e.outcome {
        PrOutcome::Failed(reason) => Some((e.pr_number, reason)),
        PrOutcome::Decided(_) => None,
    }) {
        error!("   PR #{}: {}", entry.0, logging::truncate_text(entry.1, 120));
    }
    info!("{}", "=".repeat(60));
    if let Some(path) = log_file {
        info!("\n日志已保存至: {}", path);
    }
}
