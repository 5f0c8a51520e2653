//! 日志工具模块
//!
//! 提供订阅器初始化、运行日志文件和格式化输出的辅助函数

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::io::Write;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::models::{DateRange, ListingCounts, PrSummary, ReviewDecision, TokenUsage};
use crate::workflow::decision::display_score;

/// 安装全局 tracing 订阅器
///
/// 优先使用 `RUST_LOG`，否则为 `info`（`verbose` 时为 `debug`）。重复调用无效果。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false))
        .try_init()
        .ok();
}

/// 初始化运行日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\nPR 评审日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)
        .with_context(|| format!("无法创建日志文件: {}", log_file_path))?;
    Ok(())
}

/// 向运行日志追加一行
pub fn append_log_line(log_file_path: &str, line: &str) -> Result<()> {
    let mut file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(log_file_path)
        .with_context(|| format!("无法打开日志文件: {}", log_file_path))?;
    writeln!(
        file,
        "[{}] {}",
        chrono::Local::now().format("%H:%M:%S"),
        line
    )?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `total_prs`: 待评审 PR 数量
/// - `pr_delay_secs` / `file_delay_secs`: 限流间隔
/// - `dry_run`: 是否只计算不发布
pub fn log_startup(total_prs: usize, pr_delay_secs: u64, file_delay_secs: u64, dry_run: bool) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 批量 PR 评审模式");
    info!("📦 待评审 PR: {} 个", total_prs);
    info!("⏱️ PR 间隔: {} 秒，文件间隔: {} 秒", pr_delay_secs, file_delay_secs);
    if dry_run {
        info!("🔍 DRY RUN - 不会发布评审、标签或合并");
    }
    info!("{}", "=".repeat(60));
}

/// 记录单个 PR 开始
pub fn log_pr_start(pr_number: u64, position: usize, total: usize) {
    info!("\n{}", "=".repeat(60));
    info!("📄 开始评审 PR #{} ({}/{})", pr_number, position, total);
    info!("{}", "=".repeat(60));
}

/// 单个 PR 的摘要行，同时用于终端和日志文件
pub fn pr_summary_line(pr_number: u64, decision: &ReviewDecision, tokens: &TokenUsage) -> String {
    format!(
        "PR #{}: {} | 平均分 {:.1} | 标签 [{}] | 节省 token {} ({:.1}%)",
        pr_number,
        decision.action,
        display_score(decision.aggregate_score),
        decision.labels.join(", "),
        tokens.saved(),
        tokens.percentage_saved()
    )
}

/// 记录单个 PR 完成
pub fn log_pr_complete(pr_number: u64, decision: &ReviewDecision, tokens: &TokenUsage) {
    info!("\n{}", "─".repeat(60));
    info!("✨ 评审完成");
    info!("{}", pr_summary_line(pr_number, decision, tokens));
    info!("{}", "─".repeat(60));
}

/// 输出按日期查到的 PR 列表和统计
pub fn log_listing(range: &DateRange, prs: &[PrSummary], counts: &ListingCounts) {
    for pr in prs {
        info!(
            "  #{}: {} (by {}, {})",
            pr.number,
            truncate_text(&pr.title, 50),
            pr.author,
            pr.created_at.format("%Y-%m-%d")
        );
    }
    info!("{}", "=".repeat(60));
    info!("📋 {} 共找到 {} 个 PR", range, counts.total);
    info!(
        "开放: {} | 已关闭: {} | 已合并: {}",
        counts.open, counts.closed, counts.merged
    );
    info!("{}", "=".repeat(60));
}

/// 截断过长的文本用于日志显示
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
