use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use pr_review_bot::error::ConfigError;
use pr_review_bot::models::DateRange;
use pr_review_bot::utils::logging;
use pr_review_bot::{parse_pr_reference, App, Config};

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const EXIT_PR_FAILURE: u8 = 1;
const EXIT_GLOBAL_FAILURE: u8 = 2;

#[derive(Parser)]
#[command(name = "pr-review-bot")]
#[command(about = "Automated reviewer for 30 Days of Solidity pull requests", long_about = None)]
struct Cli {
    /// PR 编号或 GitHub PR 链接，可以给多个
    #[arg(
        long = "pr",
        value_name = "PR",
        num_args = 1..,
        required_unless_present = "since",
        conflicts_with_all = ["since", "until"]
    )]
    prs: Vec<String>,

    /// 评审该时间之后创建的全部 PR（YYYY-MM-DD 或 RFC 3339，UTC）
    #[arg(long, value_name = "DATE")]
    since: Option<String>,

    /// 与 --since 一起使用，默认到当前时间
    #[arg(long, value_name = "DATE", requires = "since")]
    until: Option<String>,

    /// 只计算决策，不发布评审、标签或合并
    #[arg(long)]
    dry_run: bool,

    /// TOML 配置文件，未指定时读取 ./config.toml（不存在则使用默认值）
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// 显示 debug 日志
    #[arg(long)]
    verbose: bool,
}

/// 待评审的 PR 来源
enum PrSelection {
    Explicit(Vec<u64>),
    Created(DateRange),
}

impl Cli {
    fn selection(&self) -> Result<PrSelection, ConfigError> {
        match &self.since {
            Some(since) => DateRange::parse(since, self.until.as_deref(), chrono::Utc::now())
                .map(PrSelection::Created),
            None => self
                .prs
                .iter()
                .map(|p| parse_pr_reference(p))
                .collect::<Result<Vec<u64>, _>>()
                .map(PrSelection::Explicit),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // 加载配置（显式指定的文件必须存在）
    let config = match &cli.config {
        Some(path) => Config::load(path, true),
        None => Config::load(Path::new(DEFAULT_CONFIG_PATH), false),
    };

    // 初始化日志
    let verbose = cli.verbose || config.as_ref().is_ok_and(|c| c.verbose_logging);
    logging::init(verbose);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("❌ 配置错误: {}", e);
            return ExitCode::from(EXIT_GLOBAL_FAILURE);
        }
    };

    let selection = match cli.selection() {
        Ok(selection) => selection,
        Err(e) => {
            error!("❌ {}", e);
            return ExitCode::from(EXIT_GLOBAL_FAILURE);
        }
    };

    // 初始化应用
    let app = match App::initialize(config, cli.dry_run).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ 初始化失败: {}", e);
            return ExitCode::from(EXIT_GLOBAL_FAILURE);
        }
    };

    let pr_numbers = match selection {
        PrSelection::Explicit(numbers) => numbers,
        PrSelection::Created(range) => match app.prs_in_range(&range).await {
            Ok(numbers) => numbers,
            Err(e) => {
                error!("❌ 获取 PR 列表失败: {}", e);
                return ExitCode::from(EXIT_GLOBAL_FAILURE);
            }
        },
    };

    if pr_numbers.is_empty() {
        info!("没有需要评审的 PR");
        return ExitCode::SUCCESS;
    }

    // Ctrl-C → 当前 PR 完成后停止
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 收到 Ctrl-C，当前 PR 完成后停止");
            let _ = cancel_tx.send(true);
        }
    });

    let result = app.run(&pr_numbers, cancel_rx).await;

    if result.all_decided() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_PR_FAILURE)
    }
}
