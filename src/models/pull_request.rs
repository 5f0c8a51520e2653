use crate::error::ConfigError;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// PR 中变更的单个文件
#[derive(Debug, Clone, PartialEq)]
pub struct ChangedFile {
    /// 仓库内的完整路径
    pub path: String,
    pub content: String,
}

impl ChangedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }

    /// 文件名（路径最后一段）
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// 从 GitHub 拉取的 PR 数据
#[derive(Debug, Clone, Default)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub description: String,
    pub author: String,
    /// open / closed
    pub state: String,
    pub merged: bool,
    pub created_at: DateTime<Utc>,
    pub head_ref: String,
    pub files: Vec<ChangedFile>,
}

impl PullRequest {
    pub fn file_paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }

    pub fn file_names(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.file_name()).collect()
    }

    /// 按路径查找文件
    pub fn file(&self, path: &str) -> Option<&ChangedFile> {
        self.files.iter().find(|f| f.path == path)
    }

    pub fn summary(&self) -> PrSummary {
        PrSummary {
            number: self.number,
            title: self.title.clone(),
            author: self.author.clone(),
            created_at: self.created_at,
            state: self.state.clone(),
            merged: self.merged,
        }
    }
}

/// PR 列表中的一项，不含文件
#[derive(Debug, Clone, PartialEq)]
pub struct PrSummary {
    pub number: u64,
    pub title: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub state: String,
    pub merged: bool,
}

/// 按创建时间筛选 PR 的闭区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl DateRange {
    pub fn new(since: DateTime<Utc>, until: DateTime<Utc>) -> Result<Self, ConfigError> {
        if since > until {
            return Err(ConfigError::invalid(
                "since/until",
                format!("起始时间 {} 晚于结束时间 {}", since, until),
            ));
        }
        Ok(Self { since, until })
    }

    /// 解析命令行给出的区间
    ///
    /// 纯日期的 `since` 取当天 00:00:00，`until` 取当天 23:59:59（UTC）。
    /// 没有 `until` 时截止到 `now`
    pub fn parse(since: &str, until: Option<&str>, now: DateTime<Utc>) -> Result<Self, ConfigError> {
        let since = parse_date_bound(since, false)?;
        let until = match until {
            Some(until) => parse_date_bound(until, true)?,
            None => now,
        };
        Self::new(since, until)
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since <= at && at <= self.until
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} 至 {}",
            self.since.format("%Y-%m-%d %H:%M:%S"),
            self.until.format("%Y-%m-%d %H:%M:%S")
        )
    }
}

fn parse_date_bound(input: &str, end_of_day: bool) -> Result<DateTime<Utc>, ConfigError> {
    let input = input.trim();
    let invalid = || ConfigError::InvalidDate {
        input: input.to_string(),
    };

    if let Ok(at) = DateTime::parse_from_rfc3339(input) {
        return Ok(at.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(input, "%Y-%m-%d").map_err(|_| invalid())?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc()).ok_or_else(invalid)
}

/// 只保留区间内的 PR，按创建时间升序（同一时刻按编号）
pub fn select_in_range(prs: impl IntoIterator<Item = PrSummary>, range: &DateRange) -> Vec<PrSummary> {
    let mut selected: Vec<PrSummary> = prs
        .into_iter()
        .filter(|pr| range.contains(pr.created_at))
        .collect();
    selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.number.cmp(&b.number)));
    selected
}

/// 列表统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingCounts {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    /// 已合并的 PR 同时计入 closed
    pub merged: usize,
}

impl ListingCounts {
    pub fn from_summaries(prs: &[PrSummary]) -> Self {
        let mut counts = Self {
            total: prs.len(),
            ..Self::default()
        };
        for pr in prs {
            match pr.state.as_str() {
                "open" => counts.open += 1,
                "closed" => counts.closed += 1,
                _ => {}
            }
            if pr.merged {
                counts.merged += 1;
            }
        }
        counts
    }
}

fn pull_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/pull/(\d+)").expect("pull url regex"))
}

/// 解析 PR 编号或 GitHub PR 链接
///
/// 支持 `123` 和 `https://github.com/owner/repo/pull/123`
pub fn parse_pr_reference(input: &str) -> Result<u64, ConfigError> {
    let input = input.trim();
    let invalid = || ConfigError::InvalidPrReference {
        input: input.to_string(),
    };

    if input.contains("github.com") || input.contains("pull/") {
        let caps = pull_url_regex().captures(input).ok_or_else(invalid)?;
        return caps[1].parse().map_err(|_| invalid());
    }

    input.trim_start_matches('#').parse().map_err(|_| invalid())
}
