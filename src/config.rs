//! 程序配置
//!
//! 加载顺序：默认值 → TOML 配置文件 → 环境变量（仅凭证和路径）

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// 程序配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 挑战目录文件（challenges.json）
    pub challenges_path: String,
    /// 运行日志文件，None 表示不写文件
    pub output_log_file: Option<String>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    pub thresholds: Thresholds,
    pub delays: DelayConfig,
    pub retry: RetryPolicy,
    pub timeouts: TimeoutConfig,
    pub llm: LlmConfig,
    pub github: GithubConfig,
}

/// 决策阈值
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Thresholds {
    /// 平均分 >= 该值才可能通过
    pub approve_score: f64,
    /// 平均分 < 该值直接拒绝
    pub reject_score: f64,
    /// 概念覆盖率阈值
    pub coverage: f64,
    /// LLM 响应无法解析时的兜底分数
    pub fallback_score: f64,
    /// 模糊匹配的最低相似度
    pub fuzzy_floor: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            approve_score: 7.0,
            reject_score: 5.0,
            coverage: 0.5,
            fallback_score: 5.0,
            fuzzy_floor: 0.70,
        }
    }
}

/// 限流延迟（秒）
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct DelayConfig {
    pub between_prs: u64,
    pub between_files: u64,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            between_prs: 15,
            between_files: 5,
        }
    }
}

impl DelayConfig {
    /// 不等待，测试用
    pub fn none() -> Self {
        Self {
            between_prs: 0,
            between_files: 0,
        }
    }

    pub fn pr_delay(&self) -> Duration {
        Duration::from_secs(self.between_prs)
    }

    pub fn file_delay(&self) -> Duration {
        Duration::from_secs(self.between_files)
    }
}

/// 有界重试 + 指数退避
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetryPolicy {
    /// 最多尝试次数（含首次）
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 2_000,
            multiplier: 2.0,
            max_backoff_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// 不等待的重试策略，测试用
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff_ms: 0,
            multiplier: 1.0,
            max_backoff_ms: 0,
        }
    }

    /// 第 `attempt` 次失败后（从 1 开始）应等待的时间
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.initial_backoff_ms as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_backoff_ms as f64).max(0.0);
        Duration::from_millis(capped as u64)
    }
}

/// 超时配置（秒）
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// 单次 LLM 调用
    pub inference_call: u64,
    /// 单次 GitHub 请求
    pub github_request: u64,
    /// 单个 PR 的完整流程
    pub per_pr: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            inference_call: 60,
            github_request: 30,
            per_pr: 600,
        }
    }
}

/// LLM 配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub api_key: String,
    pub api_base_url: String,
    pub model_name: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// 是否额外调用 LLM 检查概念覆盖
    pub concept_check: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base_url: "https://generativelanguage.googleapis.com/v1beta/openai".to_string(),
            model_name: "gemini-2.0-flash".to_string(),
            temperature: 0.3,
            max_tokens: 1024,
            concept_check: true,
        }
    }
}

/// GitHub 配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub token: String,
    /// owner/name
    pub repo: String,
    pub api_base_url: String,
    pub merge_method: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            repo: String::new(),
            api_base_url: "https://api.github.com".to_string(),
            merge_method: "squash".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            challenges_path: "challenges.json".to_string(),
            output_log_file: None,
            verbose_logging: false,
            thresholds: Thresholds::default(),
            delays: DelayConfig::default(),
            retry: RetryPolicy::default(),
            timeouts: TimeoutConfig::default(),
            llm: LlmConfig::default(),
            github: GithubConfig::default(),
        }
    }
}

impl Config {
    /// 默认值 + 环境变量
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// 从 TOML 文件加载（不含环境变量）
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadFailed {
                path: path.display().to_string(),
                source,
            })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// 解析 TOML 内容
    pub fn from_toml_str(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: origin.to_string(),
            source,
        })
    }

    /// 加载配置
    ///
    /// `required` 为 false 时，文件不存在则使用默认值
    pub fn load(path: &Path, required: bool) -> Result<Self, ConfigError> {
        let mut config = if path.exists() || required {
            Self::from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// 用环境变量覆盖凭证和路径
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("GITHUB_TOKEN") {
            self.github.token = v;
        }
        if let Ok(v) = std::env::var("GITHUB_REPO") {
            self.github.repo = v;
        }
        if let Some(v) = std::env::var("LLM_API_KEY")
            .ok()
            .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
        {
            self.llm.api_key = v;
        }
        if let Ok(v) = std::env::var("LLM_API_BASE_URL") {
            self.llm.api_base_url = v;
        }
        if let Ok(v) = std::env::var("LLM_MODEL_NAME") {
            self.llm.model_name = v;
        }
        if let Ok(v) = std::env::var("CHALLENGES_PATH") {
            self.challenges_path = v;
        }
        self.verbose_logging = std::env::var("VERBOSE_LOGGING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.verbose_logging);
    }

    /// 检查凭证和阈值，在处理任何 PR 之前调用
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.github.token.trim().is_empty() {
            return Err(ConfigError::missing("GITHUB_TOKEN"));
        }
        if self.github.repo.trim().is_empty() {
            return Err(ConfigError::missing("GITHUB_REPO"));
        }
        let parts: Vec<&str> = self.github.repo.split('/').collect();
        if parts.len() != 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::invalid(
                "github.repo",
                format!("'{}' 不是 owner/name 格式", self.github.repo),
            ));
        }
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::missing("LLM_API_KEY"));
        }
        self.thresholds.validate()?;
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::invalid("retry.max_attempts", "至少为 1"));
        }
        Ok(())
    }
}

impl Thresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let in_score_range = |v: f64| (0.0..=10.0).contains(&v);
        if !in_score_range(self.approve_score) || !in_score_range(self.reject_score) {
            return Err(ConfigError::invalid("thresholds", "分数阈值必须在 [0, 10] 之间"));
        }
        if self.reject_score > self.approve_score {
            return Err(ConfigError::invalid(
                "thresholds",
                "reject_score 不能大于 approve_score",
            ));
        }
        if !(0.0..=1.0).contains(&self.coverage) {
            return Err(ConfigError::invalid("thresholds.coverage", "必须在 [0, 1] 之间"));
        }
        if !in_score_range(self.fallback_score) {
            return Err(ConfigError::invalid(
                "thresholds.fallback_score",
                "必须在 [0, 10] 之间",
            ));
        }
        if !(self.fuzzy_floor > 0.0 && self.fuzzy_floor < 1.0) {
            return Err(ConfigError::invalid("thresholds.fuzzy_floor", "必须在 (0, 1) 之间"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        let mut config = Config::default();
        config.github.token = "ghp_test".to_string();
        config.github.repo = "owner/30-days-of-solidity".to_string();
        config.llm.api_key = "key".to_string();
        config
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            challenges_path = "data/challenges.json"

            [thresholds]
            approve_score = 8.0

            [delays]
            between_files = 0
            "#,
            "inline",
        )
        .unwrap();

        assert_eq!(config.challenges_path, "data/challenges.json");
        assert_eq!(config.thresholds.approve_score, 8.0);
        assert_eq!(config.thresholds.reject_score, 5.0);
        assert_eq!(config.delays.between_files, 0);
        assert_eq!(config.delays.between_prs, 15);
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = Config::from_toml_str("thresholds = 3", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseFailed { .. }));
    }

    #[test]
    fn test_validate_requires_credentials() {
        let mut config = valid_config();
        assert!(config.validate().is_ok());

        config.github.token.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredential { .. })
        ));
    }

    #[test]
    fn test_validate_repo_format() {
        let mut config = valid_config();
        config.github.repo = "just-a-name".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_validate_threshold_order() {
        let mut config = valid_config();
        config.thresholds.reject_score = 8.0;
        config.thresholds.approve_score = 7.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 1_000,
            multiplier: 2.0,
            max_backoff_ms: 3_000,
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_for(3), Duration::from_millis(3_000));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(3_000));
        assert_eq!(RetryPolicy::immediate(3).backoff_for(2), Duration::ZERO);
    }
}
