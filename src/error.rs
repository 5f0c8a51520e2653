//! 错误类型定义
//!
//! 按照处理策略划分错误：
//! - `ConfigError`：启动前检测，直接终止程序
//! - `HostError`：GitHub 调用失败，记为单个 PR 的失败，批处理继续
//! - `InferenceError`：LLM 调用失败，由单文件评审器负责重试和降级
//! - `DecisionError`：决策引擎收到非法输入，属于程序缺陷

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// GitHub 调用错误
    #[error("GitHub错误: {0}")]
    Host(#[from] HostError),
    /// LLM 服务错误
    #[error("LLM错误: {0}")]
    Inference(#[from] InferenceError),
    /// 决策引擎错误
    #[error("决策错误: {0}")]
    Decision(#[from] DecisionError),
}

/// 配置错误（致命，处理任何 PR 之前报告）
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 缺少凭证
    #[error("缺少必需的凭证: {var_name}")]
    MissingCredential { var_name: String },

    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    FileReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML 解析失败
    #[error("TOML解析失败 ({path}): {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    /// 挑战目录解析失败
    #[error("挑战目录解析失败 ({path}): {source}")]
    CatalogParseFailed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// 挑战目录为空
    #[error("挑战目录为空: {path}")]
    EmptyCatalog { path: String },

    /// 配置项取值非法
    #[error("配置项 {field} 非法: {reason}")]
    InvalidValue { field: String, reason: String },

    /// 无法识别的 PR 编号或链接
    #[error("无法从 '{input}' 中提取 PR 编号")]
    InvalidPrReference { input: String },

    /// 无法识别的日期
    #[error("无法解析日期 '{input}'，应为 YYYY-MM-DD 或 RFC 3339")]
    InvalidDate { input: String },
}

/// GitHub 调用错误
#[derive(Debug, Error)]
pub enum HostError {
    /// 网络请求失败
    #[error("请求失败 ({endpoint}): {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// API 返回错误响应
    #[error("API返回错误响应 ({endpoint}): status={status}, message={message}")]
    BadResponse {
        endpoint: String,
        status: u16,
        message: String,
    },

    /// 响应解析失败
    #[error("响应解析失败 ({endpoint}): {source}")]
    ResponseParseFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// PR 处理超时
    #[error("PR #{pr_number} 处理超时 ({seconds}秒)")]
    Timeout { pr_number: u64, seconds: u64 },
}

/// LLM 服务错误
#[derive(Debug, Clone, Error)]
pub enum InferenceError {
    /// 可重试的临时错误（限流、网络、服务端 5xx）
    #[error("临时错误: {message}")]
    Transient { message: String },

    /// 单次调用超时，按临时错误处理
    #[error("调用超时 ({seconds}秒)")]
    Timeout { seconds: u64 },

    /// 不可重试的错误（认证失败、请求非法等）
    #[error("不可重试的错误: {message}")]
    Fatal { message: String },
}

impl InferenceError {
    /// 是否值得重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            InferenceError::Transient { .. } | InferenceError::Timeout { .. }
        )
    }
}

/// 决策引擎错误
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecisionError {
    /// 分数超出 [0, 10]
    #[error("文件 {path} 的分数 {score} 超出范围 [0, 10]")]
    ScoreOutOfRange { path: String, score: f64 },

    /// 当前状态不允许该转换
    #[error("状态 {state} 不接受事件 {event}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },

    /// 没有任何评审结果
    #[error("没有可用于决策的文件评审结果")]
    NoReviews,
}

// ========== 便捷构造函数 ==========

impl ConfigError {
    /// 创建缺少凭证错误
    pub fn missing(var_name: impl Into<String>) -> Self {
        ConfigError::MissingCredential {
            var_name: var_name.into(),
        }
    }

    /// 创建非法取值错误
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl HostError {
    /// 创建请求失败错误
    pub fn request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        HostError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(InferenceError::Transient {
            message: "429".to_string()
        }
        .is_transient());
        assert!(InferenceError::Timeout { seconds: 60 }.is_transient());
        assert!(!InferenceError::Fatal {
            message: "401".to_string()
        }
        .is_transient());
    }

    #[test]
    fn test_app_error_wraps_config_error() {
        let err: AppError = ConfigError::missing("GITHUB_TOKEN").into();
        assert!(err.to_string().contains("GITHUB_TOKEN"));
    }
}
