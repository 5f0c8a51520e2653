//! LLM 推理客户端 - 基础设施层
//!
//! 只负责"把请求发给模型并拿回原始文本"，解析和重试由业务层负责
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 API 调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务（如 Gemini、Azure 等）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::clients::{ConceptCheckRequest, FileReviewRequest, InferenceProvider};
use crate::config::LlmConfig;
use crate::error::InferenceError;
use crate::models::DayContext;

const REVIEW_SYSTEM_MESSAGE: &str = "You are a friendly Solidity mentor reviewing beginner submissions \
for a 30-day learning challenge. Be encouraging, brief and concrete. Only list actual problems.";

const CONCEPT_SYSTEM_MESSAGE: &str = "You check whether a beginner's Solidity submission demonstrates \
the concepts taught on a given day of a learning challenge. Be generous but honest.";

/// 根据错误文本判断是否值得重试
///
/// 限流、5xx、超时和网络问题视为临时错误，其余（认证、请求非法）不重试
pub fn classify_error(message: &str) -> InferenceError {
    let lower = message.to_lowercase();
    let transient_markers = [
        "rate limit",
        "rate_limit",
        "429",
        "500",
        "502",
        "503",
        "504",
        "overloaded",
        "unavailable",
        "timed out",
        "timeout",
        "connection",
        "network",
        "error sending request",
    ];

    if transient_markers.iter().any(|marker| lower.contains(marker)) {
        InferenceError::Transient {
            message: message.to_string(),
        }
    } else {
        InferenceError::Fatal {
            message: message.to_string(),
        }
    }
}

fn day_heading(context: &DayContext) -> String {
    match context.day {
        Some(day) => format!("Day {}", day),
        None => "an unidentified day".to_string(),
    }
}

/// 单文件评审的用户消息
pub fn build_review_prompt(request: &FileReviewRequest) -> String {
    let context = &request.context;
    let mut expectations = String::new();
    if !context.contract_name.is_empty() {
        expectations.push_str(&format!("Expected contract: {}\n", context.contract_name));
    }
    if !context.concepts.is_empty() {
        expectations.push_str(&format!("Concepts taught: {}\n", context.concepts.join(", ")));
    }
    if !context.description.is_empty() {
        expectations.push_str(&format!("Example application: {}\n", context.description));
    }

    format!(
        r#"Review this single Solidity file for {day}:

File: {path}
{expectations}
```solidity
{code}
```

Quick quality check:

CRITICAL ISSUES (score below 5):
- Empty file or only comments
- Syntax errors (won't compile)
- Missing pragma statement
- No contract definition
- Random or nonsense code

MINOR ISSUES (score 5-6):
- Has pragma and contract but functions are empty
- Code compiles but doesn't do much
- Missing some basic elements

GOOD CODE (score 7 and above):
- Has pragma statement
- Has contract definition
- Has functions with implementation
- Code makes sense

Reply with a JSON object only:
{{"quality_score": <0-10>, "issues": ["<brief problem>", ...], "compiles": <true|false>}}"#,
        day = day_heading(context),
        path = request.path,
        expectations = expectations,
        code = request.content,
    )
}

/// 概念检查的用户消息
pub fn build_concept_prompt(request: &ConceptCheckRequest) -> String {
    let context = &request.context;
    format!(
        r#"Quick validation for a {day} beginner submission.

Expected concepts: {concepts}
Example application: {example}

File: {path}
```solidity
{code}
```

Check:
1. Is it related to the {day} topic?
2. Which of the expected concepts does it demonstrate? Name each one you find.
3. Does it show real effort?

Keep it brief. Format: concepts_found, relevance_score (1-10)."#,
        day = day_heading(context),
        concepts = context.concepts.join(", "),
        example = context.description,
        path = request.path,
        code = request.content,
    )
}

/// LLM 客户端
///
/// 职责：
/// - 调用 OpenAI 兼容的聊天接口
/// - 构建提示词
/// - 把错误分成可重试 / 不可重试
pub struct LlmClient {
    client: Client<OpenAIConfig>,
    model_name: String,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    /// 创建新的 LLM 客户端
    pub fn new(config: &LlmConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.api_base_url);

        Self {
            client: Client::with_config(openai_config),
            model_name: config.model_name.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// 通用的 LLM 调用函数
    ///
    /// # 参数
    /// - `user_message`: 用户消息内容
    /// - `system_message`: 系统消息（可选）
    ///
    /// # 返回
    /// 返回去掉首尾空白的响应内容
    pub async fn send_to_llm(
        &self,
        user_message: &str,
        system_message: Option<&str>,
    ) -> Result<String, InferenceError> {
        debug!("调用 LLM API，模型: {}", self.model_name);
        debug!("用户消息长度: {} 字符", user_message.len());

        let build_error = |e: async_openai::error::OpenAIError| InferenceError::Fatal {
            message: format!("构建请求失败: {}", e),
        };

        let mut messages = Vec::new();

        if let Some(sys_msg) = system_message {
            let system_msg = ChatCompletionRequestSystemMessageArgs::default()
                .content(sys_msg)
                .build()
                .map_err(build_error)?;
            messages.push(ChatCompletionRequestMessage::System(system_msg));
        }

        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(build_error)?;
        messages.push(ChatCompletionRequestMessage::User(user_msg));

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages(messages)
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(build_error)?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("LLM API 调用失败: {}", e);
            classify_error(&e.to_string())
        })?;

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| InferenceError::Transient {
                message: "LLM 返回内容为空".to_string(),
            })?;

        Ok(content.trim().to_string())
    }
}

#[async_trait]
impl InferenceProvider for LlmClient {
    async fn review_file(&self, request: &FileReviewRequest) -> Result<String, InferenceError> {
        let prompt = build_review_prompt(request);
        self.send_to_llm(&prompt, Some(REVIEW_SYSTEM_MESSAGE)).await
    }

    async fn validate_concepts(
        &self,
        request: &ConceptCheckRequest,
    ) -> Result<String, InferenceError> {
        let prompt = build_concept_prompt(request);
        self.send_to_llm(&prompt, Some(CONCEPT_SYSTEM_MESSAGE)).await
    }
}
