//! Token 优化 - 业务能力层
//!
//! 发送给 LLM 之前去掉注释和空白，纯函数，无状态

use crate::models::TokenUsage;
use regex::Regex;
use std::sync::OnceLock;

fn block_comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)/\*.*?\*/").expect("block comment regex"))
}

fn line_comment_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // 同时覆盖 SPDX 行和 NatSpec `///`
    RE.get_or_init(|| Regex::new(r"(?m)//.*$").expect("line comment regex"))
}

/// 去掉注释、空行和行首尾空白
pub fn optimize(code: &str) -> String {
    let without_blocks = block_comment_regex().replace_all(code, "");
    let without_lines = line_comment_regex().replace_all(&without_blocks, "");

    without_lines
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 粗略估算：约 4 个字符一个 token
pub fn estimate_tokens(code: &str) -> usize {
    code.chars().count() / 4
}

/// 压缩代码并返回 (压缩结果, token 统计)
pub fn optimize_with_usage(code: &str) -> (String, TokenUsage) {
    let optimized = optimize(code);
    let usage = TokenUsage {
        original: estimate_tokens(code),
        optimized: estimate_tokens(&optimized),
    };
    (optimized, usage)
}
