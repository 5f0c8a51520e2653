//! PR 处理上下文
//!
//! 封装"我正在处理批次中的第几个 PR"这一信息

use std::fmt::Display;

/// PR 处理上下文
#[derive(Debug, Clone)]
pub struct PrCtx {
    /// PR 编号
    pub pr_number: u64,

    /// 在批次中的位置（从1开始，仅用于日志显示）
    pub position: usize,

    /// 批次中的 PR 总数
    pub total: usize,
}

impl PrCtx {
    /// 创建新的 PR 上下文
    pub fn new(pr_number: u64, position: usize, total: usize) -> Self {
        Self {
            pr_number,
            position,
            total,
        }
    }

    /// 是否为批次中的最后一个
    pub fn is_last(&self) -> bool {
        self.position >= self.total
    }
}

impl Display for PrCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[PR #{}]", self.pr_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_position() {
        let ctx = PrCtx::new(42, 2, 3);
        assert_eq!(ctx.to_string(), "[PR #42]");
        assert!(!ctx.is_last());
        assert!(PrCtx::new(7, 3, 3).is_last());
    }
}
