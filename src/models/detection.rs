use std::fmt;

/// 挑战天数的检测方式
///
/// 置信度相同时按 `priority` 从大到小取胜：
/// 精确合约名 > 标题 > 目录 > 文件名 > 模糊匹配
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionMethod {
    PrTitle,
    FolderPath,
    ContractNameExact,
    FilenamePattern,
    ContractNameFuzzy,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 5] = [
        DetectionMethod::PrTitle,
        DetectionMethod::FolderPath,
        DetectionMethod::ContractNameExact,
        DetectionMethod::FilenamePattern,
        DetectionMethod::ContractNameFuzzy,
    ];

    /// 平局时的优先级，越大越优先
    pub fn priority(self) -> u8 {
        match self {
            DetectionMethod::ContractNameExact => 5,
            DetectionMethod::PrTitle => 4,
            DetectionMethod::FolderPath => 3,
            DetectionMethod::FilenamePattern => 2,
            DetectionMethod::ContractNameFuzzy => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DetectionMethod::PrTitle => "pr_title",
            DetectionMethod::FolderPath => "folder_path",
            DetectionMethod::ContractNameExact => "contract_name_exact",
            DetectionMethod::FilenamePattern => "filename_pattern",
            DetectionMethod::ContractNameFuzzy => "contract_name_fuzzy",
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个检测器给出的猜测
#[derive(Debug, Clone, PartialEq)]
pub struct DetectionSignal {
    pub method: DetectionMethod,
    pub day: u32,
    /// [0, 1]
    pub confidence: f64,
    /// 命中的原始文本，便于日志排查
    pub evidence: String,
}

impl DetectionSignal {
    pub fn new(method: DetectionMethod, day: u32, confidence: f64, evidence: impl Into<String>) -> Self {
        Self {
            method,
            day,
            confidence: confidence.clamp(0.0, 1.0),
            evidence: evidence.into(),
        }
    }
}

/// 最终确定的挑战天数
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedDay {
    Resolved {
        day: u32,
        confidence: f64,
        method: DetectionMethod,
    },
    Unresolved,
}

impl ResolvedDay {
    pub fn day(&self) -> Option<u32> {
        match self {
            ResolvedDay::Resolved { day, .. } => Some(*day),
            ResolvedDay::Unresolved => None,
        }
    }

    /// `day-N` 标签
    pub fn label(&self) -> Option<String> {
        self.day().map(|day| format!("day-{}", day))
    }
}

impl fmt::Display for ResolvedDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedDay::Resolved {
                day,
                confidence,
                method,
            } => write!(f, "Day {} ({}, 置信度 {:.0}%)", day, method, confidence * 100.0),
            ResolvedDay::Unresolved => write!(f, "未识别"),
        }
    }
}
