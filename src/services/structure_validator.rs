//! 提交目录结构校验 - 业务能力层
//!
//! 规则：每个 `.sol` 文件都必须位于 `submissions/<子目录>/` 之下

use std::fmt;

const SUBMISSIONS_DIR: &str = "submissions";

/// 单个路径的问题
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StructureIssue {
    /// 不在 submissions/ 下
    OutsideSubmissions { path: String },
    /// 直接放在 submissions/ 下，没有子目录
    MissingSubfolder { path: String },
    /// 没有任何 Solidity 文件
    NoReviewableFiles,
}

impl fmt::Display for StructureIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructureIssue::OutsideSubmissions { path } => write!(
                f,
                "`{}` is not inside the `submissions/` folder. Please move it to `submissions/<your-name>/`.",
                path
            ),
            StructureIssue::MissingSubfolder { path } => write!(
                f,
                "`{}` is directly in `submissions/`. Please create a subfolder, e.g. `submissions/<your-name>/`.",
                path
            ),
            StructureIssue::NoReviewableFiles => {
                write!(f, "No Solidity (`.sol`) files were found in this PR, so there is nothing to review.")
            }
        }
    }
}

/// 校验结果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StructureReport {
    pub valid: bool,
    pub issues: Vec<StructureIssue>,
    /// 需要评审的 Solidity 文件，保持原顺序
    pub reviewable: Vec<String>,
}

/// 扩展名是否为 `.sol`（不区分大小写）
pub fn is_solidity(path: &str) -> bool {
    path.len() > 4
        && path
            .get(path.len() - 4..)
            .is_some_and(|ext| ext.eq_ignore_ascii_case(".sol"))
}

fn check_path(path: &str) -> Option<StructureIssue> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [root, _subfolder, _rest @ .., _file] if *root == SUBMISSIONS_DIR => None,
        [root, _file] if *root == SUBMISSIONS_DIR => Some(StructureIssue::MissingSubfolder {
            path: path.to_string(),
        }),
        _ => Some(StructureIssue::OutsideSubmissions {
            path: path.to_string(),
        }),
    }
}

/// 校验 PR 中全部改动路径
///
/// 非 `.sol` 文件（README、图片等）不参与校验
pub fn validate_structure(paths: &[&str]) -> StructureReport {
    let solidity: Vec<&str> = paths.iter().copied().filter(|p| is_solidity(p)).collect();

    if solidity.is_empty() {
        return StructureReport {
            valid: false,
            issues: vec![StructureIssue::NoReviewableFiles],
            reviewable: Vec::new(),
        };
    }

    let issues: Vec<StructureIssue> = solidity.iter().filter_map(|p| check_path(p)).collect();

    StructureReport {
        valid: issues.is_empty(),
        issues,
        reviewable: solidity.into_iter().map(str::to_string).collect(),
    }
}
