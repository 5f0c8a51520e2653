//! 挑战天数检测 - 业务能力层
//!
//! 五个相互独立的检测器，各自给出 `Option<DetectionSignal>`：
//!
//! | 检测器 | 依据 | 置信度 |
//! |---|---|---|
//! | `detect_from_title` | PR 标题/描述中的 "day N" / "challenge N" | 0.95 |
//! | `detect_from_folder` | 目录名 `day-N/`、`dayN/`、`N/` | 0.90 |
//! | `detect_exact_name` | 文件名与目录中的合约名完全一致 | 0.95 |
//! | `detect_from_filename` | `dayN.sol`、`N-xxx.sol` | 0.70 |
//! | `detect_fuzzy_name` | 与合约名的相似度 | 0.60 ~ 0.85 |
//!
//! 检测器遇到异常输入只会弃权，不会报错。
//! `resolve_day` 按 (置信度, 方法优先级) 的全序取最大值。

use crate::models::challenge::strip_sol;
use crate::models::{ChallengeCatalog, DetectionMethod, DetectionSignal, PullRequest, ResolvedDay};
use crate::services::structure_validator::is_solidity;
use regex::Regex;
use std::cmp::Ordering;
use std::sync::{Arc, OnceLock};
use tracing::debug;

pub const TITLE_CONFIDENCE: f64 = 0.95;
pub const FOLDER_CONFIDENCE: f64 = 0.90;
pub const EXACT_NAME_CONFIDENCE: f64 = 0.95;
pub const FILENAME_CONFIDENCE: f64 = 0.70;
pub const FUZZY_MIN_CONFIDENCE: f64 = 0.60;
pub const FUZZY_MAX_CONFIDENCE: f64 = 0.85;

/// 文件名包含合约名时视为的相似度
const CONTAINS_EXPECTED_SIMILARITY: f64 = 0.92;
/// 合约名包含文件名时视为的相似度
const CONTAINED_IN_EXPECTED_SIMILARITY: f64 = 0.88;
/// 被包含的一方至少这么多字符，包含关系才算数
const MIN_CONTAINMENT_CHARS: usize = 4;

fn title_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:day|challenge)[\s\-_#]?(\d{1,2})\b").expect("title regex")
    })
}

fn folder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:(?:day|challenge)[\-_ ]?(\d{1,2})(?:[\-_ ].*)?|(\d{1,2}))$")
            .expect("folder regex")
    })
}

fn filename_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(?:.*(?:day|challenge)[\-_]?(\d{1,2})\.sol|(\d{1,2})[\-_].*\.sol)$")
            .expect("filename regex")
    })
}

/// 取第一个非空捕获组并解析为天数
fn captured_day(caps: &regex::Captures<'_>) -> Option<u32> {
    caps.iter()
        .skip(1)
        .flatten()
        .next()
        .and_then(|m| m.as_str().parse().ok())
}

/// 检测器 1：PR 标题和描述
pub fn detect_from_title(
    title: &str,
    description: &str,
    catalog: &ChallengeCatalog,
) -> Option<DetectionSignal> {
    let text = format!("{} {}", title, description);
    title_regex().captures_iter(&text).find_map(|caps| {
        let day = captured_day(&caps)?;
        catalog.contains(day).then(|| {
            DetectionSignal::new(DetectionMethod::PrTitle, day, TITLE_CONFIDENCE, &caps[0])
        })
    })
}

/// 检测器 2：目录名
pub fn detect_from_folder(paths: &[&str], catalog: &ChallengeCatalog) -> Option<DetectionSignal> {
    paths.iter().find_map(|path| {
        let segments: Vec<&str> = path.split('/').collect();
        let dirs = &segments[..segments.len().saturating_sub(1)];
        dirs.iter().find_map(|segment| {
            let caps = folder_regex().captures(segment)?;
            let day = captured_day(&caps)?;
            catalog.contains(day).then(|| {
                DetectionSignal::new(DetectionMethod::FolderPath, day, FOLDER_CONFIDENCE, *path)
            })
        })
    })
}

/// 检测器 3：合约名精确匹配
pub fn detect_exact_name(file_names: &[&str], catalog: &ChallengeCatalog) -> Option<DetectionSignal> {
    file_names
        .iter()
        .filter(|name| is_solidity(name))
        .find_map(|name| {
            let stem = strip_sol(name);
            if stem.is_empty() {
                return None;
            }
            catalog
                .iter()
                .find(|challenge| challenge.contract_stem().eq_ignore_ascii_case(stem))
                .map(|challenge| {
                    DetectionSignal::new(
                        DetectionMethod::ContractNameExact,
                        challenge.day,
                        EXACT_NAME_CONFIDENCE,
                        *name,
                    )
                })
        })
}

/// 检测器 4：文件名中的数字
pub fn detect_from_filename(
    file_names: &[&str],
    catalog: &ChallengeCatalog,
) -> Option<DetectionSignal> {
    file_names.iter().find_map(|name| {
        let caps = filename_regex().captures(name)?;
        let day = captured_day(&caps)?;
        catalog.contains(day).then(|| {
            DetectionSignal::new(DetectionMethod::FilenamePattern, day, FILENAME_CONFIDENCE, *name)
        })
    })
}

/// 检测器 5：合约名模糊匹配
///
/// 相似度低于 `floor` 时弃权；否则置信度在 [0.60, 0.85] 之间线性缩放
pub fn detect_fuzzy_name(
    file_names: &[&str],
    catalog: &ChallengeCatalog,
    floor: f64,
) -> Option<DetectionSignal> {
    let mut best: Option<(f64, u32, &str)> = None;

    for name in file_names.iter().filter(|name| is_solidity(name)) {
        let stem = strip_sol(name).to_lowercase();
        if stem.is_empty() {
            continue;
        }

        for challenge in catalog.iter() {
            let expected = challenge.contract_stem().to_lowercase();
            if expected.is_empty() {
                continue;
            }

            let long_enough = |part: &str| part.chars().count() >= MIN_CONTAINMENT_CHARS;
            let mut similarity = similarity_ratio(&stem, &expected);
            if long_enough(&expected) && stem.contains(&expected) {
                similarity = similarity.max(CONTAINS_EXPECTED_SIMILARITY);
            }
            if long_enough(&stem) && expected.contains(&stem) {
                similarity = similarity.max(CONTAINED_IN_EXPECTED_SIMILARITY);
            }

            // 严格大于：相同相似度时保留更早的文件和更小的天数
            if best.map_or(true, |(s, _, _)| similarity > s) {
                best = Some((similarity, challenge.day, *name));
            }
        }
    }

    let (similarity, day, name) = best?;
    if similarity < floor {
        return None;
    }

    let span = (1.0 - floor).max(f64::EPSILON);
    let scaled = (similarity - floor) / span;
    let confidence = FUZZY_MIN_CONFIDENCE + scaled * (FUZZY_MAX_CONFIDENCE - FUZZY_MIN_CONFIDENCE);

    Some(DetectionSignal::new(
        DetectionMethod::ContractNameFuzzy,
        day,
        confidence.min(FUZZY_MAX_CONFIDENCE),
        format!("{} (相似度 {:.2})", name, similarity),
    ))
}

/// 归一化编辑距离相似度，范围 [0, 1]
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    strsim::normalized_levenshtein(a, b)
}

/// 信号之间的全序：置信度优先，其次方法优先级，最后天数小者优先
fn signal_order(a: &DetectionSignal, b: &DetectionSignal) -> Ordering {
    a.confidence
        .total_cmp(&b.confidence)
        .then(a.method.priority().cmp(&b.method.priority()))
        .then(b.day.cmp(&a.day))
}

/// 合并所有信号，得到唯一的天数
///
/// 不在目录中的天数会被忽略；全部弃权时返回 `Unresolved`
pub fn resolve_day(signals: &[DetectionSignal], catalog: &ChallengeCatalog) -> ResolvedDay {
    signals
        .iter()
        .filter(|s| catalog.contains(s.day) && s.confidence.is_finite())
        .max_by(|a, b| signal_order(a, b))
        .map_or(ResolvedDay::Unresolved, |s| ResolvedDay::Resolved {
            day: s.day,
            confidence: s.confidence,
            method: s.method,
        })
}

/// 天数检测服务
///
/// 职责：
/// - 对单个 PR 运行全部检测器
/// - 合并信号
/// - 不调用任何外部服务
pub struct DayDetector {
    catalog: Arc<ChallengeCatalog>,
    fuzzy_floor: f64,
}

impl DayDetector {
    pub fn new(catalog: Arc<ChallengeCatalog>, fuzzy_floor: f64) -> Self {
        Self {
            catalog,
            fuzzy_floor,
        }
    }

    /// 运行全部检测器，返回所有非弃权的信号
    pub fn extract_signals(&self, pr: &PullRequest) -> Vec<DetectionSignal> {
        let paths = pr.file_paths();
        let names = pr.file_names();
        let catalog = self.catalog.as_ref();

        [
            detect_from_title(&pr.title, &pr.description, catalog),
            detect_from_folder(&paths, catalog),
            detect_exact_name(&names, catalog),
            detect_from_filename(&names, catalog),
            detect_fuzzy_name(&names, catalog, self.fuzzy_floor),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// 检测 PR 对应的天数
    pub fn detect(&self, pr: &PullRequest) -> ResolvedDay {
        let signals = self.extract_signals(pr);
        for signal in &signals {
            debug!(
                "[PR #{}] 检测信号: {} → Day {} ({:.2}) 依据: {}",
                pr.number, signal.method, signal.day, signal.confidence, signal.evidence
            );
        }
        resolve_day(&signals, &self.catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangedFile, Challenge};

    fn catalog() -> ChallengeCatalog {
        ChallengeCatalog::new(
            [
                (1, "ClickCounter.sol"),
                (2, "SaveMyName.sol"),
                (3, "PollStation.sol"),
                (12, "SimpleERC20.sol"),
            ]
            .into_iter()
            .map(|(day, name)| Challenge {
                day,
                contract_name: name.to_string(),
                concepts_taught: Vec::new(),
                example_application: String::new(),
            }),
        )
    }

    fn signal(method: DetectionMethod, day: u32, confidence: f64) -> DetectionSignal {
        DetectionSignal::new(method, day, confidence, "test")
    }

    #[test]
    fn test_title_detection() {
        let catalog = catalog();
        let s = detect_from_title("Day 3 submission", "", &catalog).unwrap();
        assert_eq!(s.day, 3);
        assert_eq!(s.confidence, TITLE_CONFIDENCE);

        let s = detect_from_title("my work", "this is challenge-12", &catalog).unwrap();
        assert_eq!(s.day, 12);

        assert!(detect_from_title("Day 29", "", &catalog).is_none());
        assert!(detect_from_title("today was fun", "", &catalog).is_none());
        assert!(detect_from_title("", "", &catalog).is_none());
    }

    #[test]
    fn test_folder_detection() {
        let catalog = catalog();
        let s = detect_from_folder(&["submissions/alice/day-2/Name.sol"], &catalog).unwrap();
        assert_eq!(s.day, 2);
        assert_eq!(s.confidence, FOLDER_CONFIDENCE);

        let s = detect_from_folder(&["submissions/bob/12/Token.sol"], &catalog).unwrap();
        assert_eq!(s.day, 12);

        // 文件名本身不算目录
        assert!(detect_from_folder(&["submissions/alice/day1"], &catalog).is_none());
        assert!(detect_from_folder(&["submissions/alice/Token.sol"], &catalog).is_none());
    }

    #[test]
    fn test_exact_name_detection() {
        let catalog = catalog();
        let s = detect_exact_name(&["clickcounter.sol"], &catalog).unwrap();
        assert_eq!(s.day, 1);
        assert_eq!(s.confidence, EXACT_NAME_CONFIDENCE);
        assert!(detect_exact_name(&["ClickCounter.txt"], &catalog).is_none());
    }

    #[test]
    fn test_filename_detection() {
        let catalog = catalog();
        assert_eq!(detect_from_filename(&["day2.sol"], &catalog).unwrap().day, 2);
        assert_eq!(detect_from_filename(&["3-poll.sol"], &catalog).unwrap().day, 3);
        assert_eq!(
            detect_from_filename(&["Challenge_12.sol"], &catalog).unwrap().confidence,
            FILENAME_CONFIDENCE
        );
        assert!(detect_from_filename(&["Token.sol"], &catalog).is_none());
    }

    #[test]
    fn test_fuzzy_detection_scales_confidence() {
        let catalog = catalog();

        let s = detect_fuzzy_name(&["ClickCounterV2.sol"], &catalog, 0.7).unwrap();
        assert_eq!(s.day, 1);
        assert!(s.confidence >= FUZZY_MIN_CONFIDENCE && s.confidence <= FUZZY_MAX_CONFIDENCE);

        let s = detect_fuzzy_name(&["ClickCounter.sol"], &catalog, 0.7).unwrap();
        assert!((s.confidence - FUZZY_MAX_CONFIDENCE).abs() < 1e-9);

        assert!(detect_fuzzy_name(&["Xyz.sol"], &catalog, 0.7).is_none());
    }

    #[test]
    fn test_short_stem_does_not_count_as_containment() {
        let catalog = catalog();

        assert!(detect_fuzzy_name(&["C.sol"], &catalog, 0.7).is_none());
        assert!(detect_fuzzy_name(&["Poll.sol"], &catalog, 0.7).is_some());

        let s = detect_fuzzy_name(&["Save.sol"], &catalog, 0.7).unwrap();
        assert_eq!(s.day, 2);
        assert!(s.evidence.contains("0.88"));
    }

    #[test]
    fn test_similarity_ratio() {
        assert_eq!(similarity_ratio("abc", "abc"), 1.0);
        assert_eq!(similarity_ratio("", ""), 1.0);
        assert_eq!(similarity_ratio("abc", ""), 0.0);
        assert!((similarity_ratio("kitten", "sitting") - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn test_resolve_picks_highest_confidence() {
        let catalog = catalog();
        let signals = vec![
            signal(DetectionMethod::FilenamePattern, 2, 0.70),
            signal(DetectionMethod::FolderPath, 3, 0.90),
            signal(DetectionMethod::ContractNameFuzzy, 1, 0.80),
        ];
        assert_eq!(resolve_day(&signals, &catalog).day(), Some(3));
    }

    #[test]
    fn test_resolve_unresolved_when_all_abstain() {
        assert_eq!(resolve_day(&[], &catalog()), ResolvedDay::Unresolved);
    }

    #[test]
    fn test_resolve_ignores_days_outside_catalog() {
        let signals = vec![
            signal(DetectionMethod::PrTitle, 29, 0.95),
            signal(DetectionMethod::FilenamePattern, 2, 0.70),
        ];
        assert_eq!(resolve_day(&signals, &catalog()).day(), Some(2));

        let only_unknown = vec![signal(DetectionMethod::PrTitle, 29, 0.95)];
        assert_eq!(resolve_day(&only_unknown, &catalog()), ResolvedDay::Unresolved);
    }

    #[test]
    fn test_tie_break_table_is_total() {
        let catalog = catalog();
        let days = [1, 2, 3, 12, 1];
        for (i, a) in DetectionMethod::ALL.iter().enumerate() {
            for (j, b) in DetectionMethod::ALL.iter().enumerate() {
                if i == j {
                    continue;
                }
                let signals = vec![signal(*a, days[i], 0.9), signal(*b, days[j], 0.9)];
                let expected = if a.priority() > b.priority() { *a } else { *b };
                match resolve_day(&signals, &catalog) {
                    ResolvedDay::Resolved { method, .. } => assert_eq!(method, expected),
                    ResolvedDay::Unresolved => panic!("平局也必须有结果"),
                }
            }
        }
    }

    #[test]
    fn test_exact_name_beats_title_on_tie() {
        let signals = vec![
            signal(DetectionMethod::PrTitle, 2, 0.95),
            signal(DetectionMethod::ContractNameExact, 1, 0.95),
        ];
        assert_eq!(resolve_day(&signals, &catalog()).day(), Some(1));
    }

    #[test]
    fn test_resolve_is_order_independent() {
        let catalog = catalog();
        let signals = vec![
            signal(DetectionMethod::PrTitle, 2, 0.95),
            signal(DetectionMethod::FolderPath, 3, 0.90),
            signal(DetectionMethod::ContractNameExact, 1, 0.95),
            signal(DetectionMethod::FilenamePattern, 12, 0.70),
        ];
        let expected = resolve_day(&signals, &catalog);
        let mut reversed = signals.clone();
        reversed.reverse();
        assert_eq!(resolve_day(&reversed, &catalog), expected);
        let mut rotated = signals.clone();
        rotated.rotate_left(2);
        assert_eq!(resolve_day(&rotated, &catalog), expected);
    }

    #[test]
    fn test_detector_runs_all_heuristics() {
        let detector = DayDetector::new(Arc::new(catalog()), 0.7);
        let pr = PullRequest {
            number: 7,
            title: "Submission".to_string(),
            files: vec![ChangedFile::new(
                "submissions/alice/day-2/SaveMyName.sol",
                "contract SaveMyName {}",
            )],
            ..Default::default()
        };

        let methods: Vec<DetectionMethod> =
            detector.extract_signals(&pr).iter().map(|s| s.method).collect();
        assert!(methods.contains(&DetectionMethod::FolderPath));
        assert!(methods.contains(&DetectionMethod::ContractNameExact));
        assert!(methods.contains(&DetectionMethod::ContractNameFuzzy));
        assert!(!methods.contains(&DetectionMethod::PrTitle));

        assert_eq!(
            detector.detect(&pr),
            ResolvedDay::Resolved {
                day: 2,
                confidence: EXACT_NAME_CONFIDENCE,
                method: DetectionMethod::ContractNameExact,
            }
        );
    }
}
