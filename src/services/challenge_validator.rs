//! 挑战概念覆盖校验 - 业务能力层
//!
//! 把源码、评审反馈和（可选的）LLM 概念检查文本合成一个证据语料，
//! 再看当天要求的每个概念能否在语料中找到足够的关键词。

use std::collections::HashSet;

use crate::models::{ChallengeVerdict, FileReview};

/// 不参与匹配的常见词
const STOPWORDS: &[&str] = &[
    "and", "the", "for", "with", "from", "into", "using", "use", "how", "what", "when", "your",
    "its", "are", "via", "that", "this", "between", "understanding", "introduction", "intro",
];

/// 概念中的有效关键词
///
/// 小写、至少 3 个字符、不在停用词表中。全部被过滤掉时退回到所有单词。
pub fn concept_keywords(concept: &str) -> Vec<String> {
    let words: Vec<String> = concept
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    let significant: Vec<String> = words
        .iter()
        .filter(|w| w.chars().count() >= 3 && !STOPWORDS.contains(&w.as_str()))
        .cloned()
        .collect();

    let mut keywords = if significant.is_empty() { words } else { significant };
    let mut seen = HashSet::new();
    keywords.retain(|w| seen.insert(w.clone()));
    keywords
}

/// 把文本切成小写单词，驼峰标识符额外拆出各部分
fn tokenize(text: &str, words: &mut HashSet<String>) {
    for token in text.split(|c: char| !c.is_alphanumeric()) {
        if token.is_empty() {
            continue;
        }
        words.insert(token.to_lowercase());

        let mut part = String::new();
        for c in token.chars() {
            if c.is_uppercase() && !part.is_empty() {
                words.insert(part.to_lowercase());
                part.clear();
            }
            part.push(c);
        }
        if !part.is_empty() {
            words.insert(part.to_lowercase());
        }
    }
}

/// 关键词是否出现，容忍复数 `s`
fn keyword_present(keyword: &str, corpus: &HashSet<String>) -> bool {
    corpus.contains(keyword)
        || corpus.contains(&format!("{}s", keyword))
        || keyword
            .strip_suffix('s')
            .is_some_and(|singular| singular.len() >= 3 && corpus.contains(singular))
}

/// 至少一半（向上取整）关键词出现即算覆盖
fn concept_evidenced(concept: &str, corpus: &HashSet<String>) -> bool {
    let keywords = concept_keywords(concept);
    if keywords.is_empty() {
        return true;
    }
    let needed = keywords.len().div_ceil(2);
    let found = keywords
        .iter()
        .filter(|k| keyword_present(k, corpus))
        .count();
    found >= needed
}

/// 概念覆盖校验服务
pub struct ChallengeValidator {
    threshold: f64,
}

impl ChallengeValidator {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// 计算覆盖率
    ///
    /// 没有概念要求时直接满足
    pub fn validate(
        &self,
        reviews: &[FileReview],
        sources: &[&str],
        required: &[String],
        extra_evidence: Option<&str>,
    ) -> ChallengeVerdict {
        if required.is_empty() {
            return ChallengeVerdict::satisfied();
        }

        let mut corpus = HashSet::new();
        for source in sources {
            tokenize(source, &mut corpus);
        }
        for review in reviews {
            tokenize(&review.feedback, &mut corpus);
        }
        if let Some(extra) = extra_evidence {
            tokenize(extra, &mut corpus);
        }

        let (covered, missing): (Vec<String>, Vec<String>) = required
            .iter()
            .cloned()
            .partition(|concept| concept_evidenced(concept, &corpus));

        let coverage = covered.len() as f64 / required.len() as f64;

        ChallengeVerdict {
            coverage,
            meets_threshold: coverage >= self.threshold,
            covered,
            missing,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ReviewStatus, TokenUsage};

    const COUNTER: &str = r#"
pragma solidity ^0.8.0;
contract ClickCounter {
    uint256 public counter;
    event Clicked(address indexed by);
    function click() public {
        counter++;
        emit Clicked(msg.sender);
    }
}
"#;

    fn concepts(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn review(feedback: &str) -> FileReview {
        FileReview {
            path: "submissions/a/ClickCounter.sol".to_string(),
            score: 8.0,
            feedback: feedback.to_string(),
            tokens: TokenUsage::default(),
            status: ReviewStatus::Reviewed,
        }
    }

    #[test]
    fn test_empty_concept_list_is_satisfied() {
        let verdict = ChallengeValidator::new(0.5).validate(&[], &[""], &[], None);
        assert!(verdict.meets_threshold);
        assert_eq!(verdict.coverage, 1.0);
    }

    #[test]
    fn test_concept_keywords() {
        assert_eq!(concept_keywords("Functions and events"), vec!["functions", "events"]);
        assert_eq!(concept_keywords("The use of"), vec!["the", "use", "of"]);
        assert_eq!(concept_keywords("State variables"), vec!["state", "variables"]);
    }

    #[test]
    fn test_coverage_from_source_code() {
        let validator = ChallengeValidator::new(0.5);
        let verdict = validator.validate(
            &[],
            &[COUNTER],
            &concepts(&["Functions", "Events", "Mappings", "Modifiers"]),
            None,
        );

        assert_eq!(verdict.covered, vec!["Functions", "Events"]);
        assert_eq!(verdict.missing, vec!["Mappings", "Modifiers"]);
        assert_eq!(verdict.coverage, 0.5);
        assert!(verdict.meets_threshold);
    }

    #[test]
    fn test_below_threshold() {
        let validator = ChallengeValidator::new(0.5);
        let verdict = validator.validate(
            &[],
            &[COUNTER],
            &concepts(&["Mappings", "Modifiers", "Events"]),
            None,
        );
        assert!((verdict.coverage - 1.0 / 3.0).abs() < 1e-9);
        assert!(!verdict.meets_threshold);
    }

    #[test]
    fn test_feedback_and_extra_evidence_count() {
        let validator = ChallengeValidator::new(1.0);
        let verdict = validator.validate(
            &[review("Nice use of state variables.")],
            &["contract A {}"],
            &concepts(&["State variables", "Access control"]),
            Some("The contract demonstrates access control via onlyOwner."),
        );
        assert!(verdict.missing.is_empty());
        assert!(verdict.meets_threshold);
    }

    #[test]
    fn test_camel_case_identifiers_are_split() {
        let validator = ChallengeValidator::new(1.0);
        let verdict = validator.validate(
            &[],
            &["modifier onlyOwner() { _; }"],
            &concepts(&["Owner checks"]),
            None,
        );
        assert!(verdict.meets_threshold);
    }
}
