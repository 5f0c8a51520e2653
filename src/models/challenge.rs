use crate::models::detection::ResolvedDay;
use serde::Deserialize;
use std::collections::BTreeMap;

/// 挑战目录中的一天
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub day: u32,
    /// 参考合约名，如 `ClickCounter.sol`
    pub contract_name: String,
    #[serde(default)]
    pub concepts_taught: Vec<String>,
    #[serde(default)]
    pub example_application: String,
}

impl Challenge {
    /// 去掉 `.sol` 后缀的合约名
    pub fn contract_stem(&self) -> &str {
        strip_sol(&self.contract_name)
    }
}

/// challenges.json 的顶层结构
#[derive(Debug, Deserialize)]
struct CatalogFile {
    schedule: Vec<Challenge>,
}

/// 挑战目录，运行期间只读
#[derive(Debug, Clone, Default)]
pub struct ChallengeCatalog {
    challenges: BTreeMap<u32, Challenge>,
}

impl ChallengeCatalog {
    pub fn new(challenges: impl IntoIterator<Item = Challenge>) -> Self {
        Self {
            challenges: challenges.into_iter().map(|c| (c.day, c)).collect(),
        }
    }

    /// 从 JSON 文本解析
    pub fn from_json_str(content: &str) -> serde_json::Result<Self> {
        let file: CatalogFile = serde_json::from_str(content)?;
        Ok(Self::new(file.schedule))
    }

    pub fn get(&self, day: u32) -> Option<&Challenge> {
        self.challenges.get(&day)
    }

    pub fn contains(&self, day: u32) -> bool {
        self.challenges.contains_key(&day)
    }

    /// 按天数升序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Challenge> {
        self.challenges.values()
    }

    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

/// 评审时使用的当天上下文
///
/// 天数未识别时为空上下文：没有合约名，也没有概念要求
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayContext {
    pub day: Option<u32>,
    pub contract_name: String,
    pub concepts: Vec<String>,
    pub description: String,
}

impl DayContext {
    pub fn from_challenge(challenge: &Challenge) -> Self {
        Self {
            day: Some(challenge.day),
            contract_name: challenge.contract_name.clone(),
            concepts: challenge.concepts_taught.clone(),
            description: challenge.example_application.clone(),
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.day.is_some()
    }
}

impl ChallengeCatalog {
    /// 根据检测结果取当天上下文
    pub fn context_for(&self, resolved: &ResolvedDay) -> DayContext {
        resolved
            .day()
            .and_then(|day| self.get(day))
            .map(DayContext::from_challenge)
            .unwrap_or_default()
    }
}

/// 去掉大小写不敏感的 `.sol` 后缀
pub fn strip_sol(name: &str) -> &str {
    let split = name.len().checked_sub(4);
    match split.and_then(|i| name.get(i..).map(|suffix| (i, suffix))) {
        Some((i, suffix)) if suffix.eq_ignore_ascii_case(".sol") => &name[..i],
        _ => name,
    }
}
