/// GitHub REST API 客户端
///
/// 封装所有与 GitHub 相关的调用逻辑：读取和列出 PR、发布评审、打标签、合并
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::clients::SourceControl;
use crate::config::GithubConfig;
use crate::error::HostError;
use crate::models::{
    select_in_range, ChangedFile, DateRange, PrSummary, PullRequest, ReviewDecision,
};
use crate::services::structure_validator::is_solidity;

const ACCEPT_JSON: &str = "application/vnd.github.v3+json";
const ACCEPT_RAW: &str = "application/vnd.github.v3.raw";
const FILES_PER_PAGE: usize = 100;
const PULLS_PER_PAGE: usize = 100;

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    title: String,
    body: Option<String>,
    state: String,
    user: Option<UserResponse>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
    head: HeadResponse,
}

/// `GET /pulls` 列表中的一项
#[derive(Debug, Deserialize)]
struct PullListItem {
    number: u64,
    title: String,
    state: String,
    user: Option<UserResponse>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    merged_at: Option<DateTime<Utc>>,
}

impl From<PullListItem> for PrSummary {
    fn from(item: PullListItem) -> Self {
        PrSummary {
            number: item.number,
            title: item.title,
            author: item.user.map(|u| u.login).unwrap_or_default(),
            created_at: item.created_at,
            state: item.state,
            merged: item.merged_at.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct HeadResponse {
    #[serde(rename = "ref")]
    ref_name: String,
    /// 分支所在仓库被删除时为 null
    repo: Option<RepoResponse>,
}

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
}

#[derive(Debug, Deserialize)]
struct PrFileResponse {
    filename: String,
    status: String,
    patch: Option<String>,
}

/// 从 diff patch 还原新版本内容
///
/// 保留新增行（去掉 `+`）和上下文行，丢弃删除行和 hunk 头
pub fn content_from_patch(patch: &str) -> String {
    patch
        .lines()
        .filter(|line| !line.starts_with("@@") && !line.starts_with("---") && !line.starts_with("+++"))
        .filter_map(|line| {
            if let Some(added) = line.strip_prefix('+') {
                Some(added)
            } else if line.starts_with('-') || line.starts_with('\\') {
                None
            } else {
                Some(line.strip_prefix(' ').unwrap_or(line))
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// 按创建时间倒序翻页时，本页是否已经翻到区间之前（或已是最后一页）
fn listing_exhausted(page: &[PrSummary], since: DateTime<Utc>) -> bool {
    page.len() < PULLS_PER_PAGE || page.iter().any(|pr| pr.created_at < since)
}

/// 对 URL 路径做百分号编码，保留 `/`
fn encode_path(path: &str) -> String {
    let mut encoded = String::with_capacity(path.len());
    for byte in path.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' | b'/' => {
                encoded.push(byte as char)
            }
            other => encoded.push_str(&format!("%{:02X}", other)),
        }
    }
    encoded
}

/// GitHub 客户端
pub struct GithubClient {
    client: Client,
    api_base_url: String,
    repo: String,
    token: String,
    merge_method: String,
}

impl GithubClient {
    /// 创建新的 GitHub 客户端
    pub fn new(config: &GithubConfig, request_timeout: Duration) -> Result<Self, HostError> {
        let client = Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("pr-review-bot/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| HostError::request_failed("client", e))?;

        Ok(Self {
            client,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            token: config.token.clone(),
            merge_method: config.merge_method.clone(),
        })
    }

    fn repo_url(&self, repo: &str, path: &str) -> String {
        format!("{}/repos/{}{}", self.api_base_url, repo, path)
    }

    fn authorized(&self, builder: RequestBuilder, accept: &str) -> RequestBuilder {
        builder
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", accept)
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// 发送请求并检查状态码
    async fn send(&self, builder: RequestBuilder, endpoint: &str) -> Result<Response, HostError> {
        let response = builder
            .send()
            .await
            .map_err(|e| HostError::request_failed(endpoint, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(HostError::BadResponse {
                endpoint: endpoint.to_string(),
                status,
                message,
            });
        }

        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HostError> {
        let builder = self.authorized(self.client.get(url), ACCEPT_JSON);
        let response = self.send(builder, url).await?;
        response
            .json::<T>()
            .await
            .map_err(|source| HostError::ResponseParseFailed {
                endpoint: url.to_string(),
                source,
            })
    }

    /// 分页获取 PR 的全部改动文件
    async fn list_files(&self, number: u64) -> Result<Vec<PrFileResponse>, HostError> {
        let mut files = Vec::new();
        let mut page = 1;

        loop {
            let url = self.repo_url(
                &self.repo,
                &format!("/pulls/{}/files?per_page={}&page={}", number, FILES_PER_PAGE, page),
            );
            let batch: Vec<PrFileResponse> = self.get_json(&url).await?;
            let done = batch.len() < FILES_PER_PAGE;
            files.extend(batch);
            if done {
                break;
            }
            page += 1;
        }

        Ok(files)
    }

    /// 按创建时间倒序分页列出全部 PR，翻到区间起点之前就停止
    async fn list_pulls_since(&self, since: DateTime<Utc>) -> Result<Vec<PrSummary>, HostError> {
        let mut pulls = Vec::new();
        let mut page = 1;

        loop {
            let url = self.repo_url(
                &self.repo,
                &format!(
                    "/pulls?state=all&sort=created&direction=desc&per_page={}&page={}",
                    PULLS_PER_PAGE, page
                ),
            );
            let batch: Vec<PullListItem> = self.get_json(&url).await?;
            let batch: Vec<PrSummary> = batch.into_iter().map(PrSummary::from).collect();
            debug!("PR 列表第 {} 页: {} 个", page, batch.len());

            let done = listing_exhausted(&batch, since);
            pulls.extend(batch);
            if done {
                break;
            }
            page += 1;
        }

        Ok(pulls)
    }

    /// 通过 contents API 读取分支上的原始文件
    async fn fetch_raw_content(
        &self,
        repo: &str,
        path: &str,
        head_ref: &str,
    ) -> Result<String, HostError> {
        let url = self.repo_url(
            repo,
            &format!("/contents/{}?ref={}", encode_path(path), encode_path(head_ref)),
        );
        let builder = self.authorized(self.client.get(&url), ACCEPT_RAW);
        let response = self.send(builder, &url).await?;
        response
            .text()
            .await
            .map_err(|source| HostError::ResponseParseFailed {
                endpoint: url,
                source,
            })
    }
}

#[async_trait]
impl SourceControl for GithubClient {
    async fn fetch_pr(&self, number: u64) -> Result<PullRequest, HostError> {
        let url = self.repo_url(&self.repo, &format!("/pulls/{}", number));
        let pr: PullRequestResponse = self.get_json(&url).await?;
        let listed = self.list_files(number).await?;

        let head_repo = pr.head.repo.as_ref().map(|r| r.full_name.clone());
        let use_patch_only = pr.state == "closed" || head_repo.is_none();
        if use_patch_only {
            info!("[PR #{}] 📦 PR 已关闭或分支已删除，从 patch 还原文件内容", number);
        }

        let mut files = Vec::new();
        for file in listed.into_iter().filter(|f| f.status != "removed") {
            let patch_content = || file.patch.as_deref().map(content_from_patch).unwrap_or_default();

            let content = if !is_solidity(&file.filename) {
                String::new()
            } else if use_patch_only {
                patch_content()
            } else {
                let repo = head_repo.as_deref().unwrap_or(&self.repo);
                match self.fetch_raw_content(repo, &file.filename, &pr.head.ref_name).await {
                    Ok(content) => content,
                    Err(e) => {
                        warn!("[PR #{}] ⚠️ 读取 {} 失败，改用 patch: {}", number, file.filename, e);
                        patch_content()
                    }
                }
            };

            debug!("[PR #{}] 文件 {} ({} 字符)", number, file.filename, content.len());
            files.push(ChangedFile::new(file.filename, content));
        }

        Ok(PullRequest {
            number: pr.number,
            title: pr.title,
            description: pr.body.unwrap_or_default(),
            author: pr.user.map(|u| u.login).unwrap_or_default(),
            state: pr.state,
            merged: pr.merged_at.is_some(),
            created_at: pr.created_at,
            head_ref: pr.head.ref_name,
            files,
        })
    }

    async fn list_prs(&self, range: &DateRange) -> Result<Vec<PrSummary>, HostError> {
        let pulls = self.list_pulls_since(range.since).await?;
        Ok(select_in_range(pulls, range))
    }

    async fn post_review(&self, number: u64, decision: &ReviewDecision) -> Result<(), HostError> {
        let url = self.repo_url(&self.repo, &format!("/pulls/{}/reviews", number));
        let body = json!({
            "body": decision.feedback,
            "event": decision.action.review_event(),
        });
        let builder = self.authorized(self.client.post(&url), ACCEPT_JSON).json(&body);
        self.send(builder, &url).await?;
        Ok(())
    }

    async fn add_labels(&self, number: u64, labels: &[String]) -> Result<(), HostError> {
        if labels.is_empty() {
            return Ok(());
        }
        let url = self.repo_url(&self.repo, &format!("/issues/{}/labels", number));
        let builder = self
            .authorized(self.client.post(&url), ACCEPT_JSON)
            .json(&json!({ "labels": labels }));
        self.send(builder, &url).await?;
        Ok(())
    }

    async fn merge_pr(&self, number: u64) -> Result<(), HostError> {
        let url = self.repo_url(&self.repo, &format!("/pulls/{}/merge", number));
        let builder = self
            .authorized(self.client.put(&url), ACCEPT_JSON)
            .json(&json!({ "merge_method": self.merge_method }));
        self.send(builder, &url).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_from_patch() {
        let patch = "@@ -1,3 +1,4 @@\n pragma solidity ^0.8.0;\n-contract Old {}\n+contract New {\n+    uint256 x;\n+}\n\\ No newline at end of file";
        assert_eq!(
            content_from_patch(patch),
            "pragma solidity ^0.8.0;\ncontract New {\n    uint256 x;\n}"
        );
    }

    #[test]
    fn test_content_from_patch_skips_file_headers() {
        let patch = "--- a/A.sol\n+++ b/A.sol\n@@ -0,0 +1 @@\n+contract A {}";
        assert_eq!(content_from_patch(patch), "contract A {}");
    }

    #[test]
    fn test_encode_path() {
        assert_eq!(encode_path("submissions/alice/A.sol"), "submissions/alice/A.sol");
        assert_eq!(encode_path("submissions/my dir/A#1.sol"), "submissions/my%20dir/A%231.sol");
    }

    #[test]
    fn test_parse_pull_request_response() {
        let pr: PullRequestResponse = serde_json::from_str(
            r#"{"number": 5, "title": "Day 1", "body": null, "state": "open",
                "user": {"login": "alice"},
                "created_at": "2025-06-03T09:15:00Z",
                "head": {"ref": "main", "repo": null}}"#,
        )
        .unwrap();
        assert_eq!(pr.number, 5);
        assert_eq!(pr.head.ref_name, "main");
        assert!(pr.head.repo.is_none());
        assert!(pr.merged_at.is_none());
        assert_eq!(pr.created_at.format("%Y-%m-%d").to_string(), "2025-06-03");
    }

    #[test]
    fn test_parse_pull_list_item() {
        let items: Vec<PullListItem> = serde_json::from_str(
            r#"[
                {"number": 9, "title": "Day 2", "state": "closed", "user": {"login": "bob"},
                 "created_at": "2025-07-01T10:00:00Z", "merged_at": "2025-07-02T10:00:00Z"},
                {"number": 8, "title": "Day 1", "state": "closed", "user": null,
                 "created_at": "2025-06-30T10:00:00Z", "merged_at": null}
            ]"#,
        )
        .unwrap();
        let summaries: Vec<PrSummary> = items.into_iter().map(PrSummary::from).collect();

        assert!(summaries[0].merged);
        assert_eq!(summaries[0].author, "bob");
        assert!(!summaries[1].merged);
        assert_eq!(summaries[1].author, "");
    }

    #[test]
    fn test_listing_stops_before_range() {
        let since = DateTime::parse_from_rfc3339("2025-06-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let summary = |created: DateTime<Utc>| PrSummary {
            number: 1,
            title: String::new(),
            author: String::new(),
            created_at: created,
            state: "open".to_string(),
            merged: false,
        };

        let full_page_in_range = vec![summary(since + chrono::Duration::days(1)); PULLS_PER_PAGE];
        assert!(!listing_exhausted(&full_page_in_range, since));

        let mut crossing = full_page_in_range.clone();
        crossing.push(summary(since - chrono::Duration::days(1)));
        assert!(listing_exhausted(&crossing, since));

        assert!(listing_exhausted(&full_page_in_range[..3], since));
    }

    #[tokio::test]
    #[ignore = "需要 GITHUB_TOKEN 和网络"]
    async fn test_fetch_real_pr() {
        let mut config = crate::config::Config::default();
        config.apply_env();
        let client = GithubClient::new(&config.github, Duration::from_secs(30)).unwrap();
        let pr = client.fetch_pr(1).await.unwrap();
        assert_eq!(pr.number, 1);
    }
}
