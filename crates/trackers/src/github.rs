use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

use crate::adapter::TrackerAdapter;
use crate::error::{TrackerError, TrackerResult};
use crate::issue::{Issue, IssueState};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct GithubIssueDto {
    number: u64,
    title: String,
    body: Option<String>,
    updated_at: DateTime<Utc>,
    state: String,
    pull_request: Option<serde_json::Value>,
}

impl GithubIssueDto {
    fn into_issue(self, repo: &str) -> Issue {
        let state = if self.state == "closed" {
            IssueState::Closed
        } else {
            IssueState::Opened
        };
        Issue {
            id: self.number.to_string(),
            iid: Some(self.number.to_string()),
            title: self.title,
            description: self.body,
            updated_at: self.updated_at,
            unique_id: Issue::build_unique_id("github", repo, &self.number.to_string()),
            state,
            metadata: serde_json::json!({ "repo": repo }),
        }
    }
}

/// GitHub issue adapter over the REST API. `repo` is `owner/name`.
pub struct GithubAdapter {
    client: Client,
    repo: String,
    access_token: Option<String>,
}

impl GithubAdapter {
    pub fn new(repo: String, access_token: Option<String>) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .user_agent("ops-core")
            .build()
            .map_err(TrackerError::Http)?;
        Ok(Self {
            client,
            repo,
            access_token,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch_page(&self, page: u32) -> TrackerResult<Vec<GithubIssueDto>> {
        let url = format!("https://api.github.com/repos/{}/issues", self.repo);
        let request = self.authed(self.client.get(url).query(&[
            ("state", "open".to_string()),
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
            ("sort", "updated".to_string()),
        ]));
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }

    async fn fetch_one(&self, number: &str) -> TrackerResult<GithubIssueDto> {
        let url = format!("https://api.github.com/repos/{}/issues/{number}", self.repo);
        let response = self.authed(self.client.get(url)).send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TrackerAdapter for GithubAdapter {
    async fn list_issues(&self) -> TrackerResult<Vec<Issue>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.fetch_page(page).await?;
            if batch.is_empty() {
                break;
            }
            let exhausted = batch.len() < PER_PAGE as usize;
            all.extend(
                batch
                    .into_iter()
                    .filter(|dto| dto.pull_request.is_none())
                    .map(|dto| dto.into_issue(&self.repo)),
            );
            if exhausted {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    async fn revalidate(&self, iids: &[String]) -> TrackerResult<Vec<Issue>> {
        let mut results = Vec::with_capacity(iids.len());
        for iid in iids {
            match self.fetch_one(iid).await {
                Ok(dto) => results.push(dto.into_issue(&self.repo)),
                Err(e) => warn!(number = %iid, error = %e, "skipping issue that failed to revalidate"),
            }
        }
        Ok(results)
    }
}
