use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::adapter::TrackerAdapter;
use crate::error::{TrackerError, TrackerResult};
use crate::issue::{Issue, IssueState};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PER_PAGE: u32 = 100;

#[derive(Debug, Deserialize)]
struct GitlabIssueDto {
    id: u64,
    iid: u64,
    title: String,
    description: Option<String>,
    updated_at: DateTime<Utc>,
    state: String,
}

impl GitlabIssueDto {
    fn into_issue(self, project_path: &str) -> Issue {
        let state = if self.state == "closed" {
            IssueState::Closed
        } else {
            IssueState::Opened
        };
        Issue {
            id: self.id.to_string(),
            iid: Some(self.iid.to_string()),
            title: self.title,
            description: self.description,
            updated_at: self.updated_at,
            unique_id: Issue::build_unique_id("gitlab", project_path, &self.iid.to_string()),
            state,
            metadata: serde_json::json!({ "project_path": project_path }),
        }
    }
}

/// GitLab issue adapter over the REST v4 API.
pub struct GitlabAdapter {
    client: Client,
    host: String,
    project_path: String,
    access_token: Option<String>,
}

impl GitlabAdapter {
    pub fn new(host: String, project_path: String, access_token: Option<String>) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;
        Ok(Self {
            client,
            host,
            project_path,
            access_token,
        })
    }

    fn issues_url(&self) -> String {
        let encoded = urlencoding_path(&self.project_path);
        format!("{}/api/v4/projects/{encoded}/issues", self.host.trim_end_matches('/'))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn fetch_page(&self, extra: &[(&str, String)], page: u32) -> TrackerResult<Vec<GitlabIssueDto>> {
        let mut query: Vec<(&str, String)> = vec![
            ("per_page", PER_PAGE.to_string()),
            ("page", page.to_string()),
            ("order_by", "updated_at".into()),
        ];
        query.extend(extra.iter().cloned());

        let request = self.authed(self.client.get(self.issues_url()).query(&query));
        let response = request.send().await?.error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TrackerAdapter for GitlabAdapter {
    async fn list_issues(&self) -> TrackerResult<Vec<Issue>> {
        let mut all = Vec::new();
        let mut page = 1;
        loop {
            let batch = self.fetch_page(&[("state", "opened".into())], page).await?;
            if batch.is_empty() {
                break;
            }
            let exhausted = batch.len() < PER_PAGE as usize;
            all.extend(batch.into_iter().map(|dto| dto.into_issue(&self.project_path)));
            if exhausted {
                break;
            }
            page += 1;
        }
        Ok(all)
    }

    async fn revalidate(&self, iids: &[String]) -> TrackerResult<Vec<Issue>> {
        if iids.is_empty() {
            return Ok(Vec::new());
        }
        let extra: Vec<(&str, String)> = iids.iter().map(|iid| ("iids[]", iid.clone())).collect();
        let batch = self.fetch_page(&extra, 1).await?;
        Ok(batch.into_iter().map(|dto| dto.into_issue(&self.project_path)).collect())
    }
}

fn urlencoding_path(path: &str) -> String {
    path.replace('/', "%2F")
}
