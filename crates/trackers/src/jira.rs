use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;

use crate::adapter::TrackerAdapter;
use crate::error::{TrackerError, TrackerResult};
use crate::issue::{Issue, IssueState};
use crate::oauth::{OAuthRefresher, RefreshedTokens};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_SIZE: u32 = 100;

/// Default JQL when a task source doesn't configure its own.
pub const DEFAULT_JQL: &str = "resolution = Unresolved ORDER BY updated DESC";

/// Flattens an Atlassian Document Format node tree to plain text:
/// concatenates `text`-typed leaves, appending `\n` after paragraph/heading
/// nodes.
pub fn flatten_adf(doc: &serde_json::Value) -> String {
    let mut out = String::new();
    flatten_node(doc, &mut out);
    out
}

fn flatten_node(node: &serde_json::Value, out: &mut String) {
    let node_type = node.get("type").and_then(|v| v.as_str()).unwrap_or("");

    if node_type == "text" {
        if let Some(text) = node.get("text").and_then(|v| v.as_str()) {
            out.push_str(text);
        }
        return;
    }

    if let Some(children) = node.get("content").and_then(|v| v.as_array()) {
        for child in children {
            flatten_node(child, out);
        }
    }

    if node_type == "paragraph" || node_type == "heading" {
        out.push('\n');
    }
}

#[derive(Debug, Deserialize)]
struct JiraFields {
    summary: String,
    description: Option<serde_json::Value>,
    updated: DateTime<Utc>,
    status: JiraStatus,
}

#[derive(Debug, Deserialize)]
struct JiraStatus {
    #[serde(rename = "statusCategory")]
    status_category: JiraStatusCategory,
}

#[derive(Debug, Deserialize)]
struct JiraStatusCategory {
    key: String,
}

#[derive(Debug, Deserialize)]
struct JiraIssueDto {
    key: String,
    fields: JiraFields,
}

impl JiraIssueDto {
    fn into_issue(self) -> Issue {
        let state = if self.fields.status.status_category.key == "done" {
            IssueState::Closed
        } else {
            IssueState::Opened
        };
        let description = self.fields.description.as_ref().map(flatten_adf);
        Issue {
            id: self.key.clone(),
            iid: None,
            title: self.fields.summary,
            description,
            updated_at: self.fields.updated,
            unique_id: Issue::build_unique_id("jira", "issue", &self.key),
            state,
            metadata: serde_json::json!({ "key": self.key }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct JiraSearchResponse {
    issues: Vec<JiraIssueDto>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

/// Jira Cloud adapter. `host` is the site base URL
/// (`https://<site>.atlassian.net`).
pub struct JiraAdapter {
    client: Client,
    host: String,
    jql: String,
    email: String,
    api_token: Option<String>,
}

impl JiraAdapter {
    pub fn new(host: String, jql: Option<String>, email: String, api_token: Option<String>) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;
        Ok(Self {
            client,
            host,
            jql: jql.unwrap_or_else(|| DEFAULT_JQL.to_string()),
            email,
            api_token,
        })
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_token {
            Some(token) => builder.basic_auth(&self.email, Some(token)),
            None => builder,
        }
    }

    async fn fetch_page(&self, page_token: Option<&str>) -> TrackerResult<JiraSearchResponse> {
        let url = format!("{}/rest/api/3/search/jql", self.host.trim_end_matches('/'));
        let mut body = serde_json::json!({
            "jql": self.jql,
            "maxResults": PAGE_SIZE,
            "fields": ["summary", "description", "updated", "status"],
        });
        if let Some(token) = page_token {
            body["nextPageToken"] = serde_json::Value::String(token.to_string());
        }
        let response = self
            .authed(self.client.post(url).json(&body))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl TrackerAdapter for JiraAdapter {
    async fn list_issues(&self) -> TrackerResult<Vec<Issue>> {
        let mut all = Vec::new();
        let mut next_page_token = None;
        loop {
            let page = self.fetch_page(next_page_token.as_deref()).await?;
            all.extend(page.issues.into_iter().map(JiraIssueDto::into_issue));
            match page.next_page_token {
                Some(token) => next_page_token = Some(token),
                None => break,
            }
        }
        Ok(all)
    }

    async fn revalidate(&self, iids: &[String]) -> TrackerResult<Vec<Issue>> {
        if iids.is_empty() {
            return Ok(Vec::new());
        }
        let keys = iids.join(",");
        let jql = format!("key in ({keys})");
        let url = format!("{}/rest/api/3/search/jql", self.host.trim_end_matches('/'));
        let body = serde_json::json!({
            "jql": jql,
            "maxResults": PAGE_SIZE,
            "fields": ["summary", "description", "updated", "status"],
        });
        let response = self
            .authed(self.client.post(url).json(&body))
            .send()
            .await?
            .error_for_status()?;
        let page: JiraSearchResponse = response.json().await?;
        Ok(page.issues.into_iter().map(JiraIssueDto::into_issue).collect())
    }
}

#[derive(Debug, Deserialize)]
struct OAuthTokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: i64,
}

/// Refreshes Jira Cloud OAuth 2.0 (3LO) access tokens against
/// `https://auth.atlassian.com/oauth/token`. Invoked through
/// [`crate::oauth::OAuthCoordinator`], which serializes refreshes per secret.
pub struct JiraOAuthRefresher {
    client: Client,
    client_id: String,
    client_secret: String,
}

impl JiraOAuthRefresher {
    pub fn new(client_id: String, client_secret: String) -> TrackerResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(TrackerError::Http)?;
        Ok(Self {
            client,
            client_id,
            client_secret,
        })
    }
}

#[async_trait]
impl OAuthRefresher for JiraOAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> TrackerResult<RefreshedTokens> {
        let body = serde_json::json!({
            "grant_type": "refresh_token",
            "client_id": self.client_id,
            "client_secret": self.client_secret,
            "refresh_token": refresh_token,
        });
        let response = self
            .client
            .post("https://auth.atlassian.com/oauth/token")
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let parsed: OAuthTokenResponse = response.json().await?;
        Ok(RefreshedTokens {
            access_token: parsed.access_token,
            new_refresh_token: parsed.refresh_token,
            expires_at: Utc::now() + chrono::Duration::seconds(parsed.expires_in),
        })
    }
}
