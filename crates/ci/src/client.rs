use std::time::Duration;

use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{CiError, CiResult};
use crate::status::CiStatus;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Deserialize)]
pub struct CiUser {
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CiProject {
    pub id: u64,
    pub path_with_namespace: String,
    pub default_branch: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "action")]
pub enum FileChange {
    #[serde(rename = "create")]
    Create { file_path: String, content: String },
    #[serde(rename = "update")]
    Update { file_path: String, content: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TriggerPipelineInput {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub variables: Vec<(String, String)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Pipeline {
    pub id: u64,
    pub status: String,
}

impl Pipeline {
    pub fn mapped_status(&self) -> CiStatus {
        crate::status::map_remote_status(&self.status)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateMergeRequestInput {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MergeRequest {
    pub iid: u64,
    pub web_url: String,
}

/// The minimal remote-CI surface the engine relies on. Modeled
/// as a trait so the pipeline monitor and drivers can be tested against a
/// fake implementation.
#[async_trait]
pub trait CiClient: Send + Sync {
    async fn get_user(&self) -> CiResult<CiUser>;
    async fn get_project(&self, project_id: &str) -> CiResult<CiProject>;
    async fn enable_cicd(&self, project_id: &str) -> CiResult<()>;
    async fn enable_external_pipeline_variables(&self, project_id: &str) -> CiResult<()>;
    async fn get_file(&self, project_id: &str, path: &str, git_ref: &str) -> CiResult<Option<String>>;
    async fn upload_files(
        &self,
        project_id: &str,
        files: Vec<FileChange>,
        commit_message: &str,
        branch: &str,
    ) -> CiResult<()>;
    async fn trigger_pipeline(&self, project_id: &str, input: TriggerPipelineInput) -> CiResult<Pipeline>;
    async fn get_pipeline(&self, project_id: &str, pipeline_id: &str) -> CiResult<Pipeline>;
    async fn create_merge_request(
        &self,
        project_id: &str,
        input: CreateMergeRequestInput,
    ) -> CiResult<MergeRequest>;
}

/// GitLab REST v4 implementation.
pub struct GitlabCiClient {
    client: Client,
    host: String,
    access_token: String,
}

impl GitlabCiClient {
    pub fn new(host: String, access_token: String) -> CiResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(CiError::Transport)?;
        Ok(Self {
            client,
            host,
            access_token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v4{path}", self.host.trim_end_matches('/'))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.header("PRIVATE-TOKEN", &self.access_token)
    }

    async fn check_status(response: reqwest::Response) -> CiResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(CiError::Status {
            status: status.as_u16(),
            body,
        })
    }

    /// Retries transport/5xx failures up to 3 times with exponential
    /// backoff starting at 1 s.
    async fn with_retry<T, F, Fut>(op: F) -> CiResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = CiResult<T>>,
    {
        let backoff = ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_times(3);

        op.retry(backoff)
            .when(|e: &CiError| e.is_retryable())
            .await
    }
}

#[async_trait]
impl CiClient for GitlabCiClient {
    async fn get_user(&self) -> CiResult<CiUser> {
        Self::with_retry(|| async {
            let response = self.authed(self.client.get(self.url("/user"))).send().await?;
            let response = Self::check_status(response).await?;
            response.json().await.map_err(CiError::Transport)
        })
        .await
    }

    async fn get_project(&self, project_id: &str) -> CiResult<CiProject> {
        Self::with_retry(|| async {
            let encoded = project_id.replace('/', "%2F");
            let response = self
                .authed(self.client.get(self.url(&format!("/projects/{encoded}"))))
                .send()
                .await?;
            let response = Self::check_status(response).await?;
            response.json().await.map_err(CiError::Transport)
        })
        .await
    }

    async fn enable_cicd(&self, project_id: &str) -> CiResult<()> {
        let encoded = project_id.replace('/', "%2F");
        let response = self
            .authed(
                self.client
                    .put(self.url(&format!("/projects/{encoded}")))
                    .json(&json!({ "jobs_enabled": true })),
            )
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn enable_external_pipeline_variables(&self, project_id: &str) -> CiResult<()> {
        let encoded = project_id.replace('/', "%2F");
        let response = self
            .authed(
                self.client
                    .put(self.url(&format!("/projects/{encoded}")))
                    .json(&json!({ "restrict_user_defined_variables": false })),
            )
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn get_file(&self, project_id: &str, path: &str, git_ref: &str) -> CiResult<Option<String>> {
        let encoded_project = project_id.replace('/', "%2F");
        let encoded_path = path.replace('/', "%2F");
        let response = self
            .authed(
                self.client
                    .get(self.url(&format!("/projects/{encoded_project}/repository/files/{encoded_path}")))
                    .query(&[("ref", git_ref)]),
            )
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check_status(response).await?;

        #[derive(Deserialize)]
        struct FileResponse {
            content: String,
        }
        let body: FileResponse = response.json().await.map_err(CiError::Transport)?;
        let decoded = BASE64
            .decode(body.content.replace('\n', ""))
            .map_err(|e| CiError::Malformed(e.to_string()))?;
        Ok(Some(
            String::from_utf8(decoded).map_err(|e| CiError::Malformed(e.to_string()))?,
        ))
    }

    async fn upload_files(
        &self,
        project_id: &str,
        files: Vec<FileChange>,
        commit_message: &str,
        branch: &str,
    ) -> CiResult<()> {
        let encoded = project_id.replace('/', "%2F");
        let client = Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(CiError::Transport)?;

        let response = self
            .authed(client.post(self.url(&format!("/projects/{encoded}/repository/commits"))).json(&json!({
                "branch": branch,
                "commit_message": commit_message,
                "actions": files,
            })))
            .send()
            .await?;
        Self::check_status(response).await?;
        Ok(())
    }

    async fn trigger_pipeline(&self, project_id: &str, input: TriggerPipelineInput) -> CiResult<Pipeline> {
        Self::with_retry(|| async {
            let encoded = project_id.replace('/', "%2F");
            let variables: Vec<_> = input
                .variables
                .iter()
                .map(|(key, value)| json!({ "key": key, "value": value }))
                .collect();
            let response = self
                .authed(self.client.post(self.url(&format!("/projects/{encoded}/pipeline"))).json(&json!({
                    "ref": input.git_ref,
                    "variables": variables,
                })))
                .send()
                .await?;
            let response = Self::check_status(response).await?;
            response.json().await.map_err(CiError::Transport)
        })
        .await
    }

    async fn get_pipeline(&self, project_id: &str, pipeline_id: &str) -> CiResult<Pipeline> {
        Self::with_retry(|| async {
            let encoded = project_id.replace('/', "%2F");
            let response = self
                .authed(
                    self.client
                        .get(self.url(&format!("/projects/{encoded}/pipelines/{pipeline_id}"))),
                )
                .send()
                .await?;
            let response = Self::check_status(response).await?;
            response.json().await.map_err(CiError::Transport)
        })
        .await
    }

    async fn create_merge_request(
        &self,
        project_id: &str,
        input: CreateMergeRequestInput,
    ) -> CiResult<MergeRequest> {
        let encoded = project_id.replace('/', "%2F");
        let response = self
            .authed(
                self.client
                    .post(self.url(&format!("/projects/{encoded}/merge_requests")))
                    .json(&json!({
                        "source_branch": input.source_branch,
                        "target_branch": input.target_branch,
                        "title": input.title,
                        "description": input.description,
                    })),
            )
            .send()
            .await?;

        if response.status() == StatusCode::CONFLICT {
            // The MR already exists; treat as success and reuse the existing
            // one.
            return self.find_existing_merge_request(project_id, &input.source_branch).await;
        }

        let response = Self::check_status(response).await?;
        response.json().await.map_err(CiError::Transport)
    }
}

impl GitlabCiClient {
    async fn find_existing_merge_request(&self, project_id: &str, source_branch: &str) -> CiResult<MergeRequest> {
        let encoded = project_id.replace('/', "%2F");
        let response = self
            .authed(
                self.client
                    .get(self.url(&format!("/projects/{encoded}/merge_requests")))
                    .query(&[("source_branch", source_branch), ("state", "opened")]),
            )
            .send()
            .await?;
        let response = Self::check_status(response).await?;
        let mrs: Vec<MergeRequest> = response.json().await.map_err(CiError::Transport)?;
        mrs.into_iter()
            .next()
            .ok_or_else(|| CiError::Malformed("409 conflict but no existing merge request found".into()))
    }
}
