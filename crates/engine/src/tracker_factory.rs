use ops_core_db::models::secret::{Secret, TokenType};
use ops_core_db::models::task_source::{TaskSource, TaskSourceType};
use ops_core_db::SqlitePool;
use ops_core_trackers::{
    GithubAdapter, GitlabAdapter, JiraAdapter, JiraOAuthRefresher, OAuthCoordinator, TrackerAdapter, TrackerError,
    TrackerResult,
};
use ops_core_utils::secrets::SecretsClient;

/// Jira OAuth client credentials (`JIRA_OAUTH_CLIENT_ID`/`_SECRET`),
/// needed only when a Jira task source's secret is `token_type=oauth`.
pub struct JiraOAuthCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Builds the right tracker adapter for a task source's `type` and `config`.
/// `manual` sources have no adapter; callers must check for that case
/// themselves (the sync service stops before reaching here).
///
/// `oauth` serializes token refresh per secret; an expired
/// `token_type=oauth` secret is refreshed here before the adapter is built,
/// so every caller sees an already-valid access token.
pub async fn build_adapter(
    pool: &SqlitePool,
    secrets: &dyn SecretsClient,
    source: &TaskSource,
    oauth: &OAuthCoordinator,
    jira_oauth: Option<JiraOAuthCredentials<'_>>,
) -> TrackerResult<Box<dyn TrackerAdapter>> {
    let access_token = match source.config.get("secret_id").and_then(|v| v.as_str()) {
        Some(secret_id_str) => {
            let secret_id = secret_id_str
                .parse()
                .map_err(|_| TrackerError::Malformed("task_source.config.secret_id is not a uuid".into()))?;
            let secret = Secret::require(pool, secret_id).await?;

            if secret.token_type == Some(TokenType::Oauth) {
                let creds = jira_oauth.ok_or(TrackerError::MissingCredential)?;
                let refresher = JiraOAuthRefresher::new(creds.client_id.to_string(), creds.client_secret.to_string())?;
                Some(oauth.resolve_access_token(pool, secrets, &refresher, secret_id).await?)
            } else {
                Some(secrets.decrypt(&secret.ciphertext).await?)
            }
        }
        None => None,
    };

    match source.r#type {
        TaskSourceType::GitlabIssues => {
            let host = source
                .config
                .get("host")
                .and_then(|v| v.as_str())
                .unwrap_or("https://gitlab.com")
                .to_string();
            let project_path = source
                .config
                .get("repo")
                .and_then(|v| v.as_str())
                .ok_or_else(|| TrackerError::Malformed("task_source.config.repo is required for gitlab_issues".into()))?
                .to_string();
            Ok(Box::new(GitlabAdapter::new(host, project_path, access_token)?))
        }
        TaskSourceType::GithubIssues => {
            let repo = source
                .config
                .get("repo")
                .and_then(|v| v.as_str())
                .ok_or_else(|| TrackerError::Malformed("task_source.config.repo is required for github_issues".into()))?
                .to_string();
            Ok(Box::new(GithubAdapter::new(repo, access_token)?))
        }
        TaskSourceType::Jira => {
            let host = source
                .config
                .get("host")
                .and_then(|v| v.as_str())
                .ok_or_else(|| TrackerError::Malformed("task_source.config.host is required for jira".into()))?
                .to_string();
            let jql = source.config.get("jql").and_then(|v| v.as_str()).map(String::from);
            let email = source
                .config
                .get("email")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            Ok(Box::new(JiraAdapter::new(host, jql, email, access_token)?))
        }
        TaskSourceType::Manual => Err(TrackerError::Malformed("manual task sources have no adapter".into())),
    }
}
