pub mod adapter;
pub mod error;
pub mod github;
pub mod gitlab;
pub mod issue;
pub mod jira;
pub mod oauth;

pub use adapter::TrackerAdapter;
pub use error::{TrackerError, TrackerResult};
pub use github::GithubAdapter;
pub use gitlab::GitlabAdapter;
pub use issue::{Issue, IssueState};
pub use jira::{flatten_adf, JiraAdapter, JiraOAuthRefresher, DEFAULT_JQL};
pub use oauth::{OAuthCoordinator, OAuthRefresher, RefreshedTokens};

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[test]
    fn flatten_adf_joins_paragraphs_with_newlines() {
        let doc = json!({
            "type": "doc",
            "content": [
                {"type": "paragraph", "content": [{"type": "text", "text": "first line"}]},
                {"type": "paragraph", "content": [{"type": "text", "text": "second line"}]},
            ]
        });
        assert_eq!(flatten_adf(&doc), "first line\nsecond line\n");
    }

    #[tokio::test]
    async fn gitlab_adapter_lists_single_page() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v4/projects/foo%2Fbar/issues"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": 1,
                    "iid": 10,
                    "title": "fix login",
                    "description": "broken",
                    "updated_at": "2025-01-01T00:00:00Z",
                    "state": "opened",
                }
            ])))
            .mount(&server)
            .await;

        let adapter = GitlabAdapter::new(server.uri(), "foo/bar".into(), None).unwrap();
        let issues = adapter.list_issues().await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].unique_id, "gitlab-foo/bar-10");
        assert_eq!(issues[0].state, IssueState::Opened);
    }
}
