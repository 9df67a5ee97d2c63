use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum IssueState {
    Opened,
    Closed,
}

/// Normalized representation of a remote issue, common across providers
///. `metadata` is the tagged-union bag of provider-specific
/// fields (`repo`, `key`, `host`, …) that adapters don't otherwise surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub iid: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
    pub unique_id: String,
    pub state: IssueState,
    pub metadata: serde_json::Value,
}

impl Issue {
    /// `unique_id = "{provider}-{repo-or-project}-{id}"`, the natural key for
    /// upserts.
    pub fn build_unique_id(provider: &str, repo_or_project: &str, id: &str) -> String {
        format!("{provider}-{repo_or_project}-{id}")
    }
}
