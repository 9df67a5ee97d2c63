use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Internal pipeline status alphabet (mirrors
/// `ops_core_db::models::pipeline_execution::PipelineStatus`, kept as a
/// separate type here so this crate doesn't depend on the store).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CiStatus {
    Pending,
    Running,
    Success,
    Failed,
    Canceled,
}

/// Maps a raw remote CI status string to the internal alphabet.
pub fn map_remote_status(raw: &str) -> CiStatus {
    match raw {
        "created" | "waiting_for_resource" | "preparing" | "pending" => CiStatus::Pending,
        "running" => CiStatus::Running,
        "success" => CiStatus::Success,
        "failed" => CiStatus::Failed,
        "canceled" | "skipped" | "manual" => CiStatus::Canceled,
        other => {
            tracing::warn!(raw = other, "unrecognized ci status, treating as pending");
            CiStatus::Pending
        }
    }
}
