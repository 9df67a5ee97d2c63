pub mod client;
pub mod error;
pub mod status;

pub use client::{
    CiClient, CiProject, CiUser, CreateMergeRequestInput, FileChange, GitlabCiClient, MergeRequest, Pipeline,
    TriggerPipelineInput,
};
pub use error::{CiError, CiResult};
pub use status::{map_remote_status, CiStatus};

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn maps_known_statuses() {
        assert_eq!(map_remote_status("created"), CiStatus::Pending);
        assert_eq!(map_remote_status("waiting_for_resource"), CiStatus::Pending);
        assert_eq!(map_remote_status("running"), CiStatus::Running);
        assert_eq!(map_remote_status("success"), CiStatus::Success);
        assert_eq!(map_remote_status("failed"), CiStatus::Failed);
        assert_eq!(map_remote_status("skipped"), CiStatus::Canceled);
        assert_eq!(map_remote_status("manual"), CiStatus::Canceled);
    }

    #[test]
    fn classifies_retryable_errors() {
        assert!(CiError::Status { status: 503, body: String::new() }.is_retryable());
        assert!(!CiError::Status { status: 404, body: String::new() }.is_retryable());
        assert!(!CiError::Malformed("bad json".into()).is_retryable());
    }
}
