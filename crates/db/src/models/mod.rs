pub mod file_space;
pub mod pipeline_artifact;
pub mod pipeline_execution;
pub mod project;
pub mod secret;
pub mod session;
pub mod task;
pub mod task_source;
pub mod task_source_sync_state;
pub mod user_quota;
pub mod worker_repository;

pub use file_space::FileSpace;
pub use pipeline_artifact::{ArtifactType, PipelineArtifact};
pub use pipeline_execution::{PipelineExecution, PipelineStatus};
pub use project::Project;
pub use secret::{Secret, TokenType};
pub use session::{Runner, Session};
pub use task::{EvalVerdict, RemoteStatus, Task, UpsertOutcome, UpsertTask};
pub use task_source::{SyncStatus, TaskSource, TaskSourceType};
pub use task_source_sync_state::TaskSourceSyncState;
pub use user_quota::{QuotaKind, UserQuota};
pub use worker_repository::WorkerRepository;
