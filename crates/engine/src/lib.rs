pub mod ci_factory;
pub mod config;
pub mod error;
pub mod evaluation;
pub mod handlers;
pub mod implementation;
pub mod monitor;
pub mod quota;
pub mod recovery;
pub mod scheduler;
pub mod simple_evaluator;
pub mod supervisor;
pub mod sync;
pub mod tracker_factory;
#[cfg(test)]
mod test_support;

pub use ci_factory::CiClientFactory;
pub use config::{ConfigError, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use evaluation::EvaluationDriver;
pub use implementation::ImplementationDriver;
pub use monitor::{sync_pipeline_status, PipelineMonitor};
pub use quota::{Resolution, Selector, SelectorError};
pub use recovery::StuckTaskRecovery;
pub use scheduler::{EvalScheduler, SyncScheduler};
pub use supervisor::{wait_for_shutdown_signal, Supervisor};
pub use sync::{SyncReport, SyncService};
