use ops_core_ci::GitlabCiClient;
use ops_core_db::models::worker_repository::WorkerRepository;
use ops_core_utils::secrets::SecretsClient;

use crate::error::{EngineError, EngineResult};

/// Builds a [`CiClient`] scoped to one worker repository, decrypting its
/// access token first. Each worker repository may live on a
/// different GitLab host, so clients are not shared across repositories.
pub struct CiClientFactory<'a> {
    secrets: &'a dyn SecretsClient,
    default_host: String,
}

impl<'a> CiClientFactory<'a> {
    pub fn new(secrets: &'a dyn SecretsClient, default_host: String) -> Self {
        Self { secrets, default_host }
    }

    pub async fn for_worker_repository(&self, worker_repo: &WorkerRepository) -> EngineResult<GitlabCiClient> {
        let host = worker_repo.host().unwrap_or_else(|| self.default_host.clone());
        let ciphertext = worker_repo
            .access_token_ciphertext()
            .ok_or_else(|| EngineError::Validation("worker_repository.source is missing access_token_ciphertext".into()))?;
        let access_token = self.secrets.decrypt(&ciphertext).await.map_err(EngineError::Secrets)?;
        GitlabCiClient::new(host, access_token).map_err(EngineError::Ci)
    }

    /// The GitLab project id CI calls must address, distinct from our own
    /// `worker_repository.id`.
    pub fn remote_project_id(worker_repo: &WorkerRepository) -> EngineResult<String> {
        worker_repo
            .remote_project_id()
            .ok_or_else(|| EngineError::Validation("worker_repository.source is missing project_id".into()))
    }
}
