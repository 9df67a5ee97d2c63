use async_trait::async_trait;

use crate::error::TrackerResult;
use crate::issue::Issue;

/// Common surface every provider adapter implements.
#[async_trait]
pub trait TrackerAdapter: Send + Sync {
    /// Lazily-paginated listing from the provider's search/list endpoint.
    /// Adapters exhaust pagination internally and return the full batch —
    /// callers treat it as a finite sequence.
    async fn list_issues(&self) -> TrackerResult<Vec<Issue>>;

    /// Re-reads current state of specific issues, used by the revalidation
    /// sweep.
    async fn revalidate(&self, iids: &[String]) -> TrackerResult<Vec<Issue>>;
}
