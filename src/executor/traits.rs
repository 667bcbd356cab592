use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::{BatchOutcome, ResearchJob};
use crate::error::Result;

/// Runs a batch of research jobs to completion.
///
/// Implementations return exactly one `JobOutcome` per submitted job, in
/// submission order. The only hard error is a batch rejected by validation.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    async fn execute_batch(&self, jobs: Vec<ResearchJob>, cancel: CancellationToken) -> Result<BatchOutcome>;
}
