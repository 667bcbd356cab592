//! Job submission entry point.
//!
//! `conduct_research` runs one batch end to end: validate, execute,
//! segregate, render the digest.

use std::sync::Arc;

use log::info;
use tokio_util::sync::CancellationToken;

use crate::domain::{ResearchJob, validate_batch};
use crate::error::Result;
use crate::executor::JobExecutor;
use crate::feedback::{DigestFormatter, Segregation, segregate};

pub struct Conductor {
    executor: Arc<dyn JobExecutor>,
    formatter: DigestFormatter,
    cancel: CancellationToken,
}

impl Conductor {
    pub fn new(executor: Arc<dyn JobExecutor>) -> Self {
        Self {
            executor,
            formatter: DigestFormatter::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_formatter(mut self, formatter: DigestFormatter) -> Self {
        self.formatter = formatter;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run a batch and return the segregated records and feedback.
    pub async fn conduct(&self, jobs: Vec<ResearchJob>) -> Result<Segregation> {
        validate_batch(&jobs)?;
        let batch = self.executor.execute_batch(jobs, self.cancel.child_token()).await?;
        let segregation = segregate(&batch);
        info!(
            "Conducted {} job(s): {} completed record(s), {} feedback",
            batch.len(),
            segregation.completed.len(),
            segregation.feedbacks.len()
        );
        Ok(segregation)
    }

    /// Run a batch and render the digest.
    ///
    /// Malformed jobs are rejected before any task starts; every other
    /// failure ends up as feedback in the digest.
    pub async fn conduct_research(&self, jobs: Vec<ResearchJob>) -> Result<String> {
        let segregation = self.conduct(jobs).await?;
        Ok(self.formatter.format(&segregation.completed, &segregation.feedbacks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BatchOutcome, JobOutcome};
    use crate::error::ConductorError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingExecutor {
        batches: AtomicUsize,
    }

    #[async_trait]
    impl JobExecutor for CountingExecutor {
        async fn execute_batch(&self, jobs: Vec<ResearchJob>, _cancel: CancellationToken) -> Result<BatchOutcome> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            Ok(BatchOutcome {
                jobs: jobs.iter().map(|j| JobOutcome::new(j.id.clone())).collect(),
            })
        }
    }

    #[tokio::test]
    async fn test_rejects_malformed_jobs_before_executing() {
        let executor = Arc::new(CountingExecutor::default());
        let conductor = Conductor::new(executor.clone());

        let err = conductor
            .conduct_research(vec![ResearchJob::new(["ok", ""])])
            .await
            .unwrap_err();
        assert!(matches!(err, ConductorError::Validation(_)));
        assert_eq!(executor.batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_renders_digest() {
        let executor = Arc::new(CountingExecutor::default());
        let digest = Conductor::new(executor.clone())
            .conduct_research(vec![ResearchJob::single("Tokyo")])
            .await
            .unwrap();
        assert!(digest.contains("overview of the research tasks"));
        assert_eq!(executor.batches.load(Ordering::SeqCst), 1);
    }
}
