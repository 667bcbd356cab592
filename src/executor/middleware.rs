//! Executor middleware.
//!
//! `Instrumented` wraps any [`JobExecutor`] and adds a tracing span, timing
//! and batch counters without touching the wrapped executor.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use super::traits::JobExecutor;
use crate::domain::{BatchOutcome, ResearchJob};
use crate::error::Result;

/// Counters collected by [`Instrumented`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorStats {
    pub batches: usize,
    pub rejected: usize,
    pub jobs: usize,
    pub failed_jobs: usize,
    pub last_batch_ms: u64,
}

pub struct Instrumented<E> {
    inner: E,
    label: String,
    batches: AtomicUsize,
    rejected: AtomicUsize,
    jobs: AtomicUsize,
    failed_jobs: AtomicUsize,
    last_batch_ms: AtomicU64,
}

impl<E: JobExecutor> Instrumented<E> {
    pub fn new(inner: E) -> Self {
        Self {
            inner,
            label: "executor".to_string(),
            batches: AtomicUsize::new(0),
            rejected: AtomicUsize::new(0),
            jobs: AtomicUsize::new(0),
            failed_jobs: AtomicUsize::new(0),
            last_batch_ms: AtomicU64::new(0),
        }
    }

    /// Name recorded on the span, e.g. the session id
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            batches: self.batches.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            jobs: self.jobs.load(Ordering::Relaxed),
            failed_jobs: self.failed_jobs.load(Ordering::Relaxed),
            last_batch_ms: self.last_batch_ms.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl<E: JobExecutor> JobExecutor for Instrumented<E> {
    async fn execute_batch(&self, jobs: Vec<ResearchJob>, cancel: CancellationToken) -> Result<BatchOutcome> {
        let span = tracing::info_span!("execute_batch", executor = %self.label, jobs = jobs.len());
        let started = Instant::now();

        let result = self.inner.execute_batch(jobs, cancel).instrument(span.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.last_batch_ms.store(elapsed_ms, Ordering::Relaxed);

        match &result {
            Ok(batch) => {
                self.batches.fetch_add(1, Ordering::Relaxed);
                self.jobs.fetch_add(batch.len(), Ordering::Relaxed);
                self.failed_jobs.fetch_add(batch.failed_jobs(), Ordering::Relaxed);
                tracing::info!(
                    parent: &span,
                    elapsed_ms,
                    failed_jobs = batch.failed_jobs(),
                    tool_calls = batch.tool_calls_used(),
                    "Batch completed"
                );
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(parent: &span, elapsed_ms, error = %e, "Batch rejected");
            }
        }
        result
    }
}
