//! The produce, compress, verify pipeline for a single research task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use tokio_util::sync::CancellationToken;

use crate::capability::{Reviewer, Summarizer, TaskExecutor};
use crate::domain::{
    CompressedOutput, FailureReason, PipelineResult, RawOutput, ResearchTask, TaskFailure, TaskOutcome, Verdict,
};
use crate::events::{Event, EventBus, Stage};

/// Default budget for one whole pipeline run (10 minutes)
pub const DEFAULT_DEADLINE_MS: u64 = 600_000;

/// Configuration for a ResearchPipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Deadline covering produce, compress and verify together
    pub deadline_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            deadline_ms: DEFAULT_DEADLINE_MS,
        }
    }
}

/// Runs one task through produce, compress and verify, in that order.
///
/// Every invocation returns a [`TaskOutcome`]; capability errors, empty
/// output, the deadline and cancellation all become a `TaskFailure`.
pub struct ResearchPipeline {
    producer: Arc<dyn TaskExecutor>,
    summarizer: Arc<dyn Summarizer>,
    reviewer: Arc<dyn Reviewer>,
    bus: Arc<EventBus>,
    config: PipelineConfig,
    session_id: Option<String>,
    correlation_id: Option<String>,
}

impl ResearchPipeline {
    pub fn new(
        producer: Arc<dyn TaskExecutor>,
        summarizer: Arc<dyn Summarizer>,
        reviewer: Arc<dyn Reviewer>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            producer,
            summarizer,
            reviewer,
            bus,
            config: PipelineConfig::default(),
            session_id: None,
            correlation_id: None,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Tag every emitted event with this session
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Run the pipeline for `task`.
    ///
    /// `task_run_id` becomes the aggregate id of the emitted events and
    /// `job_id` is attached to their payload.
    pub async fn run(&self, task: &ResearchTask, task_run_id: &str, job_id: &str, cancel: &CancellationToken) -> TaskOutcome {
        let started = Instant::now();
        info!("Task {} started: {}", task_run_id, task);
        self.emit(Event::task_started(task_run_id, task.as_str()), job_id).await;

        let deadline = Duration::from_millis(self.config.deadline_ms);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FailureReason::Cancelled),
            staged = tokio::time::timeout(deadline, self.stages(task, task_run_id, job_id)) => match staged {
                Ok(result) => result,
                Err(_) => Err(FailureReason::DeadlineExceeded(self.config.deadline_ms)),
            },
        };
        let duration = started.elapsed().as_secs_f64();

        match result {
            Ok((raw_output, compressed_output, verdict)) => {
                info!(
                    "Task {} finished in {:.2}s with verdict {}",
                    task_run_id,
                    duration,
                    verdict.as_str()
                );
                let event = Event::task_completed(
                    task_run_id,
                    task.as_str(),
                    verdict.as_str(),
                    compressed_output.tool_calls.len(),
                    compressed_output.sources.len(),
                    duration,
                );
                self.emit(event, job_id).await;
                Ok(PipelineResult {
                    task: task.clone(),
                    raw_output,
                    compressed_output,
                    verdict,
                })
            }
            Err(reason) => {
                warn!("Task {} failed after {:.2}s: {}", task_run_id, duration, reason);
                let event = Event::task_failed(task_run_id, task.as_str(), reason.kind(), &reason.to_string(), duration);
                self.emit(event, job_id).await;
                Err(TaskFailure::new(task.clone(), reason))
            }
        }
    }

    async fn stages(
        &self,
        task: &ResearchTask,
        task_run_id: &str,
        job_id: &str,
    ) -> Result<(RawOutput, CompressedOutput, Verdict), FailureReason> {
        self.emit(Event::task_progress(task_run_id, Stage::Produce, "producing findings"), job_id)
            .await;
        let raw = self
            .producer
            .execute(task)
            .await
            .map_err(|e| FailureReason::Capability(e.to_string()))?;
        if raw.is_empty() {
            return Err(FailureReason::EmptyOutput);
        }

        self.emit(Event::task_progress(task_run_id, Stage::Compress, "compressing findings"), job_id)
            .await;
        let compressed = self
            .summarizer
            .compress(&raw)
            .await
            .map_err(|e| FailureReason::Capability(e.to_string()))?;

        self.emit(Event::task_progress(task_run_id, Stage::Verify, "verifying findings"), job_id)
            .await;
        let verdict: Verdict = self
            .reviewer
            .verify(&compressed)
            .await
            .map_err(|e| FailureReason::Capability(e.to_string()))?
            .into();

        Ok((raw, compressed, verdict))
    }

    /// Publish, logging instead of failing when the bus refuses.
    pub(crate) async fn emit(&self, mut event: Event, job_id: &str) {
        if let Some(session_id) = &self.session_id {
            event = event.with_session(session_id.clone());
        }
        if let Some(correlation_id) = &self.correlation_id {
            event = event.with_correlation(correlation_id.clone());
        }
        if let Some(data) = event.data.as_object_mut() {
            data.insert("job_id".to_string(), serde_json::Value::from(job_id));
        }

        let event_type = event.event_type;
        if let Err(e) = self.bus.publish(event).await {
            debug!("Could not publish {} for job {}: {}", event_type, job_id, e);
        }
    }
}
