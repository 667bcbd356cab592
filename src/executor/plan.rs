//! Task plan executor.
//!
//! Tasks inside a job run one after another and stop at the first failure.
//! Jobs of a batch run concurrently and never affect each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::traits::JobExecutor;
use crate::domain::{
    BatchOutcome, FailureReason, JobOutcome, ResearchJob, TaskFailure, TaskOutcome, validate_batch,
};
use crate::error::Result;
use crate::events::Event;
use crate::id::generate_task_run_id;
use crate::pipeline::ResearchPipeline;

/// Outcomes of a running job, readable after the job's task has died.
type Recorded = Arc<Mutex<Vec<TaskOutcome>>>;

fn take_recorded(recorded: &Recorded) -> Vec<TaskOutcome> {
    std::mem::take(&mut *recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
}

pub struct TaskPlanExecutor {
    pipeline: Arc<ResearchPipeline>,
}

impl TaskPlanExecutor {
    pub fn new(pipeline: Arc<ResearchPipeline>) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &Arc<ResearchPipeline> {
        &self.pipeline
    }

    /// Report the task a panicking job was running as failed.
    async fn announce_lost_task(&self, job: &ResearchJob, index: usize, message: &str, elapsed: Duration) {
        let Some(task) = job.tasks.get(index) else {
            return;
        };
        let event = Event::task_failed(
            &generate_task_run_id(&job.id, index),
            task.as_str(),
            "capability",
            message,
            elapsed.as_secs_f64(),
        );
        self.pipeline.emit(event, &job.id).await;
    }

    async fn announce_job(&self, outcome: &JobOutcome, elapsed: Duration) {
        let completed: Vec<&str> = outcome.results().map(|r| r.task.as_str()).collect();
        let failed: Vec<&str> = outcome.failure().map(|f| f.task.as_str()).into_iter().collect();
        let abandoned: Vec<&str> = outcome.abandoned.iter().map(|t| t.as_str()).collect();
        let event = Event::job_completed(
            &outcome.job_id,
            &completed,
            &failed,
            &abandoned,
            elapsed.as_secs_f64(),
            outcome.tool_calls_used(),
        );
        self.pipeline.emit(event, &outcome.job_id).await;
    }
}

/// Run one job's tasks in order, abandoning the rest after a failure.
///
/// Job-level events are published by [`TaskPlanExecutor`], not here.
pub async fn run_job(pipeline: &ResearchPipeline, job: ResearchJob, cancel: &CancellationToken) -> JobOutcome {
    run_recorded(pipeline, job, cancel, &Recorded::default()).await
}

async fn run_recorded(
    pipeline: &ResearchPipeline,
    job: ResearchJob,
    cancel: &CancellationToken,
    recorded: &Recorded,
) -> JobOutcome {
    let ResearchJob { id, tasks } = job;
    let mut outcome = JobOutcome::new(id.clone());
    debug!("Job {} running {} task(s)", id, tasks.len());

    let mut remaining = tasks.into_iter().enumerate();
    while let Some((index, task)) = remaining.next() {
        let task_run_id = generate_task_run_id(&id, index);
        let result = pipeline.run(&task, &task_run_id, &id, cancel).await;
        let failed = result.is_err();
        recorded.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).push(result);

        if failed {
            outcome.abandoned = remaining.by_ref().map(|(_, task)| task).collect();
            if !outcome.abandoned.is_empty() {
                warn!(
                    "Job {} stopped at task {}; {} task(s) abandoned",
                    id,
                    index,
                    outcome.abandoned.len()
                );
            }
            break;
        }
    }
    outcome.outcomes = take_recorded(recorded);
    outcome
}

/// Outcome for a job whose task panicked or vanished.
///
/// Tasks that finished before the loss keep their outcomes; the task that
/// was running fails with `message` and the rest are abandoned. Returns the
/// outcome and the index of the failed task.
fn lost_job(job: &ResearchJob, finished: Vec<TaskOutcome>, message: &str) -> (JobOutcome, usize) {
    let mut outcome = JobOutcome::new(job.id.clone());
    let index = finished.len();
    outcome.outcomes = finished;
    let mut tasks = job.tasks.iter().skip(index).cloned();
    if let Some(running) = tasks.next() {
        outcome
            .outcomes
            .push(Err(TaskFailure::new(running, FailureReason::Capability(message.to_string()))));
    }
    outcome.abandoned = tasks.collect();
    (outcome, index)
}

#[async_trait]
impl JobExecutor for TaskPlanExecutor {
    async fn execute_batch(&self, jobs: Vec<ResearchJob>, cancel: CancellationToken) -> Result<BatchOutcome> {
        validate_batch(&jobs)?;
        info!("Executing batch of {} job(s)", jobs.len());
        let started = Instant::now();

        let mut set = JoinSet::new();
        let mut index_of = HashMap::with_capacity(jobs.len());
        let mut records: Vec<Recorded> = Vec::with_capacity(jobs.len());
        for (index, job) in jobs.iter().cloned().enumerate() {
            let pipeline = Arc::clone(&self.pipeline);
            let cancel = cancel.clone();
            let recorded = Recorded::default();
            records.push(Arc::clone(&recorded));
            let handle = set.spawn(async move {
                let job_started = Instant::now();
                let outcome = run_recorded(&pipeline, job, &cancel, &recorded).await;
                (outcome, job_started.elapsed())
            });
            index_of.insert(handle.id(), index);
        }

        let mut slots: Vec<Option<JobOutcome>> = (0..jobs.len()).map(|_| None).collect();
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((task_id, (outcome, elapsed))) => match index_of.get(&task_id) {
                    Some(&index) => {
                        self.announce_job(&outcome, elapsed).await;
                        slots[index] = Some(outcome);
                    }
                    None => warn!("Discarding outcome of unknown job {}", outcome.job_id),
                },
                Err(join_err) => {
                    if let Some(&index) = index_of.get(&join_err.id()) {
                        let job = &jobs[index];
                        error!("Job {} panicked: {}", job.id, join_err);
                        let message = "job panicked";
                        let (outcome, failed) = lost_job(job, take_recorded(&records[index]), message);
                        self.announce_lost_task(job, failed, message, started.elapsed()).await;
                        self.announce_job(&outcome, started.elapsed()).await;
                        slots[index] = Some(outcome);
                    }
                }
            }
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        for (slot, job) in slots.into_iter().zip(&jobs) {
            let outcome = match slot {
                Some(outcome) => outcome,
                None => {
                    let (outcome, _) = lost_job(job, Vec::new(), "job result was lost");
                    self.announce_job(&outcome, started.elapsed()).await;
                    outcome
                }
            };
            outcomes.push(outcome);
        }
        let batch = BatchOutcome { jobs: outcomes };
        info!(
            "Batch finished: {} job(s), {} failed, {} tool call(s)",
            batch.len(),
            batch.failed_jobs(),
            batch.tool_calls_used()
        );
        Ok(batch)
    }
}
