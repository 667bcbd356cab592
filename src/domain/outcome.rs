//! Pipeline and job outcome types.
//!
//! Every pipeline invocation returns a [`TaskOutcome`]; jobs and batches are
//! built out of those, so the single-task and multi-task paths share one shape.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::job::ResearchTask;
use super::record::{CompressedOutput, RawOutput};

/// A piece of research the reviewer still wants, with its purpose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingItem {
    pub task: String,
    pub purpose: String,
}

impl MissingItem {
    pub fn new(task: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            purpose: purpose.into(),
        }
    }
}

/// The reviewer's judgment of a task's findings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verdict {
    Complete {
        completed: Vec<String>,
    },
    Incomplete {
        completed: Vec<String>,
        missing: Vec<MissingItem>,
    },
}

impl Verdict {
    /// Sub-items the reviewer accepted, for either variant
    pub fn completed(&self) -> &[String] {
        match self {
            Verdict::Complete { completed } => completed,
            Verdict::Incomplete { completed, .. } => completed,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, Verdict::Complete { .. })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Complete { .. } => "complete",
            Verdict::Incomplete { .. } => "incomplete",
        }
    }
}

/// Everything one successful pipeline run produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub task: ResearchTask,
    pub raw_output: RawOutput,
    pub compressed_output: CompressedOutput,
    pub verdict: Verdict,
}

/// Why a pipeline run produced no verdict.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// Produce returned nothing
    #[error("no research output was returned for the task")]
    EmptyOutput,

    /// An external capability returned an error
    #[error("capability failed: {0}")]
    Capability(String),

    /// The per-pipeline deadline elapsed
    #[error("deadline of {0}ms exceeded")]
    DeadlineExceeded(u64),

    /// The batch was cancelled while the task was running
    #[error("cancelled before completion")]
    Cancelled,
}

impl FailureReason {
    /// Short machine-readable name, used as `error_type` in events
    pub fn kind(&self) -> &'static str {
        match self {
            FailureReason::EmptyOutput => "empty_output",
            FailureReason::Capability(_) => "capability",
            FailureReason::DeadlineExceeded(_) => "deadline_exceeded",
            FailureReason::Cancelled => "cancelled",
        }
    }
}

/// A failed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub task: ResearchTask,
    pub reason: FailureReason,
}

impl TaskFailure {
    pub fn new(task: ResearchTask, reason: FailureReason) -> Self {
        Self { task, reason }
    }
}

/// Unified result of one pipeline invocation.
pub type TaskOutcome = std::result::Result<PipelineResult, TaskFailure>;

/// Outcome of one job.
///
/// `outcomes` holds one entry per task that ran, in task order. After a
/// failure the job stops, so only the last entry can be an `Err`; the tasks
/// that never started are listed in `abandoned`.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub job_id: String,
    pub outcomes: Vec<TaskOutcome>,
    pub abandoned: Vec<ResearchTask>,
}

impl JobOutcome {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            outcomes: Vec::new(),
            abandoned: Vec::new(),
        }
    }

    /// The failure that ended the job, if any
    pub fn failure(&self) -> Option<&TaskFailure> {
        self.outcomes.iter().find_map(|o| o.as_ref().err())
    }

    pub fn succeeded(&self) -> bool {
        self.failure().is_none()
    }

    /// Successful pipeline results, in task order
    pub fn results(&self) -> impl Iterator<Item = &PipelineResult> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    /// Tool calls reported by every successful task of the job
    pub fn tool_calls_used(&self) -> usize {
        self.results().map(|r| r.compressed_output.tool_calls.len()).sum()
    }
}

/// Outcome of a batch: one `JobOutcome` per submitted job, in submission order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchOutcome {
    pub jobs: Vec<JobOutcome>,
}

impl BatchOutcome {
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn failed_jobs(&self) -> usize {
        self.jobs.iter().filter(|j| !j.succeeded()).count()
    }

    pub fn tool_calls_used(&self) -> usize {
        self.jobs.iter().map(JobOutcome::tool_calls_used).sum()
    }
}
