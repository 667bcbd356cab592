//! Partition of pipeline outcomes into completed records and feedback.

use serde::Serialize;

use crate::domain::{
    BatchOutcome, CompletedRecord, Feedback, FeedbackOrigin, JobOutcome, MissingItem, PipelineResult, ResearchTask,
    TaskFailure, TaskOutcome, Verdict,
};

/// Result of segregating one set of outcomes.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Segregation {
    pub feedbacks: Vec<Feedback>,
    pub completed: Vec<CompletedRecord>,
}

impl Segregation {
    pub fn is_empty(&self) -> bool {
        self.feedbacks.is_empty() && self.completed.is_empty()
    }

    /// Append another segregation, keeping order
    pub fn extend(&mut self, other: Segregation) {
        self.feedbacks.extend(other.feedbacks);
        self.completed.extend(other.completed);
    }

    /// Whether any work is left: a reviewer or failure feedback exists
    pub fn has_outstanding_work(&self) -> bool {
        !self.feedbacks.is_empty()
    }
}

fn completed_record(result: &PipelineResult) -> CompletedRecord {
    CompletedRecord {
        task: result.task.clone(),
        completed_items: result.verdict.completed().to_vec(),
        compressed_output: result.compressed_output.clone(),
    }
}

/// Feedback for a failed task; the abandoned tasks of its job follow it.
fn failure_feedback(failure: &TaskFailure, abandoned: &[ResearchTask]) -> Feedback {
    let mut missing_items = vec![MissingItem::new(failure.task.as_str(), failure.reason.to_string())];
    missing_items.extend(
        abandoned
            .iter()
            .map(|task| MissingItem::new(task.as_str(), format!("not started: job stopped after \"{}\" failed", failure.task))),
    );
    Feedback {
        task: failure.task.clone(),
        missing_items,
        origin: FeedbackOrigin::Failure(failure.reason.clone()),
    }
}

fn push_outcome(segregation: &mut Segregation, outcome: &TaskOutcome, abandoned: &[ResearchTask]) {
    match outcome {
        Ok(result) => {
            segregation.completed.push(completed_record(result));
            match &result.verdict {
                Verdict::Complete { .. } => {}
                Verdict::Incomplete { missing, .. } => segregation.feedbacks.push(Feedback {
                    task: result.task.clone(),
                    missing_items: missing.clone(),
                    origin: FeedbackOrigin::Reviewer,
                }),
            }
        }
        Err(failure) => segregation.feedbacks.push(failure_feedback(failure, abandoned)),
    }
}

/// Segregate a list of outcomes that have no abandoned tasks attached.
pub fn segregate_outcomes(outcomes: &[TaskOutcome]) -> Segregation {
    let mut segregation = Segregation::default();
    for outcome in outcomes {
        push_outcome(&mut segregation, outcome, &[]);
    }
    segregation
}

/// Segregate the outcomes of one job, in task order.
pub fn segregate_job(job: &JobOutcome) -> Segregation {
    let mut segregation = Segregation::default();
    for outcome in &job.outcomes {
        push_outcome(&mut segregation, outcome, &job.abandoned);
    }
    segregation
}

/// Segregate a whole batch, job by job in submission order.
///
/// - `Complete` gives one completed record
/// - `Incomplete` gives a completed record (partial credit) and a feedback
/// - a failure gives one feedback and no completed record
pub fn segregate(batch: &BatchOutcome) -> Segregation {
    let mut segregation = Segregation::default();
    for job in &batch.jobs {
        segregation.extend(segregate_job(job));
    }
    segregation
}
