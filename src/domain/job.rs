//! Research jobs and tasks
//!
//! A job is an ordered, non-empty list of task descriptions scheduled as one
//! unit. Jobs are created per supervisor round and never persisted.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConductorError, Result};
use crate::id::generate_job_id;

/// One atomic research instruction, opaque to the conductor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResearchTask(String);

impl ResearchTask {
    pub fn new(description: impl Into<String>) -> Self {
        Self(description.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when the description carries no text at all
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<&str> for ResearchTask {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ResearchTask {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for ResearchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An ordered set of tasks executed as one unit.
///
/// More than one task makes a sequential chain: task `i + 1` does not consume
/// the output of task `i`, but it never starts before task `i` has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchJob {
    #[serde(default = "generate_job_id")]
    pub id: String,
    pub tasks: Vec<ResearchTask>,
}

impl ResearchJob {
    pub fn new<I, T>(tasks: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<ResearchTask>,
    {
        Self {
            id: generate_job_id(),
            tasks: tasks.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a job holding exactly one task
    pub fn single(task: impl Into<ResearchTask>) -> Self {
        Self::new([task.into()])
    }

    /// Whether the job runs as a sequential chain
    pub fn is_sequential(&self) -> bool {
        self.tasks.len() > 1
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Check that the job is well formed: at least one task, none blank
    pub fn validate(&self) -> Result<()> {
        if self.tasks.is_empty() {
            return Err(ConductorError::Validation(format!("job {} has no tasks", self.id)));
        }
        if let Some(pos) = self.tasks.iter().position(ResearchTask::is_blank) {
            return Err(ConductorError::Validation(format!(
                "job {} has a blank task description at position {}",
                self.id, pos
            )));
        }
        Ok(())
    }
}

/// Validate a whole batch before any task starts.
pub fn validate_batch(jobs: &[ResearchJob]) -> Result<()> {
    if jobs.is_empty() {
        return Err(ConductorError::Validation("batch contains no research jobs".to_string()));
    }
    for (index, job) in jobs.iter().enumerate() {
        job.validate()
            .map_err(|e| ConductorError::Validation(format!("job #{} rejected: {}", index, e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_job_is_not_sequential() {
        let job = ResearchJob::single("find population of Tokyo");
        assert_eq!(job.len(), 1);
        assert!(!job.is_sequential());
        assert!(job.id.starts_with("job-"));
    }

    #[test]
    fn test_multi_task_job_is_sequential() {
        let job = ResearchJob::new(["list EU members", "find GDP of each member"]);
        assert!(job.is_sequential());
        assert_eq!(job.tasks[1].as_str(), "find GDP of each member");
    }

    #[test]
    fn test_validate_rejects_empty_job() {
        let job = ResearchJob::new(Vec::<String>::new());
        let err = job.validate().unwrap_err();
        assert!(matches!(err, ConductorError::Validation(_)));
        assert!(err.to_string().contains("no tasks"));
    }

    #[test]
    fn test_validate_rejects_blank_task() {
        let job = ResearchJob::new(["ok", "   "]);
        let err = job.validate().unwrap_err();
        assert!(err.to_string().contains("position 1"));
    }

    #[test]
    fn test_validate_batch_rejects_empty_batch() {
        assert!(matches!(validate_batch(&[]), Err(ConductorError::Validation(_))));
    }

    #[test]
    fn test_validate_batch_names_offending_job() {
        let jobs = vec![ResearchJob::single("a"), ResearchJob::new(Vec::<String>::new())];
        let err = validate_batch(&jobs).unwrap_err();
        assert!(err.to_string().contains("job #1"));
    }

    #[test]
    fn test_job_deserializes_without_id() {
        let job: ResearchJob = serde_yaml::from_str("tasks:\n  - first\n  - second\n").unwrap();
        assert!(job.id.starts_with("job-"));
        assert_eq!(job.tasks, vec![ResearchTask::from("first"), ResearchTask::from("second")]);
    }
}
