//! External capability interfaces.
//!
//! The conductor never interprets research content itself: producing
//! findings, compressing them, judging them and planning the next round are
//! all delegated through these traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{
    CompletedRecord, CompressedOutput, Feedback, MissingItem, RawOutput, ResearchJob, ResearchTask, Verdict,
};
use crate::error::Result;

/// Produces raw findings for a task. Empty output is not an error.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, task: &ResearchTask) -> Result<RawOutput>;
}

/// Normalizes raw findings into a compressed output with citations.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn compress(&self, raw: &RawOutput) -> Result<CompressedOutput>;
}

/// Judges compressed findings.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn verify(&self, compressed: &CompressedOutput) -> Result<ReviewReport>;
}

/// Decides what to research next.
#[async_trait]
pub trait ResearchPlanner: Send + Sync {
    async fn plan(&self, context: &PlanningContext) -> Result<PlannerDecision>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Complete,
    Incomplete,
}

/// What a reviewer returns, before it becomes a [`Verdict`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewReport {
    pub status: ReviewStatus,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub missing: Vec<MissingItem>,
}

impl ReviewReport {
    pub fn complete<I, S>(completed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: ReviewStatus::Complete,
            completed: completed.into_iter().map(Into::into).collect(),
            missing: Vec::new(),
        }
    }

    pub fn incomplete<I, S>(completed: I, missing: Vec<MissingItem>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            status: ReviewStatus::Incomplete,
            completed: completed.into_iter().map(Into::into).collect(),
            missing,
        }
    }
}

impl From<ReviewReport> for Verdict {
    /// A `Complete` status discards any missing items the reviewer listed.
    fn from(report: ReviewReport) -> Self {
        match report.status {
            ReviewStatus::Complete => Verdict::Complete {
                completed: report.completed,
            },
            ReviewStatus::Incomplete => Verdict::Incomplete {
                completed: report.completed,
                missing: report.missing,
            },
        }
    }
}

/// Cumulative state handed to the planner at the start of each round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanningContext {
    pub query: Option<String>,
    /// 1-based number of the round being planned
    pub round: u32,
    pub max_rounds: u32,
    pub max_jobs_per_round: usize,
    pub tool_calls_used: usize,
    pub max_tool_calls: usize,
    pub completed: Vec<CompletedRecord>,
    pub feedbacks: Vec<Feedback>,
}

impl PlanningContext {
    pub fn remaining_tool_calls(&self) -> usize {
        self.max_tool_calls.saturating_sub(self.tool_calls_used)
    }
}

/// The planner's answer for one round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PlannerDecision {
    /// Run another batch of jobs
    Research { jobs: Vec<ResearchJob> },
    /// The research is done
    Complete,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_report_into_verdict() {
        let report = ReviewReport {
            status: ReviewStatus::Complete,
            completed: vec!["population".to_string()],
            missing: vec![MissingItem::new("ignored", "ignored")],
        };
        assert_eq!(
            Verdict::from(report),
            Verdict::Complete {
                completed: vec!["population".to_string()]
            }
        );
    }

    #[test]
    fn test_incomplete_report_keeps_missing_order() {
        let missing = vec![MissingItem::new("a", "first"), MissingItem::new("b", "second")];
        let verdict: Verdict = ReviewReport::incomplete(["x"], missing.clone()).into();
        match verdict {
            Verdict::Incomplete { completed, missing: got } => {
                assert_eq!(completed, vec!["x".to_string()]);
                assert_eq!(got, missing);
            }
            other => panic!("expected incomplete, got {:?}", other),
        }
    }

    #[test]
    fn test_review_report_parses_minimal_json() {
        let report: ReviewReport = serde_json::from_str(r#"{"status": "complete"}"#).unwrap();
        assert_eq!(report.status, ReviewStatus::Complete);
        assert!(report.completed.is_empty());
    }

    #[test]
    fn test_planner_decision_json() {
        let decision: PlannerDecision = serde_json::from_str(
            r#"{"decision": "research", "jobs": [{"tasks": ["Tokyo"]}, {"tasks": ["a", "b"]}]}"#,
        )
        .unwrap();
        match decision {
            PlannerDecision::Research { jobs } => {
                assert_eq!(jobs.len(), 2);
                assert!(jobs[0].id.starts_with("job-"));
                assert!(jobs[1].is_sequential());
            }
            PlannerDecision::Complete => panic!("expected research"),
        }

        let done: PlannerDecision = serde_json::from_str(r#"{"decision": "complete"}"#).unwrap();
        assert_eq!(done, PlannerDecision::Complete);
    }

    #[test]
    fn test_remaining_tool_calls_saturates() {
        let context = PlanningContext {
            tool_calls_used: 250,
            max_tool_calls: 200,
            ..Default::default()
        };
        assert_eq!(context.remaining_tool_calls(), 0);
    }
}
