//! Event envelope and lifecycle event constructors.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::generate_event_id;

/// Priority of a subscription, highest dispatched first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventPriority {
    Low = 1,
    #[default]
    Normal = 2,
    High = 3,
    Critical = 4,
}

/// Lifecycle event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "research.session.started")]
    SessionStarted,
    #[serde(rename = "research.session.completed")]
    SessionCompleted,
    #[serde(rename = "research.session.cancelled")]
    SessionCancelled,
    #[serde(rename = "research.round.started")]
    RoundStarted,
    #[serde(rename = "research.round.completed")]
    RoundCompleted,
    #[serde(rename = "research.task.started")]
    TaskStarted,
    #[serde(rename = "research.task.progress")]
    TaskProgress,
    #[serde(rename = "research.task.completed")]
    TaskCompleted,
    #[serde(rename = "research.task.failed")]
    TaskFailed,
    #[serde(rename = "research.job.completed")]
    JobCompleted,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::SessionStarted => "research.session.started",
            EventType::SessionCompleted => "research.session.completed",
            EventType::SessionCancelled => "research.session.cancelled",
            EventType::RoundStarted => "research.round.started",
            EventType::RoundCompleted => "research.round.completed",
            EventType::TaskStarted => "research.task.started",
            EventType::TaskProgress => "research.task.progress",
            EventType::TaskCompleted => "research.task.completed",
            EventType::TaskFailed => "research.task.failed",
            EventType::JobCompleted => "research.job.completed",
        }
    }

    pub fn is_task_event(&self) -> bool {
        matches!(
            self,
            EventType::TaskStarted | EventType::TaskProgress | EventType::TaskCompleted | EventType::TaskFailed
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which events a subscription receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Every event type
    All,
    /// One concrete event type
    Only(EventType),
}

impl EventFilter {
    pub fn matches(&self, event_type: EventType) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Only(t) => *t == event_type,
        }
    }
}

impl From<EventType> for EventFilter {
    fn from(value: EventType) -> Self {
        EventFilter::Only(value)
    }
}

/// Pipeline stage reported by `research.task.progress`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Produce,
    Compress,
    Verify,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Produce => "produce",
            Stage::Compress => "compress",
            Stage::Verify => "verify",
        }
    }
}

/// Immutable event envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    /// Task run, round or session the event is about
    pub aggregate_id: String,
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
    pub correlation_id: Option<String>,
    pub session_id: Option<String>,
    /// Component that emitted the event
    pub source: String,
    pub priority: EventPriority,
}

impl Event {
    pub fn new(event_type: EventType, aggregate_id: impl Into<String>, data: Value) -> Self {
        Self {
            id: generate_event_id(),
            aggregate_id: aggregate_id.into(),
            event_type,
            timestamp: Utc::now(),
            data,
            correlation_id: None,
            session_id: None,
            source: "conductor".to_string(),
            priority: EventPriority::Normal,
        }
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Create a research.session.started event
    pub fn session_started(session_id: &str, query: Option<&str>) -> Self {
        Self::new(
            EventType::SessionStarted,
            session_id,
            serde_json::json!({ "query": query }),
        )
        .with_session(session_id)
        .with_source("supervisor")
    }

    /// Create a research.session.completed event
    pub fn session_completed(
        session_id: &str,
        rounds: u32,
        stop_reason: &str,
        completed: usize,
        feedback: usize,
        duration_seconds: f64,
    ) -> Self {
        Self::new(
            EventType::SessionCompleted,
            session_id,
            serde_json::json!({
                "rounds": rounds,
                "stop_reason": stop_reason,
                "completed_count": completed,
                "feedback_count": feedback,
                "total_duration_seconds": duration_seconds
            }),
        )
        .with_session(session_id)
        .with_source("supervisor")
    }

    /// Create a research.session.cancelled event
    pub fn session_cancelled(session_id: &str, reason: &str) -> Self {
        Self::new(
            EventType::SessionCancelled,
            session_id,
            serde_json::json!({ "reason": reason }),
        )
        .with_session(session_id)
        .with_source("supervisor")
        .with_priority(EventPriority::High)
    }

    /// Create a research.round.started event
    pub fn round_started(session_id: &str, round: u32, jobs: usize) -> Self {
        Self::new(
            EventType::RoundStarted,
            format!("{}/round-{}", session_id, round),
            serde_json::json!({ "round": round, "jobs": jobs }),
        )
        .with_session(session_id)
        .with_source("supervisor")
    }

    /// Create a research.round.completed event
    pub fn round_completed(session_id: &str, round: u32, completed: usize, feedback: usize, tool_calls: usize) -> Self {
        Self::new(
            EventType::RoundCompleted,
            format!("{}/round-{}", session_id, round),
            serde_json::json!({
                "round": round,
                "completed_count": completed,
                "feedback_count": feedback,
                "tool_calls_used": tool_calls
            }),
        )
        .with_session(session_id)
        .with_source("supervisor")
    }

    /// Create a research.task.started event
    pub fn task_started(task_run_id: &str, description: &str) -> Self {
        Self::new(
            EventType::TaskStarted,
            task_run_id,
            serde_json::json!({
                "task_description": description,
                "started_at": Utc::now().to_rfc3339()
            }),
        )
        .with_source("research_pipeline")
    }

    /// Create a research.task.progress event
    pub fn task_progress(task_run_id: &str, stage: Stage, message: &str) -> Self {
        Self::new(
            EventType::TaskProgress,
            task_run_id,
            serde_json::json!({ "stage": stage.as_str(), "message": message }),
        )
        .with_source("research_pipeline")
        .with_priority(EventPriority::Low)
    }

    /// Create a research.task.completed event
    pub fn task_completed(
        task_run_id: &str,
        description: &str,
        verdict: &str,
        tool_calls_used: usize,
        sources_count: usize,
        duration_seconds: f64,
    ) -> Self {
        Self::new(
            EventType::TaskCompleted,
            task_run_id,
            serde_json::json!({
                "task_description": description,
                "research_verdict": verdict,
                "tool_calls_used": tool_calls_used,
                "sources_count": sources_count,
                "duration_seconds": duration_seconds
            }),
        )
        .with_source("research_pipeline")
    }

    /// Create a research.task.failed event
    pub fn task_failed(
        task_run_id: &str,
        description: &str,
        error_type: &str,
        error_message: &str,
        duration_seconds: f64,
    ) -> Self {
        Self::new(
            EventType::TaskFailed,
            task_run_id,
            serde_json::json!({
                "task_description": description,
                "error_type": error_type,
                "error_message": error_message,
                "duration_seconds": duration_seconds
            }),
        )
        .with_source("research_pipeline")
        .with_priority(EventPriority::High)
    }

    /// Create a research.job.completed event
    ///
    /// `abandoned` lists the tasks that never started because an earlier
    /// task of the job failed.
    pub fn job_completed(
        job_id: &str,
        completed_tasks: &[&str],
        failed_tasks: &[&str],
        abandoned: &[&str],
        total_duration_seconds: f64,
        total_tool_calls: usize,
    ) -> Self {
        let finished = completed_tasks.len() + failed_tasks.len();
        let success_rate = if finished == 0 {
            0.0
        } else {
            completed_tasks.len() as f64 / finished as f64
        };
        Self::new(
            EventType::JobCompleted,
            job_id,
            serde_json::json!({
                "completed_tasks": completed_tasks,
                "failed_tasks": failed_tasks,
                "abandoned_tasks": abandoned,
                "total_tasks": finished + abandoned.len(),
                "success_rate": success_rate,
                "total_duration_seconds": total_duration_seconds,
                "total_tool_calls": total_tool_calls,
                "completed_at": Utc::now().to_rfc3339()
            }),
        )
        .with_source("task_plan_executor")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(EventPriority::Critical > EventPriority::High);
        assert!(EventPriority::High > EventPriority::Normal);
        assert!(EventPriority::Normal > EventPriority::Low);
        assert_eq!(EventPriority::default(), EventPriority::Normal);
    }

    #[test]
    fn test_event_type_serializes_dotted_name() {
        let json = serde_json::to_string(&EventType::TaskCompleted).unwrap();
        assert_eq!(json, "\"research.task.completed\"");
        assert_eq!(EventType::TaskCompleted.as_str(), "research.task.completed");
    }

    #[test]
    fn test_filter_matches() {
        assert!(EventFilter::All.matches(EventType::RoundStarted));
        assert!(EventFilter::from(EventType::TaskFailed).matches(EventType::TaskFailed));
        assert!(!EventFilter::Only(EventType::TaskFailed).matches(EventType::TaskStarted));
    }

    #[test]
    fn test_task_started_event() {
        let event = Event::task_started("a1b2-000", "find population of Tokyo").with_session("ses-1");
        assert!(event.id.starts_with("evt-"));
        assert_eq!(event.event_type, EventType::TaskStarted);
        assert_eq!(event.aggregate_id, "a1b2-000");
        assert_eq!(event.session_id.as_deref(), Some("ses-1"));
        assert_eq!(event.data["task_description"], "find population of Tokyo");
        assert_eq!(event.source, "research_pipeline");
    }

    #[test]
    fn test_task_completed_event_payload() {
        let event = Event::task_completed("t", "d", "incomplete", 4, 2, 1.5);
        assert_eq!(event.data["research_verdict"], "incomplete");
        assert_eq!(event.data["tool_calls_used"], 4);
        assert_eq!(event.data["sources_count"], 2);
    }

    #[test]
    fn test_task_failed_event_is_high_priority() {
        let event = Event::task_failed("t", "d", "empty_output", "nothing", 0.1);
        assert_eq!(event.priority, EventPriority::High);
        assert_eq!(event.data["error_type"], "empty_output");
    }

    #[test]
    fn test_round_events_share_aggregate() {
        let started = Event::round_started("ses-1", 2, 3);
        let completed = Event::round_completed("ses-1", 2, 3, 1, 10);
        assert_eq!(started.aggregate_id, completed.aggregate_id);
        assert_eq!(completed.data["tool_calls_used"], 10);
    }

    #[test]
    fn test_job_completed_event_payload() {
        let event = Event::job_completed("job-1", &["Tokyo"], &["Osaka"], &["Kyoto", "Nara"], 2.5, 7);
        assert_eq!(event.event_type, EventType::JobCompleted);
        assert_eq!(event.aggregate_id, "job-1");
        assert_eq!(event.data["success_rate"], 0.5);
        assert_eq!(event.data["total_tasks"], 4);
        assert_eq!(event.data["abandoned_tasks"][1], "Nara");
        assert_eq!(event.data["total_tool_calls"], 7);
        assert!(!EventType::JobCompleted.is_task_event());
    }

    #[test]
    fn test_job_completed_with_no_finished_tasks() {
        let event = Event::job_completed("job-2", &[], &[], &[], 0.0, 0);
        assert_eq!(event.data["success_rate"], 0.0);
    }

    #[test]
    fn test_is_task_event() {
        assert!(EventType::TaskProgress.is_task_event());
        assert!(!EventType::SessionStarted.is_task_event());
    }
}
