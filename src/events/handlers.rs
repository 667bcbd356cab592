//! Built-in event subscribers.
//!
//! - `ProgressTracker`: per-session task counters and statuses
//! - `MetricsCollector`: counters and running averages across sessions
//! - `AuditLogger`: writes every envelope to the log
//! - `ChannelForwarder`: live-update bridge onto a bounded channel

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::mpsc;

use super::bus::EventHandler;
use super::event::{Event, EventType};
use crate::error::HandlerError;

/// Status of a research session as seen through its events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    Cancelled,
}

/// Status of one task run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskProgress {
    pub description: String,
    pub status: TaskStatus,
    /// Last stage reported while running
    pub stage: Option<String>,
    pub tool_calls_used: Option<u64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionProgress {
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub query: Option<String>,
    pub rounds: u32,
    pub tasks: BTreeMap<String, TaskProgress>,
    pub total_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
    pub completed_jobs: usize,
}

impl SessionProgress {
    fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            status: SessionStatus::InProgress,
            started_at,
            query: None,
            rounds: 0,
            tasks: BTreeMap::new(),
            total_tasks: 0,
            completed_tasks: 0,
            failed_tasks: 0,
            completed_jobs: 0,
        }
    }

    /// Share of started tasks that have finished, successfully or not
    pub fn finished_ratio(&self) -> f64 {
        if self.total_tasks == 0 {
            return 0.0;
        }
        (self.completed_tasks + self.failed_tasks) as f64 / self.total_tasks as f64
    }
}

/// Tracks research progress across sessions and tasks.
///
/// Events without a session id are tracked under `"default"`.
#[derive(Default)]
pub struct ProgressTracker {
    sessions: Mutex<HashMap<String, SessionProgress>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SessionProgress>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current progress of a session
    pub fn snapshot(&self, session_id: &str) -> Option<SessionProgress> {
        self.lock().get(session_id).cloned()
    }

    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn apply(&self, event: &Event) {
        let session_id = event.session_id.clone().unwrap_or_else(|| "default".to_string());
        let mut sessions = self.lock();
        let session = sessions
            .entry(session_id.clone())
            .or_insert_with(|| SessionProgress::new(event.timestamp));
        let text = |key: &str| event.data.get(key).and_then(|v| v.as_str()).map(str::to_string);

        match event.event_type {
            EventType::SessionStarted => {
                session.status = SessionStatus::InProgress;
                session.started_at = event.timestamp;
                session.query = text("query");
                info!("Started tracking progress for session {}", session_id);
            }
            EventType::RoundStarted => {
                session.rounds += 1;
            }
            EventType::RoundCompleted => {}
            EventType::TaskStarted => {
                session.tasks.insert(
                    event.aggregate_id.clone(),
                    TaskProgress {
                        description: text("task_description").unwrap_or_default(),
                        status: TaskStatus::Running,
                        stage: None,
                        tool_calls_used: None,
                        error_message: None,
                    },
                );
                session.total_tasks += 1;
                debug!("Task {} started in session {}", event.aggregate_id, session_id);
            }
            EventType::TaskProgress => {
                if let Some(task) = session.tasks.get_mut(&event.aggregate_id) {
                    task.stage = text("stage");
                }
            }
            EventType::TaskCompleted => {
                if let Some(task) = session.tasks.get_mut(&event.aggregate_id) {
                    task.status = TaskStatus::Completed;
                    task.tool_calls_used = event.data.get("tool_calls_used").and_then(|v| v.as_u64());
                }
                session.completed_tasks += 1;
                debug!("Task {} completed in session {}", event.aggregate_id, session_id);
            }
            EventType::TaskFailed => {
                if let Some(task) = session.tasks.get_mut(&event.aggregate_id) {
                    task.status = TaskStatus::Failed;
                    task.error_message = text("error_message");
                }
                session.failed_tasks += 1;
                warn!(
                    "Task {} failed in session {}: {}",
                    event.aggregate_id,
                    session_id,
                    text("error_message").unwrap_or_default()
                );
            }
            EventType::JobCompleted => {
                session.completed_jobs += 1;
                debug!("Job {} completed in session {}", event.aggregate_id, session_id);
            }
            EventType::SessionCompleted => {
                session.status = SessionStatus::Completed;
                info!("Session {} completed", session_id);
            }
            EventType::SessionCancelled => {
                session.status = SessionStatus::Cancelled;
                info!("Session {} was cancelled: {}", session_id, text("reason").unwrap_or_default());
            }
        }
    }
}

#[async_trait]
impl EventHandler for ProgressTracker {
    fn name(&self) -> &str {
        "progress_tracker"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.apply(event);
        Ok(())
    }
}

/// Aggregate counters collected by [`MetricsCollector`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResearchMetrics {
    pub total_sessions: u64,
    pub completed_sessions: u64,
    pub cancelled_sessions: u64,
    pub total_tasks: u64,
    pub completed_tasks: u64,
    pub failed_tasks: u64,
    pub completed_jobs: u64,
    pub total_tool_calls: u64,
    /// Mean duration of completed sessions, in seconds
    pub average_session_duration: f64,
    /// Mean duration of completed tasks, in seconds
    pub average_task_duration: f64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Folds `sample` into the mean of `count` samples, `count` including it.
fn running_average(average: f64, count: u64, sample: f64) -> f64 {
    if count <= 1 {
        sample
    } else {
        average + (sample - average) / count as f64
    }
}

/// Collects counters and duration averages across every session it sees.
#[derive(Default)]
pub struct MetricsCollector {
    metrics: Mutex<ResearchMetrics>,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResearchMetrics> {
        self.metrics.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Copy of the current metrics
    pub fn metrics(&self) -> ResearchMetrics {
        self.lock().clone()
    }

    fn apply(&self, event: &Event) {
        let number = |key: &str| event.data.get(key).and_then(|v| v.as_f64()).unwrap_or_default();
        let mut metrics = self.lock();

        match event.event_type {
            EventType::SessionStarted => metrics.total_sessions += 1,
            EventType::SessionCompleted => {
                metrics.completed_sessions += 1;
                metrics.average_session_duration = running_average(
                    metrics.average_session_duration,
                    metrics.completed_sessions,
                    number("total_duration_seconds"),
                );
                info!(
                    "Metrics: {} session(s) completed, {} task(s) completed, {} failed, {} tool call(s)",
                    metrics.completed_sessions, metrics.completed_tasks, metrics.failed_tasks, metrics.total_tool_calls
                );
            }
            EventType::SessionCancelled => metrics.cancelled_sessions += 1,
            EventType::TaskStarted => metrics.total_tasks += 1,
            EventType::TaskCompleted => {
                metrics.completed_tasks += 1;
                metrics.total_tool_calls += event.data.get("tool_calls_used").and_then(|v| v.as_u64()).unwrap_or(0);
                metrics.average_task_duration = running_average(
                    metrics.average_task_duration,
                    metrics.completed_tasks,
                    number("duration_seconds"),
                );
            }
            EventType::TaskFailed => metrics.failed_tasks += 1,
            EventType::JobCompleted => metrics.completed_jobs += 1,
            EventType::RoundStarted | EventType::RoundCompleted | EventType::TaskProgress => {}
        }
        metrics.last_updated = Some(event.timestamp);
    }
}

#[async_trait]
impl EventHandler for MetricsCollector {
    fn name(&self) -> &str {
        "metrics_collector"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.apply(event);
        Ok(())
    }
}

/// Writes every event envelope to the log as JSON.
pub struct AuditLogger {
    target: String,
}

impl AuditLogger {
    pub fn new() -> Self {
        Self {
            target: "conductor::audit".to_string(),
        }
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventHandler for AuditLogger {
    fn name(&self) -> &str {
        "audit_logger"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        let line = serde_json::to_string(event).map_err(|e| HandlerError::new(self.name(), e.to_string()))?;
        info!(target: self.target.as_str(), "{}", line);
        Ok(())
    }
}

/// Forwards events onto a bounded channel for live consumers.
///
/// Never waits for capacity: a full or closed channel is reported as a
/// handler error and the event is dropped for this consumer.
pub struct ChannelForwarder {
    tx: mpsc::Sender<Event>,
}

impl ChannelForwarder {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    /// Create a forwarder together with the receiving end
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Event>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl EventHandler for ChannelForwarder {
    fn name(&self) -> &str {
        "channel_forwarder"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.tx
            .try_send(event.clone())
            .map_err(|e| HandlerError::new(self.name(), format!("could not forward {}: {}", event.id, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::Stage;

    #[tokio::test]
    async fn test_tracker_counts_task_lifecycle() {
        let tracker = ProgressTracker::new();
        let events = [
            Event::session_started("ses-1", Some("population of Japan")),
            Event::round_started("ses-1", 1, 2),
            Event::task_started("t-000", "Tokyo").with_session("ses-1"),
            Event::task_progress("t-000", Stage::Compress, "compressing").with_session("ses-1"),
            Event::task_started("t-001", "Osaka").with_session("ses-1"),
            Event::task_completed("t-000", "Tokyo", "complete", 3, 1, 0.5).with_session("ses-1"),
            Event::task_failed("t-001", "Osaka", "empty_output", "no output", 0.2).with_session("ses-1"),
        ];
        for event in &events {
            tracker.handle(event).await.unwrap();
        }

        let progress = tracker.snapshot("ses-1").unwrap();
        assert_eq!(progress.status, SessionStatus::InProgress);
        assert_eq!(progress.query.as_deref(), Some("population of Japan"));
        assert_eq!(progress.rounds, 1);
        assert_eq!(progress.total_tasks, 2);
        assert_eq!(progress.completed_tasks, 1);
        assert_eq!(progress.failed_tasks, 1);
        assert_eq!(progress.tasks["t-000"].status, TaskStatus::Completed);
        assert_eq!(progress.tasks["t-000"].stage.as_deref(), Some("compress"));
        assert_eq!(progress.tasks["t-000"].tool_calls_used, Some(3));
        assert_eq!(progress.tasks["t-001"].error_message.as_deref(), Some("no output"));
        assert!((progress.finished_ratio() - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_tracker_session_terminal_states() {
        let tracker = ProgressTracker::new();
        tracker.handle(&Event::session_started("a", None)).await.unwrap();
        tracker.handle(&Event::session_completed("a", 2, "complete", 3, 0, 12.0)).await.unwrap();
        tracker.handle(&Event::session_cancelled("b", "budget")).await.unwrap();

        assert_eq!(tracker.snapshot("a").unwrap().status, SessionStatus::Completed);
        assert_eq!(tracker.snapshot("b").unwrap().status, SessionStatus::Cancelled);
        assert_eq!(tracker.session_ids(), vec!["a".to_string(), "b".to_string()]);
    }

    #[tokio::test]
    async fn test_tracker_uses_default_session() {
        let tracker = ProgressTracker::new();
        tracker.handle(&Event::task_started("t", "x")).await.unwrap();
        assert_eq!(tracker.snapshot("default").unwrap().total_tasks, 1);
    }

    #[tokio::test]
    async fn test_tracker_counts_completed_jobs() {
        let tracker = ProgressTracker::new();
        let event = Event::job_completed("job-1", &["Tokyo"], &[], &[], 1.0, 2).with_session("ses-1");
        tracker.handle(&event).await.unwrap();
        assert_eq!(tracker.snapshot("ses-1").unwrap().completed_jobs, 1);
    }

    #[tokio::test]
    async fn test_metrics_count_sessions_and_tasks() {
        let metrics = MetricsCollector::new();
        let events = [
            Event::session_started("a", None),
            Event::session_started("b", None),
            Event::task_started("t-000", "Tokyo"),
            Event::task_started("t-001", "Osaka"),
            Event::task_started("t-002", "Kyoto"),
            Event::task_completed("t-000", "Tokyo", "complete", 3, 1, 1.0),
            Event::task_completed("t-001", "Osaka", "incomplete", 2, 0, 3.0),
            Event::task_failed("t-002", "Kyoto", "empty_output", "nothing", 0.4),
            Event::job_completed("job-1", &["Tokyo", "Osaka"], &["Kyoto"], &[], 4.4, 5),
            Event::session_cancelled("b", "budget"),
        ];
        for event in &events {
            metrics.handle(event).await.unwrap();
        }

        let snapshot = metrics.metrics();
        assert_eq!(snapshot.total_sessions, 2);
        assert_eq!(snapshot.cancelled_sessions, 1);
        assert_eq!(snapshot.completed_sessions, 0);
        assert_eq!(snapshot.total_tasks, 3);
        assert_eq!(snapshot.completed_tasks, 2);
        assert_eq!(snapshot.failed_tasks, 1);
        assert_eq!(snapshot.completed_jobs, 1);
        assert_eq!(snapshot.total_tool_calls, 5);
        assert!((snapshot.average_task_duration - 2.0).abs() < 1e-9);
        assert!(snapshot.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_metrics_average_session_duration() {
        let metrics = MetricsCollector::new();
        for (id, duration) in [("a", 10.0), ("b", 20.0), ("c", 60.0)] {
            metrics
                .handle(&Event::session_completed(id, 1, "planner_complete", 1, 0, duration))
                .await
                .unwrap();
        }
        let snapshot = metrics.metrics();
        assert_eq!(snapshot.completed_sessions, 3);
        assert!((snapshot.average_session_duration - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_running_average() {
        assert_eq!(running_average(0.0, 1, 4.0), 4.0);
        assert!((running_average(4.0, 2, 8.0) - 6.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_audit_logger_accepts_events() {
        let logger = AuditLogger::new();
        assert!(logger.handle(&Event::task_started("t", "x")).await.is_ok());
    }

    #[tokio::test]
    async fn test_forwarder_delivers_and_reports_full_channel() {
        let (forwarder, mut rx) = ChannelForwarder::channel(1);
        let first = Event::task_started("t", "x");
        forwarder.handle(&first).await.unwrap();

        let err = forwarder.handle(&Event::task_started("t2", "y")).await.unwrap_err();
        assert_eq!(err.handler, "channel_forwarder");

        let received = rx.recv().await.unwrap();
        assert_eq!(received.id, first.id);
    }

    #[tokio::test]
    async fn test_forwarder_reports_closed_channel() {
        let (forwarder, rx) = ChannelForwarder::channel(4);
        drop(rx);
        assert!(forwarder.handle(&Event::task_started("t", "x")).await.is_err());
    }
}
