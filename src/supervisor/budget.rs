//! Budget limits, the completion signal and the budget watcher.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::HandlerError;
use crate::events::{Event, EventBus, EventHandler, EventPriority, EventType, SubscriptionId};

/// Limits the supervisor enforces across rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Budget {
    pub max_rounds: u32,
    pub max_tool_calls: usize,
    /// Ceiling on the number of jobs submitted in one round
    pub max_jobs_per_round: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_rounds: 5,
            max_tool_calls: 200,
            max_jobs_per_round: 5,
        }
    }
}

impl Budget {
    pub fn with_max_rounds(mut self, rounds: u32) -> Self {
        self.max_rounds = rounds;
        self
    }

    pub fn with_max_tool_calls(mut self, calls: usize) -> Self {
        self.max_tool_calls = calls;
        self
    }

    pub fn with_max_jobs_per_round(mut self, jobs: usize) -> Self {
        self.max_jobs_per_round = jobs;
        self
    }

    pub fn rounds_exhausted(&self, rounds: u32) -> bool {
        rounds >= self.max_rounds
    }

    pub fn tool_calls_exhausted(&self, used: usize) -> bool {
        used >= self.max_tool_calls
    }
}

/// Shared "no further research needed" flag.
///
/// Clones share the flag, so any holder can raise it while the supervisor runs.
#[derive(Debug, Clone, Default)]
pub struct CompletionSignal(Arc<AtomicBool>);

impl CompletionSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts tool calls from completed tasks and cancels the session once the
/// budget is exceeded, which stops every sibling job of the running batch.
pub struct BudgetWatcher {
    session_id: String,
    max_tool_calls: usize,
    used: AtomicUsize,
    tripped: AtomicBool,
    cancel: CancellationToken,
}

impl BudgetWatcher {
    pub fn new(session_id: impl Into<String>, max_tool_calls: usize, cancel: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            session_id: session_id.into(),
            max_tool_calls,
            used: AtomicUsize::new(0),
            tripped: AtomicBool::new(false),
            cancel,
        })
    }

    /// Subscribe to task completions ahead of every other handler
    pub fn install(self: &Arc<Self>, bus: &mut EventBus) -> SubscriptionId {
        bus.subscribe(self.clone(), EventType::TaskCompleted, EventPriority::Critical)
    }

    pub fn used(&self) -> usize {
        self.used.load(Ordering::SeqCst)
    }

    /// Whether the watcher has cancelled the session
    pub fn tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    fn concerns(&self, event: &Event) -> bool {
        event.session_id.as_deref().is_none_or(|id| id == self.session_id)
    }
}

#[async_trait]
impl EventHandler for BudgetWatcher {
    fn name(&self) -> &str {
        "budget_watcher"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        if event.event_type != EventType::TaskCompleted || !self.concerns(event) {
            return Ok(());
        }
        let calls = event
            .data
            .get("tool_calls_used")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| HandlerError::new(self.name(), format!("event {} has no tool_calls_used", event.id)))?
            as usize;

        let used = self.used.fetch_add(calls, Ordering::SeqCst) + calls;
        if used > self.max_tool_calls && !self.tripped.swap(true, Ordering::SeqCst) {
            warn!(
                "Session {} used {} tool calls (budget {}); cancelling running jobs",
                self.session_id, used, self.max_tool_calls
            );
            self.cancel.cancel();
        }
        Ok(())
    }
}
