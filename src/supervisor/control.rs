//! The supervisor control loop.
//!
//! ```text
//! Planning -> AwaitingResults -> Evaluating -> Planning | Done
//! ```
//!
//! Budget enforcement across rounds lives here and nowhere else: the
//! executor only ever sees one batch at a time.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, info, warn};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::budget::{Budget, BudgetWatcher, CompletionSignal};
use crate::capability::{PlannerDecision, PlanningContext, ResearchPlanner};
use crate::domain::{BatchOutcome, CompletedRecord, Feedback, ResearchJob};
use crate::error::Result;
use crate::events::{Event, EventBus};
use crate::executor::JobExecutor;
use crate::feedback::{DigestFormatter, Segregation, segregate};
use crate::id::generate_session_id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Planning,
    AwaitingResults,
    Evaluating,
    Done,
}

/// Why the supervisor stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The planner reported that no further research is needed
    PlannerComplete,
    /// The completion signal was raised from outside
    Signalled,
    MaxRounds,
    ToolBudget,
    /// The session token was cancelled from outside
    Cancelled,
}

impl StopReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            StopReason::PlannerComplete => "planner_complete",
            StopReason::Signalled => "signalled",
            StopReason::MaxRounds => "max_rounds",
            StopReason::ToolBudget => "tool_budget",
            StopReason::Cancelled => "cancelled",
        }
    }

    /// Stopped because research was judged done rather than cut short
    pub fn is_completion(&self) -> bool {
        matches!(self, StopReason::PlannerComplete | StopReason::Signalled)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cumulative result of a supervised session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SupervisorReport {
    pub session_id: String,
    pub rounds: u32,
    pub stop_reason: StopReason,
    pub completed: Vec<CompletedRecord>,
    pub feedbacks: Vec<Feedback>,
    pub tool_calls_used: usize,
}

impl SupervisorReport {
    pub fn digest(&self, formatter: &DigestFormatter) -> String {
        formatter.format(&self.completed, &self.feedbacks)
    }
}

/// Runs bounded rounds of research until completion or budget exhaustion.
pub struct Supervisor {
    planner: Arc<dyn ResearchPlanner>,
    executor: Arc<dyn JobExecutor>,
    bus: Arc<EventBus>,
    budget: Budget,
    signal: CompletionSignal,
    session_id: String,
    query: Option<String>,
    cancel: CancellationToken,
    watcher: Option<Arc<BudgetWatcher>>,
}

impl Supervisor {
    pub fn new(planner: Arc<dyn ResearchPlanner>, executor: Arc<dyn JobExecutor>, bus: Arc<EventBus>) -> Self {
        Self {
            planner,
            executor,
            bus,
            budget: Budget::default(),
            signal: CompletionSignal::new(),
            session_id: generate_session_id(),
            query: None,
            cancel: CancellationToken::new(),
            watcher: None,
        }
    }

    pub fn with_budget(mut self, budget: Budget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_signal(mut self, signal: CompletionSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Session token; cancelling it stops the running batch and the session
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Watcher already installed on the bus for this session
    pub fn with_watcher(mut self, watcher: Arc<BudgetWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn completion_signal(&self) -> CompletionSignal {
        self.signal.clone()
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn budget(&self) -> &Budget {
        &self.budget
    }

    /// Drive the session to `Done` and return the cumulative report.
    ///
    /// Fails only on planner errors or on a batch the executor rejects.
    pub async fn run(&self) -> Result<SupervisorReport> {
        let started = Instant::now();
        info!("Supervisor session {} starting ({:?})", self.session_id, self.budget);
        self.emit(Event::session_started(&self.session_id, self.query.as_deref())).await;

        let mut state = SupervisorState::Planning;
        let mut rounds: u32 = 0;
        let mut tool_calls_used: usize = 0;
        let mut cumulative = Segregation::default();
        let mut pending: Vec<ResearchJob> = Vec::new();
        let mut batch = BatchOutcome::default();
        let mut stop_reason = StopReason::MaxRounds;

        loop {
            debug!("Session {} round {} state {:?}", self.session_id, rounds, state);
            state = match state {
                SupervisorState::Planning => {
                    if let Some(reason) = self.check_stop(rounds, tool_calls_used) {
                        stop_reason = reason;
                        SupervisorState::Done
                    } else {
                        let context = self.context(rounds + 1, tool_calls_used, &cumulative);
                        match self.plan(&context).await? {
                            Some(jobs) => {
                                pending = jobs;
                                SupervisorState::AwaitingResults
                            }
                            None => {
                                stop_reason = StopReason::PlannerComplete;
                                SupervisorState::Done
                            }
                        }
                    }
                }
                SupervisorState::AwaitingResults => {
                    rounds += 1;
                    let jobs = std::mem::take(&mut pending);
                    info!("Session {} round {}: submitting {} job(s)", self.session_id, rounds, jobs.len());
                    self.emit(Event::round_started(&self.session_id, rounds, jobs.len())).await;
                    batch = self.executor.execute_batch(jobs, self.cancel.child_token()).await?;
                    SupervisorState::Evaluating
                }
                SupervisorState::Evaluating => {
                    let round = segregate(&batch);
                    let round_calls = batch.tool_calls_used();
                    tool_calls_used += round_calls;
                    self.emit(Event::round_completed(
                        &self.session_id,
                        rounds,
                        round.completed.len(),
                        round.feedbacks.len(),
                        round_calls,
                    ))
                    .await;
                    info!(
                        "Session {} round {} done: {} completed, {} feedback, {} tool call(s) so far",
                        self.session_id,
                        rounds,
                        round.completed.len(),
                        round.feedbacks.len(),
                        tool_calls_used
                    );
                    cumulative.extend(round);

                    match self.check_stop(rounds, tool_calls_used) {
                        Some(reason) => {
                            stop_reason = reason;
                            SupervisorState::Done
                        }
                        None => SupervisorState::Planning,
                    }
                }
                SupervisorState::Done => break,
            };
        }

        info!(
            "Supervisor session {} finished after {} round(s): {}",
            self.session_id, rounds, stop_reason
        );
        if stop_reason == StopReason::Cancelled {
            self.emit(Event::session_cancelled(&self.session_id, stop_reason.as_str()))
                .await;
        }
        self.emit(Event::session_completed(
            &self.session_id,
            rounds,
            stop_reason.as_str(),
            cumulative.completed.len(),
            cumulative.feedbacks.len(),
            started.elapsed().as_secs_f64(),
        ))
        .await;

        Ok(SupervisorReport {
            session_id: self.session_id.clone(),
            rounds,
            stop_reason,
            completed: cumulative.completed,
            feedbacks: cumulative.feedbacks,
            tool_calls_used,
        })
    }

    /// Termination rule, in priority order: completion signal, round
    /// ceiling, tool-call budget, outside cancellation.
    fn check_stop(&self, rounds: u32, tool_calls_used: usize) -> Option<StopReason> {
        let watcher_tripped = self.watcher.as_ref().is_some_and(|w| w.tripped());
        if self.signal.is_raised() {
            Some(StopReason::Signalled)
        } else if self.budget.rounds_exhausted(rounds) {
            Some(StopReason::MaxRounds)
        } else if self.budget.tool_calls_exhausted(tool_calls_used) || watcher_tripped {
            Some(StopReason::ToolBudget)
        } else if self.cancel.is_cancelled() {
            Some(StopReason::Cancelled)
        } else {
            None
        }
    }

    fn context(&self, round: u32, tool_calls_used: usize, cumulative: &Segregation) -> PlanningContext {
        PlanningContext {
            query: self.query.clone(),
            round,
            max_rounds: self.budget.max_rounds,
            max_jobs_per_round: self.budget.max_jobs_per_round,
            tool_calls_used,
            max_tool_calls: self.budget.max_tool_calls,
            completed: cumulative.completed.clone(),
            feedbacks: cumulative.feedbacks.clone(),
        }
    }

    /// Ask the planner for the next batch; `None` means research is complete.
    async fn plan(&self, context: &PlanningContext) -> Result<Option<Vec<ResearchJob>>> {
        match self.planner.plan(context).await? {
            PlannerDecision::Complete => {
                info!("Planner reported research complete for session {}", self.session_id);
                self.signal.raise();
                Ok(None)
            }
            PlannerDecision::Research { jobs } if jobs.is_empty() => {
                warn!("Planner returned no jobs for session {}; treating as complete", self.session_id);
                self.signal.raise();
                Ok(None)
            }
            PlannerDecision::Research { mut jobs } => {
                let ceiling = self.budget.max_jobs_per_round.max(1);
                if jobs.len() > ceiling {
                    warn!(
                        "Planner proposed {} jobs, only the first {} run this round",
                        jobs.len(),
                        ceiling
                    );
                    jobs.truncate(ceiling);
                }
                Ok(Some(jobs))
            }
        }
    }

    async fn emit(&self, event: Event) {
        let event_type = event.event_type;
        if let Err(e) = self.bus.publish(event).await {
            debug!("Could not publish {} for session {}: {}", event_type, self.session_id, e);
        }
    }
}
