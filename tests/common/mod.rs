//! Shared mocks for integration tests.
//!
//! The producer is scripted by task text; the summarizer passes findings
//! through and attaches tool calls; the reviewer marks findings that mention
//! "partial" as incomplete.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use conductor::capability::{ReviewReport, Reviewer, Summarizer, TaskExecutor};
use conductor::domain::{CompressedOutput, MissingItem, RawOutput, ResearchTask, ToolCallSummary};
use conductor::error::{ConductorError, HandlerError, Result};
use conductor::events::{Event, EventBus, EventFilter, EventHandler, EventPriority, ProgressTracker};
use conductor::executor::TaskPlanExecutor;
use conductor::pipeline::{PipelineConfig, ResearchPipeline};

pub const FINDINGS_PREFIX: &str = "findings for ";

#[derive(Debug, Clone)]
pub enum Behavior {
    Empty,
    Fail(String),
    Panic,
    Sleep(u64),
}

/// One recorded producer call.
#[derive(Debug, Clone)]
pub struct Call {
    pub task: String,
    pub start: Instant,
    pub end: Instant,
}

#[derive(Default)]
pub struct MockProducer {
    behaviors: HashMap<String, Behavior>,
    calls: Mutex<Vec<Call>>,
}

impl MockProducer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, task: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(task.to_string(), behavior);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TaskExecutor for MockProducer {
    async fn execute(&self, task: &ResearchTask) -> Result<RawOutput> {
        let start = Instant::now();
        let output = match self.behaviors.get(task.as_str()) {
            Some(Behavior::Empty) => String::new(),
            Some(Behavior::Fail(message)) => return Err(ConductorError::Capability(message.clone())),
            Some(Behavior::Panic) => panic!("producer crashed on {}", task),
            Some(Behavior::Sleep(ms)) => {
                tokio::time::sleep(Duration::from_millis(*ms)).await;
                format!("{}{}", FINDINGS_PREFIX, task)
            }
            None => format!("{}{}", FINDINGS_PREFIX, task),
        };
        self.calls.lock().unwrap().push(Call {
            task: task.to_string(),
            start,
            end: Instant::now(),
        });
        Ok(RawOutput::new(output))
    }
}

/// Passes findings through, attaching `tool_calls` calls and one source.
pub struct MockSummarizer {
    pub tool_calls: usize,
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn compress(&self, raw: &RawOutput) -> Result<CompressedOutput> {
        let mut compressed =
            CompressedOutput::new(raw.output.clone()).with_source("https://example.org/stats", "[1]");
        for _ in 0..self.tool_calls {
            compressed = compressed.with_tool_call(ToolCallSummary::new("web_search"));
        }
        Ok(compressed)
    }
}

pub struct MockReviewer;

#[async_trait]
impl Reviewer for MockReviewer {
    async fn verify(&self, compressed: &CompressedOutput) -> Result<ReviewReport> {
        let task = compressed
            .findings
            .strip_prefix(FINDINGS_PREFIX)
            .unwrap_or(&compressed.findings)
            .to_string();
        if task.contains("partial") {
            Ok(ReviewReport::incomplete(
                Vec::<String>::new(),
                vec![MissingItem::new(format!("{} breakdown", task), "needed for the summary table")],
            ))
        } else {
            Ok(ReviewReport::complete([task]))
        }
    }
}

/// Records every event it sees.
#[derive(Default)]
pub struct EventLog {
    events: Mutex<Vec<Event>>,
}

impl EventLog {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for EventLog {
    fn name(&self) -> &str {
        "event_log"
    }

    async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

pub struct Harness {
    pub producer: Arc<MockProducer>,
    pub tracker: Arc<ProgressTracker>,
    pub log: Arc<EventLog>,
    pub bus: Arc<EventBus>,
    pub executor: Arc<TaskPlanExecutor>,
}

pub const SESSION: &str = "ses-integration";

/// Build a started bus, pipeline and executor around `producer`.
///
/// `setup` may subscribe extra handlers before the bus starts.
pub fn harness_with(
    producer: MockProducer,
    tool_calls: usize,
    deadline_ms: u64,
    setup: impl FnOnce(&mut EventBus),
) -> Harness {
    let producer = Arc::new(producer);
    let tracker = Arc::new(ProgressTracker::new());
    let log = Arc::new(EventLog::default());

    let mut bus = EventBus::new();
    bus.subscribe(tracker.clone(), EventFilter::All, EventPriority::High);
    bus.subscribe(log.clone(), EventFilter::All, EventPriority::Normal);
    setup(&mut bus);
    bus.start();
    let bus = Arc::new(bus);

    let pipeline = ResearchPipeline::new(
        producer.clone(),
        Arc::new(MockSummarizer { tool_calls }),
        Arc::new(MockReviewer),
        bus.clone(),
    )
    .with_config(PipelineConfig { deadline_ms })
    .with_session(SESSION);
    let executor = Arc::new(TaskPlanExecutor::new(Arc::new(pipeline)));

    Harness {
        producer,
        tracker,
        log,
        bus,
        executor,
    }
}

pub fn harness(producer: MockProducer) -> Harness {
    harness_with(producer, 1, 5_000, |_| {})
}
