//! Domain types for Conductor
//!
//! This module contains the core data model:
//! - ResearchJob / ResearchTask: units of scheduled work
//! - PipelineResult / Verdict: what one produce, compress, verify run yields
//! - TaskOutcome / JobOutcome / BatchOutcome: unified results, failures included
//! - CompletedRecord / Feedback: the segregated view the supervisor consumes

pub mod job;
pub mod outcome;
pub mod record;

pub use job::{ResearchJob, ResearchTask, validate_batch};
pub use outcome::{
    BatchOutcome, FailureReason, JobOutcome, MissingItem, PipelineResult, TaskFailure, TaskOutcome, Verdict,
};
pub use record::{CompletedRecord, CompressedOutput, Feedback, FeedbackOrigin, RawOutput, ToolCallSummary};
