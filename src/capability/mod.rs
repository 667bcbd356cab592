// External capabilities: producer, summarizer, reviewer and planner

pub mod command;
pub mod traits;

pub use command::{CommandCapability, CommandConfig};
pub use traits::{
    PlannerDecision, PlanningContext, ResearchPlanner, ReviewReport, ReviewStatus, Reviewer, Summarizer,
    TaskExecutor,
};
