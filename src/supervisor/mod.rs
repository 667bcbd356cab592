//! Supervisor loop: bounded rounds, budgets and completion detection.

pub mod budget;
pub mod control;

pub use budget::{Budget, BudgetWatcher, CompletionSignal};
pub use control::{StopReason, Supervisor, SupervisorReport, SupervisorState};
