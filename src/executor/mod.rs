// Task plan executor: sequential inside a job, concurrent across jobs

pub mod middleware;
pub mod plan;
pub mod traits;

pub use middleware::{ExecutorStats, Instrumented};
pub use plan::{TaskPlanExecutor, run_job};
pub use traits::JobExecutor;
