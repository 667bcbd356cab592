//! Conductor - a research orchestration engine
//!
//! Conductor drives a decomposed research plan to completion: jobs of
//! research tasks run through a produce, compress, verify pipeline, results
//! are segregated into completed records and feedback, and a supervisor
//! issues further rounds until research is complete or a budget runs out.

pub mod capability;
pub mod conductor;
pub mod domain;
pub mod error;
pub mod events;
pub mod executor;
pub mod feedback;
pub mod id;
pub mod pipeline;
pub mod supervisor;

pub use conductor::Conductor;
pub use error::{ConductorError, HandlerError, Result};
