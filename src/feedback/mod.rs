//! Feedback segregation and digest rendering.

pub mod format;
pub mod segregate;

pub use format::DigestFormatter;
pub use segregate::{Segregation, segregate, segregate_job, segregate_outcomes};
