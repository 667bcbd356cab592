//! ID generation utilities for Conductor
//!
//! Provides functions for generating identifiers for sessions, jobs, task runs and events.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

fn prefixed_id(prefix: &str) -> String {
    let timestamp = now_ms();
    let random: u16 = rand::rng().random();
    format!("{}-{}-{:04x}", prefix, timestamp, random)
}

/// Generate a research session ID
///
/// Format: `ses-{timestamp_ms}-{random_hex}`
pub fn generate_session_id() -> String {
    prefixed_id("ses")
}

/// Generate a job ID
///
/// Format: `job-{timestamp_ms}-{random_hex}`
pub fn generate_job_id() -> String {
    prefixed_id("job")
}

/// Generate an event ID
///
/// Format: `evt-{timestamp_ms}-{random_hex}`
pub fn generate_event_id() -> String {
    prefixed_id("evt")
}

/// Generate the ID of one task run inside a job
///
/// Format: `run-{job_suffix}-{index:03}`
/// Example: For job "job-1738300800123-a1b2" and index 2: "run-1738300800123-a1b2-002"
pub fn generate_task_run_id(job_id: &str, index: usize) -> String {
    let job_suffix = job_id.strip_prefix("job-").unwrap_or(job_id);
    format!("run-{}-{:03}", job_suffix, index)
}
