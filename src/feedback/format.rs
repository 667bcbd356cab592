//! Digest rendering for the supervisor.
//!
//! Completed records come first, each with the sub-items the reviewer
//! accepted; feedback follows with every missing item and its purpose.
//! Input order is preserved throughout.

use crate::domain::{CompletedRecord, Feedback, FeedbackOrigin};

/// Formatter for research round digests.
#[derive(Debug, Clone)]
pub struct DigestFormatter {
    /// Include the compressed findings under each completed record
    include_findings: bool,
    /// Maximum lines of findings to show per record
    max_findings_lines: usize,
}

impl Default for DigestFormatter {
    fn default() -> Self {
        Self {
            include_findings: false,
            max_findings_lines: 20,
        }
    }
}

impl DigestFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_findings(mut self, include: bool) -> Self {
        self.include_findings = include;
        self
    }

    pub fn with_max_findings_lines(mut self, max: usize) -> Self {
        self.max_findings_lines = max;
        self
    }

    /// Render completed records and feedback into one digest.
    pub fn format(&self, completed: &[CompletedRecord], feedbacks: &[Feedback]) -> String {
        let mut output = String::new();
        output.push_str("The following is an overview of the research tasks completed in this round:\n");

        if completed.is_empty() {
            output.push_str("\n(no research tasks were completed)\n");
        }
        for record in completed {
            output.push_str(&self.format_record(record));
        }

        if !feedbacks.is_empty() {
            output.push_str("\nThe feedback from the review is:\n");
            for feedback in feedbacks {
                output.push_str(&format_feedback(feedback));
            }
        }
        output
    }

    fn format_record(&self, record: &CompletedRecord) -> String {
        let mut output = format!("\nResearch objective: {}\n", record.task);
        output.push_str("Completed research tasks:\n");
        for item in &record.completed_items {
            output.push_str(&format!("  - {}\n", item));
        }

        if self.include_findings && !record.compressed_output.findings.trim().is_empty() {
            output.push_str("Findings:\n");
            output.push_str(&indent_text(
                &truncate_lines(&record.compressed_output.findings, self.max_findings_lines),
                "  ",
            ));
            output.push('\n');
            if !record.compressed_output.sources.is_empty() {
                output.push_str("Sources:\n");
                for (source, citation) in &record.compressed_output.sources {
                    output.push_str(&format!("  {} {}\n", citation, source));
                }
            }
        }
        output
    }
}

fn format_feedback(feedback: &Feedback) -> String {
    let mut output = match &feedback.origin {
        FeedbackOrigin::Reviewer => format!("\nFeedback on task: {}\n", feedback.task),
        FeedbackOrigin::Failure(reason) => {
            format!("\nFeedback on task: {} (failed: {})\n", feedback.task, reason.kind())
        }
    };
    output.push_str("Incomplete research tasks:\n");
    for item in &feedback.missing_items {
        output.push_str(&format!("  - Feedback: {}\n    Purpose: {}\n", item.task, item.purpose));
    }
    output
}

/// Truncate text to at most `max` lines.
fn truncate_lines(text: &str, max: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    if lines.len() <= max {
        return lines.join("\n");
    }
    let mut shown = lines[..max].join("\n");
    shown.push_str(&format!("\n... ({} more lines)", lines.len() - max));
    shown
}

fn indent_text(text: &str, indent: &str) -> String {
    text.lines()
        .map(|line| format!("{}{}", indent, line))
        .collect::<Vec<_>>()
        .join("\n")
}
