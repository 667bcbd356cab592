//! Research artifacts and the records built from them.

use serde::{Deserialize, Serialize};

use super::job::ResearchTask;
use super::outcome::{FailureReason, MissingItem};

/// Raw findings returned by the task executor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOutput {
    pub output: String,
}

impl RawOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self { output: output.into() }
    }

    /// Empty findings are the producer's failure signal, not an error
    pub fn is_empty(&self) -> bool {
        self.output.trim().is_empty()
    }
}

/// Summary of one tool call made while producing findings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallSummary {
    pub tool_name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
    #[serde(default = "default_success")]
    pub success: bool,
    #[serde(default)]
    pub duration_ms: Option<f64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl ToolCallSummary {
    pub fn new(tool_name: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: serde_json::Value::Null,
            success: true,
            duration_ms: None,
            error_message: None,
        }
    }
}

/// Normalized findings with inline citations and a source list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressedOutput {
    pub findings: String,
    #[serde(default)]
    pub tool_calls: Vec<ToolCallSummary>,
    /// (source, citation) pairs in the order the summarizer cited them
    #[serde(default, with = "ordered_sources")]
    pub sources: Vec<(String, String)>,
}

impl CompressedOutput {
    pub fn new(findings: impl Into<String>) -> Self {
        Self {
            findings: findings.into(),
            ..Default::default()
        }
    }

    pub fn with_tool_call(mut self, call: ToolCallSummary) -> Self {
        self.tool_calls.push(call);
        self
    }

    /// Add a source, or replace the citation of one already listed.
    pub fn with_source(mut self, source: impl Into<String>, citation: impl Into<String>) -> Self {
        insert_source(&mut self.sources, source.into(), citation.into());
        self
    }

    pub fn citation(&self, source: &str) -> Option<&str> {
        self.sources
            .iter()
            .find(|(s, _)| s == source)
            .map(|(_, citation)| citation.as_str())
    }
}

fn insert_source(sources: &mut Vec<(String, String)>, source: String, citation: String) {
    match sources.iter_mut().find(|(s, _)| *s == source) {
        Some(entry) => entry.1 = citation,
        None => sources.push((source, citation)),
    }
}

/// Sources travel as a JSON object; entries keep document order.
mod ordered_sources {
    use std::fmt;

    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeMap;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S: Serializer>(sources: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(sources.len()))?;
        for (source, citation) in sources {
            map.serialize_entry(source, citation)?;
        }
        map.end()
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, String)>, D::Error> {
        deserializer.deserialize_map(SourcesVisitor)
    }

    struct SourcesVisitor;

    impl<'de> Visitor<'de> for SourcesVisitor {
        type Value = Vec<(String, String)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map of source to citation")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
            let mut sources = Vec::with_capacity(access.size_hint().unwrap_or(0));
            while let Some((source, citation)) = access.next_entry::<String, String>()? {
                super::insert_source(&mut sources, source, citation);
            }
            Ok(sources)
        }
    }
}

/// A task whose findings are (at least partially) accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedRecord {
    pub task: ResearchTask,
    pub completed_items: Vec<String>,
    pub compressed_output: CompressedOutput,
}

/// Where a feedback entry came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "origin", content = "reason", rename_all = "snake_case")]
pub enum FeedbackOrigin {
    /// The reviewer judged the findings incomplete
    Reviewer,
    /// The pipeline failed before a verdict was reached
    Failure(FailureReason),
}

/// Remaining work for a task that is not done.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub task: ResearchTask,
    pub missing_items: Vec<MissingItem>,
    pub origin: FeedbackOrigin,
}

impl Feedback {
    pub fn is_failure(&self) -> bool {
        matches!(self.origin, FeedbackOrigin::Failure(_))
    }
}
