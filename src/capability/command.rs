//! Process-backed capabilities.
//!
//! A `CommandCapability` runs a shell command per request: the request is
//! written to stdin as JSON and the response is read from stdout as JSON.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::traits::{PlannerDecision, PlanningContext, ResearchPlanner, ReviewReport, Reviewer, Summarizer, TaskExecutor};
use crate::domain::{CompressedOutput, RawOutput, ResearchTask};
use crate::error::{ConductorError, Result};

/// Configuration for a command-backed capability
#[derive(Debug, Clone)]
pub struct CommandConfig {
    /// The command to execute
    pub command: String,
    /// Environment variables to set
    pub env: Vec<(String, String)>,
    /// Timeout in milliseconds (default: 120000)
    pub timeout_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            command: String::new(),
            env: Vec::new(),
            timeout_ms: 120_000,
        }
    }
}

impl CommandConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Add an environment variable
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = ms;
        self
    }
}

#[derive(Serialize)]
struct TaskRequest<'a> {
    task: &'a ResearchTask,
}

/// Capability that shells out for every request
#[derive(Debug)]
pub struct CommandCapability {
    config: CommandConfig,
    name: String,
}

impl CommandCapability {
    pub fn new(name: impl Into<String>, config: CommandConfig) -> Self {
        Self {
            config,
            name: name.into(),
        }
    }

    /// Create a command capability with the default timeout
    pub fn simple(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self::new(name, CommandConfig::new(command))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn command(&self) -> &str {
        &self.config.command
    }

    /// Run the command with `input` on stdin and return its stdout.
    async fn run(&self, input: Vec<u8>) -> Result<String> {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(&self.config.command);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn()?;
        let stdin = child.stdin.take();
        let name = self.name.clone();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                // Commands that ignore their input close the pipe early
                if let Err(e) = stdin.write_all(&input).await {
                    debug!("Capability '{}' did not read its input: {}", name, e);
                }
                drop(stdin);
            }
        };

        let timeout = Duration::from_millis(self.config.timeout_ms);
        let (_, output) = match tokio::time::timeout(timeout, async { tokio::join!(feed, child.wait_with_output()) }).await
        {
            Ok(joined) => joined,
            Err(_) => {
                return Err(ConductorError::Capability(format!(
                    "'{}' timed out after {}ms",
                    self.name, self.config.timeout_ms
                )));
            }
        };
        let output = output?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let mut message = format!("'{}' failed with exit code: {:?}", self.name, output.status.code());
            if !stderr.trim().is_empty() {
                message.push_str(&format!(" stderr: {}", stderr.trim()));
            }
            return Err(ConductorError::Capability(message));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Send a JSON request and parse a JSON response.
    async fn call<Req, Resp>(&self, request: &Req) -> Result<Resp>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let stdout = self.run(serde_json::to_vec(request)?).await?;
        serde_json::from_str(stdout.trim()).map_err(|e| {
            ConductorError::Capability(format!("'{}' returned an invalid response: {}", self.name, e))
        })
    }
}

#[async_trait]
impl TaskExecutor for CommandCapability {
    /// Plain-text stdout is accepted as raw output as well as `{"output": ...}`.
    async fn execute(&self, task: &ResearchTask) -> Result<RawOutput> {
        let stdout = self.run(serde_json::to_vec(&TaskRequest { task })?).await?;
        Ok(serde_json::from_str::<RawOutput>(stdout.trim()).unwrap_or_else(|_| RawOutput::new(stdout)))
    }
}

#[async_trait]
impl Summarizer for CommandCapability {
    async fn compress(&self, raw: &RawOutput) -> Result<CompressedOutput> {
        self.call(raw).await
    }
}

#[async_trait]
impl Reviewer for CommandCapability {
    async fn verify(&self, compressed: &CompressedOutput) -> Result<ReviewReport> {
        self.call(compressed).await
    }
}

#[async_trait]
impl ResearchPlanner for CommandCapability {
    async fn plan(&self, context: &PlanningContext) -> Result<PlannerDecision> {
        self.call(context).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::traits::ReviewStatus;

    #[test]
    fn test_command_config_builder() {
        let config = CommandConfig::new("research.sh").env("MODEL", "small").timeout_ms(5000);
        assert_eq!(config.command, "research.sh");
        assert_eq!(config.env, vec![("MODEL".to_string(), "small".to_string())]);
        assert_eq!(config.timeout_ms, 5000);
        assert_eq!(CommandConfig::default().timeout_ms, 120_000);
    }

    #[tokio::test]
    async fn test_execute_accepts_plain_text() {
        let producer = CommandCapability::simple("producer", "cat >/dev/null; echo Tokyo has 14 million residents");
        let raw = producer.execute(&ResearchTask::from("Tokyo")).await.unwrap();
        assert!(raw.output.contains("14 million"));
    }

    #[tokio::test]
    async fn test_execute_accepts_json_output() {
        let producer = CommandCapability::simple("producer", r#"printf '{"output": "  "}'"#);
        let raw = producer.execute(&ResearchTask::from("Tokyo")).await.unwrap();
        assert!(raw.is_empty());
    }

    #[tokio::test]
    async fn test_execute_receives_task_on_stdin() {
        let producer = CommandCapability::simple("echo", "cat");
        let raw = producer.execute(&ResearchTask::from("population of Osaka")).await.unwrap();
        assert!(raw.output.contains("population of Osaka"));
    }

    #[tokio::test]
    async fn test_compress_parses_response() {
        let summarizer = CommandCapability::simple(
            "summarizer",
            r#"printf '{"findings": "14M [1]", "sources": {"https://stat.go.jp": "[1]"}}'"#,
        );
        let out = summarizer.compress(&RawOutput::new("raw")).await.unwrap();
        assert_eq!(out.findings, "14M [1]");
        assert_eq!(out.sources.len(), 1);
    }

    #[tokio::test]
    async fn test_verify_parses_report() {
        let reviewer = CommandCapability::simple(
            "reviewer",
            r#"printf '{"status": "incomplete", "completed": ["a"], "missing": [{"task": "b", "purpose": "c"}]}'"#,
        );
        let report = reviewer.verify(&CompressedOutput::new("x")).await.unwrap();
        assert_eq!(report.status, ReviewStatus::Incomplete);
        assert_eq!(report.missing.len(), 1);
    }

    #[tokio::test]
    async fn test_plan_parses_decision() {
        let planner = CommandCapability::simple("planner", r#"printf '{"decision": "complete"}'"#);
        let decision = planner.plan(&PlanningContext::default()).await.unwrap();
        assert_eq!(decision, PlannerDecision::Complete);
    }

    #[tokio::test]
    async fn test_invalid_json_is_capability_error() {
        let reviewer = CommandCapability::simple("reviewer", "echo not json");
        let err = reviewer.verify(&CompressedOutput::new("x")).await.unwrap_err();
        assert!(matches!(err, ConductorError::Capability(_)));
        assert!(err.to_string().contains("invalid response"));
    }

    #[tokio::test]
    async fn test_failed_command_reports_stderr() {
        let producer = CommandCapability::simple("producer", "echo quota exhausted >&2; exit 3");
        let err = producer.execute(&ResearchTask::from("x")).await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Some(3)"));
        assert!(message.contains("quota exhausted"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let producer = CommandCapability::new("slow", CommandConfig::new("sleep 10").timeout_ms(100));
        let err = producer.execute(&ResearchTask::from("x")).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let config = CommandConfig::new("cat >/dev/null; echo $REGION").env("REGION", "kansai");
        let producer = CommandCapability::new("env", config);
        let raw = producer.execute(&ResearchTask::from("x")).await.unwrap();
        assert_eq!(raw.output.trim(), "kansai");
    }
}
