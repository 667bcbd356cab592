use clap::Parser;
use colored::*;
use eyre::{Context, Result};
use log::info;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use conductor::capability::ResearchPlanner;
use conductor::domain::{ResearchJob, validate_batch};
use conductor::events::{
    AuditLogger, ChannelForwarder, Event, EventBus, EventFilter, EventPriority, EventType, MetricsCollector,
    ProgressTracker,
};
use conductor::executor::{Instrumented, TaskPlanExecutor};
use conductor::feedback::DigestFormatter;
use conductor::id::generate_session_id;
use conductor::pipeline::ResearchPipeline;
use conductor::supervisor::{BudgetWatcher, Supervisor};
use conductor::Conductor;

mod cli;
mod config;

use cli::Cli;
use cli::commands::Commands;
use config::Config;

fn setup_logging(config: &Config) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("conductor")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("conductor.log");

    // Setup env_logger with file output
    let target = Box::new(
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .context("Failed to open log file")?,
    );

    // RUST_LOG wins over the configured level
    let mut builder = env_logger::Builder::new();
    builder.parse_filters(config.log_level.as_deref().unwrap_or("info"));
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.target(env_logger::Target::Pipe(target)).init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

/// A YAML job file: either a list of jobs or a mapping with `jobs`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JobFile {
    Listed(Vec<ResearchJob>),
    Described {
        #[serde(default)]
        query: Option<String>,
        jobs: Vec<ResearchJob>,
    },
}

impl JobFile {
    fn into_jobs(self) -> Vec<ResearchJob> {
        match self {
            JobFile::Listed(jobs) => jobs,
            JobFile::Described { query, jobs } => {
                if let Some(query) = query {
                    info!("Job file query: {}", query);
                }
                jobs
            }
        }
    }
}

fn load_jobs(path: &Path) -> Result<Vec<ResearchJob>> {
    let content = fs::read_to_string(path).context(format!("Failed to read job file {}", path.display()))?;
    let file: JobFile =
        serde_yaml::from_str(&content).context(format!("Failed to parse job file {}", path.display()))?;
    Ok(file.into_jobs())
}

/// Everything a research session needs, wired onto one event bus.
struct Session {
    id: String,
    bus: Arc<EventBus>,
    tracker: Arc<ProgressTracker>,
    metrics: Arc<MetricsCollector>,
    executor: Arc<Instrumented<TaskPlanExecutor>>,
    cancel: CancellationToken,
    live: Option<JoinHandle<()>>,
}

impl Session {
    /// Build the pipeline and executor; `extra` subscribes session-specific handlers
    fn build(config: &Config, verbose: bool, extra: impl FnOnce(&mut EventBus, &str, &CancellationToken)) -> Result<Self> {
        let id = generate_session_id();
        let cancel = CancellationToken::new();
        let mut bus = EventBus::new();

        let tracker = Arc::new(ProgressTracker::new());
        bus.subscribe(tracker.clone(), EventFilter::All, EventPriority::High);
        let metrics = Arc::new(MetricsCollector::new());
        bus.subscribe(metrics.clone(), EventFilter::All, EventPriority::Normal);
        if config.events.audit {
            bus.subscribe(Arc::new(AuditLogger::new()), EventFilter::All, EventPriority::Low);
        }
        let live = if verbose {
            let (forwarder, rx) = ChannelForwarder::channel(config.events.forward_capacity);
            bus.subscribe(Arc::new(forwarder), EventFilter::All, EventPriority::Normal);
            Some(tokio::spawn(print_live_events(rx)))
        } else {
            None
        };
        extra(&mut bus, &id, &cancel);
        bus.start();
        let bus = Arc::new(bus);

        let caps = &config.capabilities;
        let pipeline = ResearchPipeline::new(
            Arc::new(caps.producer.build("producer")?),
            Arc::new(caps.summarizer.build("summarizer")?),
            Arc::new(caps.reviewer.build("reviewer")?),
            bus.clone(),
        )
        .with_config(config.pipeline())
        .with_session(&id)
        .with_correlation(&id);
        let executor = Arc::new(Instrumented::new(TaskPlanExecutor::new(Arc::new(pipeline))).with_label(&id));

        // Ctrl-C cancels every running job of the session
        let interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupt.cancel();
            }
        });

        Ok(Self {
            id,
            bus,
            tracker,
            metrics,
            executor,
            cancel,
            live,
        })
    }

    /// Stop the session, then pass the command's `result` through.
    fn finish<T>(self, result: Result<T>) -> Result<T> {
        self.bus.stop();
        if let Some(handle) = self.live {
            handle.abort();
        }
        let stats = self.executor.stats();
        info!("Session {} executor stats: {:?}", self.id, stats);
        info!("Session {} metrics: {:?}", self.id, self.metrics.metrics());
        if let Some(progress) = self.tracker.snapshot(&self.id) {
            println!(
                "{} {} task(s): {} completed, {} failed",
                "Progress:".cyan(),
                progress.total_tasks,
                progress.completed_tasks.to_string().green(),
                progress.failed_tasks.to_string().red()
            );
        }
        result
    }
}

async fn print_live_events(mut rx: tokio::sync::mpsc::Receiver<Event>) {
    while let Some(event) = rx.recv().await {
        let label = match event.event_type {
            EventType::TaskFailed => event.event_type.to_string().red(),
            EventType::TaskCompleted => event.event_type.to_string().green(),
            _ => event.event_type.to_string().dimmed(),
        };
        let detail = event
            .data
            .get("task_description")
            .and_then(|v| v.as_str())
            .unwrap_or_default();
        println!("  {} {} {}", label, event.aggregate_id, detail);
    }
}

async fn handle_conduct_command(jobs: &Path, findings: bool, cli: &Cli, config: &Config) -> Result<()> {
    let jobs = load_jobs(jobs)?;
    info!("Conducting {} job(s)", jobs.len());
    println!("{} {} job(s)", "Conducting:".green(), jobs.len());

    let session = Session::build(config, cli.is_verbose(), |_, _, _| {})?;
    let conductor = Conductor::new(session.executor.clone())
        .with_formatter(DigestFormatter::new().with_findings(findings))
        .with_cancellation(session.cancel.clone());

    let result = conductor.conduct_research(jobs).await.context("Research batch failed");
    let digest = session.finish(result)?;
    println!("{}", digest);
    Ok(())
}

async fn handle_supervise_command(
    query: Option<&str>,
    max_rounds: Option<u32>,
    max_tool_calls: Option<usize>,
    cli: &Cli,
    config: &Config,
) -> Result<()> {
    let mut budget = config.budget();
    if let Some(rounds) = max_rounds {
        budget = budget.with_max_rounds(rounds);
    }
    if let Some(calls) = max_tool_calls {
        budget = budget.with_max_tool_calls(calls);
    }
    let planner: Arc<dyn ResearchPlanner> = Arc::new(config.capabilities.planner.build("planner")?);

    let mut watcher = None;
    let session = Session::build(config, cli.is_verbose(), |bus, id, cancel| {
        let w = BudgetWatcher::new(id, budget.max_tool_calls, cancel.clone());
        w.install(bus);
        watcher = Some(w);
    })?;
    println!("{} session {}", "Supervising:".green(), session.id);

    let mut supervisor = Supervisor::new(planner, session.executor.clone(), session.bus.clone())
        .with_budget(budget)
        .with_session(&session.id)
        .with_cancellation(session.cancel.clone());
    if let Some(query) = query {
        supervisor = supervisor.with_query(query);
    }
    if let Some(watcher) = watcher {
        supervisor = supervisor.with_watcher(watcher);
    }

    let result = supervisor.run().await.context("Supervisor failed");
    let report = session.finish(result)?;
    println!("{}", report.digest(&DigestFormatter::new()));

    let reason = if report.stop_reason.is_completion() {
        report.stop_reason.to_string().green()
    } else {
        report.stop_reason.to_string().yellow()
    };
    println!(
        "{} {} after {} round(s), {} tool call(s)",
        "Stopped:".cyan(),
        reason,
        report.rounds,
        report.tool_calls_used
    );
    Ok(())
}

fn handle_validate_command(jobs: &Path) -> Result<()> {
    let loaded = load_jobs(jobs)?;
    match validate_batch(&loaded) {
        Ok(()) => {
            let tasks: usize = loaded.iter().map(ResearchJob::len).sum();
            println!(
                "{} {} job(s), {} task(s)",
                "Valid:".green(),
                loaded.len(),
                tasks
            );
            Ok(())
        }
        Err(e) => {
            println!("{} {}", "Invalid:".red(), e);
            Err(e).context(format!("Job file {} is invalid", jobs.display()))
        }
    }
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    if cli.is_verbose() {
        println!("{}", "Verbose mode enabled".yellow());
    }

    match &cli.command {
        Commands::Conduct { jobs, findings } => handle_conduct_command(jobs, *findings, cli, config).await,
        Commands::Supervise {
            query,
            max_rounds,
            max_tool_calls,
        } => handle_supervise_command(query.as_deref(), *max_rounds, *max_tool_calls, cli, config).await,
        Commands::Validate { jobs } => handle_validate_command(jobs),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    // Setup logging before any work starts
    setup_logging(&config).context("Failed to setup logging")?;

    info!("Starting with config from: {:?}", cli.config);

    // Run the main application logic
    run_application(&cli, &config).await.context("Application failed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn job_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", content).unwrap();
        file
    }

    #[test]
    fn test_load_listed_jobs() {
        let file = job_file("- tasks: [Tokyo]\n- tasks: [Osaka, Kyoto]\n");
        let jobs = load_jobs(file.path()).unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs[1].is_sequential());
    }

    #[test]
    fn test_load_described_jobs() {
        let file = job_file("query: population of Japan\njobs:\n  - id: job-a\n    tasks: [Tokyo]\n");
        let jobs = load_jobs(file.path()).unwrap();
        assert_eq!(jobs[0].id, "job-a");
    }

    #[test]
    fn test_validate_command_rejects_blank_task() {
        let file = job_file("- tasks: ['  ']\n");
        assert!(handle_validate_command(file.path()).is_err());
        let file = job_file("- tasks: [Tokyo]\n");
        assert!(handle_validate_command(file.path()).is_ok());
    }

    fn configured() -> Config {
        let mut config = Config::default();
        config.events.audit = false;
        for cap in [
            &mut config.capabilities.producer,
            &mut config.capabilities.summarizer,
            &mut config.capabilities.reviewer,
        ] {
            cap.command = "cat".to_string();
        }
        config
    }

    #[tokio::test]
    async fn test_session_finishes_when_command_fails() {
        let session = Session::build(&configured(), false, |_, _, _| {}).unwrap();
        let bus = session.bus.clone();
        assert!(bus.is_running());

        let result: Result<()> = session.finish(Err(eyre::eyre!("research batch failed")));

        assert_eq!(result.unwrap_err().to_string(), "research batch failed");
        assert!(!bus.is_running());
    }

    #[tokio::test]
    async fn test_session_collects_metrics() {
        let session = Session::build(&configured(), false, |_, _, _| {}).unwrap();
        session
            .bus
            .publish(Event::session_started(&session.id, Some("population of Japan")))
            .await
            .unwrap();

        assert_eq!(session.metrics.metrics().total_sessions, 1);
        assert_eq!(session.finish(Ok(7)).unwrap(), 7);
    }
}
