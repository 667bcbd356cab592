//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - conduct: run one batch of research jobs
//! - supervise: run planner-driven rounds until done
//! - validate: check a job file without running it

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Conductor - a research orchestration engine
#[derive(Parser, Debug)]
#[command(name = "conductor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one batch of research jobs and print the digest
    Conduct {
        /// YAML file listing the research jobs
        jobs: PathBuf,

        /// Include compressed findings in the digest
        #[arg(short, long)]
        findings: bool,
    },

    /// Run the supervisor loop with the configured planner
    Supervise {
        /// Research question handed to the planner
        #[arg(short, long)]
        query: Option<String>,

        /// Override the configured maximum number of rounds
        #[arg(long)]
        max_rounds: Option<u32>,

        /// Override the configured tool-call budget
        #[arg(long)]
        max_tool_calls: Option<usize>,
    },

    /// Validate a job file without running it
    Validate {
        /// YAML file listing the research jobs
        jobs: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_conduct() {
        let cli = Cli::parse_from(["conductor", "conduct", "jobs.yml", "--findings"]);
        match cli.command {
            Commands::Conduct { jobs, findings } => {
                assert_eq!(jobs, PathBuf::from("jobs.yml"));
                assert!(findings);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_supervise_with_global_flags() {
        let cli = Cli::parse_from([
            "conductor",
            "supervise",
            "--query",
            "population of Japan",
            "--max-rounds",
            "2",
            "-v",
            "--config",
            "c.yml",
        ]);
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("c.yml")));
        match cli.command {
            Commands::Supervise {
                query,
                max_rounds,
                max_tool_calls,
            } => {
                assert_eq!(query.as_deref(), Some("population of Japan"));
                assert_eq!(max_rounds, Some(2));
                assert_eq!(max_tool_calls, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_validate() {
        let cli = Cli::parse_from(["conductor", "validate", "jobs.yml"]);
        assert!(matches!(cli.command, Commands::Validate { .. }));
    }
}
