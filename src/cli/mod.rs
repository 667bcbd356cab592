//! CLI module for conductor - command-line interface and subcommands.
//!
//! Provides the main entry point with subcommands for running a single
//! research batch, a supervised session, or validating a job file.

pub mod commands;

pub use commands::Cli;
