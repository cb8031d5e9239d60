//! CLI module for tracebridge
//!
//! ## Commands
//!
//! - `run <PLAN>...` - Run JSON test plans through the coordinator and report (pytest-style)
//! - `resolve <NAME>...` - Show which namespace supplies each name
//!
//! ## Design
//!
//! The CLI uses clap for argument parsing with derive macros.
//! Command functions return `CliResult<T>` instead of calling `process::exit`.
//! Only the top-level `run()` function handles errors and exits.

// Enforce explicit error handling - no panicking in production code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

pub mod commands;
pub mod report;

use std::fmt;
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use crate::config::DEFAULT_CONFIG_FILE;
use crate::version::TRACEBRIDGE_VERSION;

// ============================================================================
// CLI Error handling
// ============================================================================

/// Exit code for CLI operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitCode(pub i32);

impl ExitCode {
    pub const SUCCESS: ExitCode = ExitCode(0);
    pub const FAILURE: ExitCode = ExitCode(1);
}

/// User-facing message plus the exit code to leave with.
#[derive(Debug)]
pub struct CliError {
    /// Already formatted for display
    pub message: String,
    pub exit_code: ExitCode,
}

impl CliError {
    pub fn new(message: impl Into<String>, exit_code: ExitCode) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    /// Exit code 1.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::new(message, ExitCode::FAILURE)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub type CliResult<T> = Result<T, CliError>;

// ============================================================================
// Clap CLI definition
// ============================================================================

/// Run generated test cases against instrumented code while collecting traces
#[derive(Parser, Debug)]
#[command(name = "tracebridge")]
#[command(version = TRACEBRIDGE_VERSION)]
#[command(about = "Run generated test cases against instrumented code while collecting traces", long_about = None)]
pub struct Cli {
    /// Bridge configuration file
    #[arg(short, long, global = true, value_name = "FILE", default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run JSON test plans
    Run {
        /// Test plan files, run in order
        #[arg(value_name = "PLAN", required = true)]
        plans: Vec<PathBuf>,
    },

    /// Resolve qualified names through the instrumented and origin namespaces
    Resolve {
        /// Fully qualified names
        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,
    },
}

// ============================================================================
// CLI entry point
// ============================================================================

/// Main CLI entry point.
///
/// This is the only place where `process::exit` is called.
pub fn run() {
    let cli = Cli::parse();

    match execute(cli) {
        Ok(exit_code) => {
            if exit_code.0 != 0 {
                process::exit(exit_code.0);
            }
        }
        Err(e) => {
            if !e.message.is_empty() {
                eprintln!("{}", e.message);
            }
            process::exit(e.exit_code.0);
        }
    }
}

fn execute(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Command::Run { plans } => commands::run_plans(&cli.config, &plans),
        Command::Resolve { names } => commands::resolve_names(&cli.config, &names),
    }
}

// ============================================================================
// Tests
// ============================================================================
