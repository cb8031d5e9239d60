//! CLI command implementations
//!
//! All command functions return `CliResult<ExitCode>` instead of calling
//! `process::exit`. Error handling and exits happen in the top-level `run()`.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use miette::Diagnostic;

use super::report::{self, Outcome, ReportEntry};
use super::{CliError, CliResult, ExitCode};
use crate::config::BridgeConfig;
use crate::coordinator::{self, Coordinator};
use crate::harness::{ScriptedTestCase, TestCase};
use crate::observer::TraceObserver;

/// Render a diagnostic the way miette's graphical handler does.
fn diagnostic_error(error: impl Diagnostic + Send + Sync + 'static) -> CliError {
    CliError::failure(format!("{:?}", miette::Report::new(error)))
}

fn load_config(path: &Path) -> CliResult<BridgeConfig> {
    BridgeConfig::load(path).map_err(diagnostic_error)
}

// ============================================================================
// run
// ============================================================================

/// Run every plan through the process-wide coordinator and print a pytest-style report.
pub fn run_plans(config_path: &Path, plans: &[PathBuf]) -> CliResult<ExitCode> {
    let coordinator = coordinator::instance_or_init(config_path).map_err(diagnostic_error)?;

    let color = std::io::stdout().is_terminal();
    let started = Instant::now();
    let mut entries = Vec::with_capacity(plans.len());

    for plan in plans {
        let entry = run_plan(coordinator, plan);
        print!("{}", report::render_entry(&entry, color));
        entries.push(entry);
    }

    println!();
    print!("{}", report::render_summary(&entries, started.elapsed(), color));

    let stats = coordinator.resolver().stats();
    tracing::info!(
        cached = coordinator.resolver().cached_len(),
        hits = stats.hits,
        misses = stats.misses,
        "resolver statistics"
    );

    if entries.iter().all(|e| e.outcome.is_pass()) {
        Ok(ExitCode::SUCCESS)
    } else {
        // Summary already printed
        Err(CliError::new("", ExitCode::FAILURE))
    }
}

fn run_plan(coordinator: &Coordinator, plan: &Path) -> ReportEntry {
    let plan_label = plan.display().to_string();
    let mut case = match ScriptedTestCase::from_path(plan) {
        Ok(case) => case,
        Err(e) => {
            return ReportEntry {
                plan: plan_label,
                test_name: None,
                outcome: Outcome::Error(e.to_string()),
                trace_events: 0,
            };
        }
    };

    let observer = Arc::new(TraceObserver::new(
        Arc::clone(coordinator.session()),
        Arc::clone(coordinator.proxy()),
    ));
    let outcome = match coordinator.run_with_observer(&mut case, Arc::clone(&observer)) {
        Ok(Some(result)) => Outcome::from_result(&result),
        Ok(None) => Outcome::Aborted,
        Err(e) => Outcome::Error(e.to_string()),
    };
    let trace_events = observer.active_collector().event_count();

    ReportEntry {
        plan: plan_label,
        test_name: Some(case.name().to_string()),
        outcome,
        trace_events,
    }
}

// ============================================================================
// resolve
// ============================================================================

/// Resolve each name and print which namespace supplied it.
pub fn resolve_names(config_path: &Path, names: &[String]) -> CliResult<ExitCode> {
    let config = load_config(config_path)?;
    let resolver = Coordinator::resolver_for(&config);

    let mut failures = 0;
    for name in names {
        match resolver.resolve(name) {
            Ok(unit) => println!("{name} -> {} ({} bytes)", unit.origin, unit.definition.len()),
            Err(e) => {
                failures += 1;
                eprintln!("{name} -> error: {e}");
            }
        }
    }

    if failures == 0 {
        Ok(ExitCode::SUCCESS)
    } else {
        Err(CliError::failure(format!("{failures} of {} names failed to resolve", names.len())))
    }
}
