//! Pytest-style rendering of test-plan runs.

use std::time::Duration;

use crate::harness::ExecutionResult;

/// How one plan ended, from the CLI's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed { executed: usize },
    Failed { executed: usize, message: String },
    TimedOut { after: Duration },
    /// The executor itself failed; details were logged.
    Aborted,
    /// The plan could not be loaded or the bridge reported a defect.
    Error(String),
}

impl Outcome {
    pub fn from_result(result: &ExecutionResult) -> Self {
        match &result.failure {
            None => Outcome::Passed {
                executed: result.executed,
            },
            Some(crate::harness::ExecutionFailure::Timeout { after }) => Outcome::TimedOut { after: *after },
            Some(failure) => Outcome::Failed {
                executed: result.executed,
                message: failure.to_string(),
            },
        }
    }

    pub fn is_pass(&self) -> bool {
        matches!(self, Outcome::Passed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    /// Plan file as given on the command line
    pub plan: String,
    /// Test name from the plan, when it could be read
    pub test_name: Option<String>,
    pub outcome: Outcome,
    /// Events in the trace collected for this run
    pub trace_events: usize,
}

#[derive(Debug, Clone, Copy)]
struct Palette {
    green: &'static str,
    red: &'static str,
    yellow: &'static str,
    bold: &'static str,
    reset: &'static str,
}

impl Palette {
    fn new(color: bool) -> Self {
        if color {
            Self {
                green: "\x1b[32m",
                red: "\x1b[31m",
                yellow: "\x1b[33m",
                bold: "\x1b[1m",
                reset: "\x1b[0m",
            }
        } else {
            Self {
                green: "",
                red: "",
                yellow: "",
                bold: "",
                reset: "",
            }
        }
    }
}

/// One status line, followed by an indented detail line for anything but a pass.
pub fn render_entry(entry: &ReportEntry, color: bool) -> String {
    let p = Palette::new(color);
    let id = match &entry.test_name {
        Some(name) => format!("{}::{}", entry.plan, name),
        None => entry.plan.clone(),
    };

    match &entry.outcome {
        Outcome::Passed { executed } => format!(
            "{id} {}PASSED{} ({executed} statements, {} trace events)\n",
            p.green, p.reset, entry.trace_events
        ),
        Outcome::Failed { executed, message } => format!(
            "{id} {}FAILED{} ({executed} statements, {} trace events)\n    {message}\n",
            p.red, p.reset, entry.trace_events
        ),
        Outcome::TimedOut { after } => format!(
            "{id} {}TIMEOUT{} (after {}ms)\n",
            p.yellow,
            p.reset,
            after.as_millis()
        ),
        Outcome::Aborted => format!("{id} {}ABORTED{} (executor failure, see log)\n", p.red, p.reset),
        Outcome::Error(message) => format!("{id} {}ERROR{}\n    {message}\n", p.red, p.reset),
    }
}

/// Closing `=== N passed, M failed in Xs ===` line.
pub fn render_summary(entries: &[ReportEntry], duration: Duration, color: bool) -> String {
    let p = Palette::new(color);
    let passed = entries.iter().filter(|e| e.outcome.is_pass()).count();
    let timed_out = entries
        .iter()
        .filter(|e| matches!(e.outcome, Outcome::TimedOut { .. }))
        .count();
    let failed = entries.len() - passed - timed_out;

    let mut parts = Vec::new();
    if passed > 0 {
        parts.push(format!("{passed} passed"));
    }
    if failed > 0 {
        parts.push(format!("{failed} failed"));
    }
    if timed_out > 0 {
        parts.push(format!("{timed_out} timed out"));
    }
    if parts.is_empty() {
        parts.push("no plans run".to_string());
    }

    let accent = if passed == entries.len() { p.green } else { p.red };
    format!(
        "{}{accent}=================== {} in {:.2}s ==================={}\n",
        p.bold,
        parts.join(", "),
        duration.as_secs_f64(),
        p.reset
    )
}

pub fn render_report(entries: &[ReportEntry], duration: Duration, color: bool) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&render_entry(entry, color));
    }
    out.push('\n');
    out.push_str(&render_summary(entries, duration, color));
    out
}
