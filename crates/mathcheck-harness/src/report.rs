//! Run summary

use std::fmt;
use std::time::Duration;

use crate::runner::{FunctionOutcome, FunctionReport};

/// Reports of every function tested in a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub reports: Vec<FunctionReport>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, report: FunctionReport) {
        self.reports.push(report);
    }

    pub fn passed(&self) -> usize {
        self.reports.iter().filter(|r| r.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.reports.len() - self.passed() - self.failed()
    }

    /// No function failed.
    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }

    /// Emit one event per function and a closing count.
    pub fn log(&self) {
        for report in &self.reports {
            match &report.outcome {
                FunctionOutcome::Passed { max_error, .. } => tracing::info!(
                    function = report.function,
                    precision = %report.precision,
                    relaxed = report.relaxed,
                    max_ulps = max_error.error,
                    "PASSED"
                ),
                FunctionOutcome::Failed(failure) => tracing::error!(
                    function = report.function,
                    precision = %report.precision,
                    relaxed = report.relaxed,
                    %failure,
                    "FAILED"
                ),
                FunctionOutcome::Skipped { reason } => tracing::warn!(
                    function = report.function,
                    precision = %report.precision,
                    %reason,
                    "SKIPPED"
                ),
            }
        }
        tracing::info!(
            passed = self.passed(),
            failed = self.failed(),
            skipped = self.skipped(),
            elapsed_ms = self.elapsed.as_millis() as u64,
            "run complete"
        );
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<16} {:<7} {:<8} {:<8} max_ulps", "function", "type", "mode", "result")?;
        for report in &self.reports {
            let mode = if report.relaxed { "relaxed" } else { "strict" };
            let (result, detail) = match &report.outcome {
                FunctionOutcome::Passed { max_error, .. } => ("passed", max_error.to_string()),
                FunctionOutcome::Failed(failure) => ("FAILED", failure.to_string()),
                FunctionOutcome::Skipped { reason } => ("skipped", reason.clone()),
            };
            writeln!(
                f,
                "{:<16} {:<7} {:<8} {:<8} {}",
                report.function,
                report.precision.type_name(),
                mode,
                result,
                detail
            )?;
        }
        write!(
            f,
            "{} passed, {} failed, {} skipped in {:.1}s",
            self.passed(),
            self.failed(),
            self.skipped(),
            self.elapsed.as_secs_f64()
        )
    }
}
