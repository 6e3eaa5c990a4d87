//! Timing of verification work
//!
//! Three measurements come out of a run: program builds, individual jobs and
//! whole builtins (reported as nanoseconds per element, the figure a timing
//! run compares between devices). [`PerformanceSpan`] times arbitrary scopes.
//!
//! ```rust
//! use mathcheck_tracing::performance::{record_function_timing, PerformanceSpan};
//!
//! let timer = PerformanceSpan::new("sin float", Some(100));
//! // ... verify ...
//! drop(timer); // logged only if it took at least 100us
//!
//! record_function_timing("sin", "float", 1 << 20, 5_000);
//! ```

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

use tracing::{Level, Span};

static ENABLED: AtomicBool = AtomicBool::new(true);
static THRESHOLD_US: AtomicU64 = AtomicU64::new(NO_THRESHOLD);
const NO_THRESHOLD: u64 = u64::MAX;

/// Turn span logging on or off and set the threshold used by spans created
/// without one.
pub fn configure(enabled: bool, threshold_us: Option<u64>) {
    ENABLED.store(enabled, Ordering::Relaxed);
    THRESHOLD_US.store(threshold_us.unwrap_or(NO_THRESHOLD), Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

fn configured_threshold() -> Option<u64> {
    Some(THRESHOLD_US.load(Ordering::Relaxed)).filter(|&t| t != NO_THRESHOLD)
}

/// Scope timer that logs one completion event when dropped.
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    started: Instant,
    span: Span,
}

impl PerformanceSpan {
    /// Timer in a fresh debug span. `threshold_us` defaults to the
    /// configured one.
    pub fn new(name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, name, threshold_us)
    }

    pub fn with_level(level: Level, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %name),
            Level::DEBUG => tracing::debug_span!("perf", name = %name),
            Level::INFO => tracing::info_span!("perf", name = %name),
            Level::WARN => tracing::warn_span!("perf", name = %name),
            Level::ERROR => tracing::error_span!("perf", name = %name),
        };
        Self::in_span(span, name, threshold_us)
    }

    /// Timer reporting inside an existing span, e.g. one carrying the builtin
    /// and precision as fields.
    pub fn in_span(span: Span, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self {
            name: name.into(),
            threshold_us: threshold_us.or_else(configured_threshold),
            started: Instant::now(),
            span,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn elapsed_us(&self) -> u64 {
        self.started.elapsed().as_micros() as u64
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    fn should_log(&self, elapsed_us: u64) -> bool {
        is_enabled() && self.threshold_us.map_or(true, |t| elapsed_us >= t)
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.should_log(elapsed_us) {
            let _entered = self.span.enter();
            tracing::debug!(elapsed_us, elapsed_ms = elapsed_us as f64 / 1000.0, "perf_complete");
        }
    }
}

/// Whole-builtin timing: `elements` results verified in `elapsed_us`.
pub fn record_function_timing(function: &str, precision: &str, elements: u64, elapsed_us: u64) {
    let ns_per_element = match elements {
        0 => 0.0,
        n => elapsed_us as f64 * 1000.0 / n as f64,
    };
    tracing::info!(function, precision, elements, elapsed_us, ns_per_element, "function_timing");
}

/// Build time of one kernel.
pub fn record_build(kernel: &str, function: &str, elapsed_us: u64) {
    tracing::debug!(kernel, function, elapsed_us, "program_built");
}

/// Completion of one job.
pub fn record_job(job_id: u32, elements: usize, elapsed_us: u64) {
    let elements_per_sec = match elapsed_us {
        0 => 0.0,
        us => elements as f64 * 1_000_000.0 / us as f64,
    };
    tracing::trace!(job_id, elements, elapsed_us, elements_per_sec, "job_done");
}
