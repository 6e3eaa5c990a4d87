//! Subscriber setup shared by the `mathcheck` binary and the test suites.
//!
//! Verification runs emit three streams of events: per-function results from
//! the runner, per-job detail from the dispatcher, and progress markers on the
//! `mathcheck::progress` target. [`TracingConfig`] decides which of them reach
//! the terminal and in what shape; [`init_global_tracing`] installs it.

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;

use tracing::Subscriber;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Target of the periodic progress markers emitted while a builtin runs.
pub const PROGRESS_TARGET: &str = "mathcheck::progress";

const ENGINE_DEBUG: &str = "mathcheck_core=debug,mathcheck_device=debug,mathcheck_harness=debug";

/// Errors raised while installing the subscriber.
#[derive(Debug, thiserror::Error)]
pub enum TracingSetupError {
    #[error("invalid tracing directive: {0}")]
    InvalidFilter(String),

    /// Usually a subscriber was already installed.
    #[error("failed to install global tracing subscriber: {0}")]
    SubscriberInit(#[from] tracing_subscriber::util::TryInitError),
}

/// Shape of the formatted output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// Process-wide logging behaviour for a run.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Explicit filter directives. When unset, `RUST_LOG` is consulted and
    /// then `level`.
    pub directives: Option<String>,
    /// Level used when nothing else selects one.
    pub level: &'static str,
    pub output: TracingOutput,
    pub ansi: bool,
    pub targets: bool,
    /// Emit span close events with their busy time.
    pub span_timings: bool,
    /// Let progress markers through the filter.
    pub progress: bool,
    /// Log [`performance::PerformanceSpan`] completions.
    pub performance: bool,
    /// Only log performance spans at least this long.
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Terminal output: results, skips and progress.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            level: "info",
            output: TracingOutput::Compact,
            ansi: true,
            targets: false,
            span_timings: false,
            progress: true,
            performance: cfg!(debug_assertions),
            performance_threshold_us: None,
        }
    }

    /// JSON lines for log collection; progress markers are dropped.
    pub fn for_ci() -> Self {
        Self {
            output: TracingOutput::Json,
            ansi: false,
            targets: true,
            progress: false,
            performance: false,
            ..Self::for_local()
        }
    }

    /// Per-job detail from every engine crate, with span timings.
    pub fn for_verbose() -> Self {
        Self {
            directives: Some(format!("{ENGINE_DEBUG},info")),
            output: TracingOutput::Pretty,
            targets: true,
            span_timings: true,
            performance: true,
            ..Self::for_local()
        }
    }

    /// Warnings and failures only.
    pub fn for_quiet() -> Self {
        Self {
            level: "warn",
            progress: false,
            performance: false,
            ..Self::for_local()
        }
    }

    /// A preset chosen and adjusted by the environment.
    ///
    /// # Environment Variables
    ///
    /// - `MATHCHECK_TRACING_PROFILE` - `local` (default), `ci`, `verbose` or `quiet`
    /// - `MATHCHECK_TRACING_DIRECTIVES` - filter directives
    /// - `MATHCHECK_TRACING_FORMAT` - `pretty`, `compact` or `json`
    /// - `MATHCHECK_PROGRESS` - show progress markers
    /// - `MATHCHECK_PERF_TRACING` - log performance spans
    /// - `MATHCHECK_PERF_THRESHOLD_US` - shortest performance span logged
    pub fn from_env() -> Self {
        let mut config = match env::var("MATHCHECK_TRACING_PROFILE")
            .map(|p| p.to_ascii_lowercase())
            .as_deref()
        {
            Ok("ci") => Self::for_ci(),
            Ok("verbose") => Self::for_verbose(),
            Ok("quiet") => Self::for_quiet(),
            _ => Self::for_local(),
        };

        if let Some(directives) = env::var("MATHCHECK_TRACING_DIRECTIVES")
            .ok()
            .filter(|d| !d.trim().is_empty())
        {
            config.directives = Some(directives);
        }
        if let Some(output) = env::var("MATHCHECK_TRACING_FORMAT")
            .ok()
            .and_then(|v| TracingOutput::parse(&v))
        {
            config.output = output;
        }
        if let Some(progress) = env_flag("MATHCHECK_PROGRESS") {
            config.progress = progress;
        }
        if let Some(performance) = env_flag("MATHCHECK_PERF_TRACING") {
            config.performance = performance;
        }
        if let Some(threshold) = env::var("MATHCHECK_PERF_THRESHOLD_US")
            .ok()
            .and_then(|v| v.trim().parse().ok())
        {
            config.performance_threshold_us = Some(threshold);
        }
        config
    }

    fn filter(&self) -> Result<EnvFilter, TracingSetupError> {
        let mut filter = match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))?
            }
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level)),
        };
        let progress = if self.progress { "info" } else { "off" };
        let directive: Directive = format!("{PROGRESS_TARGET}={progress}")
            .parse()
            .map_err(|err: ParseError| TracingSetupError::InvalidFilter(err.to_string()))?;
        filter = filter.add_directive(directive);
        Ok(filter)
    }

    fn span_events(&self) -> FmtSpan {
        if self.span_timings {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        }
    }
}

fn env_flag(key: &str) -> Option<bool> {
    let value = env::var(key).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

fn output_layer(config: &TracingConfig) -> BoxedLayer {
    let base = fmt::layer()
        .with_target(config.targets)
        .with_span_events(config.span_events());
    match config.output {
        TracingOutput::Compact => Box::new(base.compact().with_ansi(config.ansi)),
        TracingOutput::Pretty => Box::new(base.pretty().with_ansi(config.ansi)),
        TracingOutput::Json => Box::new(base.json().with_ansi(false)),
    }
}

/// Build a subscriber for `config` without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let filter = config.filter()?;
    Ok(Registry::default().with(output_layer(config)).with(filter))
}

/// Install the configured subscriber as the process-wide default.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    build_subscriber(config)?.try_init()?;
    performance::configure(config.performance, config.performance_threshold_us);
    Ok(())
}
