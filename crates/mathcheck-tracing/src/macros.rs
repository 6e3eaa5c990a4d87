//! Timing macros

/// Create a [`PerformanceSpan`](crate::performance::PerformanceSpan).
///
/// Extra `key = value` fields are recorded on the span the timer logs in, so
/// the completion event carries them.
///
/// ```rust
/// use mathcheck_tracing::perf_span;
///
/// let timer = perf_span!("verify_function", function = "sin", precision = "float");
/// assert_eq!(timer.name(), "verify_function");
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {
        $crate::performance::PerformanceSpan::new($name, None)
    };
    ($name:expr, $($field:ident = $value:expr),+ $(,)?) => {
        $crate::performance::PerformanceSpan::in_span(
            tracing::debug_span!("perf", name = $name, $($field = $value),+),
            $name,
            None,
        )
    };
}

/// Evaluate a block, returning its value and the time it took in
/// microseconds.
///
/// ```rust
/// use mathcheck_tracing::timed_block;
///
/// let (product, _us) = timed_block!("product", { (1..=5u64).product::<u64>() });
/// assert_eq!(product, 120);
/// ```
#[macro_export]
macro_rules! timed_block {
    ($name:expr, $block:block) => {{
        let started = std::time::Instant::now();
        let value = $block;
        let elapsed_us = started.elapsed().as_micros() as u64;
        tracing::trace!(operation = $name, elapsed_us, "timed");
        (value, elapsed_us)
    }};
}
