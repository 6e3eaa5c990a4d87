//! Worst-case error tracking

use std::fmt;

use crate::float::hex_float;

/// Largest error observed so far and the arguments that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaxError {
    /// Magnitude of the worst error.
    pub error: f32,
    /// Arguments of the worst element, widened to `f64`.
    pub inputs: Vec<f64>,
    /// Largest integer side-result deviation.
    pub int_error: i64,
}

impl MaxError {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `error` for `inputs` if it is the new worst case.
    pub fn record(&mut self, error: f32, inputs: &[f64]) {
        let magnitude = error.abs();
        if magnitude > self.error || (magnitude.is_nan() && !self.error.is_nan()) {
            self.error = magnitude;
            self.inputs.clear();
            self.inputs.extend_from_slice(inputs);
        }
    }

    pub fn record_int(&mut self, deviation: i64) {
        self.int_error = self.int_error.max(deviation.saturating_abs());
    }

    /// Fold another worker's maximum into this one.
    pub fn merge(&mut self, other: &MaxError) {
        self.record(other.error, &other.inputs);
        self.record_int(other.int_error);
    }

    /// Fold every worker's maximum.
    pub fn combine<'a>(parts: impl IntoIterator<Item = &'a MaxError>) -> MaxError {
        parts.into_iter().fold(MaxError::new(), |mut total, part| {
            total.merge(part);
            total
        })
    }
}

impl fmt::Display for MaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ulps", self.error)?;
        if !self.inputs.is_empty() {
            let inputs: Vec<String> = self.inputs.iter().map(|&x| hex_float(x)).collect();
            write!(f, " at {{{}}}", inputs.join(", "))?;
        }
        if self.int_error != 0 {
            write!(f, ", max integer error {}", self.int_error)?;
        }
        Ok(())
    }
}
