//! Progress reporting for pipeline stage transitions

use crate::models::Stage;

/// Receives human-readable progress lines as the pipeline advances
pub trait ProgressReporter: Send + Sync {
    fn report(&self, stage: Stage, message: &str);

    /// Non-fatal problem; defaults to a regular line
    fn warn(&self, stage: Stage, message: &str) {
        self.report(stage, message);
    }
}

/// Writes progress through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgress;

impl ProgressReporter for TracingProgress {
    fn report(&self, stage: Stage, message: &str) {
        tracing::info!(stage = %stage, "{}", message);
    }

    fn warn(&self, stage: Stage, message: &str) {
        tracing::warn!(stage = %stage, "{}", message);
    }
}
