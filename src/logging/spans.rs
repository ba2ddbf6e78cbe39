//! Structured spans for pipeline stages
//!
//! Every stage of a registration run gets its own span carrying the run
//! correlation id, so that JSON log lines can be grouped per run.

use std::time::{Duration, Instant};
use tracing::{span, Level, Span};
use uuid::Uuid;

/// Span for one pipeline stage
pub struct StageSpan {
    span: Span,
    start_time: Instant,
    stage_name: String,
}

impl StageSpan {
    pub fn new(stage_name: &str, correlation_id: Option<Uuid>) -> Self {
        let span = if let Some(corr_id) = correlation_id {
            span!(
                Level::INFO,
                "pipeline_stage",
                stage = stage_name,
                correlation_id = %corr_id
            )
        } else {
            span!(Level::INFO, "pipeline_stage", stage = stage_name)
        };

        Self {
            span,
            start_time: Instant::now(),
            stage_name: stage_name.to_string(),
        }
    }

    pub fn stage_name(&self) -> &str {
        &self.stage_name
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Record the number of items the stage works on
    pub fn record_input(&self, items: usize) {
        tracing::debug!(
            parent: &self.span,
            stage = %self.stage_name,
            items,
            "Pipeline stage input recorded"
        );
    }

    /// Record stage completion and return its duration
    pub fn record_completion(&self, success: bool) -> Duration {
        let duration = self.start_time.elapsed();
        if success {
            tracing::info!(
                parent: &self.span,
                stage = %self.stage_name,
                success,
                execution_time_ms = duration.as_millis() as u64,
                "Pipeline stage completed"
            );
        } else {
            tracing::warn!(
                parent: &self.span,
                stage = %self.stage_name,
                success,
                execution_time_ms = duration.as_millis() as u64,
                "Pipeline stage failed"
            );
        }
        duration
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}
