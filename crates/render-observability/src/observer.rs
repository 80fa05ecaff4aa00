//! `RenderObserver` implementations backed by the logger and metrics.

use std::cell::RefCell;
use std::collections::HashMap;
use std::time::Duration;

use render_core::{RenderObserver, StreamPhase, StreamStats, TimingContext};

use crate::logging::{LogLevel, StructuredLogger};
use crate::metrics::{MetricsCollector, StreamMetrics};

/// Writes a structured log line for every phase change and a summary when
/// the stream finishes.
#[derive(Debug)]
pub struct LoggingObserver {
    logger: StructuredLogger,
}

impl LoggingObserver {
    /// Create an observer writing through `logger`.
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }

    /// Get the underlying logger.
    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }
}

impl RenderObserver for LoggingObserver {
    fn on_phase(&self, phase: &StreamPhase, elapsed: Duration) {
        let level = match phase {
            StreamPhase::Failed(_) => LogLevel::Error,
            StreamPhase::Destroyed => LogLevel::Warn,
            _ => LogLevel::Debug,
        };
        let mut fields = HashMap::new();
        fields.insert("phase".to_string(), serde_json::json!(phase.to_string()));
        fields.insert(
            "elapsed_ms".to_string(),
            serde_json::json!(elapsed.as_millis() as u64),
        );
        self.logger.log_with_fields(level, "render stream phase", fields);
    }

    fn on_finish(&self, stats: &StreamStats, timing: &TimingContext) {
        let mut fields = HashMap::new();
        fields.insert("pulls".to_string(), serde_json::json!(stats.pulls));
        fields.insert("chunks".to_string(), serde_json::json!(stats.chunks));
        fields.insert("chars".to_string(), serde_json::json!(stats.chars));
        fields.insert("pauses".to_string(), serde_json::json!(stats.pauses));
        if let Some(ttfc) = timing.time_to_first_chunk() {
            fields.insert(
                "time_to_first_chunk_us".to_string(),
                serde_json::json!(ttfc.as_micros() as u64),
            );
        }
        self.logger
            .log_with_fields(LogLevel::Info, "render stream finished", fields);
    }
}

/// Feeds a [`MetricsCollector`] from stream events.
#[derive(Debug)]
pub struct MetricsObserver {
    collector: RefCell<MetricsCollector>,
}

impl MetricsObserver {
    /// Create an observer for a stream label.
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            collector: RefCell::new(MetricsCollector::new(stream)),
        }
    }

    /// Snapshot the metrics gathered so far.
    pub fn snapshot(&self) -> StreamMetrics {
        self.collector.borrow().finish()
    }
}

impl RenderObserver for MetricsObserver {
    fn on_phase(&self, phase: &StreamPhase, _elapsed: Duration) {
        self.collector.borrow_mut().record_phase(phase);
    }

    fn on_chunk(&self, chars: usize, _elapsed: Duration) {
        self.collector.borrow_mut().record_chunk(chars);
    }

    fn on_finish(&self, stats: &StreamStats, timing: &TimingContext) {
        let mut collector = self.collector.borrow_mut();
        collector.record_stats(stats, timing);
        tracing::debug!(
            outcome = ?collector.outcome(),
            chunks = stats.chunks,
            chars = stats.chars,
            "render stream metrics recorded"
        );
    }
}
