//! Per-stream timing and throughput metrics.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use render_core::{StreamPhase, StreamStats, TimingContext};
use serde::{Deserialize, Serialize};

/// How a stream finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StreamOutcome {
    /// Still producing output.
    InProgress,
    /// The producer ended normally.
    Completed,
    /// The stream failed.
    Failed {
        /// Error message.
        error: String,
    },
    /// The consumer cancelled the stream.
    Destroyed,
}

/// Metrics for a single render stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamMetrics {
    /// Stream label.
    pub stream: String,
    /// Wall-clock time the collector was created.
    pub started_at: DateTime<Utc>,
    /// Consumer pulls handled.
    pub pulls: u64,
    /// Chunks delivered.
    pub chunks: u64,
    /// Characters delivered.
    pub chars: u64,
    /// Backpressure pauses.
    pub pauses: u64,
    /// Continuations parked to bound recursion.
    pub trampoline_yields: u64,
    /// Deepest inline continuation nesting.
    pub max_depth: usize,
    /// Time to first chunk (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_first_chunk_us: Option<u64>,
    /// Time until the producer ended (microseconds).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_to_end_us: Option<u64>,
    /// Total stream duration (microseconds).
    pub total_duration_us: u64,
    /// Final outcome.
    pub outcome: StreamOutcome,
}

impl StreamMetrics {
    /// Format as JSON string.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Average characters per delivered chunk.
    pub fn average_chunk_chars(&self) -> Option<f64> {
        (self.chunks > 0).then(|| self.chars as f64 / self.chunks as f64)
    }
}

/// Collector for stream metrics.
///
/// Fed by phase and chunk events; the adapter's own counters are merged in
/// when the stream finishes.
#[derive(Debug)]
pub struct MetricsCollector {
    stream: String,
    started_at: DateTime<Utc>,
    start: Instant,
    first_chunk: Option<Instant>,
    ended: Option<Instant>,
    chunks: u64,
    chars: u64,
    stats: Option<StreamStats>,
    outcome: StreamOutcome,
}

impl MetricsCollector {
    /// Create a new metrics collector.
    pub fn new(stream: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            started_at: Utc::now(),
            start: Instant::now(),
            first_chunk: None,
            ended: None,
            chunks: 0,
            chars: 0,
            stats: None,
            outcome: StreamOutcome::InProgress,
        }
    }

    /// Record a delivered chunk.
    pub fn record_chunk(&mut self, chars: usize) {
        self.first_chunk.get_or_insert_with(Instant::now);
        self.chunks += 1;
        self.chars += chars as u64;
    }

    /// Record a phase transition.
    pub fn record_phase(&mut self, phase: &StreamPhase) {
        match phase {
            StreamPhase::Ended => {
                self.ended.get_or_insert_with(Instant::now);
                self.outcome = StreamOutcome::Completed;
            }
            StreamPhase::Failed(error) => {
                self.outcome = StreamOutcome::Failed {
                    error: error.clone(),
                };
            }
            StreamPhase::Destroyed if self.outcome == StreamOutcome::InProgress => {
                self.outcome = StreamOutcome::Destroyed;
            }
            _ => {}
        }
    }

    /// Merge the adapter's counters and timing marks.
    pub fn record_stats(&mut self, stats: &StreamStats, timing: &TimingContext) {
        self.stats = Some(*stats);
        if let Some(end) = timing.time_to_end() {
            self.ended.get_or_insert(self.start + end);
        }
    }

    /// Get the current outcome.
    pub fn outcome(&self) -> &StreamOutcome {
        &self.outcome
    }

    /// Build the metrics snapshot.
    pub fn finish(&self) -> StreamMetrics {
        let stats = self.stats.unwrap_or_default();
        StreamMetrics {
            stream: self.stream.clone(),
            started_at: self.started_at,
            pulls: stats.pulls,
            chunks: self.chunks.max(stats.chunks),
            chars: self.chars.max(stats.chars),
            pauses: stats.pauses,
            trampoline_yields: stats.trampoline_yields,
            max_depth: stats.max_depth,
            time_to_first_chunk_us: self.first_chunk.map(|t| micros(t - self.start)),
            time_to_end_us: self.ended.map(|t| micros(t - self.start)),
            total_duration_us: micros(self.start.elapsed()),
            outcome: self.outcome.clone(),
        }
    }
}

fn micros(duration: Duration) -> u64 {
    duration.as_micros() as u64
}
