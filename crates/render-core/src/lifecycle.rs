//! Stream lifecycle tracking.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Lifecycle phases for a render stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamPhase {
    /// Created, no data requested yet.
    Idle,
    /// The producer is running or has yielded to the trampoline.
    Rendering,
    /// The producer is paused until the consumer asks for more.
    Paused,
    /// The producer has ended; remaining output is drained.
    Ended,
    /// An error occurred.
    Failed(String),
    /// The consumer cancelled the stream.
    Destroyed,
}

impl StreamPhase {
    /// Whether no further data can be produced in this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ended | Self::Failed(_) | Self::Destroyed)
    }
}

impl fmt::Display for StreamPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Rendering => write!(f, "rendering"),
            Self::Paused => write!(f, "paused"),
            Self::Ended => write!(f, "ended"),
            Self::Failed(err) => write!(f, "failed: {}", err),
            Self::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Timing context for observability.
#[derive(Debug, Clone)]
pub struct TimingContext {
    start: Instant,
    marks: HashMap<String, Instant>,
}

impl TimingContext {
    /// Create a new timing context.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            marks: HashMap::new(),
        }
    }

    /// Record a timing mark.
    pub fn mark(&mut self, name: &str) {
        self.marks.insert(name.to_string(), Instant::now());
    }

    /// Record a timing mark unless it already exists.
    pub fn mark_once(&mut self, name: &str) {
        self.marks
            .entry(name.to_string())
            .or_insert_with(Instant::now);
    }

    /// Whether a mark has been recorded.
    pub fn has_mark(&self, name: &str) -> bool {
        self.marks.contains_key(name)
    }

    /// Time from start to a named mark.
    pub fn time_to(&self, name: &str) -> Option<Duration> {
        self.marks.get(name).map(|t| t.duration_since(self.start))
    }

    /// Get elapsed time since start.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time to the first consumer pull.
    pub fn time_to_first_pull(&self) -> Option<Duration> {
        self.time_to("first_pull")
    }

    /// Time to the first released chunk.
    pub fn time_to_first_chunk(&self) -> Option<Duration> {
        self.time_to("first_chunk")
    }

    /// Time until the producer ended.
    pub fn time_to_end(&self) -> Option<Duration> {
        self.time_to("end")
    }
}

impl Default for TimingContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters describing the work done by one stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Consumer pull requests handled.
    pub pulls: u64,
    /// Chunks released downstream.
    pub chunks: u64,
    /// Characters released downstream.
    pub chars: u64,
    /// Times the producer was paused by backpressure.
    pub pauses: u64,
    /// Times a continuation was parked to bound recursion.
    pub trampoline_yields: u64,
    /// Deepest inline continuation nesting observed.
    pub max_depth: usize,
}

/// Observer trait for stream lifecycle events.
///
/// Streams are single-threaded, so observers are shared through `Rc` and use
/// interior mutability when they need to record state.
pub trait RenderObserver {
    /// Called when the stream enters a new phase.
    fn on_phase(&self, phase: &StreamPhase, elapsed: Duration);

    /// Called for every chunk handed to the consumer.
    fn on_chunk(&self, chars: usize, elapsed: Duration) {
        let _ = (chars, elapsed);
    }

    /// Called once the stream reaches a terminal phase.
    fn on_finish(&self, stats: &StreamStats, timing: &TimingContext) {
        let _ = (stats, timing);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_terminal() {
        assert!(!StreamPhase::Idle.is_terminal());
        assert!(!StreamPhase::Paused.is_terminal());
        assert!(StreamPhase::Ended.is_terminal());
        assert!(StreamPhase::Failed("x".into()).is_terminal());
        assert!(StreamPhase::Destroyed.is_terminal());
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(StreamPhase::Paused.to_string(), "paused");
        assert_eq!(
            StreamPhase::Failed("boom".into()).to_string(),
            "failed: boom"
        );
    }

    #[test]
    fn test_timing_mark_once_keeps_first() {
        let mut timing = TimingContext::new();
        timing.mark_once("first_chunk");
        let first = timing.time_to_first_chunk().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        timing.mark_once("first_chunk");

        assert_eq!(timing.time_to_first_chunk(), Some(first));
        assert!(timing.has_mark("first_chunk"));
        assert!(timing.time_to_end().is_none());
    }
}
