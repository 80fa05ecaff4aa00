//! Observability infrastructure for the streaming render adapter.
//!
//! This crate provides:
//! - `StructuredLogger` - Structured logging with stream context
//! - `MetricsCollector` / `StreamMetrics` - Per-stream timing and throughput
//! - `LoggingObserver` / `MetricsObserver` - `RenderObserver` implementations

mod logging;
mod metrics;
mod observer;

pub use logging::*;
pub use metrics::*;
pub use observer::*;

// Re-export lifecycle types from render-core for convenience
pub use render_core::{RenderObserver, StreamPhase, StreamStats, TimingContext};
