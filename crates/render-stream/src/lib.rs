//! Pull-based streaming for continuation-passing renderers.
//!
//! A renderer pushes text through `write(text, next)` and signals completion
//! with `end()`. A consumer pulls fixed-size chunks. This crate sits between
//! the two:
//! - `RenderStream` - Lazy render driver and pull loop, also a `futures::Stream`
//! - `RenderContext` - Write protocol with backpressure and bounded recursion
//! - `RenderBuffer` - Character-counted text buffer
//! - `RenderSink` - Forwards chunks into a byte sink
//! - `render_to_string` / `fragments` - Whole-output rendering and a simple producer

mod buffer;
mod context;
mod producer;
mod sink;
mod stream;

pub use buffer::*;
pub use context::{Continuation, RenderContext, WriteOutcome};
pub use producer::*;
pub use sink::*;
pub use stream::*;

pub use render_core::{RenderError, StreamConfig, StreamPhase, StreamStats};
