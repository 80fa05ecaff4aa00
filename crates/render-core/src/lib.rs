//! Core abstractions for the streaming render adapter.
//!
//! This crate provides the fundamental types shared by the adapter and its
//! observers:
//! - `StreamConfig` - Chunk size and recursion limits
//! - `RenderError` - Error taxonomy for render streams
//! - `StreamPhase` / `TimingContext` - Stream lifecycle tracking
//! - `RenderObserver` trait - Lifecycle event hooks

mod config;
mod error;
mod lifecycle;

pub use config::*;
pub use error::*;
pub use lifecycle::*;
