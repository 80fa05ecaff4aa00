//! Producer-facing write protocol with backpressure and bounded recursion.

use std::collections::VecDeque;

use render_core::{RenderError, StreamStats};
use tracing::{debug, trace, warn};

/// A stored resumption point for a paused producer.
pub type Continuation = Box<dyn FnOnce(&mut RenderContext) -> Result<(), RenderError>>;

/// Result of a single `write` call, as seen by the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Demand was not yet met; the continuation ran inline and left nothing
    /// pending.
    Proceed,
    /// A continuation, this write's or one nested inside it, is stored and
    /// will run when the stream resumes it.
    Paused,
    /// The stream has failed or ended; the write was dropped.
    Errored,
}

/// Why a continuation is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PendingKind {
    /// Buffer satisfied the current pull; waiting for the next one.
    Demand,
    /// Inline depth hit the limit; waiting to be resumed from the driver loop.
    Trampoline,
}

pub(crate) struct Pending {
    pub(crate) kind: PendingKind,
    pub(crate) resume: Continuation,
}

/// Write/end surface handed to the render function and every continuation.
///
/// Holds the buffer, the current demand and the single pending continuation.
/// Releasing a chunk queues it for the owning stream, which hands it to the
/// consumer.
pub struct RenderContext {
    buffer: crate::buffer::RenderBuffer,
    expected_size: usize,
    max_stack_depth: usize,
    stack_depth: usize,
    pending: Option<Pending>,
    done: bool,
    error: Option<RenderError>,
    released: VecDeque<String>,
    captures: Vec<String>,
    stats: StreamStats,
}

impl RenderContext {
    pub(crate) fn new(max_stack_depth: usize) -> Self {
        Self {
            buffer: crate::buffer::RenderBuffer::new(),
            expected_size: 0,
            max_stack_depth: max_stack_depth.max(1),
            stack_depth: 0,
            pending: None,
            done: false,
            error: None,
            released: VecDeque::new(),
            captures: Vec::new(),
            stats: StreamStats::default(),
        }
    }

    /// Append `text` and continue with `next`.
    ///
    /// If the buffer now covers the current demand, exactly that many
    /// characters are released, `next` is stored and `Paused` is returned.
    /// Otherwise `next` runs before this call returns, unless the inline depth
    /// limit was reached, in which case it is parked for the driver loop.
    /// A pause anywhere inside the inline `next` also yields `Paused`.
    ///
    /// The producer must return after calling `write`; further work belongs
    /// in `next`.
    pub fn write<F>(&mut self, text: impl AsRef<str>, next: F) -> WriteOutcome
    where
        F: FnOnce(&mut RenderContext) -> Result<(), RenderError> + 'static,
    {
        if !self.accept(text.as_ref()) {
            return WriteOutcome::Errored;
        }

        if self.buffer.len() >= self.expected_size {
            self.pause(Box::new(next));
            return WriteOutcome::Paused;
        }

        if self.stack_depth >= self.max_stack_depth {
            self.park(Box::new(next));
            return WriteOutcome::Paused;
        }

        self.stack_depth += 1;
        self.stats.max_depth = self.stats.max_depth.max(self.stack_depth);
        let result = next(self);
        self.stack_depth -= 1;

        match result {
            Ok(()) if self.error.is_some() => WriteOutcome::Errored,
            Ok(()) if self.pending.is_some() => WriteOutcome::Paused,
            Ok(()) => WriteOutcome::Proceed,
            Err(err) => {
                self.fail(err);
                WriteOutcome::Errored
            }
        }
    }

    /// Validate a write against the protocol and buffer its text.
    fn accept(&mut self, text: &str) -> bool {
        if self.error.is_some() {
            return false;
        }
        if self.done {
            warn!("write after end ignored");
            return false;
        }
        if self.pending.is_some() {
            self.fail(RenderError::Protocol(
                "write called while a continuation is pending".to_string(),
            ));
            return false;
        }

        self.buffer.push(text);
        if let Some(capture) = self.captures.last_mut() {
            capture.push_str(text);
        }
        true
    }

    /// Store `resume` and release exactly the current demand.
    fn pause(&mut self, resume: Continuation) {
        let demand = self.expected_size;
        trace!(buffered = self.buffer.len(), demand, "demand met, pausing producer");
        self.pending = Some(Pending {
            kind: PendingKind::Demand,
            resume,
        });
        self.stats.pauses += 1;
        self.release(demand);
    }

    /// Store `resume` for the driver loop instead of nesting deeper.
    fn park(&mut self, resume: Continuation) {
        trace!(depth = self.stack_depth, "stack depth limit reached, yielding");
        self.pending = Some(Pending {
            kind: PendingKind::Trampoline,
            resume,
        });
        self.stats.trampoline_yields += 1;
    }

    /// Signal that rendering is finished and release everything buffered.
    pub fn end(&mut self) {
        if self.error.is_some() {
            return;
        }
        if self.done {
            warn!("end called more than once");
            return;
        }
        if self.pending.take().is_some() {
            warn!("end called while a continuation is pending; dropping it");
        }

        self.done = true;
        if !self.buffer.is_empty() {
            let rest = self.buffer.len();
            self.release(rest);
        }
        debug!(chars = self.stats.chars, "producer ended");
    }

    /// Report a production error. Halts the stream.
    pub fn report_error(&mut self, message: impl Into<String>) {
        self.fail(RenderError::Reported(message.into()));
    }

    /// Start recording written text, e.g. to cache a rendered subtree.
    pub fn begin_capture(&mut self) {
        self.captures.push(String::new());
    }

    /// Stop the innermost capture and return its text.
    ///
    /// The captured text is also appended to the enclosing capture, if any.
    pub fn end_capture(&mut self) -> Option<String> {
        let captured = self.captures.pop()?;
        if let Some(parent) = self.captures.last_mut() {
            parent.push_str(&captured);
        }
        Some(captured)
    }

    /// Whether any capture is active.
    pub fn is_capturing(&self) -> bool {
        !self.captures.is_empty()
    }

    /// Characters the current pull asks for.
    pub fn expected_size(&self) -> usize {
        self.expected_size
    }

    /// Characters buffered and not yet released.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Current inline continuation depth.
    pub fn stack_depth(&self) -> usize {
        self.stack_depth
    }

    /// Whether `end` has been called.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Whether the stream has failed.
    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub(crate) fn set_expected_size(&mut self, n: usize) {
        self.expected_size = n;
    }

    pub(crate) fn pending_kind(&self) -> Option<PendingKind> {
        self.pending.as_ref().map(|p| p.kind)
    }

    pub(crate) fn take_pending(&mut self) -> Option<Pending> {
        self.pending.take()
    }

    pub(crate) fn release(&mut self, n: usize) {
        let chunk = self.buffer.take_prefix(n);
        if chunk.is_empty() {
            return;
        }
        self.stats.chunks += 1;
        self.stats.chars += chunk.chars().count() as u64;
        self.released.push_back(chunk);
    }

    pub(crate) fn take_released(&mut self) -> Option<String> {
        self.released.pop_front()
    }

    pub(crate) fn take_error(&mut self) -> Option<RenderError> {
        self.error.take()
    }

    pub(crate) fn record_pull(&mut self) {
        self.stats.pulls += 1;
    }

    pub(crate) fn stats(&self) -> StreamStats {
        self.stats
    }

    /// Record the first error and halt production. Later errors are dropped.
    pub(crate) fn fail(&mut self, err: RenderError) {
        if let Some(first) = &self.error {
            debug!(error = %err, first = %first, "suppressing secondary render error");
            return;
        }
        debug!(error = %err, "render stream failed");
        self.error = Some(err);
        self.pending = None;
        self.buffer.clear();
        self.captures.clear();
    }

    /// Drop all pending work and undelivered output.
    pub(crate) fn cancel(&mut self) {
        self.pending = None;
        self.buffer.clear();
        self.released.clear();
        self.captures.clear();
        self.done = true;
    }

    pub(crate) fn reset_stack_depth(&mut self) {
        self.stack_depth = 0;
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("buffered", &self.buffer.len())
            .field("expected_size", &self.expected_size)
            .field("stack_depth", &self.stack_depth)
            .field("pending", &self.pending_kind())
            .field("done", &self.done)
            .field("error", &self.error)
            .finish()
    }
}
