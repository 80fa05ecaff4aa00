//! Pull-driven render stream.

use std::any::Any;
use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::Stream;
use render_core::{
    RenderError, RenderObserver, StreamConfig, StreamPhase, StreamStats, TimingContext,
};
use tracing::debug;

use crate::context::{Continuation, PendingKind, RenderContext};

/// An event delivered to the consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A chunk of rendered text.
    Data(String),
    /// The stream finished normally.
    End,
    /// The stream failed; nothing follows.
    Error(RenderError),
}

/// Adapts a continuation-passing render function into a pull-based stream.
///
/// The render function runs once, on the first [`request`](Self::request).
/// Each request records the demanded size and either drains leftover buffer,
/// starts rendering, or resumes the paused producer. Chunks released while
/// doing so are queued as [`StreamEvent`]s.
///
/// `RenderStream` also implements [`futures::Stream`], pulling
/// `config.chunk_size` characters per poll.
pub struct RenderStream {
    render: Option<Continuation>,
    started: bool,
    ctx: RenderContext,
    events: VecDeque<StreamEvent>,
    finished: bool,
    phase: StreamPhase,
    config: StreamConfig,
    timing: TimingContext,
    observer: Option<Rc<dyn RenderObserver>>,
}

impl RenderStream {
    /// Create a stream with the default configuration.
    pub fn new<F>(render: F) -> Self
    where
        F: FnOnce(&mut RenderContext) -> Result<(), RenderError> + 'static,
    {
        Self::with_config(StreamConfig::default(), render)
    }

    /// Create a stream with an explicit configuration.
    ///
    /// An invalid configuration surfaces as the stream's single error on the
    /// first pull, without running `render`.
    pub fn with_config<F>(config: StreamConfig, render: F) -> Self
    where
        F: FnOnce(&mut RenderContext) -> Result<(), RenderError> + 'static,
    {
        let mut ctx = RenderContext::new(config.max_stack_depth);
        let render: Option<Continuation> = match config.validate() {
            Ok(()) => Some(Box::new(render)),
            Err(err) => {
                ctx.fail(err);
                None
            }
        };

        Self {
            render,
            started: false,
            ctx,
            events: VecDeque::new(),
            finished: false,
            phase: StreamPhase::Idle,
            config,
            timing: TimingContext::new(),
            observer: None,
        }
    }

    /// Attach a lifecycle observer.
    pub fn with_observer(mut self, observer: Rc<dyn RenderObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Ask for `n` characters, producing more output if needed.
    ///
    /// Released chunks, end-of-stream and errors are queued for
    /// [`next_event`](Self::next_event). Does nothing once the stream has
    /// finished or been destroyed.
    pub fn request(&mut self, n: usize) {
        self.pull(n, true);
    }

    /// Pop the next queued event.
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.pop_front()
    }

    /// Pull until a chunk, the end, or an error is available.
    ///
    /// Returns `None` at end-of-stream and after destruction.
    pub fn read_chunk(&mut self, n: usize) -> Option<Result<String, RenderError>> {
        loop {
            match self.events.pop_front() {
                Some(StreamEvent::Data(chunk)) => return Some(Ok(chunk)),
                Some(StreamEvent::Error(err)) => return Some(Err(err)),
                Some(StreamEvent::End) => return None,
                None if self.finished => return None,
                None => self.pull(n, true),
            }
        }
    }

    /// Cancel the stream.
    ///
    /// The pending continuation, buffered text and undelivered chunks are
    /// dropped. Later requests are no-ops and no error is raised.
    pub fn destroy(&mut self) {
        if self.phase == StreamPhase::Destroyed {
            return;
        }
        debug!(stream = self.config.label_or_default(), "render stream destroyed");
        self.render = None;
        self.ctx.cancel();
        self.events.clear();
        self.finished = true;
        self.set_phase(StreamPhase::Destroyed);
    }

    /// Whether the render function has been invoked.
    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Whether end-of-stream or an error has been queued.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> &StreamPhase {
        &self.phase
    }

    /// Characters buffered and not yet released.
    pub fn buffered_len(&self) -> usize {
        self.ctx.buffered_len()
    }

    /// Work counters for this stream.
    pub fn stats(&self) -> StreamStats {
        self.ctx.stats()
    }

    /// Timing marks for this stream.
    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }

    /// Configuration this stream was built with.
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// One pull cycle. With `drain_trampoline`, continuations parked by the
    /// depth limit are resumed here; otherwise they wait for the next pull.
    fn pull(&mut self, n: usize, drain_trampoline: bool) {
        if self.finished {
            return;
        }

        let n = n.max(1);
        self.ctx.record_pull();
        self.timing.mark_once("first_pull");
        self.ctx.set_expected_size(n);

        if self.ctx.is_failed() {
            // Configuration rejected at construction.
        } else if self.ctx.is_done() {
            self.events.push_back(StreamEvent::End);
            self.finished = true;
        } else if self.ctx.buffered_len() >= n {
            self.ctx.release(n);
        } else if !self.started {
            self.start();
        } else if let Some(pending) = self.ctx.take_pending() {
            self.invoke(pending.resume);
        } else {
            self.ctx.fail(RenderError::Stalled);
        }

        if drain_trampoline {
            while self.ctx.pending_kind() == Some(PendingKind::Trampoline) {
                if let Some(pending) = self.ctx.take_pending() {
                    self.invoke(pending.resume);
                }
            }
        }

        self.collect();
    }

    fn start(&mut self) {
        self.started = true;
        let Some(render) = self.render.take() else {
            return;
        };
        debug!(stream = self.config.label_or_default(), "starting render");
        self.set_phase(StreamPhase::Rendering);
        self.invoke(render);
    }

    /// Run the producer at a call boundary, turning errors and panics into the
    /// stream's single error.
    fn invoke(&mut self, resume: Continuation) {
        let ctx = &mut self.ctx;
        match panic::catch_unwind(AssertUnwindSafe(|| resume(&mut *ctx))) {
            Ok(Ok(())) => {}
            Ok(Err(err)) => ctx.fail(err),
            Err(payload) => ctx.fail(RenderError::Panicked(panic_message(&*payload))),
        }
        ctx.reset_stack_depth();

        if ctx.pending_kind().is_none() && !ctx.is_done() && !ctx.is_failed() {
            ctx.fail(RenderError::Stalled);
        }
    }

    /// Move released chunks and terminal signals into the event queue.
    fn collect(&mut self) {
        while let Some(chunk) = self.ctx.take_released() {
            self.timing.mark_once("first_chunk");
            if let Some(observer) = &self.observer {
                observer.on_chunk(chunk.chars().count(), self.timing.elapsed());
            }
            self.events.push_back(StreamEvent::Data(chunk));
        }

        if let Some(err) = self.ctx.take_error() {
            self.events.push_back(StreamEvent::Error(err.clone()));
            self.finished = true;
            self.render = None;
            self.set_phase(StreamPhase::Failed(err.to_string()));
            return;
        }

        let phase = if self.ctx.is_done() {
            self.timing.mark_once("end");
            StreamPhase::Ended
        } else {
            match self.ctx.pending_kind() {
                Some(PendingKind::Demand) => StreamPhase::Paused,
                Some(PendingKind::Trampoline) => StreamPhase::Rendering,
                None => self.phase.clone(),
            }
        };
        self.set_phase(phase);
    }

    fn set_phase(&mut self, phase: StreamPhase) {
        if self.phase == phase {
            return;
        }
        let was_terminal = self.phase.is_terminal();
        self.phase = phase;
        if let Some(observer) = &self.observer {
            observer.on_phase(&self.phase, self.timing.elapsed());
            if self.phase.is_terminal() && !was_terminal {
                observer.on_finish(&self.ctx.stats(), &self.timing);
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Stream for RenderStream {
    type Item = Result<String, RenderError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.events.pop_front() {
                Some(StreamEvent::Data(chunk)) => return Poll::Ready(Some(Ok(chunk))),
                Some(StreamEvent::Error(err)) => return Poll::Ready(Some(Err(err))),
                Some(StreamEvent::End) => return Poll::Ready(None),
                None if this.finished => return Poll::Ready(None),
                None => {}
            }

            this.pull(this.config.chunk_size, false);

            // Parked by the depth limit: let the executor run other work
            // before resuming.
            if this.events.is_empty()
                && this.ctx.pending_kind() == Some(PendingKind::Trampoline)
            {
                cx.waker().wake_by_ref();
                return Poll::Pending;
            }
        }
    }
}

impl fmt::Debug for RenderStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderStream")
            .field("started", &self.started)
            .field("finished", &self.finished)
            .field("phase", &self.phase)
            .field("queued_events", &self.events.len())
            .field("ctx", &self.ctx)
            .finish()
    }
}

impl Drop for RenderStream {
    fn drop(&mut self) {
        if !self.finished {
            self.destroy();
        }
    }
}
