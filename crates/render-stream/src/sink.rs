//! Forwarding rendered chunks into a byte sink.

use std::fmt::Display;

use futures::{Sink, SinkExt, StreamExt};
use render_core::{RenderError, TimingContext};
use tracing::debug;

use crate::stream::RenderStream;

/// State of the forwarding sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SinkState {
    /// Nothing sent yet.
    Initial,
    /// At least one chunk has been sent.
    Streaming,
    /// The sink has been flushed and closed.
    Completed,
}

/// Sends rendered chunks as UTF-8 bytes into any `Sink<Vec<u8>>`.
///
/// Generic over the underlying sink so it can wrap an HTTP response body,
/// a channel, or a test collector.
pub struct RenderSink<S, E>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: Display,
{
    inner: S,
    state: SinkState,
    timing: TimingContext,
    bytes_sent: usize,
    chunks_sent: usize,
}

impl<S, E> RenderSink<S, E>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: Display,
{
    /// Create a new forwarding sink.
    pub fn new(sink: S) -> Self {
        Self {
            inner: sink,
            state: SinkState::Initial,
            timing: TimingContext::new(),
            bytes_sent: 0,
            chunks_sent: 0,
        }
    }

    /// Send one chunk of text.
    pub async fn send_chunk(&mut self, chunk: String) -> Result<(), RenderError> {
        if self.state == SinkState::Completed {
            return Err(RenderError::Sink("Sink already completed".to_string()));
        }

        let bytes = chunk.into_bytes();
        let len = bytes.len();
        self.inner
            .send(bytes)
            .await
            .map_err(|e| RenderError::Sink(e.to_string()))?;

        if self.state == SinkState::Initial {
            self.timing.mark("first_byte");
            self.state = SinkState::Streaming;
        }
        self.bytes_sent += len;
        self.chunks_sent += 1;
        Ok(())
    }

    /// Forward every chunk of `stream`, then complete the sink.
    ///
    /// Stops at the first stream or sink error; on a sink error the stream
    /// is destroyed so the producer is not resumed again.
    pub async fn pipe(&mut self, stream: &mut RenderStream) -> Result<usize, RenderError> {
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Err(err) = self.send_chunk(chunk).await {
                stream.destroy();
                return Err(err);
            }
        }
        self.complete().await?;
        debug!(
            bytes = self.bytes_sent,
            chunks = self.chunks_sent,
            "render stream piped to sink"
        );
        Ok(self.bytes_sent)
    }

    /// Close the underlying sink.
    pub async fn complete(&mut self) -> Result<(), RenderError> {
        if self.state == SinkState::Completed {
            return Ok(());
        }
        self.inner
            .close()
            .await
            .map_err(|e| RenderError::Sink(e.to_string()))?;
        self.state = SinkState::Completed;
        self.timing.mark("complete");
        Ok(())
    }

    /// Bytes sent so far.
    pub fn bytes_sent(&self) -> usize {
        self.bytes_sent
    }

    /// Chunks sent so far.
    pub fn chunks_sent(&self) -> usize {
        self.chunks_sent
    }

    /// Whether the sink has been completed.
    pub fn is_completed(&self) -> bool {
        self.state == SinkState::Completed
    }

    /// Get timing context reference.
    pub fn timing(&self) -> &TimingContext {
        &self.timing
    }

    /// Consume the sink and return the inner value.
    pub fn into_inner(self) -> S {
        self.inner
    }
}

/// Pipe `stream` into `sink`, returning the number of bytes sent.
pub async fn pipe_to_sink<S, E>(stream: &mut RenderStream, sink: S) -> Result<usize, RenderError>
where
    S: Sink<Vec<u8>, Error = E> + Unpin,
    E: Display,
{
    RenderSink::new(sink).pipe(stream).await
}
