//! Ready-made producers and whole-output rendering.

use render_core::{RenderError, StreamConfig};

use crate::context::RenderContext;
use crate::stream::RenderStream;

/// Build a render function that writes each item of `items` in order and
/// then ends the stream.
///
/// Every fragment is written through the regular continuation protocol, so
/// the result pauses and resumes exactly like a hand-written tree walker.
pub fn fragments<I>(
    items: I,
) -> impl FnOnce(&mut RenderContext) -> Result<(), RenderError> + 'static
where
    I: IntoIterator + 'static,
    I::Item: Into<String>,
    I::IntoIter: 'static,
{
    let iter = items.into_iter();
    move |ctx| write_next(ctx, iter)
}

fn write_next<It>(ctx: &mut RenderContext, mut iter: It) -> Result<(), RenderError>
where
    It: Iterator + 'static,
    It::Item: Into<String>,
{
    match iter.next() {
        Some(fragment) => {
            let fragment: String = fragment.into();
            ctx.write(fragment, move |ctx| write_next(ctx, iter));
        }
        None => ctx.end(),
    }
    Ok(())
}

/// Render to completion and return the whole output.
///
/// Uses the same write protocol as streaming with unbounded demand, so the
/// producer never pauses for backpressure; deep recursion is still bounded.
pub fn render_to_string<F>(render: F) -> Result<String, RenderError>
where
    F: FnOnce(&mut RenderContext) -> Result<(), RenderError> + 'static,
{
    render_to_string_with(StreamConfig::default(), render)
}

/// Like [`render_to_string`] with an explicit configuration.
pub fn render_to_string_with<F>(config: StreamConfig, render: F) -> Result<String, RenderError>
where
    F: FnOnce(&mut RenderContext) -> Result<(), RenderError> + 'static,
{
    let mut stream = RenderStream::with_config(config, render);
    let mut output = String::new();
    while let Some(chunk) = stream.read_chunk(usize::MAX) {
        output.push_str(&chunk?);
    }
    Ok(output)
}
