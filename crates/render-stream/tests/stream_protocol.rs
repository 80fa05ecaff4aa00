//! End-to-end tests of the write/pull protocol.

use std::cell::Cell;
use std::rc::Rc;

use futures::channel::mpsc;
use futures::StreamExt;
use render_observability::{MetricsObserver, StreamOutcome};
use render_stream::{
    fragments, pipe_to_sink, render_to_string, RenderContext, RenderError, RenderSink,
    RenderStream, StreamConfig, StreamEvent, WriteOutcome,
};

/// Pull `n` characters at a time until the stream finishes.
fn collect_chunks(stream: &mut RenderStream, n: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    while let Some(chunk) = stream.read_chunk(n) {
        chunks.push(chunk.expect("stream should not fail"));
    }
    chunks
}

/// A recursive tree walker: `depth` levels of nested `<div>`s around a leaf.
fn nested_divs(ctx: &mut RenderContext, depth: usize) -> Result<(), RenderError> {
    open_divs(ctx, depth, depth)
}

fn open_divs(ctx: &mut RenderContext, remaining: usize, total: usize) -> Result<(), RenderError> {
    if remaining == 0 {
        ctx.write("leaf", move |ctx| close_divs(ctx, total));
    } else {
        ctx.write("<div>", move |ctx| open_divs(ctx, remaining - 1, total));
    }
    Ok(())
}

fn close_divs(ctx: &mut RenderContext, remaining: usize) -> Result<(), RenderError> {
    if remaining == 0 {
        ctx.end();
        return Ok(());
    }
    ctx.write("</div>", move |ctx| close_divs(ctx, remaining - 1));
    Ok(())
}

#[test]
fn test_e2e_pulls_of_two() {
    let mut stream = RenderStream::new(fragments(["ab", "cde", "f"]));

    assert_eq!(collect_chunks(&mut stream, 2), vec!["ab", "cd", "ef"]);
    assert!(stream.is_finished());
}

#[test]
fn test_e2e_short_final_chunk_single_render() {
    let renders = Rc::new(Cell::new(0));
    let counter = renders.clone();
    let mut stream = RenderStream::new(move |ctx| {
        counter.set(counter.get() + 1);
        fragments(["ab", "c", "de"])(ctx)
    });

    stream.request(10);
    assert_eq!(stream.next_event(), Some(StreamEvent::Data("abcde".to_string())));
    stream.request(10);
    assert_eq!(stream.next_event(), Some(StreamEvent::End));
    stream.request(10);
    assert_eq!(stream.next_event(), None);
    assert_eq!(renders.get(), 1);
}

#[test]
fn test_order_preserved_for_any_pull_size() {
    let pieces: Vec<String> = (0..40)
        .map(|i| "x".repeat(i % 7) + &i.to_string())
        .collect();
    let expected = pieces.concat();

    for n in [1, 2, 3, 5, 8, 13, 64, 1000] {
        let mut stream = RenderStream::new(fragments(pieces.clone()));
        let chunks = collect_chunks(&mut stream, n);

        assert_eq!(chunks.concat(), expected, "pull size {}", n);
        let (last, full) = chunks.split_last().unwrap();
        assert!(full.iter().all(|c| c.chars().count() == n), "pull size {}", n);
        assert!(last.chars().count() <= n);
    }
}

#[test]
fn test_surplus_retained_across_pulls() {
    let mut stream = RenderStream::new(|ctx| {
        ctx.write("0123456789", |ctx| {
            ctx.end();
            Ok(())
        });
        Ok(())
    });

    stream.request(3);
    assert_eq!(stream.next_event(), Some(StreamEvent::Data("012".to_string())));
    assert_eq!(stream.buffered_len(), 7);

    stream.request(4);
    assert_eq!(stream.next_event(), Some(StreamEvent::Data("3456".to_string())));
    assert_eq!(stream.buffered_len(), 3);

    assert_eq!(collect_chunks(&mut stream, 4), vec!["789"]);
}

#[test]
fn test_large_fragment_drained_in_small_pulls() {
    let page: String = (0..200_003).map(|i| char::from(b'a' + (i % 26) as u8)).collect();
    let mut stream = RenderStream::new(fragments([page.clone()]));

    let chunks = collect_chunks(&mut stream, 64);

    assert_eq!(chunks.len(), 200_003 / 64 + 1);
    assert_eq!(chunks.last().map(String::len), Some(3));
    assert!(chunks[..chunks.len() - 1].iter().all(|c| c.len() == 64));
    assert_eq!(chunks.concat(), page);
    assert_eq!(stream.stats().pauses, 1);
}

#[test]
fn test_write_outcomes_seen_by_producer() {
    let outcomes = Rc::new(std::cell::RefCell::new(Vec::new()));
    let log = outcomes.clone();
    let mut stream = RenderStream::new(move |ctx| {
        let inner_log = log.clone();
        let first = ctx.write("a", move |ctx| {
            let second = ctx.write("bc", |ctx| {
                ctx.end();
                Ok(())
            });
            inner_log.borrow_mut().push(second);
            Ok(())
        });
        log.borrow_mut().push(first);
        Ok(())
    });

    assert_eq!(collect_chunks(&mut stream, 2), vec!["ab", "c"]);
    // "bc" met demand and paused; "a" ran it inline, so it sees the pause too.
    assert_eq!(
        *outcomes.borrow(),
        vec![WriteOutcome::Paused, WriteOutcome::Paused]
    );
}

#[test]
fn test_error_on_first_pull_surfaces_once() {
    let mut stream = RenderStream::new(|ctx| {
        ctx.write("partial", |_| Ok(()));
        Err(RenderError::producer("template missing"))
    });

    stream.request(100);
    stream.request(100);
    stream.request(100);

    let events: Vec<StreamEvent> = std::iter::from_fn(|| stream.next_event()).collect();
    assert_eq!(
        events,
        vec![StreamEvent::Error(RenderError::Producer(
            "template missing".to_string()
        ))]
    );
}

#[test]
fn test_reported_error_after_data_stops_stream() {
    let mut stream = RenderStream::new(|ctx| {
        ctx.write("<ul>", |ctx| {
            ctx.write("<li>", |ctx| {
                ctx.report_error("unterminated list");
                ctx.write("never", |_| Ok(()));
                Ok(())
            });
            Ok(())
        });
        Ok(())
    });

    assert_eq!(stream.read_chunk(4), Some(Ok("<ul>".to_string())));
    assert_eq!(stream.read_chunk(4), Some(Ok("<li>".to_string())));
    assert_eq!(
        stream.read_chunk(4),
        Some(Err(RenderError::Reported("unterminated list".to_string())))
    );
    assert_eq!(stream.read_chunk(4), None);
}

#[test]
fn test_deep_recursion_does_not_overflow() {
    let count = 100_000;
    let items: Vec<String> = (0..count).map(|_| "x".to_string()).collect();
    let mut stream = RenderStream::new(fragments(items));

    let chunks = collect_chunks(&mut stream, 4096);
    let total: usize = chunks.iter().map(|c| c.len()).sum();

    assert_eq!(total, count);
    assert!(stream.stats().trampoline_yields > 0);
    assert!(stream.stats().max_depth <= 1000);
}

#[test]
fn test_recursive_tree_walker() {
    let mut stream = RenderStream::with_config(
        StreamConfig::new().with_max_stack_depth(16),
        |ctx| nested_divs(ctx, 50),
    );
    let html = collect_chunks(&mut stream, 7).concat();

    let expected = format!("{}leaf{}", "<div>".repeat(50), "</div>".repeat(50));
    assert_eq!(html, expected);
    assert_eq!(render_to_string(|ctx| nested_divs(ctx, 50)).unwrap(), expected);
}

#[test]
fn test_capture_records_subtree_while_streaming() {
    let captured = Rc::new(std::cell::RefCell::new(None));
    let slot = captured.clone();
    let mut stream = RenderStream::new(move |ctx| {
        ctx.write("<main>", move |ctx| {
            ctx.begin_capture();
            ctx.write("<aside>cached</aside>", move |ctx| {
                *slot.borrow_mut() = ctx.end_capture();
                ctx.write("</main>", |ctx| {
                    ctx.end();
                    Ok(())
                });
                Ok(())
            });
            Ok(())
        });
        Ok(())
    });

    let html = collect_chunks(&mut stream, 5).concat();
    assert_eq!(html, "<main><aside>cached</aside></main>");
    assert_eq!(captured.borrow().as_deref(), Some("<aside>cached</aside>"));
}

#[test]
fn test_metrics_observer_end_to_end() {
    let observer = Rc::new(MetricsObserver::new("e2e"));
    let mut stream =
        RenderStream::new(fragments(["ab", "cde", "f"])).with_observer(observer.clone());

    collect_chunks(&mut stream, 2);
    let metrics = observer.snapshot();

    assert_eq!(metrics.chunks, 3);
    assert_eq!(metrics.chars, 6);
    assert_eq!(metrics.pauses, 3);
    assert_eq!(metrics.outcome, StreamOutcome::Completed);
    assert!(metrics.time_to_first_chunk_us.is_some());
}

#[test]
fn test_dropping_unfinished_stream_records_destroy() {
    let observer = Rc::new(MetricsObserver::new("dropped"));
    {
        let mut stream =
            RenderStream::new(fragments(["abcd", "efgh"])).with_observer(observer.clone());
        stream.request(2);
    }

    assert_eq!(observer.snapshot().outcome, StreamOutcome::Destroyed);
}

#[test]
fn test_async_stream_yields_configured_chunks() {
    let config = StreamConfig::new().with_chunk_size(3).with_max_stack_depth(4);
    let stream = RenderStream::with_config(config, fragments(["a", "b", "c", "d", "e", "f", "g"]));

    let chunks: Vec<String> = futures::executor::block_on(
        stream.map(|chunk| chunk.expect("no error")).collect(),
    );
    assert_eq!(chunks, vec!["abc", "def", "g"]);
}

#[test]
fn test_async_stream_yields_to_executor_at_depth_limit() {
    let config = StreamConfig::new().with_chunk_size(100).with_max_stack_depth(2);
    let digits: Vec<String> = (0..10).map(|i| i.to_string()).collect();
    let mut stream = RenderStream::with_config(config, fragments(digits));

    let chunks: Vec<String> = futures::executor::block_on(async {
        let mut chunks = Vec::new();
        while let Some(chunk) = stream.next().await {
            chunks.push(chunk.expect("no error"));
        }
        chunks
    });

    assert_eq!(chunks, vec!["0123456789"]);
    assert!(stream.stats().trampoline_yields >= 3);
}

#[test]
fn test_async_stream_yields_error() {
    let stream = RenderStream::new(|_| Err(RenderError::producer("boom")));

    let items: Vec<Result<String, RenderError>> =
        futures::executor::block_on(stream.collect());
    assert_eq!(items, vec![Err(RenderError::Producer("boom".to_string()))]);
}

#[tokio::test(flavor = "current_thread")]
async fn test_pipe_to_channel_sink() {
    let (tx, rx) = mpsc::unbounded::<Vec<u8>>();
    let config = StreamConfig::new().with_chunk_size(4);
    let mut stream = RenderStream::with_config(config, fragments(["<h1>", "héllo", "</h1>"]));

    let sent = pipe_to_sink(&mut stream, tx).await.unwrap();
    let received: Vec<Vec<u8>> = rx.collect().await;

    let body = String::from_utf8(received.concat()).unwrap();
    assert_eq!(body, "<h1>héllo</h1>");
    assert_eq!(sent, body.len());
}

#[tokio::test(flavor = "current_thread")]
async fn test_closed_sink_destroys_stream() {
    let (tx, rx) = mpsc::unbounded::<Vec<u8>>();
    drop(rx);
    let resumed = Rc::new(Cell::new(false));
    let flag = resumed.clone();
    let mut stream = RenderStream::with_config(
        StreamConfig::new().with_chunk_size(2),
        move |ctx| {
            ctx.write("abcd", move |ctx| {
                flag.set(true);
                ctx.end();
                Ok(())
            });
            Ok(())
        },
    );

    let mut sink = RenderSink::new(tx);
    let result = sink.pipe(&mut stream).await;

    assert!(matches!(result, Err(RenderError::Sink(_))));
    assert_eq!(sink.chunks_sent(), 0);
    assert!(stream.is_finished());
    assert!(!resumed.get());
}
