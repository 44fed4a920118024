//! Rendering: emitters, the interpreter loop, the sync driver and the
//! streaming adapter.
//!
//! There is exactly one interpreter, written async. Buffered rendering
//! collects chunks into a string; streaming rendering pushes them through a
//! bounded channel for backpressure; synchronous rendering polls the same
//! future exactly once against a no-op waker and treats a `Pending` as the
//! error it is, since a fully synchronous pipeline never suspends.

use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::task::noop_waker;
use futures::{Future, Stream};
use tokio::sync::mpsc;
use weft_core::WeftError;

use crate::context::Context;
use crate::engine::Engine;
use crate::parser::Template;

/// Receives rendered output chunks.
///
/// `closed` lets long renders notice a vanished consumer; the interpreter
/// checks it between nodes and stops early without error.
#[async_trait]
pub trait Emitter: Send {
    /// Appends one chunk of output.
    async fn write(&mut self, chunk: &str) -> Result<(), WeftError>;

    /// True when the consumer is gone and rendering may stop.
    fn closed(&self) -> bool {
        false
    }
}

/// Collects output into a string. Never suspends.
#[derive(Debug, Default)]
pub struct BufferedEmitter {
    buffer: String,
}

impl BufferedEmitter {
    /// Creates an empty emitter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes the emitter, returning the collected output.
    pub fn into_string(self) -> String {
        self.buffer
    }
}

#[async_trait]
impl Emitter for BufferedEmitter {
    async fn write(&mut self, chunk: &str) -> Result<(), WeftError> {
        self.buffer.push_str(chunk);
        Ok(())
    }
}

/// Pushes output chunks into a bounded channel. A full channel suspends
/// the render until the consumer catches up; a dropped consumer marks the
/// emitter closed instead of failing the render.
pub struct ChannelEmitter {
    tx: mpsc::Sender<String>,
    closed: bool,
}

impl ChannelEmitter {
    /// Wraps a channel sender.
    pub const fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx, closed: false }
    }
}

#[async_trait]
impl Emitter for ChannelEmitter {
    async fn write(&mut self, chunk: &str) -> Result<(), WeftError> {
        if self.closed || chunk.is_empty() {
            return Ok(());
        }
        if self.tx.send(chunk.to_string()).await.is_err() {
            self.closed = true;
        }
        Ok(())
    }

    fn closed(&self) -> bool {
        self.closed
    }
}

/// The interpreter loop: walks template nodes and writes their output.
///
/// Stops early when an interrupt is pending (a `break`/`continue` working
/// its way up to the enclosing loop) or the emitter closed.
pub(crate) async fn render_templates(
    engine: &Engine,
    templates: &[Template],
    ctx: &mut Context,
    emitter: &mut dyn Emitter,
) -> Result<(), WeftError> {
    for template in templates {
        if ctx.registers().interrupt.is_some() || emitter.closed() {
            break;
        }
        match template {
            Template::Html(html) => emitter.write(html.content()).await?,
            Template::Output(node) => {
                let value = node
                    .value
                    .evaluate(ctx, &engine.options().operators, false)
                    .await?;
                let text = match (&engine.options().escaper, node.escape) {
                    (Some(escaper), true) => escaper(&value),
                    _ => value.to_display_string(),
                };
                emitter.write(&text).await?;
            }
            Template::Tag(node) => match &node.renderer {
                Some(renderer) => renderer.render(ctx, emitter, engine).await?,
                None => {
                    emitter
                        .write(&format!("<!-- unknown tag \"{}\" -->", node.name))
                        .await?;
                }
            },
        }
    }
    Ok(())
}

/// Renders templates into a fresh buffer.
pub(crate) async fn render_to_string(
    engine: &Engine,
    templates: &[Template],
    ctx: &mut Context,
) -> Result<String, WeftError> {
    let mut emitter = BufferedEmitter::new();
    render_templates(engine, templates, ctx, &mut emitter).await?;
    Ok(emitter.into_string())
}

/// Polls a render future exactly once against a no-op waker.
///
/// A fully synchronous pipeline completes on the first poll; anything that
/// returns `Pending` genuinely needed to suspend, which is the
/// [`WeftError::Async`] failure.
pub(crate) fn drive_sync<T>(
    future: impl Future<Output = Result<T, WeftError>>,
    what: &str,
) -> Result<T, WeftError> {
    let waker = noop_waker();
    let mut task_ctx = TaskContext::from_waker(&waker);
    let mut future = std::pin::pin!(future);
    match future.as_mut().poll(&mut task_ctx) {
        Poll::Ready(result) => result,
        Poll::Pending => Err(WeftError::Async(format!(
            "{what} reached asynchronous work; use the async variant"
        ))),
    }
}

/// A stream of rendered output chunks.
///
/// Polling drives the render future and the channel together: the future
/// runs only while the stream is polled, so dropping the stream cancels
/// the render. A render error is yielded as the final item.
pub struct RenderStream<'a> {
    future: Option<BoxFuture<'a, Result<(), WeftError>>>,
    rx: mpsc::Receiver<String>,
}

impl<'a> RenderStream<'a> {
    /// Channel capacity bounding how far the render runs ahead of the
    /// consumer.
    pub(crate) const CAPACITY: usize = 16;

    pub(crate) fn new(
        future: BoxFuture<'a, Result<(), WeftError>>,
        rx: mpsc::Receiver<String>,
    ) -> Self {
        Self {
            future: Some(future),
            rx,
        }
    }
}

impl Stream for RenderStream<'_> {
    type Item = Result<String, WeftError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(future) = this.future.as_mut() {
            match future.as_mut().poll(cx) {
                // dropping the finished future drops its sender, which
                // lets the channel report completion
                Poll::Ready(Ok(())) => this.future = None,
                Poll::Ready(Err(err)) => {
                    this.future = None;
                    this.rx.close();
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Pending => {}
            }
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}
