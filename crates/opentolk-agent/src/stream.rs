//! Incremental text streams.
//!
//! A [`TextStream`] is the receiving half of a bounded channel of
//! [`StreamEvent`]s: any number of text deltas followed by exactly one
//! terminal event. It can be rendered live (it implements
//! [`futures::Stream`]) or drained to a complete string with
//! [`TextStream::collect_text`].
//!
//! Dropping a stream aborts the task producing it, which in turn drops the
//! underlying model request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::error::{AgentError, Result};

/// Channel capacity between a producer and its consumer.
const STREAM_BUFFER: usize = 64;

/// One event of a text stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A fragment of text to append.
    Delta(String),
    /// The stream completed normally.
    Done,
    /// The stream ended because the producer failed.
    Failed(String),
}

impl StreamEvent {
    fn is_terminal(&self) -> bool {
        !matches!(self, Self::Delta(_))
    }
}

// ---------------------------------------------------------------------------
// Sender
// ---------------------------------------------------------------------------

/// Producer half of a [`TextStream`].
#[derive(Debug, Clone)]
pub struct StreamSender {
    tx: mpsc::Sender<StreamEvent>,
}

impl StreamSender {
    /// Send a text fragment. Returns `false` once the consumer is gone, at
    /// which point the producer should stop.
    pub async fn delta(&self, text: impl Into<String>) -> bool {
        self.tx.send(StreamEvent::Delta(text.into())).await.is_ok()
    }

    pub async fn done(self) {
        let _ = self.tx.send(StreamEvent::Done).await;
    }

    pub async fn fail(self, reason: impl Into<String>) {
        let _ = self.tx.send(StreamEvent::Failed(reason.into())).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// Consumer half: a live sequence of text deltas.
#[derive(Debug)]
pub struct TextStream {
    rx: mpsc::Receiver<StreamEvent>,
    producer: Option<AbortHandle>,
    finished: bool,
}

impl TextStream {
    /// Create a connected sender/stream pair.
    pub fn channel() -> (StreamSender, TextStream) {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        (
            StreamSender { tx },
            TextStream {
                rx,
                producer: None,
                finished: false,
            },
        )
    }

    /// A stream that yields `text` as a single delta and completes.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_events(vec![StreamEvent::Delta(text.into()), StreamEvent::Done])
    }

    /// A stream replaying fixed events.
    ///
    /// Events past the channel capacity are dropped.
    pub fn from_events(events: Vec<StreamEvent>) -> Self {
        let (sender, stream) = Self::channel();
        for event in events.into_iter().take(STREAM_BUFFER) {
            let _ = sender.tx.try_send(event);
        }
        stream
    }

    /// Tie the lifetime of the producing task to this stream.
    #[must_use]
    pub fn with_producer(mut self, producer: AbortHandle) -> Self {
        self.producer = Some(producer);
        self
    }

    /// Receive the next event. Returns `None` after a terminal event, or if
    /// the producer went away without sending one.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        if self.finished {
            return None;
        }
        let event = self.rx.recv().await;
        self.finished = event.as_ref().is_none_or(StreamEvent::is_terminal);
        event
    }

    /// Drain the stream, concatenating every delta.
    ///
    /// A producer failure, or a producer that disappears without completing,
    /// is an error.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut text = String::new();
        while let Some(event) = self.next_event().await {
            match event {
                StreamEvent::Delta(delta) => text.push_str(&delta),
                StreamEvent::Done => return Ok(text),
                StreamEvent::Failed(reason) => {
                    return Err(AgentError::LlmStreamError { reason });
                }
            }
        }
        Err(AgentError::LlmStreamError {
            reason: "stream ended without completing".into(),
        })
    }

    /// Forward this stream through a new one, calling `on_complete` with the
    /// full text once it completes normally and before `Done` is forwarded.
    pub fn on_complete<F, Fut>(mut self, on_complete: F) -> TextStream
    where
        F: FnOnce(String) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (sender, relay) = Self::channel();
        let task = tokio::spawn(async move {
            let mut full = String::new();
            while let Some(event) = self.next_event().await {
                match event {
                    StreamEvent::Delta(delta) => {
                        full.push_str(&delta);
                        if !sender.delta(delta).await {
                            return;
                        }
                    }
                    StreamEvent::Done => {
                        on_complete(full).await;
                        sender.done().await;
                        return;
                    }
                    StreamEvent::Failed(reason) => {
                        sender.fail(reason).await;
                        return;
                    }
                }
            }
            sender.fail("stream ended without completing").await;
        });
        relay.with_producer(task.abort_handle())
    }
}

impl futures::Stream for TextStream {
    type Item = StreamEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<StreamEvent>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }
        match this.rx.poll_recv(cx) {
            Poll::Ready(event) => {
                this.finished = event.as_ref().is_none_or(StreamEvent::is_terminal);
                Poll::Ready(event)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for TextStream {
    fn drop(&mut self) {
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
