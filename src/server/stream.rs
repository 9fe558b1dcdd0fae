//! Streaming gateway: replays a job's transcript to each subscriber and then
//! follows it live until the job finishes.
//!
//! Subscribers share the job's append-only message log and keep their own
//! cursor into it, so nothing is consumed on anyone's behalf.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use axum::response::sse::Event;
use futures::Stream;
use tokio::sync::watch;
use tokio_stream::StreamExt;

use crate::agent::ConversationMessage;
use crate::config::ServerConfig;
use crate::jobs::{Job, JobSnapshot};
use crate::server::types::StatusResponse;

/// One item on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// A transcript entry and its index in the job's log.
    Message {
        index: usize,
        message: ConversationMessage,
    },
    /// Nothing happened within the keepalive interval.
    Keepalive,
    /// The job finished. Always the last event.
    Complete(JobSnapshot),
}

impl StreamEvent {
    /// Render as an SSE frame. Message frames carry their index as the event id.
    pub fn into_sse(self) -> Event {
        match self {
            StreamEvent::Message { index, message } => Event::default()
                .event("message")
                .id(index.to_string())
                .data(serde_json::to_string(&message).unwrap_or_default()),
            StreamEvent::Keepalive => Event::default().event("keepalive").data(""),
            StreamEvent::Complete(snapshot) => Event::default().event("complete").data(
                serde_json::to_string(&StatusResponse::from(snapshot)).unwrap_or_default(),
            ),
        }
    }
}

type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Hands out per-job subscriptions, capped at a fixed number of open streams.
pub struct StreamGateway {
    connection_count: Arc<AtomicU64>,
    max_connections: u64,
    keepalive: Duration,
}

impl StreamGateway {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            connection_count: Arc::new(AtomicU64::new(0)),
            max_connections: config.max_streams,
            keepalive: config.keepalive,
        }
    }

    pub fn connection_count(&self) -> u64 {
        self.connection_count.load(Ordering::Relaxed)
    }

    /// Subscribe to `job` starting at message index `cursor`.
    ///
    /// Returns `None` if the connection limit has been reached.
    pub fn subscribe(
        &self,
        job: Arc<Job>,
        cursor: usize,
    ) -> Option<impl Stream<Item = StreamEvent> + Send + 'static + use<>> {
        let counter = Arc::clone(&self.connection_count);
        let max = self.max_connections;
        counter
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                if current < max {
                    Some(current + 1)
                } else {
                    None
                }
            })
            .ok()?;

        tracing::debug!(job_id = %job.id, cursor, "Stream subscribed");
        Some(CountedStream {
            inner: follow(job, cursor, self.keepalive),
            counter,
        })
    }

    /// Same as [`subscribe`](Self::subscribe), framed for an SSE response.
    pub fn subscribe_sse(
        &self,
        job: Arc<Job>,
        cursor: usize,
    ) -> Option<impl Stream<Item = Result<Event, Infallible>> + Send + 'static + use<>> {
        let stream = self.subscribe(job, cursor)?;
        Some(stream.map(|event| Ok(event.into_sse())))
    }
}

struct Follower {
    job: Arc<Job>,
    progress: watch::Receiver<u64>,
    next: usize,
    pending: VecDeque<StreamEvent>,
    keepalive: Duration,
    done: bool,
}

fn follow(job: Arc<Job>, cursor: usize, keepalive: Duration) -> EventStream {
    let state = Follower {
        progress: job.subscribe(),
        job,
        next: cursor,
        pending: VecDeque::new(),
        keepalive,
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                return Some((event, st));
            }
            if st.done {
                return None;
            }

            st.progress.borrow_and_update();
            // Status first: once terminal, the log below is already complete.
            let finished = st.job.is_finished().await;
            let fresh = st.job.messages_from(st.next).await;

            if !fresh.is_empty() {
                for message in fresh {
                    st.pending.push_back(StreamEvent::Message {
                        index: st.next,
                        message,
                    });
                    st.next += 1;
                }
                continue;
            }

            if finished {
                st.done = true;
                let snapshot = st.job.snapshot().await;
                return Some((StreamEvent::Complete(snapshot), st));
            }

            match tokio::time::timeout(st.keepalive, st.progress.changed()).await {
                Ok(Ok(())) => continue,
                // The job owns the sender, so this only happens at teardown.
                Ok(Err(_)) => {
                    st.done = true;
                    let snapshot = st.job.snapshot().await;
                    return Some((StreamEvent::Complete(snapshot), st));
                }
                Err(_) => return Some((StreamEvent::Keepalive, st)),
            }
        }
    }))
}

/// Stream wrapper that decrements the connection count on drop.
struct CountedStream<S> {
    inner: S,
    counter: Arc<AtomicU64>,
}

impl<S: Stream + Unpin> Stream for CountedStream<S> {
    type Item = S::Item;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for CountedStream<S> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
