//! Message sources: interchangeable transports behind one capability.
//!
//! A source hands out [`Subscription`]s, each a stream of raw JSON
//! payloads. Decoding happens in the ingestion task, so transports only
//! deal with framing and liveness.
//!
//! | Transport          | Framing                    | Liveness               | Backoff     |
//! |--------------------|----------------------------|------------------------|-------------|
//! | [`EventFeedSource`] | HTTP + server-sent events | server keep-alive idle | exponential |
//! | [`LineFeedSource`]  | newline-delimited JSON    | client ping            | immediate   |

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::backoff::BackoffPolicy;
use crate::error::MarqueeError;

pub mod event_feed;
pub mod line_feed;

pub use event_feed::EventFeedSource;
pub use line_feed::LineFeedSource;

/// One item of a subscription: a raw payload or a failure.
pub type SourceItem = Result<Bytes, MarqueeError>;

/// Sender half used by transport tasks to feed a [`Subscription`].
pub type SubscriptionSender = mpsc::Sender<SourceItem>;

// ── MessageSource ────────────────────────────────────────────────

/// A remote feed of bitmap messages.
#[async_trait]
pub trait MessageSource: Send {
    /// Open a fresh subscription.
    async fn subscribe(&mut self) -> Result<Subscription, MarqueeError>;

    /// Retry policy for reconnecting to this source.
    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential()
    }

    /// Human-readable endpoint, for logs.
    fn describe(&self) -> String;
}

#[async_trait]
impl<M: MessageSource + ?Sized> MessageSource for Box<M> {
    async fn subscribe(&mut self) -> Result<Subscription, MarqueeError> {
        (**self).subscribe().await
    }

    fn backoff(&self) -> BackoffPolicy {
        (**self).backoff()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

// ── Subscription ─────────────────────────────────────────────────

/// A live stream of payloads.
///
/// Background tasks feeding the stream are aborted when the
/// subscription is dropped, which closes the underlying connection.
#[derive(Debug)]
pub struct Subscription {
    events: ReceiverStream<SourceItem>,
    tasks: Vec<JoinHandle<()>>,
}

impl Subscription {
    /// Create a subscription and the sender that feeds it.
    pub fn channel(capacity: usize) -> (SubscriptionSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            tx,
            Self {
                events: ReceiverStream::new(rx),
                tasks: Vec::new(),
            },
        )
    }

    /// Tie a background task to the lifetime of this subscription.
    pub fn attach(&mut self, task: JoinHandle<()>) {
        self.tasks.push(task);
    }
}

impl Stream for Subscription {
    type Item = SourceItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.events).poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn items_flow_in_order() {
        let (tx, mut sub) = Subscription::channel(4);
        tx.send(Ok(Bytes::from_static(b"1"))).await.unwrap();
        tx.send(Err(MarqueeError::StreamClosed)).await.unwrap();
        drop(tx);

        assert_eq!(sub.next().await.unwrap().unwrap(), Bytes::from_static(b"1"));
        assert!(matches!(sub.next().await, Some(Err(MarqueeError::StreamClosed))));
        assert!(sub.next().await.is_none());
    }

    #[tokio::test]
    async fn drop_aborts_tasks() {
        let (_tx, mut sub) = Subscription::channel(1);
        let task = tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let handle = task.abort_handle();
        sub.attach(task);
        drop(sub);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(handle.is_finished());
    }
}
