//! Document-sync feed over HTTP server-sent events.
//!
//! The feed streams the current document as `put` events:
//!
//! ```text
//! event: put
//! data: {"path": "/", "data": { "matrix": {..}, "preamble": 0, "checkpoint": 10 }}
//!
//! event: keep-alive
//! data: null
//! ```
//!
//! Only whole-document updates (`path == "/"`) are forwarded. The
//! server sends `keep-alive` regularly; if nothing arrives within the
//! keepalive timeout the session is torn down and re-opened.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, LinesCodec};
use tracing::{debug, warn};
use url::{Position, Url};

use crate::backoff::BackoffPolicy;
use crate::codec::{EventStreamCodec, SseEvent, SseFrame};
use crate::error::MarqueeError;
use crate::source::{MessageSource, Subscription, SubscriptionSender};

/// Longest accepted status or header line.
const MAX_HEADER_LINE: usize = 8 * 1024;

/// Default liveness window; the feed sends keep-alives every 30 s.
pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(90);

// ── EventFeedSource ──────────────────────────────────────────────

/// Subscribes to an `http://` server-sent event feed.
#[derive(Debug, Clone)]
pub struct EventFeedSource {
    url: Url,
    keepalive_timeout: Duration,
}

impl EventFeedSource {
    /// Parse and check the endpoint. Fails with an initialization
    /// error if the URL is unusable.
    pub fn new(url: &str, keepalive_timeout: Duration) -> Result<Self, MarqueeError> {
        let url = Url::parse(url)?;
        if url.scheme() != "http" {
            return Err(MarqueeError::Initialization(format!(
                "unsupported scheme {:?} (expected http)",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(MarqueeError::Initialization(format!("no host in {url}")));
        }
        Ok(Self {
            url,
            keepalive_timeout,
        })
    }

    /// The HTTP request that opens the stream.
    pub fn request(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        let host = match self.url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_owned(),
        };
        format!(
            "GET {} HTTP/1.0\r\nHost: {host}\r\nAccept: text/event-stream\r\nCache-Control: no-cache\r\n\r\n",
            &self.url[Position::BeforePath..Position::AfterQuery],
        )
    }

    /// Run the HTTP handshake on `io` and start streaming events.
    pub async fn open<T>(&self, mut io: T) -> Result<Subscription, MarqueeError>
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        io.write_all(self.request().as_bytes()).await?;
        io.flush().await?;

        let mut head = FramedRead::new(io, LinesCodec::new_with_max_length(MAX_HEADER_LINE));
        let status = head.next().await.ok_or(MarqueeError::StreamClosed)??;
        check_status(&status)?;
        loop {
            let line = head.next().await.ok_or(MarqueeError::StreamClosed)??;
            if line.is_empty() {
                break;
            }
        }

        let events = head.map_decoder(|_| EventStreamCodec::new());
        let (tx, mut subscription) = Subscription::channel(16);
        subscription.attach(tokio::spawn(pump(events, tx, self.keepalive_timeout)));
        Ok(subscription)
    }
}

#[async_trait]
impl MessageSource for EventFeedSource {
    async fn subscribe(&mut self) -> Result<Subscription, MarqueeError> {
        let host = self.url.host_str().unwrap_or_default();
        let port = self.url.port_or_known_default().unwrap_or(80);
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;
        self.open(stream).await
    }

    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::exponential()
    }

    fn describe(&self) -> String {
        self.url.to_string()
    }
}

// ── Session ──────────────────────────────────────────────────────

fn check_status(line: &str) -> Result<(), MarqueeError> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    let code = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/") {
        return Err(MarqueeError::Feed(format!("not an HTTP response: {line:?}")));
    }
    if code != "200" {
        return Err(MarqueeError::Feed(format!("unexpected status: {line}")));
    }
    Ok(())
}

/// Forward events until the stream ends, fails or goes quiet.
///
/// Undecodable events are forwarded as errors and the session goes on.
async fn pump<R>(
    mut events: FramedRead<R, EventStreamCodec>,
    tx: SubscriptionSender,
    keepalive_timeout: Duration,
) where
    R: AsyncRead + Unpin,
{
    loop {
        let next = match tokio::time::timeout(keepalive_timeout, events.next()).await {
            Ok(next) => next,
            Err(_) => {
                warn!("no event within {keepalive_timeout:?}");
                let _ = tx.send(Err(MarqueeError::KeepaliveTimeout(keepalive_timeout))).await;
                return;
            }
        };

        let item = match next {
            None => return,
            Some(Ok(SseFrame::Event(event))) => classify(&event),
            Some(Ok(SseFrame::Discarded(reason))) => Some(Err(MarqueeError::Decode(reason))),
            Some(Err(e)) => {
                let _ = tx.send(Err(e)).await;
                return;
            }
        };

        let fatal = matches!(&item, Some(Err(e)) if !e.is_recoverable_in_stream());
        if let Some(item) = item {
            if tx.send(item).await.is_err() {
                return;
            }
        }
        if fatal {
            return;
        }
    }
}

#[derive(Deserialize)]
struct PutEnvelope {
    path: String,
    data: serde_json::Value,
}

/// Map one server-sent event onto a subscription item.
///
/// Returns `None` for events that carry nothing to forward.
fn classify(event: &SseEvent) -> Option<Result<Bytes, MarqueeError>> {
    match event.event.as_str() {
        "put" => {
            let envelope: PutEnvelope = match serde_json::from_str(&event.data) {
                Ok(envelope) => envelope,
                Err(e) => return Some(Err(e.into())),
            };
            if envelope.path != "/" {
                return Some(Err(MarqueeError::Decode(format!(
                    "partial update at {}",
                    envelope.path
                ))));
            }
            Some(serde_json::to_vec(&envelope.data).map(Bytes::from).map_err(Into::into))
        }
        "keep-alive" => {
            debug!("keep-alive");
            None
        }
        "cancel" => Some(Err(MarqueeError::Feed("subscription cancelled".into()))),
        "auth_revoked" => Some(Err(MarqueeError::Feed("credential revoked".into()))),
        other => {
            debug!(event = other, "ignoring event");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
