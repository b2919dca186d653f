//! Direct socket stream of newline-delimited JSON messages.
//!
//! Every line the server sends is one bitmap message. The client pings
//! the server periodically; a failed ping means the connection is dead
//! and the session ends so the ingestion task can reconnect.
//!
//! On every reconnect the client first writes a `skip` line, telling the
//! server not to replay the message that is already on screen.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::time::{Instant, interval_at};
use tokio_util::codec::{Decoder, Encoder, Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::backoff::BackoffPolicy;
use crate::error::MarqueeError;
use crate::source::{MessageSource, Subscription};

/// Longest accepted message line.
pub const MAX_LINE_LENGTH: usize = 1 << 20;

/// Keepalive line written by the client.
pub const PING: &str = "ping";

/// Reply the server may send to a ping; skipped.
pub const PONG: &str = "pong";

/// First line of a resumed session: do not replay the current message.
pub const SKIP: &str = "skip";

// ── FeedLineCodec ────────────────────────────────────────────────

/// One decoded line, or the marker left by an over-long one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedLine {
    Line(String),
    Oversized,
}

/// `LinesCodec` that reports over-long lines in-band.
///
/// `LinesCodec` already skips to the next newline after an over-long
/// line, but `Framed` stops reading after any decoder error.
#[derive(Debug)]
pub struct FeedLineCodec {
    inner: LinesCodec,
}

impl FeedLineCodec {
    pub fn new(max_length: usize) -> Self {
        Self {
            inner: LinesCodec::new_with_max_length(max_length),
        }
    }

    fn lift(
        result: Result<Option<String>, LinesCodecError>,
    ) -> Result<Option<FeedLine>, LinesCodecError> {
        match result {
            Ok(line) => Ok(line.map(FeedLine::Line)),
            Err(LinesCodecError::MaxLineLengthExceeded) => Ok(Some(FeedLine::Oversized)),
            Err(e) => Err(e),
        }
    }
}

impl Decoder for FeedLineCodec {
    type Item = FeedLine;
    type Error = LinesCodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FeedLine>, LinesCodecError> {
        Self::lift(self.inner.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<FeedLine>, LinesCodecError> {
        Self::lift(self.inner.decode_eof(src))
    }
}

impl<T: AsRef<str>> Encoder<T> for FeedLineCodec {
    type Error = LinesCodecError;

    fn encode(&mut self, line: T, dst: &mut BytesMut) -> Result<(), LinesCodecError> {
        self.inner.encode(line, dst)
    }
}

// ── LineFeedSource ───────────────────────────────────────────────

/// Streams JSON lines from a `host:port` TCP endpoint.
#[derive(Debug, Clone)]
pub struct LineFeedSource {
    address: String,
    ping_period: Duration,
    resumed: bool,
}

impl LineFeedSource {
    /// Accepts `host:port`, optionally prefixed with `tcp://`.
    pub fn new(address: &str, ping_period: Duration) -> Result<Self, MarqueeError> {
        let address = address.strip_prefix("tcp://").unwrap_or(address);
        match address.rsplit_once(':') {
            Some((host, port)) if !host.is_empty() && port.parse::<u16>().is_ok() => {}
            _ => {
                return Err(MarqueeError::Initialization(format!(
                    "expected host:port, got {address:?}"
                )));
            }
        }
        if ping_period.is_zero() {
            return Err(MarqueeError::Initialization("ping period must be positive".into()));
        }
        Ok(Self {
            address: address.to_owned(),
            ping_period,
            resumed: false,
        })
    }

    /// Start reading lines from `io` and pinging through it.
    ///
    /// A resumed session announces itself with [`SKIP`] before anything
    /// else is written.
    pub fn open<T>(&self, io: T) -> Subscription
    where
        T: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut writer, mut reader) = Framed::new(io, FeedLineCodec::new(MAX_LINE_LENGTH)).split();
        let (tx, mut subscription) = Subscription::channel(16);

        // Reader task: network -> subscription
        let read_tx = tx.clone();
        subscription.attach(tokio::spawn(async move {
            while let Some(result) = reader.next().await {
                let item = match result {
                    Ok(FeedLine::Line(line)) if line.trim().is_empty() || line == PONG => continue,
                    Ok(FeedLine::Line(line)) => Ok(Bytes::from(line)),
                    Ok(FeedLine::Oversized) => Err(MarqueeError::Decode("line too long".into())),
                    Err(e) => {
                        let _ = read_tx.send(Err(e.into())).await;
                        return;
                    }
                };
                if read_tx.send(item).await.is_err() {
                    return;
                }
            }
            let _ = read_tx.send(Err(MarqueeError::StreamClosed)).await;
        }));

        // Keepalive task: ping -> network
        let period = self.ping_period;
        let resumed = self.resumed;
        subscription.attach(tokio::spawn(async move {
            if resumed {
                if let Err(e) = writer.send(SKIP).await {
                    warn!("resume marker failed: {e}");
                    let _ = tx.send(Err(e.into())).await;
                    return;
                }
            }
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                debug!("ping");
                if let Err(e) = writer.send(PING).await {
                    warn!("keepalive failed: {e}");
                    let _ = tx.send(Err(e.into())).await;
                    break;
                }
            }
        }));

        subscription
    }
}

#[async_trait]
impl MessageSource for LineFeedSource {
    async fn subscribe(&mut self) -> Result<Subscription, MarqueeError> {
        let stream = TcpStream::connect(&self.address).await?;
        stream.set_nodelay(true)?;
        let subscription = self.open(stream);
        self.resumed = true;
        Ok(subscription)
    }

    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::immediate()
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address)
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation() {
        assert!(LineFeedSource::new("tcp://127.0.0.1:9000", Duration::from_secs(30)).is_ok());
        assert!(LineFeedSource::new("display.local:9000", Duration::from_secs(30)).is_ok());
        assert!(matches!(
            LineFeedSource::new("display.local", Duration::from_secs(30)),
            Err(MarqueeError::Initialization(_))
        ));
        assert!(LineFeedSource::new(":9000", Duration::from_secs(30)).is_err());
        assert!(LineFeedSource::new("host:1", Duration::ZERO).is_err());
    }

    #[test]
    fn describe_and_backoff() {
        let src = LineFeedSource::new("127.0.0.1:9000", Duration::from_secs(30)).unwrap();
        assert_eq!(src.describe(), "tcp://127.0.0.1:9000");
        assert_eq!(src.backoff().next_attempt(), Some(Duration::ZERO));
    }

    #[tokio::test]
    async fn lines_become_payloads() {
        let src = LineFeedSource::new("127.0.0.1:9000", Duration::from_secs(3600)).unwrap();
        let io = tokio_test::io::Builder::new()
            .read(b"{\"a\":1}\n\npong\n{\"b\":2}\n")
            .build();

        let mut sub = src.open(io);
        assert_eq!(&sub.next().await.unwrap().unwrap()[..], br#"{"a":1}"#);
        assert_eq!(&sub.next().await.unwrap().unwrap()[..], br#"{"b":2}"#);
    }

    #[tokio::test]
    async fn oversized_line_is_dropped_and_reading_continues() {
        let src = LineFeedSource::new("127.0.0.1:9000", Duration::from_secs(3600)).unwrap();
        let mut long = "x".repeat(MAX_LINE_LENGTH + 10);
        long.push('\n');
        let io = tokio_test::io::Builder::new()
            .read(long.as_bytes())
            .read(b"{\"ok\":1}\n")
            .build();

        let mut sub = src.open(io);
        let err = sub.next().await.unwrap().unwrap_err();
        assert!(err.is_recoverable_in_stream());
        assert_eq!(&sub.next().await.unwrap().unwrap()[..], br#"{"ok":1}"#);
    }

    #[tokio::test]
    async fn resumed_session_writes_skip_first() {
        let mut src = LineFeedSource::new("127.0.0.1:9000", Duration::from_secs(3600)).unwrap();
        src.resumed = true;
        let io = tokio_test::io::Builder::new()
            .write(b"skip\n")
            .read(b"{\"a\":1}\n")
            .build();

        let mut sub = src.open(io);
        assert_eq!(&sub.next().await.unwrap().unwrap()[..], br#"{"a":1}"#);
    }

    #[test]
    fn codec_reports_oversized_lines() {
        let mut codec = FeedLineCodec::new(4);
        let mut buf = BytesMut::from("abcdefgh\nok\n");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(FeedLine::Oversized));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(FeedLine::Line("ok".into())));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ping_ends_the_session() {
        let src = LineFeedSource::new("127.0.0.1:9000", Duration::from_secs(30)).unwrap();
        let io = tokio_test::io::Builder::new()
            .wait(Duration::from_secs(3600))
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone"))
            .build();

        let mut sub = src.open(io);
        assert!(matches!(sub.next().await, Some(Err(MarqueeError::Connection(_)))));
    }
}
