//! The ingestion task: subscribe, decode, hand off, reconnect.
//!
//! Keeps exactly one subscription to the message source alive. Bad
//! events are dropped without touching the subscription; a failed or
//! closed subscription is re-opened under the source's backoff policy.
//! The loop only exits if the render scheduler goes away.

use futures::StreamExt;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::backoff::BackoffPolicy;
use crate::error::MarqueeError;
use crate::handoff::HandoffSender;
use crate::message::{BitmapMessage, DisplayGeometry, ScrollMessage};
use crate::source::{MessageSource, Subscription};

// ── IngestStats ──────────────────────────────────────────────────

/// Counters published after every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Payloads read from the source.
    pub received: u64,
    /// Messages handed to the scheduler.
    pub accepted: u64,
    /// Payloads or stream items dropped as undecodable or invalid.
    pub dropped: u64,
    /// Subscriptions successfully opened.
    pub subscriptions: u64,
    /// Reconnect attempts scheduled.
    pub reconnects: u64,
}

// ── Ingestor ─────────────────────────────────────────────────────

/// Feeds the render scheduler from a [`MessageSource`].
pub struct Ingestor<M> {
    source: M,
    geometry: DisplayGeometry,
    handoff: HandoffSender,
    backoff: BackoffPolicy,
    stats_tx: watch::Sender<IngestStats>,
    stats_rx: watch::Receiver<IngestStats>,
}

impl<M: MessageSource> Ingestor<M> {
    /// Create an ingestor using the source's own backoff policy.
    pub fn new(source: M, geometry: DisplayGeometry, handoff: HandoffSender) -> Self {
        let backoff = source.backoff();
        Self::with_backoff(source, geometry, handoff, backoff)
    }

    pub fn with_backoff(
        source: M,
        geometry: DisplayGeometry,
        handoff: HandoffSender,
        backoff: BackoffPolicy,
    ) -> Self {
        let (stats_tx, stats_rx) = watch::channel(IngestStats::default());
        Self {
            source,
            geometry,
            handoff,
            backoff,
            stats_tx,
            stats_rx,
        }
    }

    /// Obtain a `watch::Receiver` for ingestion counters.
    pub fn stats_receiver(&self) -> watch::Receiver<IngestStats> {
        self.stats_rx.clone()
    }

    /// Run forever. Returns only with [`MarqueeError::ChannelClosed`]
    /// once the scheduler has dropped its end of the handoff.
    pub async fn run(&mut self) -> Result<(), MarqueeError> {
        let endpoint = self.source.describe();
        info!(%endpoint, "ingestion started");

        loop {
            match self.source.subscribe().await {
                Ok(subscription) => {
                    info!(%endpoint, "subscribed");
                    self.backoff.reset();
                    self.stats_tx.send_modify(|s| s.subscriptions += 1);
                    self.pump(subscription).await?;
                }
                Err(e) => {
                    warn!(%endpoint, attempt = self.backoff.attempts(), "subscribe failed: {e}");
                }
            }

            let delay = match self.backoff.next_attempt() {
                Some(delay) => delay,
                None => {
                    warn!("retry budget spent; starting a new backoff cycle");
                    self.backoff.reset();
                    self.backoff.next_attempt().unwrap_or_default()
                }
            };
            self.stats_tx.send_modify(|s| s.reconnects += 1);
            info!(?delay, "re-opening subscription");
            tokio::time::sleep(delay).await;
        }
    }

    /// Drain one subscription until it ends or fails.
    async fn pump(&mut self, mut subscription: Subscription) -> Result<(), MarqueeError> {
        while let Some(item) = subscription.next().await {
            match item {
                Ok(payload) => self.accept(&payload).await?,
                Err(e) if e.is_recoverable_in_stream() => {
                    warn!("dropping event: {e}");
                    self.stats_tx.send_modify(|s| s.dropped += 1);
                }
                Err(e) => {
                    warn!("subscription failed: {e}");
                    return Ok(());
                }
            }
        }
        info!("stream closed");
        Ok(())
    }

    /// Decode and validate one payload, then block until the
    /// scheduler takes it.
    async fn accept(&mut self, payload: &[u8]) -> Result<(), MarqueeError> {
        self.stats_tx.send_modify(|s| s.received += 1);

        let decoded = BitmapMessage::from_json(payload)
            .and_then(|raw| ScrollMessage::prepare(raw, self.geometry));
        let message = match decoded {
            Ok(message) => message,
            Err(e) => {
                warn!("dropping event: {e}");
                self.stats_tx.send_modify(|s| s.dropped += 1);
                return Ok(());
            }
        };

        info!(width = message.width(), "message received");
        self.handoff.send(message).await?;
        self.stats_tx.send_modify(|s| s.accepted += 1);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
