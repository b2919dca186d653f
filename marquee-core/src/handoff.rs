//! Rendezvous handoff between the ingestion task and the scheduler.
//!
//! `send` completes only after the scheduler has taken the message, so
//! at most one message is ever in flight and a burst of updates
//! collapses onto whatever the scheduler picks up next.

use tokio::sync::{mpsc, oneshot};

use crate::error::MarqueeError;
use crate::message::ScrollMessage;

type Envelope = (ScrollMessage, oneshot::Sender<()>);

/// Create a connected sender/receiver pair.
pub fn channel() -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx }, HandoffReceiver { rx })
}

/// Producer side, held by the ingestion task.
#[derive(Debug, Clone)]
pub struct HandoffSender {
    tx: mpsc::Sender<Envelope>,
}

impl HandoffSender {
    /// Hand `message` over and wait until the scheduler accepts it.
    pub async fn send(&self, message: ScrollMessage) -> Result<(), MarqueeError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send((message, ack_tx))
            .await
            .map_err(|_| MarqueeError::ChannelClosed)?;
        ack_rx.await.map_err(|_| MarqueeError::ChannelClosed)
    }

    /// Whether the scheduler side has gone away.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side, owned by the render scheduler.
#[derive(Debug)]
pub struct HandoffReceiver {
    rx: mpsc::Receiver<Envelope>,
}

impl HandoffReceiver {
    /// Take the next message, releasing its sender.
    ///
    /// Returns `None` once every sender has been dropped.
    pub async fn recv(&mut self) -> Option<ScrollMessage> {
        let (message, ack) = self.rx.recv().await?;
        // The sender may have given up waiting; the message is still ours.
        let _ = ack.send(());
        Some(message)
    }
}
