//! Async driver for the render state machine.
//!
//! The scheduler owns the current message and the sink outright. It
//! waits on two inputs: the handoff from the ingestion task and its own
//! single-slot continuation channel. When both are ready the new
//! message wins, so a switch never waits for more than one pass.

use tokio::sync::mpsc;
use tracing::{info, trace};

use crate::handoff::HandoffReceiver;
use crate::render::sink::FrameSink;
use crate::render::state::{RenderEvent, RenderState};

/// Turns scroll messages into an endless sequence of frame writes.
pub struct RenderScheduler<S> {
    state: RenderState,
    sink: S,
    inbox: HandoffReceiver,
    inbox_open: bool,
    roll_tx: mpsc::Sender<()>,
    roll_rx: mpsc::Receiver<()>,
    frames: u64,
}

impl<S: FrameSink> RenderScheduler<S> {
    pub fn new(inbox: HandoffReceiver, sink: S) -> Self {
        let (roll_tx, roll_rx) = mpsc::channel(1);
        Self {
            state: RenderState::Idle,
            sink,
            inbox,
            inbox_open: true,
            roll_tx,
            roll_rx,
            frames: 0,
        }
    }

    pub fn state(&self) -> &RenderState {
        &self.state
    }

    /// Frames written since start.
    pub fn frames_sent(&self) -> u64 {
        self.frames
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Wait for the next event. New messages take strict priority over
    /// a pending tick.
    ///
    /// Returns `None` when the handoff is closed and nothing is left to
    /// roll.
    pub async fn next_event(&mut self) -> Option<RenderEvent> {
        loop {
            tokio::select! {
                biased;

                message = self.inbox.recv(), if self.inbox_open => match message {
                    Some(message) => return Some(RenderEvent::MessageArrived(message)),
                    None => {
                        info!("handoff closed; keeping the current message");
                        self.inbox_open = false;
                    }
                },
                Some(()) = self.roll_rx.recv(), if self.state.has_body() => {
                    return Some(RenderEvent::RollTick);
                }
                else => return None,
            }
        }
    }

    /// Apply `event`, write its frames and re-arm the continuation.
    pub async fn handle(&mut self, event: RenderEvent) {
        if let RenderEvent::MessageArrived(message) = &event {
            info!(
                width = message.width(),
                preamble = message.preamble(),
                checkpoint = message.checkpoint(),
                "switching to new message"
            );
            self.reset_roll();
        }

        let passes = self.state.apply(event);
        let Some(message) = self.state.message() else {
            return;
        };

        for pass in passes {
            trace!(start = pass.start, end = pass.end, "rolling");
            for index in pass {
                self.sink.send_frame(message.frame(index)).await;
                self.frames += 1;
            }
        }

        // The slot holds at most one tick, so a full channel is fine.
        let _ = self.roll_tx.try_send(());
    }

    /// Run until the handoff closes with nothing left to show.
    pub async fn run(&mut self) {
        info!("render scheduler started");
        while let Some(event) = self.next_event().await {
            self.handle(event).await;
        }
        info!(frames = self.frames, "render scheduler stopped");
    }

    /// Drop any pending tick by replacing the continuation channel.
    fn reset_roll(&mut self) {
        let (roll_tx, roll_rx) = mpsc::channel(1);
        self.roll_tx = roll_tx;
        self.roll_rx = roll_rx;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::handoff::{self, HandoffSender};
    use crate::matrix::{Color, Matrix};
    use crate::message::{BitmapMessage, DisplayGeometry, ScrollMessage};
    use crate::render::state::DisplayPhase;

    const ROWS: usize = 8;

    /// Records the window index of every frame, decoded from the color
    /// of its top-left pixel.
    #[derive(Default)]
    struct Recorder {
        windows: Vec<usize>,
        tags: Vec<u32>,
    }

    #[async_trait]
    impl FrameSink for Recorder {
        async fn send_frame(&mut self, frame: &[Color]) {
            assert_eq!(frame.len(), ROWS * 5);
            // Row 0 of the first column must come first in strip order.
            assert_eq!(frame[0] >> 8 & 0xff, 0);
            self.windows.push((frame[0] & 0xff) as usize);
            self.tags.push(frame[0] >> 16);
        }
    }

    /// Color = tag << 16 | row << 8 | column.
    fn message(tag: u32, columns: usize, preamble: usize, checkpoint: usize) -> ScrollMessage {
        let pixels = (0..ROWS * columns)
            .map(|i| tag << 16 | ((i / columns) as u32) << 8 | (i % columns) as u32)
            .collect();
        let raw = BitmapMessage {
            matrix: Matrix::new(ROWS, columns, pixels),
            preamble,
            checkpoint,
        };
        ScrollMessage::prepare(raw, DisplayGeometry::new(ROWS, 5)).unwrap()
    }

    fn scheduler() -> (HandoffSender, RenderScheduler<Recorder>) {
        let (tx, rx) = handoff::channel();
        (tx, RenderScheduler::new(rx, Recorder::default()))
    }

    async fn deliver(tx: &HandoffSender, message: ScrollMessage) {
        let tx = tx.clone();
        tokio::spawn(async move { tx.send(message).await });
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn intro_then_body_loop() {
        let (tx, mut sched) = scheduler();
        deliver(&tx, message(1, 40, 0, 10)).await;

        let event = sched.next_event().await.unwrap();
        assert!(matches!(event, RenderEvent::MessageArrived(_)));
        sched.handle(event).await;
        assert_eq!(sched.sink().windows, (0..10).collect::<Vec<_>>());
        assert_eq!(sched.state().phase(), Some(DisplayPhase::Intro));

        for _ in 0..2 {
            let event = sched.next_event().await.unwrap();
            assert!(matches!(event, RenderEvent::RollTick));
            sched.handle(event).await;
        }

        let expected: Vec<usize> = (0..10).chain(10..35).chain(0..10).chain(10..35).chain(0..10).collect();
        assert_eq!(sched.sink().windows, expected);
        assert_eq!(sched.frames_sent(), expected.len() as u64);
        assert_eq!(sched.state().phase(), Some(DisplayPhase::Loop));
    }

    #[tokio::test]
    async fn message_beats_pending_tick() {
        let (tx, mut sched) = scheduler();
        deliver(&tx, message(1, 40, 0, 10)).await;
        let event = sched.next_event().await.unwrap();
        sched.handle(event).await;

        // A tick is armed; a message now waits too.
        deliver(&tx, message(2, 20, 0, 3)).await;
        let event = sched.next_event().await.unwrap();
        assert!(matches!(event, RenderEvent::MessageArrived(_)));
        sched.handle(event).await;

        let (old, new) = sched.sink().tags.split_at(10);
        assert!(old.iter().all(|&t| t == 1));
        assert!(new.iter().all(|&t| t == 2));
        assert_eq!(sched.sink().windows[10..], [0, 1, 2]);
    }

    #[tokio::test]
    async fn replaced_message_leaves_one_tick() {
        let (tx, mut sched) = scheduler();
        deliver(&tx, message(1, 40, 0, 10)).await;
        let event = sched.next_event().await.unwrap();
        sched.handle(event).await;
        deliver(&tx, message(2, 20, 1, 3)).await;
        let event = sched.next_event().await.unwrap();
        sched.handle(event).await;

        let event = sched.next_event().await.unwrap();
        assert!(matches!(event, RenderEvent::RollTick));
        sched.handle(event).await;

        let windows = &sched.sink().windows[10..];
        let expected: Vec<usize> = (0..3).chain(3..15).chain(1..3).collect();
        assert_eq!(windows, expected.as_slice());
    }

    #[tokio::test]
    async fn identical_message_restarts_intro() {
        let (tx, mut sched) = scheduler();
        for _ in 0..2 {
            deliver(&tx, message(1, 40, 0, 4)).await;
            let event = sched.next_event().await.unwrap();
            sched.handle(event).await;
        }
        assert_eq!(sched.sink().windows, vec![0, 1, 2, 3, 0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn closed_handoff_keeps_rolling() {
        let (tx, mut sched) = scheduler();
        deliver(&tx, message(1, 8, 0, 1)).await;
        drop(tx);

        for _ in 0..4 {
            let event = sched.next_event().await.unwrap();
            sched.handle(event).await;
        }
        // Intro 0, then body 1..3 + 0..1 three times.
        assert_eq!(sched.sink().windows, vec![0, 1, 2, 0, 1, 2, 0, 1, 2, 0]);
    }

    #[tokio::test]
    async fn static_message_stops_when_handoff_closes() {
        let (tx, mut sched) = scheduler();
        deliver(&tx, message(1, 5, 0, 0)).await;
        drop(tx);

        sched.run().await;
        assert!(sched.sink().windows.is_empty());
        assert!(sched.state().message().is_some());
    }

    #[tokio::test]
    async fn idle_with_closed_handoff_returns() {
        let (tx, mut sched) = scheduler();
        drop(tx);
        assert!(sched.next_event().await.is_none());
        assert!(sched.state().is_idle());
    }
}
