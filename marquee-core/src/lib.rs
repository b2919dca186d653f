//! # marquee-core
//!
//! Core library for driving a scrolling LED pixel-matrix display from a
//! remote message feed.
//!
//! This crate contains:
//! - **Matrix**: `Matrix` bitmaps and the `StripeBuilder` serpentine transform
//! - **Message**: wire `BitmapMessage` and validated `ScrollMessage`
//! - **Render**: the `RenderScheduler` state machine and `FrameSink` trait
//! - **Ingest**: the `Ingestor` task that keeps a subscription alive
//! - **Source**: `MessageSource` transports (SSE document feed, JSON lines)
//! - **Codec**: `EventStreamCodec` for server-sent event framing
//! - **Backoff**: `BackoffPolicy` for reconnect loops
//! - **Handoff**: rendezvous channel between ingestion and rendering
//! - **Error**: `MarqueeError`, a `thiserror`-based error hierarchy

pub mod backoff;
pub mod codec;
pub mod error;
pub mod handoff;
pub mod ingest;
pub mod matrix;
pub mod message;
pub mod render;
pub mod source;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use backoff::BackoffPolicy;
pub use codec::{EventStreamCodec, SseEvent, SseFrame};
pub use error::MarqueeError;
pub use handoff::{HandoffReceiver, HandoffSender};
pub use ingest::{IngestStats, Ingestor};
pub use matrix::{Color, Matrix, StripeBuilder, StripePair};
pub use message::{BitmapMessage, DisplayGeometry, ScrollMessage};
pub use render::{DisplayPhase, FrameSink, RenderEvent, RenderScheduler, RenderState};
pub use source::{EventFeedSource, LineFeedSource, MessageSource, Subscription};
