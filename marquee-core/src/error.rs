//! Domain-specific error types for the marquee pipeline.
//!
//! Errors fall into four families: decode and validation errors are
//! dropped per event, connection errors are absorbed by the reconnect
//! loop, and initialization errors stop the process at startup.

use std::time::Duration;
use thiserror::Error;

/// The canonical error type for the marquee pipeline.
#[derive(Debug, Error)]
pub enum MarqueeError {
    // ── Decode Errors ────────────────────────────────────────────
    /// An event payload could not be decoded into a bitmap message.
    #[error("decode error: {0}")]
    Decode(String),

    // ── Validation Errors ────────────────────────────────────────
    /// The pixel buffer does not hold `rows * columns` values.
    #[error("pixel count mismatch: expected {expected}, got {actual}")]
    PixelCount { expected: usize, actual: usize },

    /// The matrix height differs from the physical display.
    #[error("row count mismatch: display has {expected} rows, matrix has {actual}")]
    RowMismatch { expected: usize, actual: usize },

    /// The matrix is narrower than one display window.
    #[error("matrix too narrow: {columns} columns for a {window}-column display")]
    TooNarrow { columns: usize, window: usize },

    /// Loop offsets violate `preamble <= checkpoint <= width`.
    #[error("invalid offsets: preamble {preamble}, checkpoint {checkpoint}, width {width}")]
    Offsets {
        preamble: usize,
        checkpoint: usize,
        width: usize,
    },

    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The remote side closed the stream.
    #[error("stream closed")]
    StreamClosed,

    /// Nothing was heard from the source within the liveness window.
    #[error("no keepalive within {0:?}")]
    KeepaliveTimeout(Duration),

    /// The feed rejected or cancelled the subscription.
    #[error("feed error: {0}")]
    Feed(String),

    // ── Startup Errors ───────────────────────────────────────────
    /// A required collaborator could not be acquired at startup.
    #[error("initialization failed: {0}")]
    Initialization(String),

    // ── Internal ─────────────────────────────────────────────────
    /// The handoff to the render scheduler was closed.
    #[error("channel closed")]
    ChannelClosed,
}

impl MarqueeError {
    /// Whether the error only affects a single event and leaves the
    /// subscription usable.
    pub fn is_recoverable_in_stream(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::PixelCount { .. }
                | Self::RowMismatch { .. }
                | Self::TooNarrow { .. }
                | Self::Offsets { .. }
        )
    }

    /// Whether the error belongs to the validation family.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::PixelCount { .. }
                | Self::RowMismatch { .. }
                | Self::TooNarrow { .. }
                | Self::Offsets { .. }
        )
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<serde_json::Error> for MarqueeError {
    fn from(e: serde_json::Error) -> Self {
        MarqueeError::Decode(e.to_string())
    }
}

impl From<tokio_util::codec::LinesCodecError> for MarqueeError {
    fn from(e: tokio_util::codec::LinesCodecError) -> Self {
        match e {
            tokio_util::codec::LinesCodecError::MaxLineLengthExceeded => {
                MarqueeError::Decode("line too long".into())
            }
            tokio_util::codec::LinesCodecError::Io(io) => MarqueeError::Connection(io),
        }
    }
}

impl From<url::ParseError> for MarqueeError {
    fn from(e: url::ParseError) -> Self {
        MarqueeError::Initialization(format!("invalid endpoint: {e}"))
    }
}
