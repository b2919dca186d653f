//! Bitmap messages as received, and scroll-ready messages as rendered.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::MarqueeError;
use crate::matrix::{Color, Matrix, StripeBuilder, StripePair};

// ── DisplayGeometry ──────────────────────────────────────────────

/// Physical size of the LED matrix, fixed at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayGeometry {
    pub rows: usize,
    pub columns: usize,
}

impl DisplayGeometry {
    pub fn new(rows: usize, columns: usize) -> Self {
        Self { rows, columns }
    }

    /// Number of pixels in one frame.
    pub fn frame_len(&self) -> usize {
        self.rows * self.columns
    }
}

// ── BitmapMessage ────────────────────────────────────────────────

/// Wire form of a message: a bitmap plus its loop offsets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BitmapMessage {
    #[serde(alias = "Matrix")]
    pub matrix: Matrix,
    #[serde(alias = "Preamble")]
    pub preamble: usize,
    #[serde(alias = "Checkpoint")]
    pub checkpoint: usize,
}

impl BitmapMessage {
    /// Decode a JSON event payload.
    pub fn from_json(payload: &[u8]) -> Result<Self, MarqueeError> {
        Ok(serde_json::from_slice(payload)?)
    }
}

// ── ScrollMessage ────────────────────────────────────────────────

/// A validated message with its stripes built, ready for the scheduler.
///
/// Only [`ScrollMessage::prepare`] constructs one, so every instance
/// satisfies `preamble <= checkpoint <= width` and every window index
/// below `width` is in bounds.
#[derive(Debug, Clone)]
pub struct ScrollMessage {
    stripes: StripePair,
    window: usize,
    preamble: usize,
    checkpoint: usize,
}

impl ScrollMessage {
    /// Validate `message` against the display and build its stripes.
    pub fn prepare(message: BitmapMessage, geometry: DisplayGeometry) -> Result<Self, MarqueeError> {
        let BitmapMessage {
            matrix,
            preamble,
            checkpoint,
        } = message;

        matrix.validate()?;
        if matrix.rows != geometry.rows {
            return Err(MarqueeError::RowMismatch {
                expected: geometry.rows,
                actual: matrix.rows,
            });
        }
        if matrix.columns < geometry.columns {
            return Err(MarqueeError::TooNarrow {
                columns: matrix.columns,
                window: geometry.columns,
            });
        }

        let width = matrix.columns - geometry.columns;
        if preamble > checkpoint || checkpoint > width {
            return Err(MarqueeError::Offsets {
                preamble,
                checkpoint,
                width,
            });
        }

        Ok(Self {
            stripes: StripeBuilder::build(&matrix)?,
            window: geometry.columns,
            preamble,
            checkpoint,
        })
    }

    /// Number of window positions a full pass scrolls through.
    pub fn width(&self) -> usize {
        self.stripes.columns() - self.window
    }

    pub fn preamble(&self) -> usize {
        self.preamble
    }

    pub fn checkpoint(&self) -> usize {
        self.checkpoint
    }

    /// The one-time lead-in: `0..checkpoint`.
    pub fn intro(&self) -> Range<usize> {
        0..self.checkpoint
    }

    /// One repetition of the loop body: `checkpoint..width` then
    /// `preamble..checkpoint`.
    pub fn body(&self) -> [Range<usize>; 2] {
        [self.checkpoint..self.width(), self.preamble..self.checkpoint]
    }

    /// The frame at window `index`.
    pub fn frame(&self, index: usize) -> &[Color] {
        self.stripes.window(index, self.window)
    }

    pub fn stripes(&self) -> &StripePair {
        &self.stripes
    }
}

// ── Tests ────────────────────────────────────────────────────────
