//! Bitmap matrices and the interleaved stripe transform.
//!
//! The LED panel is a single serpentine strip wired column by column:
//! the first column runs top to bottom, the next one bottom to top, and
//! so on. A scrolled window can start on either kind of column, so every
//! matrix is turned into two column-major buffers with opposite column
//! orientations. A window starting at column `i` is read from
//! `phase[i % 2]`, which always lays its first column out top to bottom.
//!
//! ```text
//!  matrix (2×3)      phase 0          phase 1
//!  a b c             a d | e b | c f   d a | b e | f c
//!  d e f
//! ```

use serde::{Deserialize, Serialize};

use crate::error::MarqueeError;

/// A packed `0xRRGGBB` color value.
pub type Color = u32;

// ── Matrix ───────────────────────────────────────────────────────

/// A row-major bitmap as delivered by the message source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Matrix {
    #[serde(alias = "Rows")]
    pub rows: usize,
    #[serde(alias = "Columns")]
    pub columns: usize,
    #[serde(alias = "Bitmap", alias = "bitmap")]
    pub pixels: Vec<Color>,
}

impl Matrix {
    pub fn new(rows: usize, columns: usize, pixels: Vec<Color>) -> Self {
        Self {
            rows,
            columns,
            pixels,
        }
    }

    /// Checks that `pixels` holds exactly `rows * columns` values.
    ///
    /// Dimensions come off the wire, so a product that does not fit in
    /// `usize` is rejected rather than wrapped.
    pub fn validate(&self) -> Result<(), MarqueeError> {
        if self.rows == 0 || self.columns == 0 {
            return Err(MarqueeError::Decode(format!(
                "empty matrix {}x{}",
                self.rows, self.columns
            )));
        }
        let expected = self.rows.checked_mul(self.columns).ok_or_else(|| {
            MarqueeError::Decode(format!("matrix {}x{} is too large", self.rows, self.columns))
        })?;
        if self.pixels.len() != expected {
            return Err(MarqueeError::PixelCount {
                expected,
                actual: self.pixels.len(),
            });
        }
        Ok(())
    }

    /// Pixel at `(row, column)`.
    pub fn at(&self, row: usize, column: usize) -> Color {
        self.pixels[row * self.columns + column]
    }
}

// ── StripePair ───────────────────────────────────────────────────

/// Two column-major buffers with alternating column orientation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripePair {
    rows: usize,
    columns: usize,
    phases: [Vec<Color>; 2],
}

impl StripePair {
    /// Height of every column in the stripes.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Number of columns held by each phase.
    pub fn columns(&self) -> usize {
        self.columns
    }

    /// One of the two phase buffers.
    pub fn phase(&self, phase: usize) -> &[Color] {
        &self.phases[phase % 2]
    }

    /// The `window_columns`-wide window starting at column `index`,
    /// taken from `phase[index % 2]`.
    ///
    /// # Panics
    ///
    /// Panics if the window extends past the last column.
    pub fn window(&self, index: usize, window_columns: usize) -> &[Color] {
        let start = index * self.rows;
        let end = (index + window_columns) * self.rows;
        &self.phases[index % 2][start..end]
    }
}

// ── StripeBuilder ────────────────────────────────────────────────

/// Pure transform from a [`Matrix`] to its [`StripePair`].
pub struct StripeBuilder;

impl StripeBuilder {
    /// Build both phases. Fails only when the pixel count is wrong.
    pub fn build(matrix: &Matrix) -> Result<StripePair, MarqueeError> {
        matrix.validate()?;

        let rows = matrix.rows;
        let len = matrix.pixels.len();
        let mut phases = [vec![0; len], vec![0; len]];

        for x in 0..matrix.columns {
            let (forward, reverse) = if x % 2 == 0 { (0, 1) } else { (1, 0) };
            for y in 0..rows {
                let color = matrix.at(y, x);
                phases[forward][x * rows + y] = color;
                phases[reverse][x * rows + rows - 1 - y] = color;
            }
        }

        Ok(StripePair {
            rows,
            columns: matrix.columns,
            phases,
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────
