//! Frame sinks for the daemon.
//!
//! The UDP sink streams every frame to a panel controller as one
//! datagram:
//!
//! ```text
//! rows:     u16 LE (2)
//! columns:  u16 LE (2)
//! pixels:   rows * columns × [r, g, b]   (strip order, brightness applied)
//! ```

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time::{Duration, Interval, MissedTickBehavior};
use tracing::{info, trace, warn};

use marquee_core::{Color, DisplayGeometry, FrameSink, MarqueeError};

use crate::config::{DisplayConfig, SinkKind};

/// Datagram header size.
pub const HEADER_SIZE: usize = 4;

/// Scale a `0xRRGGBB` color by `brightness / 255`.
pub fn scale(color: Color, brightness: u8) -> [u8; 3] {
    let level = brightness as u32;
    let channel = |shift: u32| (((color >> shift) & 0xff) * level / 255) as u8;
    [channel(16), channel(8), channel(0)]
}

/// Acquire the sink selected by `display`. Failure is fatal at startup.
pub async fn open(display: &DisplayConfig) -> Result<Box<dyn FrameSink>, MarqueeError> {
    let geometry = DisplayGeometry::new(display.rows, display.columns);
    let interval = Duration::from_millis(display.frame_interval_ms);
    match display.sink {
        SinkKind::Udp => {
            let sink =
                UdpFrameSink::connect(&display.udp_target, geometry, display.brightness, interval)
                    .await?;
            Ok(Box::new(sink))
        }
        SinkKind::Log => Ok(Box::new(LogSink::new(interval))),
    }
}

// ── Pacing ───────────────────────────────────────────────────────

/// Holds frames to a minimum spacing. A zero interval disables pacing.
struct Pacer {
    ticker: Option<Interval>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        let ticker = (!interval.is_zero()).then(|| {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });
        Self { ticker }
    }

    async fn wait(&mut self) {
        if let Some(ticker) = self.ticker.as_mut() {
            ticker.tick().await;
        }
    }
}

// ── UdpFrameSink ─────────────────────────────────────────────────

/// Sends frames to a panel controller over UDP.
pub struct UdpFrameSink {
    socket: UdpSocket,
    geometry: DisplayGeometry,
    brightness: u8,
    pacer: Pacer,
    buf: Vec<u8>,
    failures: u64,
}

impl UdpFrameSink {
    /// Bind a local socket and connect it to `target`.
    pub async fn connect(
        target: &str,
        geometry: DisplayGeometry,
        brightness: u8,
        frame_interval: Duration,
    ) -> Result<Self, MarqueeError> {
        let init = |e: std::io::Error| MarqueeError::Initialization(format!("udp sink {target}: {e}"));

        let peer = tokio::net::lookup_host(target)
            .await
            .map_err(init)?
            .next()
            .ok_or_else(|| MarqueeError::Initialization(format!("udp sink {target}: no address")))?;
        let local = if peer.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(local).await.map_err(init)?;
        socket.connect(peer).await.map_err(init)?;
        info!("UDP frame sink → {peer}");

        let u16_dim = |n: usize| u16::try_from(n).is_ok();
        if !u16_dim(geometry.rows) || !u16_dim(geometry.columns) {
            return Err(MarqueeError::Initialization(format!(
                "display {}x{} exceeds the datagram header",
                geometry.rows, geometry.columns
            )));
        }

        Ok(Self {
            socket,
            geometry,
            brightness,
            pacer: Pacer::new(frame_interval),
            buf: Vec::with_capacity(HEADER_SIZE + geometry.frame_len() * 3),
            failures: 0,
        })
    }

    /// Serialize `frame` into the datagram buffer.
    fn encode(&mut self, frame: &[Color]) {
        self.buf.clear();
        self.buf.extend_from_slice(&(self.geometry.rows as u16).to_le_bytes());
        self.buf.extend_from_slice(&(self.geometry.columns as u16).to_le_bytes());
        for &color in frame {
            self.buf.extend_from_slice(&scale(color, self.brightness));
        }
    }
}

#[async_trait]
impl FrameSink for UdpFrameSink {
    async fn send_frame(&mut self, frame: &[Color]) {
        self.pacer.wait().await;
        self.encode(frame);
        if let Err(e) = self.socket.send(&self.buf).await {
            // Log the first failure of a streak, then every 1000th.
            if self.failures % 1000 == 0 {
                warn!(failures = self.failures + 1, "frame send failed: {e}");
            }
            self.failures += 1;
        } else {
            self.failures = 0;
        }
    }
}

// ── LogSink ──────────────────────────────────────────────────────

/// Dry-run sink: paces like a real panel and traces each frame.
pub struct LogSink {
    pacer: Pacer,
    frames: u64,
}

impl LogSink {
    pub fn new(frame_interval: Duration) -> Self {
        Self {
            pacer: Pacer::new(frame_interval),
            frames: 0,
        }
    }
}

#[async_trait]
impl FrameSink for LogSink {
    async fn send_frame(&mut self, frame: &[Color]) {
        self.pacer.wait().await;
        self.frames += 1;
        trace!(frame = self.frames, pixels = frame.len(), "frame");
    }
}

// ── Tests ────────────────────────────────────────────────────────
