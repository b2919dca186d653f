//! Configuration for the display daemon.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use marquee_core::{
    DisplayGeometry, EventFeedSource, LineFeedSource, MarqueeError, MessageSource,
};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarqueeConfig {
    /// Message feed settings.
    pub source: SourceConfig,
    /// Physical display settings.
    pub display: DisplayConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Which transport the feed speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// HTTP server-sent events carrying document `put`s.
    EventFeed,
    /// Raw TCP, one JSON message per line.
    LineFeed,
}

/// Message feed configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Transport used to reach the feed.
    pub transport: TransportKind,
    /// `http://host[:port]/path` for the event feed, `host:port` for
    /// the line feed.
    pub url: String,
    /// Tear down an event-feed session after this much silence.
    pub keepalive_timeout_secs: u64,
    /// Interval between line-feed pings.
    pub ping_period_secs: u64,
}

/// Where frames go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SinkKind {
    /// Stream frames as UDP datagrams to a panel controller.
    Udp,
    /// Dry run: log frames only.
    Log,
}

/// Display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// LED rows of the panel.
    pub rows: usize,
    /// LED columns of the panel.
    pub columns: usize,
    /// Global brightness, 0–255.
    pub brightness: u8,
    /// Minimum time between two frames in milliseconds (0 = unpaced).
    pub frame_interval_ms: u64,
    /// Frame destination.
    pub sink: SinkKind,
    /// Panel controller address for the UDP sink.
    pub udp_target: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            transport: TransportKind::EventFeed,
            url: "http://127.0.0.1:8080/currentBitmap.json".into(),
            keepalive_timeout_secs: 90,
            ping_period_secs: 30,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            rows: 8,
            columns: 128,
            brightness: 32,
            frame_interval_ms: 20,
            sink: SinkKind::Udp,
            udp_target: "127.0.0.1:7890".into(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl MarqueeConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// Fixed size of the physical panel.
    pub fn geometry(&self) -> DisplayGeometry {
        DisplayGeometry::new(self.display.rows, self.display.columns)
    }

    /// Check the settings the process cannot run without.
    pub fn validate(&self) -> Result<(), MarqueeError> {
        if self.display.rows == 0 || self.display.columns == 0 {
            return Err(MarqueeError::Initialization(format!(
                "display must be at least 1x1, got {}x{}",
                self.display.rows, self.display.columns
            )));
        }
        Ok(())
    }
}

impl SourceConfig {
    /// Build the configured transport. An unusable endpoint is fatal.
    pub fn build(&self) -> Result<Box<dyn MessageSource>, MarqueeError> {
        match self.transport {
            TransportKind::EventFeed => Ok(Box::new(EventFeedSource::new(
                &self.url,
                Duration::from_secs(self.keepalive_timeout_secs.max(1)),
            )?)),
            TransportKind::LineFeed => Ok(Box::new(LineFeedSource::new(
                &self.url,
                Duration::from_secs(self.ping_period_secs.max(1)),
            )?)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
