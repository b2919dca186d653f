//! marquee-daemon — entry point.
//!
//! ```text
//! marquee-daemon                     Run in the foreground
//! marquee-daemon --config <path>     Load a custom config TOML
//! marquee-daemon --gen-config        Write default config to stdout
//! marquee-daemon --brightness <n>    Override display brightness
//! marquee-daemon --url <url>         Override the feed endpoint
//! ```

use std::path::PathBuf;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use marquee_core::{Ingestor, RenderScheduler, handoff};
use marquee_daemon::config::MarqueeConfig;
use marquee_daemon::sink;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "marquee-daemon", about = "Scrolling LED matrix display daemon")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "marquee.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Display brightness (0-255), overrides the config file.
    #[arg(short, long)]
    brightness: Option<u8>,

    /// Feed endpoint, overrides the config file.
    #[arg(short, long)]
    url: Option<String>,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&MarqueeConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config, then apply command-line overrides.
    let mut config = MarqueeConfig::load(&cli.config);
    if let Some(brightness) = cli.brightness {
        config.display.brightness = brightness;
    }
    if let Some(url) = cli.url {
        config.source.url = url;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("marquee-daemon v{}", env!("CARGO_PKG_VERSION"));
    config.validate()?;
    let geometry = config.geometry();
    info!("display: {}x{}", geometry.rows, geometry.columns);
    info!("brightness: {}", config.display.brightness);

    // Startup failures are fatal.
    let frame_sink = sink::open(&config.display).await?;
    let source = config.source.build()?;
    info!("feed: {}", source.describe());

    let (handoff_tx, handoff_rx) = handoff::channel();

    let mut scheduler = RenderScheduler::new(handoff_rx, frame_sink);
    let mut render = tokio::spawn(async move { scheduler.run().await });

    let mut ingestor = Ingestor::new(source, geometry, handoff_tx);
    let mut stats = ingestor.stats_receiver();
    let mut ingest = tokio::spawn(async move { ingestor.run().await });

    // Periodic feed statistics at debug level.
    tokio::spawn(async move {
        while stats.changed().await.is_ok() {
            let s = stats.borrow_and_update().clone();
            tracing::debug!(
                received = s.received,
                accepted = s.accepted,
                dropped = s.dropped,
                reconnects = s.reconnects,
                "feed stats"
            );
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
        result = &mut ingest => match result {
            Ok(Ok(())) => warn!("ingestion stopped"),
            Ok(Err(e)) => error!("ingestion failed: {e}"),
            Err(e) => error!("ingestion task panicked: {e}"),
        },
        _ = &mut render => {
            warn!("renderer stopped");
        }
    }

    ingest.abort();
    render.abort();
    Ok(())
}
