//! Broadcast audio sink - main entry point
//!
//! Wires the three execution contexts together: the sync state machine on
//! the tokio control context, the simulated radio delivering payloads into
//! the decode pipeline, and the hardware output clock consuming blocks from
//! the ring. The clock handle is `!Send` and must stay on this thread.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auracast_common::SinkConfig;
use auracast_sink::audio::{
    BlockRing, DecodePipeline, OutputClock, OutputScheduler, PcmDecoder, StreamParams,
};
use auracast_sink::codec::{HwCodec, ShadowBus};
use auracast_sink::radio::sim::SimulatedRadio;
use auracast_sink::state::StreamingFlag;
use auracast_sink::status::LogIndicator;
use auracast_sink::sync::SyncStateMachine;
use auracast_sink::{shell, SyncState};

/// Capacity of the radio event queue feeding the state machine
const RADIO_EVENT_QUEUE: usize = 64;

/// Command-line arguments for auracast-sink
#[derive(Parser, Debug)]
#[command(name = "auracast-sink")]
#[command(about = "Broadcast audio sink")]
#[command(version)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "AURACAST_CONFIG")]
    config: Option<PathBuf>,

    /// Audio output device name (overrides the config file)
    #[arg(short, long)]
    output_device: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auracast_sink=debug,auracast_common=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = SinkConfig::load(args.config.as_deref()).context("Cannot load config")?;
    if args.output_device.is_some() {
        config.output_device = args.output_device;
    }

    info!(
        "Starting broadcast audio sink: {} Hz, {} us frames, ring of {} blocks",
        config.sample_rate_hz, config.frame_duration_us, config.ring_capacity_blocks
    );

    // Ring geometry is fixed at startup from the configured cadence; a
    // session announcing different parameters is rejected at negotiation.
    let params = StreamParams::from_config(&config).context("Invalid stream geometry")?;
    let (producer, consumer) =
        BlockRing::with_capacity(config.ring_capacity_blocks, params.stereo_samples_per_block())
            .split();

    // A missing or broken codec is not fatal: the sink still decodes and
    // the recovery path keeps retrying the reset.
    let codec = Arc::new(HwCodec::new(ShadowBus::new()));
    if let Err(e) = codec.init().and_then(|_| codec.default_conf_enable()) {
        warn!("Hardware codec setup failed, continuing: {}", e);
    }

    let streaming = StreamingFlag::new();
    let pipeline = Arc::new(Mutex::new(DecodePipeline::new(
        Box::new(PcmDecoder::new()),
        producer,
        streaming.clone(),
        &config,
    )));

    let scheduler = OutputScheduler::new(consumer, streaming.clone(), Arc::clone(&codec));
    let _clock = OutputClock::start(scheduler, config.output_device.as_deref(), &params)
        .context("Cannot start audio output")?;

    let (event_tx, event_rx) = mpsc::channel(RADIO_EVENT_QUEUE);
    let radio = SimulatedRadio::new(
        event_tx,
        pipeline.clone(),
        config.sample_rate_hz,
        config.frame_duration_us,
    );

    let machine = SyncStateMachine::new(
        radio,
        pipeline,
        streaming,
        Arc::new(LogIndicator),
        &config,
    );
    let mut state_rx = machine.watch();

    let mut sync_task = tokio::spawn(machine.run(event_rx));
    tokio::spawn(shell::run(codec));
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state: SyncState = *state_rx.borrow();
            info!("Sync state: {}", state);
        }
    });

    tokio::select! {
        result = &mut sync_task => {
            result.context("Sync task panicked")??;
            info!("Sync state machine stopped");
        }
        _ = shutdown_signal() => {
            sync_task.abort();
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
