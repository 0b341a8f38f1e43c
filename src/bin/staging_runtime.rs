//! Staging Runtime
//!
//! This binary runs the telemetry staging layer:
//! - Opens the configured store (SQLite schema applied on open)
//! - Preloads the player roster
//! - Spawns the ingestion loop with its periodic flush
//! - Reads batches from stdin, one JSON object per line:
//!   `{"key": "session-1", "batch": {"gpsdata": [...], "heartratedata": [...]}}`
//! - Flushes whatever is still staged on EOF or CTRL+C
//!
//! Usage:
//!   cargo run --release --bin staging_runtime < batches.jsonl
//!
//! Environment variables:
//!   TRAINFLOW_DB_PATH - SQLite database path (default: trainflow.db)
//!   TRAINFLOW_SCHEMA_DIR - Schema directory (default: sql)
//!   TRAINFLOW_STORE_BACKEND - sqlite | memory (default: sqlite)
//!   TRAINFLOW_FLUSH_INTERVAL_MS - Flush interval (default: 60000)
//!   TRAINFLOW_CHANNEL_BUFFER - Channel size (default: 10000)

use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use trainflow::config::StagingConfig;
use trainflow::ingestion::{forward_json_lines, start_staging_ingestion, IngestMessage};
use trainflow::StagingCoordinator;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run());
    // A stdin read can still be blocked after CTRL+C; do not wait on it
    runtime.shutdown_timeout(Duration::from_secs(1));
    result
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("🚀 Staging Runtime");
    info!("   └─ Version: {}", env!("CARGO_PKG_VERSION"));

    let config = StagingConfig::from_env()?;
    info!("✅ Configuration loaded");
    info!("   ├─ Backend: {}", config.backend);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Schema dir: {}", config.schema_dir);
    info!("   ├─ Channel buffer: {} batches", config.channel_buffer);
    info!("   └─ Flush interval: {}ms", config.flush_interval_ms);

    info!("🔧 Initializing store...");
    let coordinator = match StagingCoordinator::init(&config).await {
        Ok(coordinator) => Arc::new(coordinator),
        Err(e) => {
            error!("❌ Initialization failed: {}", e);
            return Err(e.into());
        }
    };
    info!("✅ Coordinator ready");

    let (tx, rx) = mpsc::channel::<IngestMessage>(config.channel_buffer);
    info!("✅ Batch channel created (buffer: {})", config.channel_buffer);

    let ingestion_coordinator = coordinator.clone();
    let flush_interval = config.flush_interval_ms;
    let ingestion = tokio::spawn(async move {
        start_staging_ingestion(rx, ingestion_coordinator, flush_interval).await;
    });
    info!("✅ Ingestion task spawned");

    let mut reader = tokio::spawn(async move {
        forward_json_lines(BufReader::new(tokio::io::stdin()), tx).await
    });
    info!("✅ Stdin reader spawned (one JSON batch per line)");
    info!("🔄 Press CTRL+C to shutdown gracefully");

    // The reader owns the only sender: once it ends, the channel closes and
    // the ingestion loop runs its final flush
    tokio::select! {
        result = &mut reader => {
            if let Err(e) = result {
                error!("❌ Stdin reader failed: {}", e);
            }
            info!("⚠️  Input closed, shutting down...");
        }
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => {
                    info!("");
                    info!("⚠️  Received CTRL+C, shutting down...");
                }
                Err(err) => {
                    error!("❌ Failed to listen for CTRL+C: {}", err);
                }
            }
            reader.abort();
        }
    }

    if let Err(e) = ingestion.await {
        error!("❌ Ingestion task failed: {}", e);
    }

    let stats = coordinator.staging_stats();
    if stats.keys > 0 {
        error!(
            "❌ {} key(s) still staged at shutdown ({} raw samples)",
            stats.keys, stats.raw_samples
        );
    }

    info!("✅ Staging runtime stopped");
    Ok(())
}
