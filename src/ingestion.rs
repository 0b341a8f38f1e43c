//! Staging ingestion - async channel consumer for raw telemetry batches
//!
//! Main loop:
//! 1. Receives batches from producers via mpsc channel
//! 2. Appends each batch to the coordinator's staging area
//! 3. Periodically flushes staged sessions to the store
//!
//! When every sender is dropped the loop performs one final flush and exits.
//!
//! [`forward_json_lines`] is a producer: it reads one `{"key", "batch"}`
//! object per line and feeds the channel.

use crate::coordinator::StagingCoordinator;
use crate::types::RawSession;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration};

/// One raw batch addressed to a session key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestMessage {
    pub key: String,
    pub batch: RawSession,
}

impl IngestMessage {
    pub fn new(key: impl Into<String>, batch: RawSession) -> Self {
        Self {
            key: key.into(),
            batch,
        }
    }
}

/// Forward newline-delimited JSON batches from `reader` into `tx`
///
/// Blank lines are ignored and malformed lines are logged and skipped.
/// Stops at end of input, on a read error, or when the channel closes.
/// Returns the number of batches forwarded.
pub async fn forward_json_lines<R>(reader: R, tx: mpsc::Sender<IngestMessage>) -> u64
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut forwarded = 0u64;
    let mut line_no = 0u64;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::error!("❌ Failed to read batch input: {}", e);
                break;
            }
        };
        line_no += 1;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let msg = match serde_json::from_str::<IngestMessage>(trimmed) {
            Ok(msg) => msg,
            Err(e) => {
                log::warn!("⚠️  Skipping malformed batch on line {}: {}", line_no, e);
                continue;
            }
        };

        if tx.send(msg).await.is_err() {
            log::warn!("⚠️  Batch channel closed, dropping remaining input");
            break;
        }
        forwarded += 1;
    }

    log::info!("📥 Input finished: {} batches forwarded", forwarded);
    forwarded
}

/// Start staging ingestion from a batch channel
///
/// Runs until the channel is closed.
pub async fn start_staging_ingestion(
    mut rx: mpsc::Receiver<IngestMessage>,
    coordinator: Arc<StagingCoordinator>,
    flush_interval_ms: u64,
) {
    log::info!("🚀 Starting staging ingestion");
    log::info!("   ├─ Flush interval: {}ms", flush_interval_ms);
    log::info!("   └─ Waiting for batches...");

    // First flush after one full period, not at startup
    let period = Duration::from_millis(flush_interval_ms.max(1));
    let mut flush_timer = interval_at(tokio::time::Instant::now() + period, period);
    let mut batch_count = 0u64;
    let mut last_log_time = Instant::now();

    loop {
        tokio::select! {
            received = rx.recv() => {
                let Some(msg) = received else {
                    log::warn!("⚠️  Batch channel closed, stopping ingestion");
                    log::info!("🔄 Performing final flush...");
                    flush_and_log(&coordinator).await;
                    break;
                };

                coordinator.append(&msg.key, &msg.batch);
                batch_count += 1;

                if last_log_time.elapsed().as_secs() >= 10 {
                    let per_sec = batch_count as f64 / last_log_time.elapsed().as_secs_f64();
                    log::info!("📊 Ingestion rate: {:.1} batches/sec (total: {})", per_sec, batch_count);
                    last_log_time = Instant::now();
                    batch_count = 0;
                }
            }

            _ = flush_timer.tick() => {
                flush_and_log(&coordinator).await;

                let stats = coordinator.staging_stats();
                log::debug!(
                    "📦 Staged: {} keys, {} raw samples, {} derived samples | channel backlog: {}",
                    stats.keys,
                    stats.raw_samples,
                    stats.derived_samples,
                    rx.len()
                );
            }
        }
    }

    log::info!("✅ Staging ingestion stopped");
}

async fn flush_and_log(coordinator: &StagingCoordinator) {
    let flush_start = Instant::now();
    match coordinator.flush().await {
        Ok(summary) if summary.raw_sessions + summary.derived_sessions == 0 => {
            log::debug!("💤 Nothing staged, flush skipped");
        }
        Ok(summary) => {
            log::info!(
                "✅ Flushed {} raw / {} derived sessions ({} samples) in {}ms",
                summary.raw_sessions,
                summary.derived_sessions,
                summary.samples,
                flush_start.elapsed().as_millis()
            );
        }
        Err(e) => {
            log::error!("❌ {}", e);
            for failure in &e.failures {
                log::error!("   └─ {}", failure);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::NaiveProcessor;
    use crate::store::MemoryStore;
    use crate::types::fixtures::batch;

    async fn setup() -> (Arc<MemoryStore>, Arc<StagingCoordinator>) {
        let store = Arc::new(MemoryStore::new());
        let coordinator = StagingCoordinator::with_store(store.clone(), Arc::new(NaiveProcessor))
            .await
            .unwrap();
        (store, Arc::new(coordinator))
    }

    #[tokio::test]
    async fn test_ingestion_stages_batches() {
        let (tx, rx) = mpsc::channel(100);
        let (_store, coordinator) = setup().await;

        // Long interval: no timer flush during the test
        let coordinator_clone = coordinator.clone();
        let handle = tokio::spawn(async move {
            start_staging_ingestion(rx, coordinator_clone, 3_600_000).await;
        });

        for _ in 0..5 {
            tx.send(IngestMessage::new("s1", batch(2, 1))).await.unwrap();
        }

        let mut staged = 0;
        for _ in 0..50 {
            staged = coordinator.query_raw("s1", 0, 100).result.gps.len();
            if staged == 10 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(staged, 10);

        drop(tx);
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_channel_close_triggers_final_flush() {
        let (tx, rx) = mpsc::channel(100);
        let (store, coordinator) = setup().await;

        for i in 0..3 {
            tx.send(IngestMessage::new(format!("s{}", i), batch(3, 2)))
                .await
                .unwrap();
        }
        drop(tx);

        start_staging_ingestion(rx, coordinator.clone(), 3_600_000).await;

        assert!(coordinator.staged_keys().is_empty());
        for i in 0..3 {
            let key = format!("s{}", i);
            assert_eq!(store.raw_documents(&key).len(), 1);
            assert_eq!(store.derived_documents(&key)[0].speed.len(), 3);
        }
    }

    #[tokio::test]
    async fn test_failed_final_flush_keeps_data_staged() {
        let (tx, rx) = mpsc::channel(10);
        let (store, coordinator) = setup().await;
        store.fail_key("bad");

        tx.send(IngestMessage::new("bad", batch(1, 0))).await.unwrap();
        tx.send(IngestMessage::new("good", batch(1, 0))).await.unwrap();
        drop(tx);

        start_staging_ingestion(rx, coordinator.clone(), 3_600_000).await;

        assert_eq!(coordinator.staged_keys(), vec!["bad".to_string()]);
        assert_eq!(store.raw_documents("good").len(), 1);
    }

    #[tokio::test]
    async fn test_json_lines_feed_staging() {
        let input = concat!(
            r#"{"key":"s1","batch":{"gpsdata":[{"latitude":31.0,"longitude":121.0,"altitude":0.0,"bearing":0.0,"speed":2.5,"accuracy":3.0,"time":1}],"heartratedata":[88]}}"#,
            "\n",
            "\n",
            "not json\n",
            r#"{"key":"s2","batch":{"accdata":[{"xacc":1.0,"yacc":0.0,"zacc":9.8}]}}"#,
            "\n",
        );

        let (tx, rx) = mpsc::channel(10);
        let (store, coordinator) = setup().await;

        let forwarded = forward_json_lines(input.as_bytes(), tx).await;
        assert_eq!(forwarded, 2);

        // Reader dropped its sender, so ingestion drains and final-flushes
        start_staging_ingestion(rx, coordinator.clone(), 3_600_000).await;

        let s1 = store.raw_documents("s1");
        assert_eq!(s1.len(), 1);
        assert_eq!(s1[0].gps[0].speed, 2.5);
        assert_eq!(s1[0].heart_rate, vec![88]);
        assert_eq!(store.derived_documents("s1")[0].speed, vec![2.5]);
        assert_eq!(store.raw_documents("s2")[0].accel[0].z, 9.8);
    }

    #[tokio::test]
    async fn test_json_lines_stop_when_channel_closes() {
        let input = "{\"key\":\"a\",\"batch\":{}}\n{\"key\":\"b\",\"batch\":{}}\n";
        let (tx, rx) = mpsc::channel(10);
        drop(rx);

        assert_eq!(forward_json_lines(input.as_bytes(), tx).await, 0);
    }

    #[tokio::test]
    async fn test_timer_flushes_periodically() {
        let (tx, rx) = mpsc::channel(10);
        let (store, coordinator) = setup().await;

        let coordinator_clone = coordinator.clone();
        let handle = tokio::spawn(async move {
            start_staging_ingestion(rx, coordinator_clone, 20).await;
        });

        tx.send(IngestMessage::new("tick", batch(2, 0))).await.unwrap();

        let mut flushed = false;
        for _ in 0..100 {
            if !store.raw_documents("tick").is_empty() {
                flushed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(flushed);
        assert!(coordinator.staged_keys().is_empty());

        drop(tx);
        handle.await.unwrap();
    }
}
