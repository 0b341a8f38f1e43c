//! In-memory staging of session telemetry
//!
//! Raw and derived sessions live in two maps with independent read/write
//! locks, so raw readers never wait on derived writers and vice versa.
//! Every lock covers only the map read or mutation itself; metric
//! computation and store writes happen with no lock held.
//!
//! ## Flush
//!
//! A flush snapshots every staged key and writes each partition (raw,
//! derived) to the store. When a write succeeds, exactly the persisted
//! prefix of each sequence is drained from memory, so samples appended while
//! the write was in flight stay staged for the next flush. A failed write
//! leaves its partition untouched. All keys are attempted; failures come
//! back together in a [`FlushError`].

use crate::error::{FlushError, KeyFailure, Partition};
use crate::pagination::{MultiWindow, PageResult};
use crate::processor::MetricsProcessor;
use crate::store::PersistentStore;
use crate::types::{DerivedSession, RawSession};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap};

/// Counts of what a successful (or partially successful) flush persisted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushSummary {
    pub raw_sessions: usize,
    pub derived_sessions: usize,
    pub samples: usize,
}

/// Point-in-time size of the staging area
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingStats {
    pub keys: usize,
    pub raw_samples: usize,
    pub derived_samples: usize,
}

/// Concurrent keyed accumulator for raw and derived telemetry
#[derive(Default)]
pub struct TelemetryStagingStore {
    raw: RwLock<HashMap<String, RawSession>>,
    derived: RwLock<HashMap<String, DerivedSession>>,
    /// Serializes flushes so a snapshot is never persisted twice
    flush_gate: tokio::sync::Mutex<()>,
}

impl TelemetryStagingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch to session `key`
    ///
    /// The processor sees `batch` alone, not the accumulated history. The
    /// session is created on first use.
    pub fn append(&self, key: &str, batch: &RawSession, processor: &dyn MetricsProcessor) {
        let derived = processor.transform(batch);

        {
            let mut raw = self.raw.write();
            raw.entry(key.to_string()).or_default().extend_from(batch);
        }

        {
            let mut staged = self.derived.write();
            staged.entry(key.to_string()).or_default().extend_from(&derived);
        }
    }

    /// One page of raw telemetry; each sensor sequence is paginated on its own
    pub fn query_raw(&self, key: &str, page: i64, count: i64) -> PageResult<RawSession> {
        let mut mw = MultiWindow::new(page, count);
        let raw = self.raw.read();

        let result = match raw.get(key) {
            Some(session) => RawSession {
                gps: mw.slice(&session.gps),
                accel: mw.slice(&session.accel),
                gyro: mw.slice(&session.gyro),
                heart_rate: mw.slice(&session.heart_rate),
            },
            None => RawSession::default(),
        };
        drop(raw);

        mw.finish(result)
    }

    /// One page of derived metrics; each metric sequence is paginated on its own
    pub fn query_derived(&self, key: &str, page: i64, count: i64) -> PageResult<DerivedSession> {
        let mut mw = MultiWindow::new(page, count);
        let derived = self.derived.read();

        let result = match derived.get(key) {
            Some(session) => DerivedSession {
                speed: mw.slice(&session.speed),
                distance: mw.slice(&session.distance),
                heart_rate: mw.slice(&session.heart_rate),
            },
            None => DerivedSession::default(),
        };
        drop(derived);

        mw.finish(result)
    }

    /// Write every staged session to `store` and release what was persisted
    pub async fn flush(&self, store: &dyn PersistentStore) -> Result<FlushSummary, FlushError> {
        let _gate = self.flush_gate.lock().await;

        let raw_snapshot: Vec<(String, RawSession)> = {
            let raw = self.raw.read();
            raw.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };
        let derived_snapshot: Vec<(String, DerivedSession)> = {
            let derived = self.derived.read();
            derived.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
        };

        let mut summary = FlushSummary::default();
        let mut failures = Vec::new();

        for (key, session) in raw_snapshot {
            if session.is_empty() {
                self.release_raw(&key, &session);
                continue;
            }
            match store.insert_raw_session(&key, &session).await {
                Ok(()) => {
                    self.release_raw(&key, &session);
                    summary.raw_sessions += 1;
                    summary.samples += session.sample_count();
                }
                Err(source) => {
                    log::warn!("⚠️  Raw session '{}' not flushed: {}", key, source);
                    failures.push(KeyFailure {
                        key,
                        partition: Partition::Raw,
                        source,
                    });
                }
            }
        }

        for (key, session) in derived_snapshot {
            if session.is_empty() {
                self.release_derived(&key, &session);
                continue;
            }
            match store.insert_derived_session(&key, &session).await {
                Ok(()) => {
                    self.release_derived(&key, &session);
                    summary.derived_sessions += 1;
                    summary.samples += session.sample_count();
                }
                Err(source) => {
                    log::warn!("⚠️  Derived session '{}' not flushed: {}", key, source);
                    failures.push(KeyFailure {
                        key,
                        partition: Partition::Derived,
                        source,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(summary)
        } else {
            Err(FlushError {
                failures,
                still_staged: self.staged_keys(),
            })
        }
    }

    /// Drain the persisted prefix of a raw session
    fn release_raw(&self, key: &str, persisted: &RawSession) {
        let mut raw = self.raw.write();
        if let Some(entry) = raw.get_mut(key) {
            drain_prefix(&mut entry.gps, persisted.gps.len());
            drain_prefix(&mut entry.accel, persisted.accel.len());
            drain_prefix(&mut entry.gyro, persisted.gyro.len());
            drain_prefix(&mut entry.heart_rate, persisted.heart_rate.len());
            if entry.is_empty() {
                raw.remove(key);
            }
        }
    }

    fn release_derived(&self, key: &str, persisted: &DerivedSession) {
        let mut derived = self.derived.write();
        if let Some(entry) = derived.get_mut(key) {
            drain_prefix(&mut entry.speed, persisted.speed.len());
            drain_prefix(&mut entry.distance, persisted.distance.len());
            drain_prefix(&mut entry.heart_rate, persisted.heart_rate.len());
            if entry.is_empty() {
                derived.remove(key);
            }
        }
    }

    /// Keys with any raw or derived data in memory, sorted
    pub fn staged_keys(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self.raw.read().keys().cloned().collect();
        keys.extend(self.derived.read().keys().cloned());
        keys.into_iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.read().is_empty() && self.derived.read().is_empty()
    }

    pub fn stats(&self) -> StagingStats {
        let (raw_keys, raw_samples) = {
            let raw = self.raw.read();
            let samples = raw.values().map(RawSession::sample_count).sum();
            (raw.keys().cloned().collect::<BTreeSet<_>>(), samples)
        };
        let (derived_keys, derived_samples) = {
            let derived = self.derived.read();
            let samples = derived.values().map(DerivedSession::sample_count).sum();
            (derived.keys().cloned().collect::<BTreeSet<_>>(), samples)
        };

        StagingStats {
            keys: raw_keys.union(&derived_keys).count(),
            raw_samples,
            derived_samples,
        }
    }
}

fn drain_prefix<T>(items: &mut Vec<T>, n: usize) {
    let n = n.min(items.len());
    items.drain(..n);
}
