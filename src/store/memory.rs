//! In-process store backend
//!
//! Keeps every document in memory. Writes for selected collection keys can
//! be made to fail (both partitions or only the derived one), which lets
//! tests exercise partial flushes and store-first roster semantics without a
//! database.

use super::PersistentStore;
use crate::error::StoreError;
use crate::pagination;
use crate::types::{DerivedSession, PlayerId, PlayerRecord, RawSession, TrainRecord};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Default)]
struct Inner {
    players: Vec<PlayerRecord>,
    raw: HashMap<String, Vec<RawSession>>,
    derived: HashMap<String, Vec<TrainRecord>>,
    next_record_id: i64,
    failing_keys: HashSet<String>,
    failing_derived_keys: HashSet<String>,
    fail_players: bool,
}

/// Memory-backed [`PersistentStore`]
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every session write for `key` fail until cleared
    pub fn fail_key(&self, key: &str) {
        self.inner.lock().failing_keys.insert(key.to_string());
    }

    /// Make only derived session writes for `key` fail until cleared
    pub fn fail_derived_key(&self, key: &str) {
        self.inner.lock().failing_derived_keys.insert(key.to_string());
    }

    pub fn clear_failures(&self) {
        let mut inner = self.inner.lock();
        inner.failing_keys.clear();
        inner.failing_derived_keys.clear();
        inner.fail_players = false;
    }

    /// Make player inserts and updates fail
    pub fn fail_players(&self, fail: bool) {
        self.inner.lock().fail_players = fail;
    }

    /// Raw documents persisted under `key`, in write order
    pub fn raw_documents(&self, key: &str) -> Vec<RawSession> {
        self.inner.lock().raw.get(key).cloned().unwrap_or_default()
    }

    /// Derived documents persisted under `key`, in write order
    pub fn derived_documents(&self, key: &str) -> Vec<DerivedSession> {
        self.inner
            .lock()
            .derived
            .get(key)
            .map(|records| records.iter().map(|r| r.metrics.clone()).collect())
            .unwrap_or_default()
    }
}

fn check_key(inner: &Inner, key: &str) -> Result<(), StoreError> {
    if inner.failing_keys.contains(key) {
        return Err(StoreError::Unavailable(format!("writes to '{}' are failing", key)));
    }
    Ok(())
}

fn check_players(inner: &Inner) -> Result<(), StoreError> {
    if inner.fail_players {
        return Err(StoreError::Unavailable("player writes are failing".to_string()));
    }
    Ok(())
}

#[async_trait]
impl PersistentStore for MemoryStore {
    async fn insert_player(&self, record: &PlayerRecord) -> Result<PlayerId, StoreError> {
        let mut inner = self.inner.lock();
        check_players(&inner)?;

        let id = PlayerId::generate();
        let mut stored = record.clone();
        stored.id = Some(id.clone());
        inner.players.push(stored);
        Ok(id)
    }

    async fn update_player(&self, id: &PlayerId, record: &PlayerRecord) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        check_players(&inner)?;

        let slot = inner
            .players
            .iter_mut()
            .find(|p| p.id.as_ref() == Some(id))
            .ok_or_else(|| StoreError::NotFound(format!("player {}", id)))?;

        let mut stored = record.clone();
        stored.id = Some(id.clone());
        *slot = stored;
        Ok(())
    }

    async fn query_players(&self) -> Result<Vec<PlayerRecord>, StoreError> {
        Ok(self.inner.lock().players.clone())
    }

    async fn query_record_page(
        &self,
        collection: &str,
        page: i64,
        count: i64,
    ) -> Result<(Vec<TrainRecord>, usize), StoreError> {
        let inner = self.inner.lock();
        let records = inner.derived.get(collection).map(Vec::as_slice).unwrap_or(&[]);
        let w = pagination::window(records, page, count);
        Ok((w.items.to_vec(), records.len()))
    }

    async fn insert_raw_session(&self, key: &str, session: &RawSession) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        check_key(&inner, key)?;
        inner.raw.entry(key.to_string()).or_default().push(session.clone());
        Ok(())
    }

    async fn insert_derived_session(
        &self,
        key: &str,
        session: &DerivedSession,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        check_key(&inner, key)?;
        if inner.failing_derived_keys.contains(key) {
            return Err(StoreError::Unavailable(format!(
                "derived writes to '{}' are failing",
                key
            )));
        }

        inner.next_record_id += 1;
        let record = TrainRecord {
            id: inner.next_record_id,
            timestamp: chrono::Utc::now().timestamp(),
            metrics: session.clone(),
        };
        inner.derived.entry(key.to_string()).or_default().push(record);
        Ok(())
    }
}
