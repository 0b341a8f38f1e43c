//! Player roster cache
//!
//! The store is the source of truth. Every mutation is written there first
//! and the cached roster changes only after the store write succeeds.
//! Mutations (and roster reloads) are serialized by a write gate held across
//! the store call and the cache update, so a reload snapshot can never
//! overwrite a concurrent insert.

use crate::error::{Error, Result, StoreError};
use crate::pagination::{self, PageResult};
use crate::store::PersistentStore;
use crate::types::PlayerRecord;
use parking_lot::RwLock;
use std::sync::Arc;

/// Concurrent in-memory mirror of the player roster
pub struct PlayerDirectory {
    store: Arc<dyn PersistentStore>,
    players: RwLock<Vec<PlayerRecord>>,
    /// Serializes store-write + cache-update pairs
    write_gate: tokio::sync::Mutex<()>,
}

impl PlayerDirectory {
    /// Directory with an empty cache (nothing preloaded)
    pub fn new(store: Arc<dyn PersistentStore>) -> Self {
        Self::with_players(store, Vec::new())
    }

    /// Build a directory preloaded with the store's full roster
    pub async fn load(store: Arc<dyn PersistentStore>) -> std::result::Result<Self, StoreError> {
        let players = store.query_players().await?;
        log::info!("👥 Preloaded {} players", players.len());
        Ok(Self::with_players(store, players))
    }

    fn with_players(store: Arc<dyn PersistentStore>, players: Vec<PlayerRecord>) -> Self {
        Self {
            store,
            players: RwLock::new(players),
            write_gate: tokio::sync::Mutex::new(()),
        }
    }

    pub fn query_page(&self, page: i64, count: i64) -> PageResult<Vec<PlayerRecord>> {
        let players = self.players.read();
        pagination::paginate(players.as_slice(), page, count)
    }

    /// Persist a new player, then add it to the cache
    ///
    /// Returns the record with the identity assigned by the store.
    pub async fn insert(&self, record: PlayerRecord) -> Result<PlayerRecord> {
        if !record.is_valid() {
            return Err(Error::InvalidPlayer(format!(
                "'{}' has missing or non-positive profile fields",
                record.name
            )));
        }

        let _gate = self.write_gate.lock().await;
        let id = self.store.insert_player(&record).await?;

        let mut stored = record;
        stored.id = Some(id);
        self.players.write().push(stored.clone());
        Ok(stored)
    }

    /// Persist changes to an existing player, then refresh the cache
    ///
    /// If the cache has no entry with the record's id it is out of sync with
    /// the store, so the whole roster is reloaded. The update has already
    /// landed by then, so a failed reload is logged rather than returned.
    pub async fn update(&self, record: PlayerRecord) -> Result<()> {
        let id = record.id.clone().ok_or(Error::MissingPlayerId)?;
        if !record.is_valid() {
            return Err(Error::InvalidPlayer(format!(
                "player {} needs a name, a valid profile and a history",
                id
            )));
        }

        let _gate = self.write_gate.lock().await;
        self.store.update_player(&id, &record).await?;

        let replaced = {
            let mut players = self.players.write();
            match players.iter_mut().find(|p| p.id.as_ref() == Some(&id)) {
                Some(slot) => {
                    *slot = record;
                    true
                }
                None => false,
            }
        };

        if !replaced {
            log::warn!("⚠️  Player {} missing from roster cache, reloading from store", id);
            if let Err(e) = self.reload().await {
                log::error!("❌ Roster resync after updating {} failed: {}", id, e);
            }
        }
        Ok(())
    }

    /// Replace the cache with the store's current roster
    ///
    /// Caller must hold `write_gate`.
    async fn reload(&self) -> std::result::Result<(), StoreError> {
        let players = self.store.query_players().await?;
        *self.players.write() = players;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.players.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::NO_PAGE;
    use crate::store::MemoryStore;
    use crate::types::fixtures::player;
    use crate::types::{DerivedSession, PlayerId, RawSession, TrainRecord};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Memory store whose next roster read can be held open or made to fail
    #[derive(Default)]
    struct GatedStore {
        inner: MemoryStore,
        hold_next_read: AtomicBool,
        fail_reads: AtomicBool,
        read_started: Notify,
        release_read: Notify,
    }

    #[async_trait]
    impl PersistentStore for GatedStore {
        async fn insert_player(
            &self,
            record: &PlayerRecord,
        ) -> std::result::Result<PlayerId, StoreError> {
            self.inner.insert_player(record).await
        }

        async fn update_player(
            &self,
            id: &PlayerId,
            record: &PlayerRecord,
        ) -> std::result::Result<(), StoreError> {
            self.inner.update_player(id, record).await
        }

        async fn query_players(&self) -> std::result::Result<Vec<PlayerRecord>, StoreError> {
            if self.fail_reads.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("roster reads are failing".to_string()));
            }
            let snapshot = self.inner.query_players().await?;
            if self.hold_next_read.swap(false, Ordering::SeqCst) {
                self.read_started.notify_one();
                self.release_read.notified().await;
            }
            Ok(snapshot)
        }

        async fn query_record_page(
            &self,
            collection: &str,
            page: i64,
            count: i64,
        ) -> std::result::Result<(Vec<TrainRecord>, usize), StoreError> {
            self.inner.query_record_page(collection, page, count).await
        }

        async fn insert_raw_session(
            &self,
            key: &str,
            session: &RawSession,
        ) -> std::result::Result<(), StoreError> {
            self.inner.insert_raw_session(key, session).await
        }

        async fn insert_derived_session(
            &self,
            key: &str,
            session: &DerivedSession,
        ) -> std::result::Result<(), StoreError> {
            self.inner.insert_derived_session(key, session).await
        }
    }

    #[tokio::test]
    async fn test_roster_page_scenario() {
        // 25 players, page 2 of size 10
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(store.clone());
        for i in 0..25 {
            directory.insert(player(&format!("p{}", i))).await.unwrap();
        }

        let page = directory.query_page(2, 10);
        assert_eq!(page.result.len(), 5);
        assert_eq!(page.result[0].name, "p20");
        assert_eq!(page.total_number, 25);
        assert_eq!(page.before, 1);
        assert_eq!(page.current, 2);
        assert_eq!(page.next, NO_PAGE);
    }

    #[tokio::test]
    async fn test_insert_assigns_store_id() {
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(store.clone());

        let stored = directory.insert(player("erin")).await.unwrap();
        let id = stored.id.clone().unwrap();

        let page = directory.query_page(0, 10);
        assert_eq!(page.result.len(), 1);
        assert_eq!(page.result[0].id.as_ref(), Some(&id));

        let persisted = store.query_players().await.unwrap();
        assert_eq!(persisted[0].id.as_ref(), Some(&id));
    }

    #[tokio::test]
    async fn test_insert_store_failure_leaves_cache() {
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(store.clone());
        store.fail_players(true);

        let result = directory.insert(player("frank")).await;
        assert!(matches!(result, Err(Error::Store(_))));
        assert!(directory.is_empty());
    }

    #[tokio::test]
    async fn test_insert_rejects_invalid() {
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(store.clone());

        let mut bad = player("gina");
        bad.profile.weight = 0.0;
        let result = directory.insert(bad).await;
        assert!(matches!(result, Err(Error::InvalidPlayer(_))));
        assert!(store.query_players().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_replaces_in_place() {
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(store.clone());
        directory.insert(player("a")).await.unwrap();
        let mut b = directory.insert(player("b")).await.unwrap();
        directory.insert(player("c")).await.unwrap();

        b.history = "sprint drills".to_string();
        b.remark.heart_rate = 172;
        directory.update(b.clone()).await.unwrap();

        let page = directory.query_page(0, 10);
        assert_eq!(page.result.len(), 3);
        assert_eq!(page.result[1], b);
    }

    #[tokio::test]
    async fn test_update_requires_id() {
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(store);

        let result = directory.update(player("nobody")).await;
        assert!(matches!(result, Err(Error::MissingPlayerId)));
    }

    #[tokio::test]
    async fn test_update_store_failure_leaves_cache() {
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(store.clone());
        let mut record = directory.insert(player("hal")).await.unwrap();

        store.fail_players(true);
        record.history = "changed".to_string();
        assert!(directory.update(record).await.is_err());

        let page = directory.query_page(0, 10);
        assert_eq!(page.result[0].history, "");
    }

    #[tokio::test]
    async fn test_update_cache_miss_reloads() {
        let store = Arc::new(MemoryStore::new());
        let directory = PlayerDirectory::new(store.clone());

        // Player exists in the store but never reached this cache
        let id = store.insert_player(&player("ivy")).await.unwrap();
        assert!(directory.is_empty());

        let mut record = player("ivy");
        record.id = Some(id.clone());
        record.history = "returning".to_string();
        directory.update(record).await.unwrap();

        assert_eq!(directory.len(), 1);
        let page = directory.query_page(0, 10);
        assert_eq!(page.result[0].id.as_ref(), Some(&id));
        assert_eq!(page.result[0].history, "returning");
    }

    #[tokio::test]
    async fn test_load_preloads_roster() {
        let store = Arc::new(MemoryStore::new());
        store.insert_player(&player("jo")).await.unwrap();
        store.insert_player(&player("kim")).await.unwrap();

        let directory = PlayerDirectory::load(store).await.unwrap();
        assert_eq!(directory.len(), 2);
    }

    #[tokio::test]
    async fn test_resync_does_not_drop_concurrent_insert() {
        let store = Arc::new(GatedStore::default());
        let directory = Arc::new(PlayerDirectory::new(store.clone()));

        // In the store but not in the cache, so updating it triggers a resync
        let stale_id = store.inner.insert_player(&player("stale")).await.unwrap();
        let mut stale = player("stale");
        stale.id = Some(stale_id);
        stale.history = "returning".to_string();

        store.hold_next_read.store(true, Ordering::SeqCst);
        let updater = {
            let directory = directory.clone();
            tokio::spawn(async move { directory.update(stale).await })
        };
        store.read_started.notified().await;

        let inserter = {
            let directory = directory.clone();
            tokio::spawn(async move { directory.insert(player("fresh")).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!inserter.is_finished());

        store.release_read.notify_one();
        updater.await.unwrap().unwrap();
        let fresh = inserter.await.unwrap().unwrap();

        let cached = directory.query_page(0, 10).result;
        let persisted = store.query_players().await.unwrap();
        assert_eq!(cached, persisted);
        assert_eq!(cached.len(), 2);
        assert!(cached.contains(&fresh));
    }

    #[tokio::test]
    async fn test_update_succeeds_when_resync_fails() {
        let store = Arc::new(GatedStore::default());
        let directory = PlayerDirectory::new(store.clone());

        let id = store.inner.insert_player(&player("lin")).await.unwrap();
        let mut record = player("lin");
        record.id = Some(id);
        record.history = "landed".to_string();

        store.fail_reads.store(true, Ordering::SeqCst);
        directory.update(record).await.unwrap();

        // The write landed even though the cache could not be refreshed
        assert_eq!(store.inner.query_players().await.unwrap()[0].history, "landed");
        assert!(directory.is_empty());
    }
}
