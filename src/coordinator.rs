//! Staging coordinator - context object threaded through every operation
//!
//! `init` builds everything the process needs (store handle, roster cache,
//! staging maps, metrics processor) and returns it as one owned value
//! instead of process-wide globals.
//!
//! ```text
//! append(key, batch)
//!     ↓
//! MetricsProcessor::transform(batch)     (no lock held)
//!     ↓
//! TelemetryStagingStore (raw lock, then derived lock)
//!     ↓
//! flush() → PersistentStore              (no lock held)
//! ```

use crate::config::{BackendType, StagingConfig};
use crate::directory::PlayerDirectory;
use crate::error::{FlushError, InitError, Result};
use crate::pagination::{self, PageResult, NO_PAGE};
use crate::processor::{MetricsProcessor, NaiveProcessor};
use crate::staging::{FlushSummary, StagingStats, TelemetryStagingStore};
use crate::store::{MemoryStore, PersistentStore, SqliteStore};
use crate::types::{DerivedSession, PlayerRecord, RawSession, TrainRecord};
use std::sync::Arc;

/// Owns the staging store, roster cache, processor and store handle
pub struct StagingCoordinator {
    store: Arc<dyn PersistentStore>,
    processor: Arc<dyn MetricsProcessor>,
    staging: TelemetryStagingStore,
    directory: PlayerDirectory,
}

impl StagingCoordinator {
    /// Open the configured store and preload the roster
    ///
    /// Any failure here is fatal: no request can be served without a store.
    pub async fn init(config: &StagingConfig) -> std::result::Result<Self, InitError> {
        let store: Arc<dyn PersistentStore> = match config.backend {
            BackendType::Sqlite => {
                let store = SqliteStore::open(&config.db_path, &config.schema_dir).map_err(
                    |source| InitError::StoreOpen {
                        path: config.db_path.clone(),
                        source,
                    },
                )?;
                Arc::new(store)
            }
            BackendType::Memory => Arc::new(MemoryStore::new()),
        };
        log::info!("✅ Store opened (backend: {})", config.backend);

        Self::with_store(store, Arc::new(NaiveProcessor)).await
    }

    /// Build a coordinator around an existing store, preloading its roster
    pub async fn with_store(
        store: Arc<dyn PersistentStore>,
        processor: Arc<dyn MetricsProcessor>,
    ) -> std::result::Result<Self, InitError> {
        let directory = PlayerDirectory::load(store.clone())
            .await
            .map_err(InitError::Preload)?;

        Ok(Self {
            store,
            processor,
            staging: TelemetryStagingStore::new(),
            directory,
        })
    }

    /// Ingest one raw batch for session `key`
    pub fn append(&self, key: &str, batch: &RawSession) {
        self.staging.append(key, batch, self.processor.as_ref());
    }

    pub fn query_raw(&self, key: &str, page: i64, count: i64) -> PageResult<RawSession> {
        self.staging.query_raw(key, page, count)
    }

    pub fn query_derived(&self, key: &str, page: i64, count: i64) -> PageResult<DerivedSession> {
        self.staging.query_derived(key, page, count)
    }

    /// Persist all staged sessions; see [`TelemetryStagingStore::flush`]
    pub async fn flush(&self) -> std::result::Result<FlushSummary, FlushError> {
        self.staging.flush(self.store.as_ref()).await
    }

    pub fn query_players(&self, page: i64, count: i64) -> PageResult<Vec<PlayerRecord>> {
        self.directory.query_page(page, count)
    }

    pub async fn insert_player(&self, record: PlayerRecord) -> Result<PlayerRecord> {
        self.directory.insert(record).await
    }

    pub async fn update_player(&self, record: PlayerRecord) -> Result<()> {
        self.directory.update(record).await
    }

    /// One page of persisted training records for `collection`
    ///
    /// Negative input falls back to the first page of ten. A store error is
    /// logged and answered with an empty page.
    pub async fn query_history(
        &self,
        collection: &str,
        page: i64,
        count: i64,
    ) -> PageResult<Vec<TrainRecord>> {
        let (page, count, _) = pagination::normalize(page, count);

        match self.store.query_record_page(collection, page, count).await {
            Ok((records, total)) => {
                PageResult::new(records, total, page, pagination::next_page(total, page, count))
            }
            Err(e) => {
                log::error!("❌ History query for '{}' failed: {}", collection, e);
                PageResult::new(Vec::new(), 0, page, NO_PAGE)
            }
        }
    }

    pub fn staging_stats(&self) -> StagingStats {
        self.staging.stats()
    }

    pub fn staged_keys(&self) -> Vec<String> {
        self.staging.staged_keys()
    }
}
