//! Durable store collaborator
//!
//! The staging layer and the player directory only talk to the backing
//! store through [`PersistentStore`]. Two backends ship with the crate:
//! - `sqlite` - rusqlite database (production)
//! - `memory` - in-process maps with failure injection (tests, dry runs)

pub mod memory;
pub mod sqlite;

use crate::error::StoreError;
use crate::types::{DerivedSession, PlayerId, PlayerRecord, RawSession, TrainRecord};
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use sqlite::{run_schema_migrations, SqliteStore};

/// Trait for reading and writing durable roster and session data
///
/// Calls are synchronous from the caller's perspective: they return once the
/// backend has committed or failed.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Insert a new player and return the identity the store assigned
    async fn insert_player(&self, record: &PlayerRecord) -> Result<PlayerId, StoreError>;

    /// Replace the stored player with identity `id`
    ///
    /// Returns `StoreError::NotFound` when no such player exists.
    async fn update_player(&self, id: &PlayerId, record: &PlayerRecord) -> Result<(), StoreError>;

    /// Full roster in insertion order
    async fn query_players(&self) -> Result<Vec<PlayerRecord>, StoreError>;

    /// One page of persisted training records for `collection`
    ///
    /// Returns the page items and the total number of records in the
    /// collection. `page`/`count` are expected to be non-negative.
    async fn query_record_page(
        &self,
        collection: &str,
        page: i64,
        count: i64,
    ) -> Result<(Vec<TrainRecord>, usize), StoreError>;

    /// Persist a raw session document under `key`
    async fn insert_raw_session(&self, key: &str, session: &RawSession) -> Result<(), StoreError>;

    /// Persist a derived session document under `key`
    async fn insert_derived_session(
        &self,
        key: &str,
        session: &DerivedSession,
    ) -> Result<(), StoreError>;
}
