//! trainflow - staging layer for wearable training telemetry
//!
//! Raw sensor batches are staged per session key in memory, transformed into
//! derived metrics on arrival, and flushed to a durable store on demand or on
//! a timer. A cached player roster sits beside the staging area and is kept
//! in sync with the same store.

pub mod config;
pub mod coordinator;
pub mod directory;
pub mod error;
pub mod ingestion;
pub mod pagination;
pub mod processor;
pub mod staging;
pub mod store;
pub mod types;

pub use coordinator::StagingCoordinator;
pub use error::{Error, FlushError, InitError, Result, StoreError};
pub use pagination::{PageResult, NO_PAGE};
pub use types::{DerivedSession, PlayerId, PlayerRecord, RawSession, TrainRecord};
