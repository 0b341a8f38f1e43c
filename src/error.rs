//! Error types for staging, roster and store operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a `PersistentStore` backend
///
/// Surfaced verbatim to callers; never retried by this crate.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("schema error: {0}")]
    Schema(String),
}

/// Errors from roster and coordinator operations
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("invalid player record: {0}")]
    InvalidPlayer(String),

    #[error("player record has no id")]
    MissingPlayerId,
}

/// Which staged partition a flush write belonged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Raw,
    Derived,
}

impl std::fmt::Display for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Partition::Raw => write!(f, "raw"),
            Partition::Derived => write!(f, "derived"),
        }
    }
}

/// A single failed write during a flush
#[derive(Error, Debug)]
#[error("{partition} session '{key}': {source}")]
pub struct KeyFailure {
    pub key: String,
    pub partition: Partition,
    #[source]
    pub source: StoreError,
}

/// Aggregated result of a partially failed flush
///
/// Every key was attempted; keys that persisted were released from memory
/// and `still_staged` names what remains in memory afterwards.
#[derive(Error, Debug)]
#[error("flush failed for {} write(s); {} key(s) still staged", failures.len(), still_staged.len())]
pub struct FlushError {
    pub failures: Vec<KeyFailure>,
    pub still_staged: Vec<String>,
}

impl FlushError {
    pub fn failed_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.failures.iter().map(|f| f.key.as_str()).collect();
        keys.sort_unstable();
        keys.dedup();
        keys
    }
}

/// Startup failure: the process cannot serve requests without a store
#[derive(Error, Debug)]
pub enum InitError {
    #[error("failed to open store at {path}: {source}")]
    StoreOpen {
        path: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to preload player roster: {0}")]
    Preload(#[source] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_error_message() {
        let err = FlushError {
            failures: vec![
                KeyFailure {
                    key: "s2".to_string(),
                    partition: Partition::Raw,
                    source: StoreError::Unavailable("down".to_string()),
                },
                KeyFailure {
                    key: "s2".to_string(),
                    partition: Partition::Derived,
                    source: StoreError::Unavailable("down".to_string()),
                },
            ],
            still_staged: vec!["s2".to_string()],
        };

        assert_eq!(
            err.to_string(),
            "flush failed for 2 write(s); 1 key(s) still staged"
        );
        assert_eq!(err.failed_keys(), vec!["s2"]);
        assert_eq!(
            err.failures[0].to_string(),
            "raw session 's2': store unavailable: down"
        );
    }

    #[test]
    fn test_store_error_wraps_transparently() {
        let err: Error = StoreError::NotFound("player abc".to_string()).into();
        assert_eq!(err.to_string(), "not found: player abc");
    }
}
