//! Transaction pool configuration.

use std::time::Duration;

use kestrel_primitives::serde_utils::duration_secs;
use serde::{Deserialize, Serialize};

/// Default maximum number of pending transactions.
pub const DEFAULT_MAX_TXS: usize = 5000;

/// Default maximum total size of the pending transactions, in bytes (1 GiB).
pub const DEFAULT_MAX_TXS_BYTES: usize = 1024 * 1024 * 1024;

/// Default maximum size of a single transaction, in bytes (1 MiB).
pub const DEFAULT_MAX_TX_BYTES: usize = 1024 * 1024;

/// Default duplicate suppression window in seconds.
pub const DEFAULT_RETENTION_SECS: u64 = 60;

/// Default maximum number of hashes remembered for duplicate suppression.
pub const DEFAULT_MAX_SEEN_HASHES: usize = 10_000;

/// Configuration for the transaction pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of transactions in the pending set.
    pub max_txs: usize,
    /// Maximum total size of the pending set, in bytes.
    pub max_txs_bytes: usize,
    /// Maximum size of a single transaction, in bytes.
    pub max_tx_bytes: usize,
    /// How long an admitted hash is remembered after admission. A transaction whose hash was
    /// admitted within this window is rejected as a duplicate, even if it already left the
    /// pending set.
    #[serde(with = "duration_secs")]
    pub retention: Duration,
    /// Upper bound of the seen-hash cache. Entries only leave it by expiring, so while it holds
    /// this many hashes every new transaction is rejected as if the pool were full. 0 disables
    /// the cache.
    pub max_seen_hashes: usize,
}

impl PoolConfig {
    pub fn with_max_txs(mut self, max: usize) -> Self {
        self.max_txs = max;
        self
    }

    pub fn with_max_txs_bytes(mut self, max: usize) -> Self {
        self.max_txs_bytes = max;
        self
    }

    pub fn with_max_tx_bytes(mut self, max: usize) -> Self {
        self.max_tx_bytes = max;
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_max_seen_hashes(mut self, max: usize) -> Self {
        self.max_seen_hashes = max;
        self
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_txs: DEFAULT_MAX_TXS,
            max_txs_bytes: DEFAULT_MAX_TXS_BYTES,
            max_tx_bytes: DEFAULT_MAX_TX_BYTES,
            retention: Duration::from_secs(DEFAULT_RETENTION_SECS),
            max_seen_hashes: DEFAULT_MAX_SEEN_HASHES,
        }
    }
}
