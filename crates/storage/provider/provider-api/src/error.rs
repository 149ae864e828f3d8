use kestrel_primitives::block::{BlockHash, BlockNumber, IntegrityError};

/// Possible errors returned by the storage provider.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    /// The inserted block doesn't directly follow the latest committed (or staged) block.
    #[error("non-sequential block: expected height {expected}, got {got}")]
    NonSequentialBlock { expected: BlockNumber, got: BlockNumber },

    /// The inserted block doesn't point to the latest block as its parent.
    #[error("parent hash mismatch at height {height}: expected {expected:#x}, got {got:#x}")]
    ParentHashMismatch { height: BlockNumber, expected: BlockHash, got: BlockHash },

    /// The block's hashes or commit don't check out.
    #[error("block {height} failed integrity check: {source}")]
    Integrity {
        height: BlockNumber,
        #[source]
        source: IntegrityError,
    },

    /// Pruning must leave at least the latest block in place.
    #[error("cannot prune below {requested}, latest committed block is {latest}")]
    InvalidPruneHeight { requested: BlockNumber, latest: BlockNumber },

    /// The stored data is inconsistent with itself.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}
