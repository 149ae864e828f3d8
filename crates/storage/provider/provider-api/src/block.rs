use std::ops::RangeInclusive;
use std::sync::Arc;

use kestrel_primitives::block::{BlockHash, BlockHashOrNumber, BlockNumber, CommittedBlock};
use tokio::sync::watch;

use crate::ProviderResult;

#[auto_impl::auto_impl(&, Box, Arc)]
pub trait BlockNumberProvider: Send + Sync {
    /// Returns the block number of the block with the given hash.
    fn block_number_by_hash(&self, hash: BlockHash) -> ProviderResult<Option<BlockNumber>>;

    /// Returns the latest committed block number, or `0` if nothing has been committed yet.
    fn latest_number(&self) -> ProviderResult<BlockNumber>;

    /// Returns the lowest block number still retained by the store, if any.
    fn earliest_number(&self) -> ProviderResult<Option<BlockNumber>>;
}

#[auto_impl::auto_impl(&, Box, Arc)]
pub trait BlockHashProvider: Send + Sync {
    /// Returns the hash of the latest committed block, if any.
    fn latest_hash(&self) -> ProviderResult<Option<BlockHash>>;

    /// Returns the block hash given the block number.
    fn block_hash_by_num(&self, num: BlockNumber) -> ProviderResult<Option<BlockHash>>;
}

#[auto_impl::auto_impl(&, Box, Arc)]
pub trait BlockProvider: BlockHashProvider + BlockNumberProvider + Send + Sync {
    /// Returns a committed block given its id.
    fn block(&self, id: BlockHashOrNumber) -> ProviderResult<Option<Arc<CommittedBlock>>>;

    /// Returns all the retained blocks whose number falls within the given range.
    fn blocks_in_range(
        &self,
        range: RangeInclusive<BlockNumber>,
    ) -> ProviderResult<Vec<Arc<CommittedBlock>>>;
}

/// Staged writes. Nothing written through this trait is visible to readers until the provider is
/// committed.
#[auto_impl::auto_impl(&, Box, Arc)]
pub trait BlockWriter: Send + Sync {
    /// Stages a block to be appended on top of the latest one.
    fn insert_block(&self, block: CommittedBlock) -> ProviderResult<()>;

    /// Stages the removal of every block below `number`.
    fn prune_below(&self, number: BlockNumber) -> ProviderResult<()>;
}

/// A provider whose staged changes can be published atomically.
pub trait MutableProvider: Sized {
    /// Publishes all the staged changes at once. On error nothing is published.
    fn commit(self) -> ProviderResult<()>;
}

/// Notification of newly committed heights.
#[auto_impl::auto_impl(&, Box, Arc)]
pub trait HeadSubscriptionProvider: Send + Sync {
    /// Returns a receiver that always holds the latest committed block number.
    fn subscribe_heads(&self) -> watch::Receiver<BlockNumber>;
}
