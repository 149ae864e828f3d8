//! In-memory block store with lock-free readers.
//!
//! Readers load the current [`ChainSnapshot`] through an atomic pointer and keep it for as long
//! as they need. The single writer builds the next snapshot off to the side and swaps it in once
//! every staged change has been applied, so readers only ever see fully committed versions.

mod snapshot;

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use arc_swap::ArcSwap;
use kestrel_primitives::block::{BlockHash, BlockHashOrNumber, BlockNumber, CommittedBlock};
use kestrel_provider_api::block::{
    BlockHashProvider, BlockNumberProvider, BlockProvider, BlockWriter, HeadSubscriptionProvider,
    MutableProvider,
};
use kestrel_provider_api::{ProviderError, ProviderResult};
use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

pub use self::snapshot::{ChainSnapshot, SEGMENT_SIZE};
use crate::ProviderFactory;

#[derive(Debug, Clone)]
pub struct MemoryProviderFactory {
    shared: Arc<Shared>,
}

struct Shared {
    snapshot: ArcSwap<ChainSnapshot>,
    /// Serializes commits. Readers never take it.
    writer: Mutex<()>,
    heads: watch::Sender<BlockNumber>,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared").field("latest", &self.snapshot.load().latest()).finish()
    }
}

impl MemoryProviderFactory {
    pub fn new() -> Self {
        let (heads, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                snapshot: ArcSwap::from_pointee(ChainSnapshot::default()),
                writer: Mutex::new(()),
                heads,
            }),
        }
    }

    /// Returns the currently published snapshot.
    pub fn snapshot(&self) -> Arc<ChainSnapshot> {
        self.shared.snapshot.load_full()
    }
}

impl Default for MemoryProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderFactory for MemoryProviderFactory {
    type Provider = SnapshotProvider;
    type ProviderMut = MemoryProviderMut;

    fn provider(&self) -> Self::Provider {
        SnapshotProvider::new(self.snapshot())
    }

    fn provider_mut(&self) -> Self::ProviderMut {
        MemoryProviderMut { shared: Arc::clone(&self.shared), staged: Mutex::default() }
    }
}

impl HeadSubscriptionProvider for MemoryProviderFactory {
    fn subscribe_heads(&self) -> watch::Receiver<BlockNumber> {
        self.shared.heads.subscribe()
    }
}

/// A read-only provider pinned to one [`ChainSnapshot`]. Commits published after it was created
/// are not visible through it.
#[derive(Debug, Clone)]
pub struct SnapshotProvider(Arc<ChainSnapshot>);

impl SnapshotProvider {
    pub fn new(snapshot: Arc<ChainSnapshot>) -> Self {
        Self(snapshot)
    }

    pub fn snapshot(&self) -> &ChainSnapshot {
        &self.0
    }
}

impl BlockNumberProvider for SnapshotProvider {
    fn block_number_by_hash(&self, hash: BlockHash) -> ProviderResult<Option<BlockNumber>> {
        Ok(self.0.number_by_hash(&hash))
    }

    fn latest_number(&self) -> ProviderResult<BlockNumber> {
        Ok(self.0.latest())
    }

    fn earliest_number(&self) -> ProviderResult<Option<BlockNumber>> {
        Ok(self.0.earliest())
    }
}

impl BlockHashProvider for SnapshotProvider {
    fn latest_hash(&self) -> ProviderResult<Option<BlockHash>> {
        Ok(self.0.latest_hash())
    }

    fn block_hash_by_num(&self, num: BlockNumber) -> ProviderResult<Option<BlockHash>> {
        Ok(self.0.block(num).map(|b| b.hash()))
    }
}

impl BlockProvider for SnapshotProvider {
    fn block(&self, id: BlockHashOrNumber) -> ProviderResult<Option<Arc<CommittedBlock>>> {
        let number = match id {
            BlockHashOrNumber::Num(num) => num,
            BlockHashOrNumber::Hash(hash) => match self.0.number_by_hash(&hash) {
                Some(num) => num,
                None => return Ok(None),
            },
        };

        Ok(self.0.block(number).cloned())
    }

    fn blocks_in_range(
        &self,
        range: RangeInclusive<BlockNumber>,
    ) -> ProviderResult<Vec<Arc<CommittedBlock>>> {
        Ok(range.map_while(|num| self.0.block(num).cloned()).collect())
    }
}

#[derive(Debug, Default)]
struct Staged {
    blocks: Vec<CommittedBlock>,
    prune_below: Option<BlockNumber>,
}

/// A staged writer. Changes are buffered until [`MutableProvider::commit`] and dropped if the
/// writer is dropped without committing.
#[derive(Debug)]
pub struct MemoryProviderMut {
    shared: Arc<Shared>,
    staged: Mutex<Staged>,
}

impl BlockWriter for MemoryProviderMut {
    fn insert_block(&self, block: CommittedBlock) -> ProviderResult<()> {
        let height = block.number();
        block.verify().map_err(|source| ProviderError::Integrity { height, source })?;
        self.staged.lock().blocks.push(block);
        Ok(())
    }

    fn prune_below(&self, number: BlockNumber) -> ProviderResult<()> {
        let mut staged = self.staged.lock();
        staged.prune_below = Some(staged.prune_below.map_or(number, |n| n.max(number)));
        Ok(())
    }
}

impl MutableProvider for MemoryProviderMut {
    fn commit(self) -> ProviderResult<()> {
        let staged = self.staged.into_inner();
        if staged.blocks.is_empty() && staged.prune_below.is_none() {
            return Ok(());
        }

        let _writer = self.shared.writer.lock();

        let current = self.shared.snapshot.load_full();
        let mut next = ChainSnapshot::clone(&current);

        let count = staged.blocks.len();
        for block in staged.blocks {
            next.append(block)?;
        }

        if let Some(number) = staged.prune_below {
            next.prune_below(number)?;
        }

        let latest = next.latest();
        let earliest = next.earliest();
        self.shared.snapshot.store(Arc::new(next));
        self.shared.heads.send_replace(latest);

        debug!(target: "provider", blocks = count, latest, ?earliest, "Committed to block store.");

        Ok(())
    }
}
