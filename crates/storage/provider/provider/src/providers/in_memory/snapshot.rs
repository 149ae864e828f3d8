use std::collections::HashMap;
use std::sync::Arc;

use kestrel_primitives::block::{BlockHash, BlockNumber, CommittedBlock};
use kestrel_provider_api::{ProviderError, ProviderResult};

/// Number of blocks held by a full segment.
pub const SEGMENT_SIZE: u64 = 1024;

/// A fixed-size run of consecutive blocks. Segment `k` holds heights
/// `[1 + k * SEGMENT_SIZE, (k + 1) * SEGMENT_SIZE]`.
#[derive(Debug, Clone)]
struct Segment {
    start: BlockNumber,
    blocks: Vec<Arc<CommittedBlock>>,
    by_hash: HashMap<BlockHash, BlockNumber>,
}

impl Segment {
    fn new(start: BlockNumber) -> Self {
        Self {
            start,
            blocks: Vec::with_capacity(SEGMENT_SIZE as usize),
            by_hash: HashMap::new(),
        }
    }

    fn index(number: BlockNumber) -> u64 {
        (number - 1) / SEGMENT_SIZE
    }

    fn is_full(&self) -> bool {
        self.blocks.len() as u64 >= SEGMENT_SIZE
    }

    /// Last height the segment can hold.
    fn end(&self) -> BlockNumber {
        self.start + SEGMENT_SIZE - 1
    }
}

/// An immutable version of the chain.
///
/// Once published, a snapshot is never modified. Building the next version clones the segment
/// list and copies at most the tail segment; every other segment is shared with the previous
/// version.
#[derive(Debug, Clone, Default)]
pub struct ChainSnapshot {
    segments: Vec<Arc<Segment>>,
    /// Lowest retained height. `0` on an empty chain.
    earliest: BlockNumber,
    /// Latest committed height. `0` on an empty chain.
    latest: BlockNumber,
    latest_hash: Option<BlockHash>,
}

impl ChainSnapshot {
    pub fn latest(&self) -> BlockNumber {
        self.latest
    }

    pub fn latest_hash(&self) -> Option<BlockHash> {
        self.latest_hash
    }

    pub fn earliest(&self) -> Option<BlockNumber> {
        (self.latest > 0).then_some(self.earliest)
    }

    pub fn block(&self, number: BlockNumber) -> Option<&Arc<CommittedBlock>> {
        if number == 0 || number < self.earliest || number > self.latest {
            return None;
        }

        let first = self.segments.first()?;
        let pos = Segment::index(number) - Segment::index(first.start);
        let segment = self.segments.get(pos as usize)?;
        segment.blocks.get((number - segment.start) as usize)
    }

    pub fn number_by_hash(&self, hash: &BlockHash) -> Option<BlockNumber> {
        self.segments
            .iter()
            .rev()
            .find_map(|s| s.by_hash.get(hash).copied())
            .filter(|number| *number >= self.earliest)
    }

    /// Appends a block on top of the latest one.
    pub(crate) fn append(&mut self, block: CommittedBlock) -> ProviderResult<()> {
        let number = block.number();
        let expected = self.latest + 1;
        if number != expected {
            return Err(ProviderError::NonSequentialBlock { expected, got: number });
        }

        let parent = self.latest_hash.unwrap_or_default();
        let got = block.block.header.last_block_hash;
        if got != parent {
            return Err(ProviderError::ParentHashMismatch { height: number, expected: parent, got });
        }

        block.verify().map_err(|source| ProviderError::Integrity { height: number, source })?;

        if self.segments.last().map_or(true, |s| s.is_full()) {
            self.segments.push(Arc::new(Segment::new(number)));
        }

        let hash = block.hash();
        if let Some(tail) = self.segments.last_mut() {
            // copies the tail only if a published snapshot still shares it
            let tail = Arc::make_mut(tail);
            tail.blocks.push(Arc::new(block));
            tail.by_hash.insert(hash, number);
        }

        if self.earliest == 0 {
            self.earliest = number;
        }
        self.latest = number;
        self.latest_hash = Some(hash);

        Ok(())
    }

    /// Drops every block below `number`. Segments that fall entirely below it are released.
    pub(crate) fn prune_below(&mut self, number: BlockNumber) -> ProviderResult<()> {
        if number > self.latest {
            return Err(ProviderError::InvalidPruneHeight {
                requested: number,
                latest: self.latest,
            });
        }

        if number <= self.earliest {
            return Ok(());
        }

        let released = self.segments.iter().take_while(|s| s.end() < number).count();
        self.segments.drain(..released);
        self.earliest = number;

        Ok(())
    }

    #[cfg(test)]
    fn segment_count(&self) -> usize {
        self.segments.len()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use kestrel_primitives::B256;

    use super::*;
    use crate::test_utils::generate_chain;

    fn snapshot_with(len: u64) -> ChainSnapshot {
        let mut snapshot = ChainSnapshot::default();
        for block in generate_chain(len) {
            snapshot.append(block).unwrap();
        }
        snapshot
    }

    #[test]
    fn empty_chain() {
        let snapshot = ChainSnapshot::default();
        assert_eq!(snapshot.latest(), 0);
        assert_eq!(snapshot.earliest(), None);
        assert_eq!(snapshot.latest_hash(), None);
        assert!(snapshot.block(0).is_none());
        assert!(snapshot.block(1).is_none());
    }

    #[test]
    fn lookups_across_segments() {
        let len = SEGMENT_SIZE * 2 + 10;
        let snapshot = snapshot_with(len);

        assert_eq!(snapshot.segment_count(), 3);
        assert_eq!(snapshot.latest(), len);
        assert_eq!(snapshot.earliest(), Some(1));

        for number in [1, SEGMENT_SIZE, SEGMENT_SIZE + 1, 2 * SEGMENT_SIZE + 1, len] {
            let block = snapshot.block(number).unwrap();
            assert_eq!(block.number(), number);
            assert_eq!(snapshot.number_by_hash(&block.hash()), Some(number));
        }

        assert!(snapshot.block(len + 1).is_none());
        assert_eq!(snapshot.number_by_hash(&B256::ZERO), None);
    }

    #[test]
    fn published_segments_are_not_mutated() {
        let mut next = snapshot_with(5);
        let published = next.clone();

        let extra = generate_chain(6).pop().unwrap();
        next.append(extra).unwrap();

        assert_eq!(published.latest(), 5);
        assert!(published.block(6).is_none());
        assert_eq!(next.block(6).map(|b| b.number()), Some(6));
    }

    #[test]
    fn rejects_gaps_and_wrong_parents() {
        let chain = generate_chain(3);
        let mut snapshot = ChainSnapshot::default();

        assert_matches!(
            snapshot.append(chain[1].clone()),
            Err(ProviderError::NonSequentialBlock { expected: 1, got: 2 })
        );

        snapshot.append(chain[0].clone()).unwrap();

        let mut orphan = generate_chain(2).pop().unwrap();
        orphan.block.header.last_block_hash = B256::digest(b"not the parent");
        assert_matches!(snapshot.append(orphan), Err(ProviderError::ParentHashMismatch { height: 2, .. }));

        assert_eq!(snapshot.latest(), 1);
    }

    #[test]
    fn rejects_blocks_failing_integrity() {
        let mut chain = generate_chain(1);
        chain[0].commit.block_hash = B256::ZERO;

        let mut snapshot = ChainSnapshot::default();
        assert_matches!(
            snapshot.append(chain.remove(0)),
            Err(ProviderError::Integrity { height: 1, .. })
        );
    }

    #[test]
    fn prune_releases_whole_segments() {
        let len = SEGMENT_SIZE * 2 + 10;
        let mut snapshot = snapshot_with(len);
        let pruned_hash = snapshot.block(SEGMENT_SIZE + 5).unwrap().hash();

        snapshot.prune_below(SEGMENT_SIZE + 10).unwrap();

        assert_eq!(snapshot.segment_count(), 2);
        assert_eq!(snapshot.earliest(), Some(SEGMENT_SIZE + 10));
        assert!(snapshot.block(1).is_none());
        // still in memory but below the retained height
        assert!(snapshot.block(SEGMENT_SIZE + 5).is_none());
        assert_eq!(snapshot.number_by_hash(&pruned_hash), None);
        assert!(snapshot.block(SEGMENT_SIZE + 10).is_some());

        // pruning lower is a no-op
        snapshot.prune_below(3).unwrap();
        assert_eq!(snapshot.earliest(), Some(SEGMENT_SIZE + 10));

        assert_matches!(
            snapshot.prune_below(len + 1),
            Err(ProviderError::InvalidPruneHeight { .. })
        );
    }
}
