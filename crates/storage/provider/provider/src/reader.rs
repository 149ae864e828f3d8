//! Consistent reads of committed blocks.
//!
//! Every call of [`BlockReader`] pins one provider snapshot when it starts and takes all of its
//! decisions against it, so a block committed halfway through a call is either fully visible to
//! that call or not at all.
//!
//! A block that comes back from storage with a hash, height or commit that doesn't match is
//! treated as storage corruption. The reader then halts for good: every later call fails with
//! [`ReadError::Halted`] instead of serving data that can't be trusted.

use std::fmt;
use std::ops::RangeInclusive;
use std::sync::{Arc, OnceLock};

use kestrel_primitives::block::{BlockHashOrNumber, BlockNumber, BlockQuery, CommittedBlock};
use kestrel_provider_api::block::{BlockNumberProvider, BlockProvider, HeadSubscriptionProvider};
use tokio::sync::watch;
use tracing::error;

use crate::ProviderFactory;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReadError {
    /// The block never existed, was pruned, or the query's hash and height disagree.
    #[error("block not found")]
    NotFound,

    /// The requested height is above the latest committed block.
    #[error("block {requested} is not available yet, latest committed block is {latest}")]
    Pending { requested: BlockNumber, latest: BlockNumber },

    /// The reader detected corrupted storage and stopped serving reads.
    #[error("block store reader halted: {reason}")]
    Halted { reason: Arc<str> },
}

pub struct BlockReader<PF> {
    inner: Arc<Inner<PF>>,
}

struct Inner<PF> {
    factory: PF,
    halted: OnceLock<Arc<str>>,
}

impl<PF> BlockReader<PF>
where
    PF: ProviderFactory,
    PF::Provider: BlockProvider,
{
    pub fn new(factory: PF) -> Self {
        Self { inner: Arc::new(Inner { factory, halted: OnceLock::new() }) }
    }

    pub fn factory(&self) -> &PF {
        &self.inner.factory
    }

    pub fn is_halted(&self) -> bool {
        self.inner.halted.get().is_some()
    }

    /// Pins the current version of the chain. All reads made through the returned snapshot
    /// observe the same committed state.
    pub fn snapshot(&self) -> Result<ReadSnapshot<PF>, ReadError> {
        self.ensure_running()?;
        Ok(ReadSnapshot { reader: self.clone(), provider: self.inner.factory.provider() })
    }

    pub fn block(&self, query: BlockQuery) -> Result<Arc<CommittedBlock>, ReadError> {
        self.snapshot()?.block(query)
    }

    /// Returns the latest committed height, `0` if nothing has been committed yet.
    pub fn latest_number(&self) -> Result<BlockNumber, ReadError> {
        self.snapshot()?.latest_number()
    }

    /// Returns the blocks from `start` up to `end` or the latest committed block, whichever is
    /// lower.
    pub fn blocks_in_range(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> Result<Vec<Arc<CommittedBlock>>, ReadError> {
        let snapshot = self.snapshot()?;
        snapshot.range(start, end)?.map(|number| snapshot.block_by_number(number)).collect()
    }

    fn ensure_running(&self) -> Result<(), ReadError> {
        match self.inner.halted.get() {
            Some(reason) => Err(ReadError::Halted { reason: Arc::clone(reason) }),
            None => Ok(()),
        }
    }

    /// Halts the reader. Only the first reason is kept.
    fn halt(&self, reason: impl fmt::Display) -> ReadError {
        let reason = self.inner.halted.get_or_init(|| {
            let reason: Arc<str> = reason.to_string().into();
            error!(target: "provider", %reason, "Block store reader halted.");
            reason
        });
        ReadError::Halted { reason: Arc::clone(reason) }
    }
}

impl<PF> BlockReader<PF>
where
    PF: ProviderFactory + HeadSubscriptionProvider,
{
    /// Returns a receiver that always holds the latest committed height.
    pub fn subscribe_heights(&self) -> watch::Receiver<BlockNumber> {
        self.inner.factory.subscribe_heads()
    }
}

impl<PF> Clone for BlockReader<PF> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<PF: fmt::Debug> fmt::Debug for BlockReader<PF> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockReader")
            .field("factory", &self.inner.factory)
            .field("halted", &self.inner.halted.get())
            .finish()
    }
}

/// A [`BlockReader`] pinned to one version of the chain.
pub struct ReadSnapshot<PF: ProviderFactory> {
    reader: BlockReader<PF>,
    provider: PF::Provider,
}

impl<PF> ReadSnapshot<PF>
where
    PF: ProviderFactory,
    PF::Provider: BlockProvider,
{
    pub fn latest_number(&self) -> Result<BlockNumber, ReadError> {
        self.reader.ensure_running()?;
        self.provider.latest_number().map_err(|e| self.reader.halt(e))
    }

    pub fn block(&self, query: BlockQuery) -> Result<Arc<CommittedBlock>, ReadError> {
        let latest = self.latest_number()?;

        match (query.height, query.hash) {
            (None, None) if latest == 0 => Err(ReadError::Pending { requested: 1, latest }),
            (None, None) => self.block_by_number(latest),

            (Some(height), hash) => {
                let number = match u64::try_from(height) {
                    Ok(number) if number > 0 => number,
                    _ => return Err(ReadError::NotFound),
                };

                if number > latest {
                    return Err(ReadError::Pending { requested: number, latest });
                }

                let block = self.block_by_number(number)?;
                match hash {
                    Some(hash) if hash != block.hash() => Err(ReadError::NotFound),
                    _ => Ok(block),
                }
            }

            (None, Some(hash)) => {
                let block = self
                    .provider
                    .block(BlockHashOrNumber::Hash(hash))
                    .map_err(|e| self.reader.halt(e))?
                    .ok_or(ReadError::NotFound)?;

                if block.hash() != hash {
                    return Err(self.reader.halt(format_args!(
                        "lookup of block {hash:#x} returned block {:#x}",
                        block.hash()
                    )));
                }

                self.verify(&block)?;
                Ok(block)
            }
        }
    }

    /// Returns the verified block at `number`, or [`ReadError::NotFound`] if it isn't retained.
    pub fn block_by_number(&self, number: BlockNumber) -> Result<Arc<CommittedBlock>, ReadError> {
        self.reader.ensure_running()?;

        let block = self
            .provider
            .block(BlockHashOrNumber::Num(number))
            .map_err(|e| self.reader.halt(e))?
            .ok_or(ReadError::NotFound)?;

        if block.number() != number {
            return Err(self.reader.halt(format_args!(
                "lookup of block {number} returned block {}",
                block.number()
            )));
        }

        self.verify(&block)?;
        Ok(block)
    }

    /// Resolves `start..=end` against this snapshot: the end is clamped to the latest committed
    /// height. A range starting at 0 or ending before its start matches no block.
    pub fn range(
        &self,
        start: BlockNumber,
        end: BlockNumber,
    ) -> Result<RangeInclusive<BlockNumber>, ReadError> {
        if start == 0 || start > end {
            return Err(ReadError::NotFound);
        }

        let latest = self.latest_number()?;
        if start > latest {
            return Err(ReadError::Pending { requested: start, latest });
        }

        let earliest = self.provider.earliest_number().map_err(|e| self.reader.halt(e))?;
        if earliest.map_or(true, |earliest| start < earliest) {
            return Err(ReadError::NotFound);
        }

        Ok(start..=end.min(latest))
    }

    fn verify(&self, block: &CommittedBlock) -> Result<(), ReadError> {
        block
            .verify()
            .map_err(|e| self.reader.halt(format_args!("block {}: {e}", block.number())))
    }
}

impl<PF> fmt::Debug for ReadSnapshot<PF>
where
    PF: ProviderFactory,
    PF::Provider: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadSnapshot").field("provider", &self.provider).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::ops::RangeInclusive;
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use kestrel_primitives::block::{
        BlockHash, BlockHashOrNumber, BlockNumber, BlockQuery, CommittedBlock,
    };
    use kestrel_primitives::B256;
    use kestrel_provider_api::block::{
        BlockHashProvider, BlockNumberProvider, BlockProvider, BlockWriter, MutableProvider,
    };
    use kestrel_provider_api::ProviderResult;
    use rstest::rstest;

    use super::{BlockReader, ReadError};
    use crate::providers::in_memory::{MemoryProviderFactory, MemoryProviderMut, SnapshotProvider};
    use crate::test_utils::{factory_with_chain, generate_chain};
    use crate::ProviderFactory;

    fn reader_with_chain(len: u64) -> BlockReader<MemoryProviderFactory> {
        BlockReader::new(factory_with_chain(len))
    }

    #[test]
    fn empty_chain() {
        let reader = reader_with_chain(0);
        assert_eq!(reader.latest_number(), Ok(0));
        assert_eq!(
            reader.block(BlockQuery::latest()),
            Err(ReadError::Pending { requested: 1, latest: 0 })
        );
        assert_eq!(
            reader.block(BlockQuery::height(1)),
            Err(ReadError::Pending { requested: 1, latest: 0 })
        );
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(i64::MIN)]
    fn non_positive_heights_are_not_found(#[case] height: i64) {
        let reader = reader_with_chain(3);
        assert_eq!(reader.block(BlockQuery::height(height)), Err(ReadError::NotFound));
    }

    #[test]
    fn height_above_latest_is_pending() {
        let reader = reader_with_chain(3);
        assert_eq!(
            reader.block(BlockQuery::height(4)),
            Err(ReadError::Pending { requested: 4, latest: 3 })
        );
        assert_eq!(
            reader.block(BlockQuery::height(i64::MAX)),
            Err(ReadError::Pending { requested: i64::MAX as u64, latest: 3 })
        );
    }

    #[test]
    fn point_queries() {
        let reader = reader_with_chain(5);
        let chain = generate_chain(5);

        assert_eq!(reader.block(BlockQuery::latest()).unwrap().number(), 5);
        assert_eq!(reader.block(BlockQuery::height(2)).unwrap().as_ref(), &chain[1]);
        assert_eq!(reader.block(BlockQuery::hash(chain[2].hash())).unwrap().as_ref(), &chain[2]);
        assert_eq!(reader.block(BlockQuery::hash(B256::ZERO)), Err(ReadError::NotFound));

        let agreeing = BlockQuery { height: Some(4), hash: Some(chain[3].hash()) };
        assert_eq!(reader.block(agreeing).unwrap().number(), 4);

        let disagreeing = BlockQuery { height: Some(4), hash: Some(chain[2].hash()) };
        assert_eq!(reader.block(disagreeing), Err(ReadError::NotFound));
    }

    #[test]
    fn pruned_heights_are_not_found() {
        let factory = factory_with_chain(6);
        let writer = factory.provider_mut();
        writer.prune_below(4).unwrap();
        writer.commit().unwrap();

        let reader = BlockReader::new(factory);
        assert_eq!(reader.block(BlockQuery::height(3)), Err(ReadError::NotFound));
        assert_eq!(reader.block(BlockQuery::height(4)).unwrap().number(), 4);
        assert_eq!(reader.blocks_in_range(2, 5), Err(ReadError::NotFound));
    }

    #[test]
    fn ranges() {
        let reader = reader_with_chain(5);

        let numbers = |blocks: Vec<Arc<CommittedBlock>>| {
            blocks.iter().map(|b| b.number()).collect::<Vec<_>>()
        };

        assert_eq!(numbers(reader.blocks_in_range(2, 4).unwrap()), vec![2, 3, 4]);
        assert_eq!(numbers(reader.blocks_in_range(4, 100).unwrap()), vec![4, 5]);
        assert_eq!(reader.blocks_in_range(6, 8), Err(ReadError::Pending { requested: 6, latest: 5 }));
    }

    #[rstest]
    #[case(0, 2)]
    #[case(0, 0)]
    #[case(3, 1)]
    fn empty_ranges_are_not_found(#[case] start: BlockNumber, #[case] end: BlockNumber) {
        let reader = reader_with_chain(5);
        assert_eq!(reader.blocks_in_range(start, end), Err(ReadError::NotFound));
        assert!(!reader.is_halted());
    }

    #[test]
    fn snapshot_is_isolated_from_later_commits() {
        let factory = factory_with_chain(2);
        let reader = BlockReader::new(factory.clone());
        let snapshot = reader.snapshot().unwrap();

        let writer = factory.provider_mut();
        writer.insert_block(generate_chain(3).pop().unwrap()).unwrap();
        writer.commit().unwrap();

        assert_eq!(snapshot.latest_number(), Ok(2));
        assert_eq!(
            snapshot.block(BlockQuery::height(3)),
            Err(ReadError::Pending { requested: 3, latest: 2 })
        );
        assert_eq!(reader.latest_number(), Ok(3));
    }

    /// Serves the blocks of an in-memory store, except for one height where it hands out a
    /// tampered copy.
    #[derive(Debug)]
    struct TamperingFactory {
        inner: MemoryProviderFactory,
        height: BlockNumber,
        tamper: fn(&mut CommittedBlock),
    }

    #[derive(Debug)]
    struct TamperingProvider {
        inner: SnapshotProvider,
        height: BlockNumber,
        tamper: fn(&mut CommittedBlock),
    }

    impl ProviderFactory for TamperingFactory {
        type Provider = TamperingProvider;
        type ProviderMut = MemoryProviderMut;

        fn provider(&self) -> Self::Provider {
            TamperingProvider {
                inner: self.inner.provider(),
                height: self.height,
                tamper: self.tamper,
            }
        }

        fn provider_mut(&self) -> Self::ProviderMut {
            self.inner.provider_mut()
        }
    }

    impl BlockNumberProvider for TamperingProvider {
        fn block_number_by_hash(&self, hash: BlockHash) -> ProviderResult<Option<BlockNumber>> {
            self.inner.block_number_by_hash(hash)
        }

        fn latest_number(&self) -> ProviderResult<BlockNumber> {
            self.inner.latest_number()
        }

        fn earliest_number(&self) -> ProviderResult<Option<BlockNumber>> {
            self.inner.earliest_number()
        }
    }

    impl BlockHashProvider for TamperingProvider {
        fn latest_hash(&self) -> ProviderResult<Option<BlockHash>> {
            self.inner.latest_hash()
        }

        fn block_hash_by_num(&self, num: BlockNumber) -> ProviderResult<Option<BlockHash>> {
            self.inner.block_hash_by_num(num)
        }
    }

    impl BlockProvider for TamperingProvider {
        fn block(&self, id: BlockHashOrNumber) -> ProviderResult<Option<Arc<CommittedBlock>>> {
            let block = self.inner.block(id)?;
            Ok(block.map(|block| {
                if block.number() == self.height {
                    let mut tampered = CommittedBlock::clone(&block);
                    (self.tamper)(&mut tampered);
                    Arc::new(tampered)
                } else {
                    block
                }
            }))
        }

        fn blocks_in_range(
            &self,
            range: RangeInclusive<BlockNumber>,
        ) -> ProviderResult<Vec<Arc<CommittedBlock>>> {
            range.filter_map(|num| self.block(BlockHashOrNumber::Num(num)).transpose()).collect()
        }
    }

    fn tampered_reader(tamper: fn(&mut CommittedBlock)) -> BlockReader<TamperingFactory> {
        BlockReader::new(TamperingFactory { inner: factory_with_chain(5), height: 3, tamper })
    }

    #[rstest]
    #[case::body(|b: &mut CommittedBlock| b.block.body.clear())]
    #[case::header(|b: &mut CommittedBlock| b.block.header.time += 1)]
    #[case::commit(|b: &mut CommittedBlock| b.commit.block_hash = B256::ZERO)]
    #[case::height(|b: &mut CommittedBlock| b.block.header.height = 2)]
    fn corruption_halts_the_reader(#[case] tamper: fn(&mut CommittedBlock)) {
        let reader = tampered_reader(tamper);

        // untouched heights are served until the corruption is observed
        assert_eq!(reader.block(BlockQuery::height(2)).unwrap().number(), 2);
        assert!(!reader.is_halted());

        assert_matches!(reader.block(BlockQuery::height(3)), Err(ReadError::Halted { .. }));
        assert!(reader.is_halted());

        // every later call fails, including ones that would otherwise succeed
        assert_matches!(reader.block(BlockQuery::height(2)), Err(ReadError::Halted { .. }));
        assert_matches!(reader.latest_number(), Err(ReadError::Halted { .. }));
        assert_matches!(reader.snapshot(), Err(ReadError::Halted { .. }));
    }

    #[test]
    fn corruption_in_range_halts_the_reader() {
        let reader = tampered_reader(|b| b.block.body.clear());
        assert_matches!(reader.blocks_in_range(1, 5), Err(ReadError::Halted { .. }));
        assert!(reader.is_halted());
    }
}
