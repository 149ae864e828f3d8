use kestrel_primitives::block::{
    Block, BlockHash, BlockNumber, Commit, CommitSig, CommittedBlock, Header,
};
use kestrel_primitives::transaction::Tx;
use kestrel_provider_api::block::{BlockWriter, MutableProvider};

use crate::providers::in_memory::MemoryProviderFactory;
use crate::ProviderFactory;

pub const TEST_CHAIN_ID: &str = "kestrel-test";

/// Unix time in milliseconds of the first generated block.
const GENESIS_TIME: u64 = 1_700_000_000_000;

/// Generates a valid block on top of `parent`. The same inputs always produce the same block.
pub fn committed_block(height: BlockNumber, parent: BlockHash) -> CommittedBlock {
    let body = (0..height % 4)
        .map(|i| Tx::new(format!("key-{height}-{i}=value").into_bytes()))
        .collect();

    let header = Header {
        chain_id: TEST_CHAIN_ID.to_string(),
        height,
        time: GENESIS_TIME + height * 1000,
        last_block_hash: parent,
        proposer_address: [height as u8; 20],
        ..Default::default()
    };

    let block = Block { header, body }.seal_with_data_hash();
    let commit = Commit {
        height,
        round: 0,
        block_hash: block.hash,
        signatures: vec![CommitSig {
            validator_address: [1; 20],
            timestamp: GENESIS_TIME + height * 1000 + 500,
            signature: vec![0xab; 64].into(),
        }],
    };

    CommittedBlock { block, commit }
}

/// Generates a valid chain of blocks at heights `1..=len`.
pub fn generate_chain(len: u64) -> Vec<CommittedBlock> {
    let mut parent = BlockHash::ZERO;
    (1..=len)
        .map(|height| {
            let block = committed_block(height, parent);
            parent = block.hash();
            block
        })
        .collect()
}

/// Creates an in-memory store with a committed chain of `len` blocks.
pub fn factory_with_chain(len: u64) -> MemoryProviderFactory {
    let factory = MemoryProviderFactory::new();
    let writer = factory.provider_mut();
    for block in generate_chain(len) {
        writer.insert_block(block).expect("generated block is valid");
    }
    writer.commit().expect("generated chain is valid");
    factory
}
