use kestrel_primitives::block::{Block, BlockHash, Commit, CommittedBlock, Header};
use kestrel_primitives::transaction::Tx;
use kestrel_provider::MemoryProviderFactory;
use rand::Rng;
use rstest::fixture;

#[fixture]
pub fn provider_factory() -> MemoryProviderFactory {
    MemoryProviderFactory::new()
}

fn random_tx() -> Tx {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(1..64);
    let value = (0..len).map(|_| rng.gen_range(b'a'..=b'z')).collect::<Vec<u8>>();
    Tx::new([b"key=".as_slice(), &value].concat())
}

/// Generates a valid chain of `len` blocks with random transactions.
pub fn random_chain(len: u64) -> Vec<CommittedBlock> {
    let mut rng = rand::thread_rng();
    let mut parent = BlockHash::ZERO;

    (1..=len)
        .map(|height| {
            let header = Header {
                chain_id: "kestrel-it".to_string(),
                height,
                time: height * 1000,
                last_block_hash: parent,
                proposer_address: rng.gen(),
                ..Default::default()
            };

            let body = (0..rng.gen_range(0..5)).map(|_| random_tx()).collect();
            let block = Block { header, body }.seal_with_data_hash();
            let commit = Commit { height, block_hash: block.hash, ..Default::default() };

            parent = block.hash;
            CommittedBlock { block, commit }
        })
        .collect()
}
