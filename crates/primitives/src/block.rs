use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::hash::B256;
use crate::merkle::merkle_root;
use crate::transaction::Tx;

/// Block number type. The first block of a chain is at height 1; height 0 means "no block".
pub type BlockNumber = u64;
/// Block hash type.
pub type BlockHash = B256;
/// 20-byte validator address.
pub type ValidatorAddress = [u8; 20];

/// Identifies a committed block by either its hash or its height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlockHashOrNumber {
    Hash(BlockHash),
    Num(BlockNumber),
}

impl From<BlockNumber> for BlockHashOrNumber {
    fn from(number: BlockNumber) -> Self {
        Self::Num(number)
    }
}

impl From<BlockHash> for BlockHashOrNumber {
    fn from(hash: BlockHash) -> Self {
        Self::Hash(hash)
    }
}

/// A point query over committed blocks.
///
/// The height is signed to mirror what clients can put on the wire: zero and negative heights
/// are valid queries that simply never match a block. When neither field is set the query refers
/// to the latest committed block. When both are set, they must agree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockQuery {
    pub height: Option<i64>,
    pub hash: Option<BlockHash>,
}

impl BlockQuery {
    pub fn latest() -> Self {
        Self::default()
    }

    pub fn height(height: i64) -> Self {
        Self { height: Some(height), hash: None }
    }

    pub fn hash(hash: BlockHash) -> Self {
        Self { height: None, hash: Some(hash) }
    }

    pub fn is_latest(&self) -> bool {
        self.height.is_none() && self.hash.is_none()
    }
}

/// Block header.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub chain_id: String,
    pub height: BlockNumber,
    /// Block time in milliseconds since the unix epoch.
    pub time: u64,
    pub last_block_hash: BlockHash,
    /// Merkle root of the block's transactions.
    pub data_hash: B256,
    pub proposer_address: ValidatorAddress,
}

impl Header {
    /// Computes the hash of the header over its canonical big-endian encoding. The chain id is
    /// prefixed with its length as a `u64`.
    pub fn compute_hash(&self) -> BlockHash {
        let mut hasher = Sha256::new();
        hasher.update((self.chain_id.len() as u64).to_be_bytes());
        hasher.update(self.chain_id.as_bytes());
        hasher.update(self.height.to_be_bytes());
        hasher.update(self.time.to_be_bytes());
        hasher.update(self.last_block_hash.as_bytes());
        hasher.update(self.data_hash.as_bytes());
        hasher.update(self.proposer_address);
        B256::new(hasher.finalize().into())
    }
}

/// An unsealed block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: Header,
    pub body: Vec<Tx>,
}

impl Block {
    /// Seals the block by computing its hash. The header's data hash is taken as is.
    pub fn seal(self) -> SealedBlock {
        SealedBlock { hash: self.header.compute_hash(), header: self.header, body: self.body }
    }

    /// Fills in the header's data hash from the body, then seals the block.
    pub fn seal_with_data_hash(mut self) -> SealedBlock {
        self.header.data_hash = compute_data_hash(&self.body);
        self.seal()
    }
}

/// Computes the data hash of a list of transactions.
pub fn compute_data_hash(txs: &[Tx]) -> B256 {
    merkle_root(txs)
}

/// A block whose hash has been computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedBlock {
    pub hash: BlockHash,
    pub header: Header,
    pub body: Vec<Tx>,
}

impl SealedBlock {
    pub fn unseal(self) -> Block {
        Block { header: self.header, body: self.body }
    }

    /// Recomputes the block and data hashes and checks them against the stored values.
    pub fn verify(&self) -> Result<(), IntegrityError> {
        let actual = self.header.compute_hash();
        if actual != self.hash {
            return Err(IntegrityError::BlockHashMismatch { expected: self.hash, actual });
        }

        let actual = compute_data_hash(&self.body);
        if actual != self.header.data_hash {
            return Err(IntegrityError::DataHashMismatch {
                expected: self.header.data_hash,
                actual,
            });
        }

        Ok(())
    }
}

/// A validator's vote for a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSig {
    pub validator_address: ValidatorAddress,
    /// Vote time in milliseconds since the unix epoch.
    pub timestamp: u64,
    pub signature: Bytes,
}

/// Commit metadata: the set of votes that finalized a block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub height: BlockNumber,
    pub round: u32,
    pub block_hash: BlockHash,
    pub signatures: Vec<CommitSig>,
}

/// A sealed block together with the commit that finalized it. This is the unit a block store
/// holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommittedBlock {
    pub block: SealedBlock,
    pub commit: Commit,
}

impl CommittedBlock {
    pub fn number(&self) -> BlockNumber {
        self.block.header.height
    }

    pub fn hash(&self) -> BlockHash {
        self.block.hash
    }

    /// Checks the block's own hashes and that the commit refers to this block.
    pub fn verify(&self) -> Result<(), IntegrityError> {
        self.block.verify()?;

        if self.commit.height != self.number() {
            return Err(IntegrityError::CommitHeightMismatch {
                block: self.number(),
                commit: self.commit.height,
            });
        }

        if self.commit.block_hash != self.hash() {
            return Err(IntegrityError::CommitHashMismatch {
                block: self.hash(),
                commit: self.commit.block_hash,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("block hash mismatch: stored {expected:#x}, computed {actual:#x}")]
    BlockHashMismatch { expected: BlockHash, actual: BlockHash },

    #[error("data hash mismatch: header {expected:#x}, computed {actual:#x}")]
    DataHashMismatch { expected: B256, actual: B256 },

    #[error("commit is for height {commit}, block is at height {block}")]
    CommitHeightMismatch { block: BlockNumber, commit: BlockNumber },

    #[error("commit is for block {commit:#x}, block hash is {block:#x}")]
    CommitHashMismatch { block: BlockHash, commit: BlockHash },
}
