use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::hash::B256;

/// The hash of a transaction: SHA-256 of its raw payload.
pub type TxHash = B256;

/// A raw transaction.
///
/// The node doesn't interpret the payload; it's handed as-is to the application through
/// consensus.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tx(pub Bytes);

impl Tx {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self(payload.into())
    }

    pub fn calculate_hash(&self) -> TxHash {
        B256::digest(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn payload(&self) -> &Bytes {
        &self.0
    }
}

impl From<Bytes> for Tx {
    fn from(value: Bytes) -> Self {
        Self(value)
    }
}

impl From<Vec<u8>> for Tx {
    fn from(value: Vec<u8>) -> Self {
        Self(value.into())
    }
}

impl AsRef<[u8]> for Tx {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A transaction along with its content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxWithHash {
    pub hash: TxHash,
    pub transaction: Tx,
}

impl TxWithHash {
    pub fn new(transaction: Tx) -> Self {
        Self { hash: transaction.calculate_hash(), transaction }
    }
}

impl From<Tx> for TxWithHash {
    fn from(value: Tx) -> Self {
        Self::new(value)
    }
}
