#![cfg_attr(not(test), warn(unused_crate_dependencies))]

use std::sync::Arc;

use futures::channel::mpsc::Receiver;
use kestrel_primitives::transaction::{TxHash, TxWithHash};

mod admission;
mod pending;
mod subscription;
mod tx;
pub mod validation;

pub use admission::*;
pub use pending::*;
pub use subscription::*;
pub use tx::*;

use crate::validation::{InvalidTransactionError, ValidatedTx, Validator};

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(Box<InvalidTransactionError>),
}

impl From<InvalidTransactionError> for PoolError {
    fn from(error: InvalidTransactionError) -> Self {
        Self::InvalidTransaction(Box::new(error))
    }
}

pub type PoolResult<T> = Result<T, PoolError>;

/// Represents a complete transaction pool.
///
/// Admission is synchronous: the caller learns the outcome of [`add_transaction`] before it
/// returns, and the pool never retries a rejected transaction on its own.
///
/// [`add_transaction`]: TransactionPool::add_transaction
pub trait TransactionPool: Send + Sync {
    /// The pool's transaction type.
    type Transaction: PoolTransaction;

    /// Transaction validation before adding to the pool.
    type Validator: Validator<Transaction = Self::Transaction>;

    /// Admit a validated transaction into the pending set.
    ///
    /// Within the pool's retention window, at most one call per transaction hash returns an
    /// accepted result, no matter how many callers race to add it.
    fn add_transaction(&self, tx: ValidatedTx<Self::Transaction>) -> AdmissionResult;

    /// Returns a [`Stream`](futures::Stream) which yields the pending transactions in admission
    /// order, followed by every transaction admitted after the stream was created.
    fn pending_transactions(&self) -> PendingTransactions<Self::Transaction>;

    /// Check if the pool contains a transaction with the given hash.
    fn contains(&self, hash: TxHash) -> bool;

    /// Get a transaction from the pool by its hash.
    fn get(&self, hash: TxHash) -> Option<Arc<Self::Transaction>>;

    fn add_listener(&self) -> Receiver<TxHash>;

    /// Removes a list of transactions from the pool according to their hashes.
    ///
    /// Removed hashes stay in the seen-hash cache until the retention window passes, so they
    /// can't be re-admitted right after being consumed.
    fn remove_transactions(&self, hashes: &[TxHash]);

    /// Get the total number of transactions in the pool.
    fn size(&self) -> usize;

    /// Get the total size in bytes of the transactions in the pool.
    fn size_bytes(&self) -> usize;

    /// Get a reference to the pool's validator.
    fn validator(&self) -> &Self::Validator;

    /// Returns a point-in-time snapshot of all transactions currently in the pool.
    fn take_transactions_snapshot(&self) -> Vec<Arc<Self::Transaction>>;
}

// the transaction type is recommended to implement a cheap clone (eg ref-counting) so that it
// can be cloned around to different pools as necessary.
pub trait PoolTransaction: Clone + Send + Sync {
    /// return the tx hash.
    fn hash(&self) -> TxHash;

    /// return the size of the tx payload in bytes.
    fn size(&self) -> usize;
}

impl PoolTransaction for TxWithHash {
    fn hash(&self) -> TxHash {
        self.hash
    }

    fn size(&self) -> usize {
        self.transaction.len()
    }
}
