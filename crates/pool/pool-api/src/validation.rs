use bytes::Bytes;

use crate::PoolTransaction;

/// Reasons a broadcast payload is rejected before it reaches the pool.
///
/// These are client input errors: they are returned immediately and never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidTransactionError {
    /// The payload has no bytes.
    #[error("Transaction payload is empty.")]
    Empty,

    /// The payload is bigger than the configured per-transaction limit.
    #[error("Transaction size ({size} bytes) exceeds the maximum of {max} bytes.")]
    TooLarge { size: usize, max: usize },

    /// The payload doesn't follow the configured transaction schema.
    #[error("Malformed transaction: {reason}")]
    Malformed { reason: String },
}

impl InvalidTransactionError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed { reason: reason.into() }
    }
}

/// A transaction that has passed validation.
///
/// [`TransactionPool::add_transaction`](crate::TransactionPool::add_transaction) only accepts
/// this type, so a raw payload has to go through a [`Validator`] before it can be admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTx<T> {
    tx: T,
}

impl<T> ValidatedTx<T> {
    /// Wraps a transaction that a [`Validator`] has accepted.
    ///
    /// Meant to be called from [`Validator`] implementations only.
    pub fn new(tx: T) -> Self {
        Self { tx }
    }

    pub fn tx(&self) -> &T {
        &self.tx
    }

    pub fn into_inner(self) -> T {
        self.tx
    }
}

impl<T: PoolTransaction> ValidatedTx<T> {
    pub fn hash(&self) -> kestrel_primitives::transaction::TxHash {
        self.tx.hash()
    }
}

pub type ValidationResult<T> = Result<ValidatedTx<T>, InvalidTransactionError>;

/// A trait for validating transaction payloads before they are added to the transaction pool.
///
/// Validation must be pure: no shared state, no side effects and no blocking. The same payload
/// always yields the same result.
pub trait Validator {
    type Transaction: PoolTransaction;

    /// Validate a raw transaction payload.
    fn validate(&self, payload: Bytes) -> ValidationResult<Self::Transaction>;
}
