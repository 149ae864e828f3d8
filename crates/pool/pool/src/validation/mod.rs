pub mod schema;
pub mod stateless;

use bytes::Bytes;
use kestrel_pool_api::validation::{ValidatedTx, ValidationResult, Validator};
use kestrel_pool_api::PoolTransaction;
use kestrel_primitives::transaction::Tx;

/// A no-op validator that does nothing and assume all incoming transactions are valid.
#[derive(Debug)]
pub struct NoopValidator<T>(std::marker::PhantomData<T>);

impl<T> NoopValidator<T> {
    pub fn new() -> Self {
        Self(std::marker::PhantomData)
    }
}

impl<T: PoolTransaction + From<Tx>> Validator for NoopValidator<T> {
    type Transaction = T;

    fn validate(&self, payload: Bytes) -> ValidationResult<Self::Transaction> {
        Ok(ValidatedTx::new(T::from(Tx::new(payload))))
    }
}

impl<T> Default for NoopValidator<T> {
    fn default() -> Self {
        Self::new()
    }
}
