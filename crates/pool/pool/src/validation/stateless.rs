use std::sync::Arc;

use bytes::Bytes;
use kestrel_pool_api::validation::{
    InvalidTransactionError, ValidatedTx, ValidationResult, Validator,
};
use kestrel_primitives::transaction::{Tx, TxWithHash};

use super::schema::TxSchema;
use crate::config::DEFAULT_MAX_TX_BYTES;

/// Validates the shape of a broadcast payload: non-empty, within the size limit and, if a schema
/// is set, well-formed.
///
/// Holds no state besides its configuration, so it's safe to share across any number of
/// concurrent callers.
#[derive(Debug, Clone)]
pub struct TxValidator {
    max_tx_bytes: usize,
    schema: Option<Arc<dyn TxSchema>>,
}

impl TxValidator {
    pub fn new(max_tx_bytes: usize) -> Self {
        Self { max_tx_bytes, schema: None }
    }

    pub fn with_schema(mut self, schema: impl TxSchema + 'static) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn max_tx_bytes(&self) -> usize {
        self.max_tx_bytes
    }
}

impl Default for TxValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TX_BYTES)
    }
}

impl Validator for TxValidator {
    type Transaction = TxWithHash;

    fn validate(&self, payload: Bytes) -> ValidationResult<Self::Transaction> {
        if payload.is_empty() {
            return Err(InvalidTransactionError::Empty);
        }

        if payload.len() > self.max_tx_bytes {
            return Err(InvalidTransactionError::TooLarge {
                size: payload.len(),
                max: self.max_tx_bytes,
            });
        }

        if let Some(schema) = &self.schema {
            schema.check(&payload).map_err(InvalidTransactionError::malformed)?;
        }

        Ok(ValidatedTx::new(TxWithHash::new(Tx::new(payload))))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use kestrel_primitives::B256;

    use super::*;
    use crate::validation::schema::KvSchema;

    #[test]
    fn checks_in_order() {
        let validator = TxValidator::new(4).with_schema(KvSchema);

        assert_eq!(validator.validate(Bytes::new()), Err(InvalidTransactionError::Empty));

        // size is checked before the schema
        assert_eq!(
            validator.validate(Bytes::from_static(b"no separator")),
            Err(InvalidTransactionError::TooLarge { size: 12, max: 4 })
        );

        assert_matches!(
            validator.validate(Bytes::from_static(b"abcd")),
            Err(InvalidTransactionError::Malformed { .. })
        );

        let tx = validator.validate(Bytes::from_static(b"a=bc")).unwrap();
        assert_eq!(tx.hash(), B256::digest(b"a=bc"));
    }

    #[test]
    fn boundary_size_is_accepted() {
        let validator = TxValidator::new(3);
        assert!(validator.validate(Bytes::from_static(b"abc")).is_ok());
        assert_matches!(
            validator.validate(Bytes::from_static(b"abcd")),
            Err(InvalidTransactionError::TooLarge { size: 4, max: 3 })
        );
    }

    #[test]
    fn without_schema_any_bytes_pass() {
        let validator = TxValidator::default();
        assert!(validator.validate(Bytes::from_static(b"\x00\x01\x02")).is_ok());
    }
}
