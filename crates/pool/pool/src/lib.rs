#![cfg_attr(not(test), warn(unused_crate_dependencies))]

pub mod config;
pub mod pool;
mod seen;
pub mod validation;

pub use config::PoolConfig;
pub use kestrel_pool_api::{
    AdmissionReason, AdmissionResult, PendingTransactions, PoolTransaction, TransactionPool,
};
use kestrel_primitives::transaction::TxWithHash;
use pool::Pool;
use validation::stateless::TxValidator;

/// Kestrel default transaction pool type.
pub type TxPool = Pool<TxWithHash, TxValidator>;

impl TxPool {
    /// Creates the default pool: a [`TxValidator`] sized after the config's per-transaction limit.
    pub fn from_config(config: PoolConfig) -> Self {
        Pool::new(TxValidator::new(config.max_tx_bytes), config)
    }
}

#[cfg(test)]
mod tests {

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    use futures::StreamExt;
    use kestrel_pool_api::TransactionPool;
    use kestrel_primitives::transaction::{Tx, TxWithHash};
    use tokio::task::yield_now;

    use crate::pool::test_utils::{random_payload, random_payloads};
    use crate::pool::Pool;
    use crate::validation::schema::KvSchema;
    use crate::validation::stateless::TxValidator;
    use crate::validation::NoopValidator;
    use crate::{PoolConfig, TxPool};

    #[tokio::test]
    async fn pending_transactions() {
        let pool = Pool::new(NoopValidator::<TxWithHash>::new(), PoolConfig::default());

        let first_batch = random_payloads(6);
        for payload in &first_batch {
            assert!(pool.submit(payload.clone()).expect("failed to add tx").is_accepted());
        }

        let mut pendings = pool.pending_transactions();

        // exhaust all the first batch transactions
        for expected in &first_batch {
            let actual = pendings.next().await.map(|t| t.tx).unwrap();
            assert_eq!(expected, actual.transaction.payload());
        }

        let second_batch = random_payloads(6);
        for payload in &second_batch {
            assert!(pool.submit(payload.clone()).expect("failed to add tx").is_accepted());
        }

        // exhaust all the second batch transactions
        for expected in &second_batch {
            let actual = pendings.next().await.map(|t| t.tx).unwrap();
            assert_eq!(expected, actual.transaction.payload());
        }

        // Check that all the added transaction is still in the pool because we haven't removed it
        // yet.
        let all = [first_batch, second_batch].concat();
        for payload in all {
            assert!(pool.contains(Tx::new(payload).calculate_hash()));
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscription_stream_wakeup() {
        let pool = Pool::new(NoopValidator::<TxWithHash>::new(), PoolConfig::default());
        let mut pending = pool.pending_transactions();

        // Spawn a task that will add a transaction after a delay
        let pool_clone = pool.clone();

        let payloads = random_payloads(3);
        let payloads_clone = payloads.clone();

        let has_polled_once = Arc::new(AtomicBool::new(false));
        let has_polled_once_clone = has_polled_once.clone();

        tokio::spawn(async move {
            while !has_polled_once_clone.load(Ordering::SeqCst) {
                yield_now().await;
            }

            for payload in payloads_clone {
                pool_clone.submit(payload).expect("failed to add tx");
            }
        });

        // Check that first poll_next returns Pending because no pending transaction has been added
        // to the pool yet
        assert!(futures_util::poll!(pending.next()).is_pending());
        has_polled_once.store(true, Ordering::SeqCst);

        for payload in payloads {
            let received = pending.next().await.unwrap();
            assert_eq!(&payload, received.tx.transaction.payload());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn pending_stream_has_no_gaps_under_concurrent_admission() {
        const WRITERS: usize = 4;
        const PER_WRITER: usize = 50;

        let pool = Pool::new(NoopValidator::<TxWithHash>::new(), PoolConfig::default());

        let writers = (0..WRITERS)
            .map(|_| {
                let pool = pool.clone();
                tokio::spawn(async move {
                    for payload in random_payloads(PER_WRITER) {
                        pool.submit(payload).unwrap();
                        yield_now().await;
                    }
                })
            })
            .collect::<Vec<_>>();

        // subscribe somewhere in the middle of the admissions
        yield_now().await;
        let pending = pool.pending_transactions();

        for writer in writers {
            writer.await.unwrap();
        }

        let received = pending.take(WRITERS * PER_WRITER).collect::<Vec<_>>().await;
        let seqs = received.iter().map(|t| t.seq).collect::<Vec<_>>();
        let expected = (0..(WRITERS * PER_WRITER) as u64).collect::<Vec<_>>();
        assert_eq!(seqs, expected);
    }

    #[test]
    fn default_pool_validates_against_config() {
        let pool = TxPool::from_config(PoolConfig::default().with_max_tx_bytes(16));

        assert!(pool.submit(random_payload(16)).unwrap().is_accepted());
        assert!(pool.submit(random_payload(17)).is_err());
        assert_eq!(pool.validator().max_tx_bytes(), 16);
    }

    #[test]
    fn schema_rejection_leaves_pool_untouched() {
        let pool = Pool::new(TxValidator::default().with_schema(KvSchema), PoolConfig::default());

        assert!(pool.submit(bytes::Bytes::from_static(b"missing-separator")).is_err());
        assert!(pool.submit(bytes::Bytes::from_static(b"k=v")).unwrap().is_accepted());
        assert_eq!(pool.size(), 1);
    }
}
