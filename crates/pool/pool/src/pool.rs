use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use bytes::Bytes;
use futures::channel::mpsc::{channel, Receiver, Sender};
use kestrel_pool_api::validation::{ValidatedTx, Validator};
use kestrel_pool_api::{
    AdmissionResult, PendingTransactions, PendingTx, PoolResult, PoolTransaction, Subscription,
    TransactionPool,
};
use kestrel_primitives::transaction::TxHash;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::config::PoolConfig;
use crate::seen::SeenHashes;

#[derive(Debug)]
pub struct Pool<T, V>
where
    T: PoolTransaction,
    V: Validator<Transaction = T>,
{
    inner: Arc<Inner<T, V>>,
}

#[derive(Debug)]
struct Inner<T, V> {
    /// The pending set and the seen-hash cache. Every admission decision is made while holding
    /// this lock.
    pending: Mutex<PendingSet<T>>,

    /// listeners for incoming txs
    listeners: Mutex<Vec<Sender<TxHash>>>,

    /// subscribers for incoming txs
    subscribers: Mutex<Vec<mpsc::UnboundedSender<PendingTx<T>>>>,

    /// the tx validator
    validator: V,

    config: PoolConfig,
}

#[derive(Debug)]
struct PendingSet<T> {
    /// Pending txs keyed by their admission sequence number.
    queue: BTreeMap<u64, PendingTx<T>>,
    by_hash: HashMap<TxHash, u64>,
    seen: SeenHashes,
    size_bytes: usize,
    next_seq: u64,
}

impl<T> PendingSet<T> {
    fn new(config: &PoolConfig) -> Self {
        Self {
            queue: BTreeMap::new(),
            by_hash: HashMap::new(),
            seen: SeenHashes::new(config.retention, config.max_seen_hashes),
            size_bytes: 0,
            next_seq: 0,
        }
    }
}

impl<T, V> Pool<T, V>
where
    T: PoolTransaction,
    V: Validator<Transaction = T> + Send + Sync,
{
    /// Creates a new [Pool] with the given [Validator] and configuration.
    pub fn new(validator: V, config: PoolConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                pending: Mutex::new(PendingSet::new(&config)),
                listeners: Default::default(),
                subscribers: Default::default(),
                validator,
                config,
            }),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Validates a raw payload and admits it into the pool.
    ///
    /// A payload that fails validation never touches the pending set. Admission rejections
    /// (duplicate, full) are returned as an `Ok` result with the corresponding reason.
    pub fn submit(&self, payload: Bytes) -> PoolResult<AdmissionResult> {
        match self.inner.validator.validate(payload) {
            Ok(tx) => Ok(self.add_transaction(tx)),
            Err(error) => {
                debug!(target: "pool", %error, "Invalid transaction.");
                Err(error.into())
            }
        }
    }

    /// Notifies all listeners about the new incoming transaction.
    fn notify_listener(&self, hash: TxHash) {
        let mut listener = self.inner.listeners.lock();
        // this is basically a retain but with mut reference
        for n in (0..listener.len()).rev() {
            let mut listener_tx = listener.swap_remove(n);
            let retain = match listener_tx.try_send(hash) {
                Ok(()) => true,
                Err(e) => {
                    if e.is_full() {
                        warn!(
                            target: "pool",
                            hash = format!("{hash:#x}"),
                            "Unable to send tx notification because channel is full."
                        );
                        true
                    } else {
                        false
                    }
                }
            };

            if retain {
                listener.push(listener_tx)
            }
        }
    }

    fn notify_subscribers(&self, tx: PendingTx<T>) {
        self.inner.subscribers.lock().retain(|sender| match sender.send(tx.clone()) {
            Ok(()) => true,
            Err(error) => {
                trace!(target: "pool", %error, "Subscription channel closed.");
                false
            }
        });
    }

    // notify both listener and subscribers
    fn notify(&self, tx: PendingTx<T>) {
        self.notify_listener(tx.tx.hash());
        self.notify_subscribers(tx);
    }
}

impl<T, V> TransactionPool for Pool<T, V>
where
    T: PoolTransaction,
    V: Validator<Transaction = T> + Send + Sync,
{
    type Transaction = T;
    type Validator = V;

    fn add_transaction(&self, tx: ValidatedTx<T>) -> AdmissionResult {
        let tx = tx.into_inner();
        let hash = tx.hash();
        let size = tx.size();

        let _span =
            tracing::trace_span!(target: "pool", "pool_add", tx_hash = format!("{hash:#x}"))
                .entered();

        let mut pending = self.inner.pending.lock();

        let now = Instant::now();
        pending.seen.expire(now);

        if pending.by_hash.contains_key(&hash) || pending.seen.contains(&hash) {
            debug!(target: "pool", "Duplicate transaction.");
            return AdmissionResult::duplicate(hash);
        }

        let config = &self.inner.config;
        let count = pending.queue.len();
        if count >= config.max_txs || pending.size_bytes.saturating_add(size) > config.max_txs_bytes
        {
            debug!(target: "pool", count, bytes = pending.size_bytes, "Pool is full.");
            return AdmissionResult::full(hash);
        }

        // admitting past the seen-hash capacity would forget a hash before its retention ends
        if pending.seen.is_full() {
            debug!(target: "pool", seen = pending.seen.len(), "Seen-hash cache is full.");
            return AdmissionResult::full(hash);
        }

        let seq = pending.next_seq;
        pending.next_seq += 1;

        let tx = PendingTx::new(seq, tx);
        pending.queue.insert(seq, tx.clone());
        pending.by_hash.insert(hash, seq);
        pending.size_bytes += size;
        pending.seen.insert(hash, now);

        trace!(target: "pool", position = count, "Transaction added to the pool.");

        // notified under the pending lock so that subscribers observe admission order
        self.notify(tx);

        AdmissionResult::accepted(hash, count as u64)
    }

    fn pending_transactions(&self) -> PendingTransactions<Self::Transaction> {
        let pending = self.inner.pending.lock();
        let all = pending.queue.values().cloned().collect::<Vec<_>>();

        let (subscription, sender) = Subscription::new();
        self.inner.subscribers.lock().push(sender);

        PendingTransactions { all: all.into_iter(), subscription }
    }

    // check if a tx is in the pool
    fn contains(&self, hash: TxHash) -> bool {
        self.inner.pending.lock().by_hash.contains_key(&hash)
    }

    fn get(&self, hash: TxHash) -> Option<Arc<T>> {
        let pending = self.inner.pending.lock();
        let seq = pending.by_hash.get(&hash)?;
        pending.queue.get(seq).map(|t| Arc::clone(&t.tx))
    }

    fn add_listener(&self) -> Receiver<TxHash> {
        const TX_LISTENER_BUFFER_SIZE: usize = 2048;
        let (tx, rx) = channel(TX_LISTENER_BUFFER_SIZE);
        self.inner.listeners.lock().push(tx);
        rx
    }

    fn remove_transactions(&self, hashes: &[TxHash]) {
        let mut pending = self.inner.pending.lock();
        let mut removed = 0;

        for hash in hashes {
            let Some(seq) = pending.by_hash.remove(hash) else { continue };
            if let Some(tx) = pending.queue.remove(&seq) {
                pending.size_bytes -= tx.tx.size();
                removed += 1;
            }
        }

        trace!(target: "pool", removed, remaining = pending.queue.len(), "Transactions removed.");
    }

    fn size(&self) -> usize {
        self.inner.pending.lock().queue.len()
    }

    fn size_bytes(&self) -> usize {
        self.inner.pending.lock().size_bytes
    }

    fn validator(&self) -> &Self::Validator {
        &self.inner.validator
    }

    fn take_transactions_snapshot(&self) -> Vec<Arc<T>> {
        self.inner.pending.lock().queue.values().map(|t| Arc::clone(&t.tx)).collect()
    }
}

impl<T, V> Clone for Pool<T, V>
where
    T: PoolTransaction,
    V: Validator<Transaction = T>,
{
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}
