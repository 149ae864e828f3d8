use std::sync::Arc;

use tokio::time::Instant;

/// A transaction sitting in the pending queue.
#[derive(Debug)]
pub struct PendingTx<T> {
    /// Monotonic admission sequence number. Defines the queue order.
    pub seq: u64,
    pub tx: Arc<T>,
    pub added_at: Instant,
}

impl<T> PendingTx<T> {
    pub fn new(seq: u64, tx: T) -> Self {
        Self { seq, tx: Arc::new(tx), added_at: Instant::now() }
    }
}

// We can't just derive these traits because the derive implementation would require that
// the generics also implement these traits, which is not necessary.

impl<T> Clone for PendingTx<T> {
    fn clone(&self) -> Self {
        Self { seq: self.seq, tx: Arc::clone(&self.tx), added_at: self.added_at }
    }
}

impl<T> PartialEq for PendingTx<T> {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl<T> Eq for PendingTx<T> {}

impl<T> PartialOrd for PendingTx<T> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PendingTx<T> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.seq.cmp(&other.seq)
    }
}
