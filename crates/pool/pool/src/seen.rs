use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use kestrel_primitives::transaction::TxHash;
use tokio::time::Instant;

/// Bounded, time-ordered record of admitted transaction hashes.
///
/// An entry lives for exactly `retention` after it was recorded. Entries are never evicted early:
/// once `capacity` live entries are held the cache is full and the pool stops admitting until the
/// oldest ones expire. A capacity of 0 disables the cache.
#[derive(Debug)]
pub(crate) struct SeenHashes {
    retention: Duration,
    capacity: usize,
    order: VecDeque<(Instant, TxHash)>,
    entries: HashMap<TxHash, Instant>,
}

impl SeenHashes {
    pub(crate) fn new(retention: Duration, capacity: usize) -> Self {
        Self {
            retention,
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    /// Drops every entry recorded `retention` or longer before `now`.
    pub(crate) fn expire(&mut self, now: Instant) {
        while let Some(&(at, _)) = self.order.front() {
            if now.saturating_duration_since(at) < self.retention {
                break;
            }
            self.pop_front();
        }
    }

    pub(crate) fn contains(&self, hash: &TxHash) -> bool {
        self.entries.contains_key(hash)
    }

    /// Whether recording another hash would exceed the capacity. Call [`expire`](Self::expire)
    /// first, so that only live entries count.
    pub(crate) fn is_full(&self) -> bool {
        self.capacity != 0 && self.order.len() >= self.capacity
    }

    /// Records `hash`. Returns `false`, leaving the cache untouched, if it is full.
    pub(crate) fn insert(&mut self, hash: TxHash, now: Instant) -> bool {
        if self.capacity == 0 {
            return true;
        }
        if self.is_full() {
            return false;
        }

        self.order.push_back((now, hash));
        self.entries.insert(hash, now);
        true
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    fn pop_front(&mut self) {
        if let Some((at, hash)) = self.order.pop_front() {
            // a newer entry for the same hash owns the map slot
            if self.entries.get(&hash) == Some(&at) {
                self.entries.remove(&hash);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use kestrel_primitives::B256;

    use super::*;

    #[test]
    fn entries_expire_after_retention() {
        let mut seen = SeenHashes::new(Duration::from_secs(10), 100);
        let t0 = Instant::now();
        let a = B256::digest(b"a");
        let b = B256::digest(b"b");

        seen.insert(a, t0);
        seen.insert(b, t0 + Duration::from_secs(5));

        seen.expire(t0 + Duration::from_secs(9));
        assert!(seen.contains(&a));
        assert!(seen.contains(&b));

        seen.expire(t0 + Duration::from_secs(10));
        assert!(!seen.contains(&a));
        assert!(seen.contains(&b));

        seen.expire(t0 + Duration::from_secs(15));
        assert_eq!(seen.len(), 0);
    }

    #[test]
    fn live_entries_are_never_evicted() {
        let mut seen = SeenHashes::new(Duration::from_secs(60), 2);
        let t0 = Instant::now();
        let hashes: Vec<_> = (0u8..3).map(|i| B256::digest([i])).collect();

        assert!(seen.insert(hashes[0], t0));
        assert!(seen.insert(hashes[1], t0));
        assert!(seen.is_full());
        assert!(!seen.insert(hashes[2], t0));

        assert_eq!(seen.len(), 2);
        assert!(seen.contains(&hashes[0]));
        assert!(!seen.contains(&hashes[2]));

        // room is made only by expiry
        seen.expire(t0 + Duration::from_secs(60));
        assert!(!seen.is_full());
        assert!(seen.insert(hashes[2], t0 + Duration::from_secs(60)));
    }

    #[test]
    fn zero_capacity_remembers_nothing() {
        let mut seen = SeenHashes::new(Duration::from_secs(60), 0);
        assert!(seen.insert(B256::digest(b"a"), Instant::now()));
        assert!(!seen.is_full());
        assert_eq!(seen.len(), 0);
    }
}
