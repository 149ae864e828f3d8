use kestrel_primitives::transaction::TxHash;

/// Why a transaction was or wasn't admitted into the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionReason {
    /// The transaction was inserted into the pending set.
    Accepted,
    /// The same transaction is already pending, or was admitted within the retention window.
    Duplicate,
    /// The pending set, or the record of recently admitted hashes, has reached its configured
    /// capacity. Retriable after a backoff; the pool never retries.
    Full,
}

/// The outcome of a single admission attempt. Created once per submission and never changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionResult {
    pub hash: TxHash,
    pub reason: AdmissionReason,
    /// Zero-based position of the transaction in the pending queue at the time it was admitted.
    /// Only set for accepted transactions.
    pub queue_position: Option<u64>,
}

impl AdmissionResult {
    pub fn accepted(hash: TxHash, queue_position: u64) -> Self {
        Self { hash, reason: AdmissionReason::Accepted, queue_position: Some(queue_position) }
    }

    pub fn duplicate(hash: TxHash) -> Self {
        Self { hash, reason: AdmissionReason::Duplicate, queue_position: None }
    }

    pub fn full(hash: TxHash) -> Self {
        Self { hash, reason: AdmissionReason::Full, queue_position: None }
    }

    pub fn is_accepted(&self) -> bool {
        self.reason == AdmissionReason::Accepted
    }
}

#[cfg(test)]
mod tests {
    use kestrel_primitives::B256;

    use super::*;

    #[test]
    fn only_accepted_results_have_a_position() {
        let hash = B256::digest(b"tx");

        assert_eq!(AdmissionResult::accepted(hash, 3).queue_position, Some(3));
        assert!(AdmissionResult::accepted(hash, 0).is_accepted());
        assert!(!AdmissionResult::full(hash).is_accepted());
        assert_eq!(AdmissionResult::duplicate(hash).queue_position, None);
    }
}
