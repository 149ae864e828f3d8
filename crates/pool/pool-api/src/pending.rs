use std::pin::Pin;
use std::task::{Context, Poll};
use std::vec::IntoIter;

use futures::{Stream, StreamExt};

use crate::subscription::Subscription;
use crate::tx::PendingTx;
use crate::PoolTransaction;

/// A stream that yields transactions from the pool in the order they were admitted.
///
/// The pool creates `all` and `subscription` under the same lock, so the stream neither skips
/// nor repeats a transaction at the boundary between the two.
#[derive(Debug)]
pub struct PendingTransactions<T> {
    /// Iterator over all the pending transactions at the time of the creation of this struct.
    pub all: IntoIter<PendingTx<T>>,
    /// Subscription to the pool to get notified when new transactions are added. This is used to
    /// wait on the new transactions after exhausting the `all` iterator.
    pub subscription: Subscription<T>,
}

impl<T> Stream for PendingTransactions<T>
where
    T: PoolTransaction,
{
    type Item = PendingTx<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(tx) = this.all.next() {
            Poll::Ready(Some(tx))
        } else {
            this.subscription.poll_next_unpin(cx)
        }
    }
}
