use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::tx::PendingTx;

/// Receiving half of a pool subscription. Yields every transaction admitted after the
/// subscription was registered, in admission order.
#[derive(Debug)]
pub struct Subscription<T> {
    receiver: mpsc::UnboundedReceiver<PendingTx<T>>,
}

impl<T> Subscription<T> {
    /// Creates a new subscription along with the sender the pool uses to feed it.
    pub fn new() -> (Self, mpsc::UnboundedSender<PendingTx<T>>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { receiver }, sender)
    }
}

impl<T> Stream for Subscription<T> {
    type Item = PendingTx<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}
