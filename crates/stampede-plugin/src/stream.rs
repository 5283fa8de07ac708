//! Lazily produced transactions.

use crate::error::DriverError;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, Stream, StreamExt};
use stampede_core::Transaction;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};
use tokio_util::sync::CancellationToken;

/// A finite stream of transactions built by a driver for one unit.
///
/// The stream ends with `None` on a clean end-of-stream; a producer
/// failure is delivered as an `Err` item.
pub struct TransactionStream {
    inner: BoxStream<'static, Result<Transaction, DriverError>>,
}

impl TransactionStream {
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Transaction, DriverError>> + Send + 'static,
    {
        Self {
            inner: stream.boxed(),
        }
    }

    /// A stream over already built transactions.
    pub fn from_vec(transactions: Vec<Transaction>) -> Self {
        Self::new(stream::iter(transactions.into_iter().map(Ok)))
    }

    /// A stream fed by a bounded channel; it ends when every sender is dropped.
    pub fn from_receiver(receiver: mpsc::Receiver<Result<Transaction, DriverError>>) -> Self {
        Self::new(ReceiverStream::new(receiver))
    }

    /// A stream fed by an unbounded channel; it ends when every sender is dropped.
    pub fn from_unbounded(
        receiver: mpsc::UnboundedReceiver<Result<Transaction, DriverError>>,
    ) -> Self {
        Self::new(UnboundedReceiverStream::new(receiver))
    }

    /// Receive the next item.
    pub async fn recv(&mut self) -> Option<Result<Transaction, DriverError>> {
        self.inner.next().await
    }

    /// Receive the next transaction unless `token` is cancelled first.
    ///
    /// A ready item is returned without waiting. Otherwise the wait races
    /// the stream against the token and yields [`DriverError::Cancelled`]
    /// if the token wins. `Ok(None)` means the stream ended cleanly.
    pub async fn recv_with_cancel(
        &mut self,
        token: &CancellationToken,
    ) -> Result<Option<Transaction>, DriverError> {
        if let Some(ready) = self.inner.next().now_or_never() {
            return ready.transpose();
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => Err(DriverError::Cancelled),
            item = self.inner.next() => item.transpose(),
        }
    }
}

impl Stream for TransactionStream {
    type Item = Result<Transaction, DriverError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl std::fmt::Debug for TransactionStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionStream").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stampede_core::DriverQuery;
    use std::time::Duration;

    fn tx(name: &str) -> Transaction {
        Transaction::new(vec![DriverQuery::new(name, "SELECT 1")])
    }

    #[tokio::test]
    async fn test_from_vec_then_clean_end() {
        let mut stream = TransactionStream::from_vec(vec![tx("a"), tx("b")]);
        let token = CancellationToken::new();

        assert_eq!(stream.recv_with_cancel(&token).await.unwrap(), Some(tx("a")));
        assert_eq!(stream.recv_with_cancel(&token).await.unwrap(), Some(tx("b")));
        assert_eq!(stream.recv_with_cancel(&token).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_producer_error_is_not_end_of_stream() {
        let (sender, receiver) = mpsc::channel(4);
        sender.send(Ok(tx("a"))).await.unwrap();
        sender
            .send(Err(DriverError::Remote("boom".to_string())))
            .await
            .unwrap();
        drop(sender);

        let mut stream = TransactionStream::from_receiver(receiver);
        let token = CancellationToken::new();
        assert!(stream.recv_with_cancel(&token).await.unwrap().is_some());
        assert!(matches!(
            stream.recv_with_cancel(&token).await,
            Err(DriverError::Remote(msg)) if msg == "boom"
        ));
        assert!(stream.recv_with_cancel(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cancel_interrupts_blocked_receive() {
        let (_sender, receiver) = mpsc::unbounded_channel();
        let mut stream = TransactionStream::from_unbounded(receiver);
        let token = CancellationToken::new();

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), stream.recv_with_cancel(&token))
            .await
            .expect("receive should observe cancellation");
        assert!(matches!(result, Err(DriverError::Cancelled)));
    }
}
