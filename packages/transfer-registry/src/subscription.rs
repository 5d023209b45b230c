//! Cancellable live notification stream
//!
//! An [`EventSubscription`] owns the background task relaying notifications
//! into it. `unsubscribe().await` cancels the relay and waits for it to
//! exit; dropping the subscription cancels and aborts it.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::{EventFilter, LoggedEvent};

/// Default channel depth between the relay task and the consumer
pub const SUBSCRIPTION_BUFFER: usize = 256;

pub struct EventSubscription {
    receiver: mpsc::Receiver<LoggedEvent>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl EventSubscription {
    /// Spawn `relay` on the current runtime, handing it the sending half of
    /// the stream and the token it must watch.
    pub fn spawn<F, Fut>(buffer: usize, relay: F) -> Self
    where
        F: FnOnce(mpsc::Sender<LoggedEvent>, CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, receiver) = mpsc::channel(buffer.max(1));
        let cancel = CancellationToken::new();
        let task = tokio::spawn(relay(tx, cancel.clone()));
        Self {
            receiver,
            cancel,
            task: Some(task),
        }
    }

    /// Next matching notification, or `None` once the relay has stopped
    pub async fn next_event(&mut self) -> Option<LoggedEvent> {
        self.receiver.recv().await
    }

    /// Stop the relay and wait for its task to finish
    pub async fn unsubscribe(mut self) {
        self.cancel.cancel();
        self.receiver.close();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if e.is_panic() {
                    warn!(error = %e, "Subscription relay panicked");
                }
            }
        }
        debug!("Subscription closed");
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Stream for EventSubscription {
    type Item = LoggedEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for EventSubscription {
    fn drop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for EventSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSubscription")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("running", &self.task.as_ref().map(|t| !t.is_finished()))
            .finish()
    }
}

/// Forward matching entries from a broadcast feed until cancelled
pub async fn relay_broadcast(
    mut source: broadcast::Receiver<LoggedEvent>,
    filter: EventFilter,
    sink: mpsc::Sender<LoggedEvent>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = source.recv() => {
                let event = match received {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped = skipped, "Subscriber lagging, notifications skipped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                if !filter.matches(&event) {
                    continue;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = sink.send(event) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ContractKind, EventKind, Notification};
    use crate::types::Bytes32;
    use futures::StreamExt;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn retry_event(block: u64) -> LoggedEvent {
        LoggedEvent {
            contract: ContractKind::PaymentManager,
            notification: Notification::Retry {
                tx_hash: Bytes32::repeat_byte(block as u8),
            },
            block_number: block,
            log_index: 0,
            tx_hash: Bytes32::repeat_byte(0xEE),
        }
    }

    #[tokio::test]
    async fn test_unsubscribe_joins_relay() {
        let exited = Arc::new(AtomicBool::new(false));
        let flag = exited.clone();

        let sub = EventSubscription::spawn(4, move |_tx, cancel| async move {
            cancel.cancelled().await;
            flag.store(true, Ordering::SeqCst);
        });

        assert!(!sub.is_cancelled());
        sub.unsubscribe().await;
        assert!(exited.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_stream_ends_when_relay_stops() {
        let mut sub = EventSubscription::spawn(4, |tx, _cancel| async move {
            for block in 1..=3 {
                let _ = tx.send(retry_event(block)).await;
            }
        });

        let blocks: Vec<u64> = (&mut sub).map(|e| e.block_number).collect().await;
        assert_eq!(blocks, vec![1, 2, 3]);
        assert!(sub.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_relay_broadcast_filters() {
        let (feed, _) = broadcast::channel(16);
        let source = feed.subscribe();
        let filter = EventFilter::for_kind(EventKind::Retry).topic(1, vec![Bytes32::repeat_byte(2)]);

        let mut sub = EventSubscription::spawn(4, move |tx, cancel| {
            relay_broadcast(source, filter, tx, cancel)
        });

        for block in 1..=3 {
            feed.send(retry_event(block)).unwrap();
        }

        let event = tokio::time::timeout(Duration::from_secs(1), sub.next_event())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.block_number, 2);
        sub.unsubscribe().await;
    }

    #[tokio::test]
    async fn test_drop_cancels_relay() {
        let (feed, _) = broadcast::channel::<LoggedEvent>(16);
        let source = feed.subscribe();
        let sub = EventSubscription::spawn(4, move |tx, cancel| {
            relay_broadcast(source, EventFilter::new(), tx, cancel)
        });
        assert_eq!(feed.receiver_count(), 1);

        drop(sub);
        // Aborted task releases its broadcast receiver
        tokio::time::timeout(Duration::from_secs(1), async {
            while feed.receiver_count() > 0 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
