use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

/// Receiving end handed out by [`Notifier::subscribe`].
pub type NotifyReceiver<T> = async_channel::Receiver<T>;

/// Multicast publisher: every subscriber gets its own clone of each item.
///
/// Queues are unbounded, so a slow subscriber never throttles the publisher
/// and never makes it drop items for the other subscribers. Receivers that
/// were dropped are pruned on the next publish.
#[derive(Debug)]
pub struct Notifier<T> {
    subscribers: Mutex<Vec<async_channel::Sender<T>>>,
    closed: AtomicBool,
}

impl<T> Default for Notifier<T> {
    fn default() -> Self {
        Notifier {
            subscribers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }
}

impl<T: Clone> Notifier<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new subscriber. After [`close`](Self::close) the returned
    /// receiver is already at end of stream.
    pub fn subscribe(&self) -> NotifyReceiver<T> {
        let (tx, rx) = async_channel::unbounded();
        let mut subscribers = self.subscribers.lock();
        if self.is_closed() {
            tx.close();
        } else {
            subscribers.push(tx);
        }
        rx
    }

    /// Returns the number of subscribers that received `item`.
    pub fn publish(&self, item: T) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| tx.try_send(item.clone()).is_ok());
        subscribers.len()
    }

    /// Ends every subscriber's stream once its queued items are drained.
    pub fn close(&self) {
        let mut subscribers = self.subscribers.lock();
        self.closed.store(true, Ordering::Release);
        for tx in subscribers.drain(..) {
            tx.close();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_subscriber_gets_every_item() {
        let notifier = Notifier::new();
        let first = notifier.subscribe();
        let second = notifier.subscribe();

        assert_eq!(notifier.publish(1), 2);
        assert_eq!(notifier.publish(2), 2);

        for rx in [first, second] {
            assert_eq!(rx.recv().await.unwrap(), 1);
            assert_eq!(rx.recv().await.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned() {
        let notifier = Notifier::new();
        let kept = notifier.subscribe();
        drop(notifier.subscribe());

        assert_eq!(notifier.publish("a"), 1);
        assert_eq!(notifier.subscriber_count(), 1);
        assert_eq!(kept.recv().await.unwrap(), "a");
    }

    #[tokio::test]
    async fn close_drains_then_ends_stream() {
        let notifier = Notifier::new();
        let rx = notifier.subscribe();
        notifier.publish(7);
        assert!(!notifier.is_closed());
        notifier.close();
        assert!(notifier.is_closed());

        assert_eq!(rx.recv().await.unwrap(), 7);
        assert!(rx.recv().await.is_err());
        assert!(notifier.subscribe().recv().await.is_err());
        assert_eq!(notifier.publish(8), 0);
    }
}
