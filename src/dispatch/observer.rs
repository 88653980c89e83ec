use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::message::TcpMessage;
use crate::service::ConsumerError;

/// Push-style consumer with `next`/`error`/`completed` notifications.
pub trait MessageObserver: Send + Sync {
    /// An `Err` (or a panic) is routed back into [`on_error`](Self::on_error)
    /// of the same observer.
    fn on_next(&self, message: &TcpMessage) -> Result<(), ConsumerError>;

    fn on_error(&self, error: &ConsumerError);

    fn on_completed(&self);
}

/// When observers receive `on_completed`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverCompletion {
    /// Once, after the last message, when the dispatcher's input ends.
    #[default]
    OnShutdown,
    /// After every message, whether or not `on_next` failed.
    PerMessage,
}

/// Notification republished by [`ObserverStream`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObserverEvent {
    Next(TcpMessage),
    Error(String),
    Completed,
}

/// Wraps an observer and republishes what it sees as a stream.
///
/// The wrapped observer runs first; a message it rejects is not republished
/// as `Next`, only as the `Error` that follows.
pub struct ObserverStream<O> {
    inner: O,
    events: broadcast::Sender<ObserverEvent>,
}

impl<O: MessageObserver> ObserverStream<O> {
    pub fn new(inner: O, capacity: usize) -> Self {
        let (events, _) = broadcast::channel(capacity.max(1));
        ObserverStream { inner, events }
    }

    /// Lagging consumers see `BroadcastStreamRecvError::Lagged` items.
    pub fn stream(&self) -> BroadcastStream<ObserverEvent> {
        BroadcastStream::new(self.events.subscribe())
    }

    pub fn inner(&self) -> &O {
        &self.inner
    }
}

impl<O: MessageObserver> MessageObserver for ObserverStream<O> {
    fn on_next(&self, message: &TcpMessage) -> Result<(), ConsumerError> {
        self.inner.on_next(message)?;
        let _ = self.events.send(ObserverEvent::Next(message.clone()));
        Ok(())
    }

    fn on_error(&self, error: &ConsumerError) {
        self.inner.on_error(error);
        let _ = self.events.send(ObserverEvent::Error(error.to_string()));
    }

    fn on_completed(&self) {
        self.inner.on_completed();
        let _ = self.events.send(ObserverEvent::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    struct RejectBlank;

    impl MessageObserver for RejectBlank {
        fn on_next(&self, message: &TcpMessage) -> Result<(), ConsumerError> {
            if message.is_empty() {
                return Err("blank message".into());
            }
            Ok(())
        }

        fn on_error(&self, _error: &ConsumerError) {}

        fn on_completed(&self) {}
    }

    #[tokio::test]
    async fn republishes_next_error_and_completed() {
        let observer = ObserverStream::new(RejectBlank, 8);
        let mut stream = observer.stream();

        let ok = TcpMessage::now("T=21.5");
        observer.on_next(&ok).unwrap();
        let err = observer.on_next(&TcpMessage::now("  ")).unwrap_err();
        observer.on_error(&err);
        observer.on_completed();

        assert_eq!(stream.next().await.unwrap().unwrap(), ObserverEvent::Next(ok));
        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            ObserverEvent::Error("blank message".to_string())
        );
        assert_eq!(stream.next().await.unwrap().unwrap(), ObserverEvent::Completed);
    }
}
