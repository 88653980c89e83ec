use std::sync::Arc;

use async_trait::async_trait;

use crate::message::TcpMessage;
use crate::service::ConsumerError;

/// Identifies where a message came from; passed to every consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageSource {
    pub address: String,
    pub session_id: u64,
}

/// Single optional callback invoked first for every message.
pub type MessageHandler =
    Arc<dyn Fn(&MessageSource, &TcpMessage) -> Result<(), ConsumerError> + Send + Sync>;

/// Asynchronous consumer of emitted messages.
///
/// An error or panic from one subscriber is logged and never reaches the
/// other consumers of the same message.
#[async_trait]
pub trait MessageSubscriber: Send + Sync {
    async fn handle(&self, source: &MessageSource, message: &TcpMessage)
        -> Result<(), ConsumerError>;

    /// Used in log fields.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Builds a fresh subscriber for every message.
///
/// The instance lives only for that message's dispatch and is dropped when
/// it finishes, whether it succeeded, failed or panicked. Put per-message
/// resources (files, transactions) in its `Drop`.
pub trait SubscriberFactory: Send + Sync {
    fn create(&self) -> Box<dyn MessageSubscriber>;
}

impl<F> SubscriberFactory for F
where
    F: Fn() -> Box<dyn MessageSubscriber> + Send + Sync,
{
    fn create(&self) -> Box<dyn MessageSubscriber> {
        self()
    }
}

/// A registered subscriber: one shared instance, or one instance per message.
#[derive(Clone)]
pub enum Subscription {
    Shared(Arc<dyn MessageSubscriber>),
    Scoped(Arc<dyn SubscriberFactory>),
}
