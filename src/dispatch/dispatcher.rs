use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::client::MessageReceiver;
use crate::message::TcpMessage;
use crate::service::ConsumerError;

use super::{
    MessageHandler, MessageObserver, MessageSource, MessageSubscriber, ObserverCompletion,
    SubscriberFactory, Subscription,
};

/// Outcome of dispatching one message.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// No consumer was configured and the message was only logged.
    pub fallback_logged: bool,
}

impl DispatchReport {
    fn record(&mut self, result: &Result<(), ConsumerError>) {
        match result {
            Ok(()) => self.delivered += 1,
            Err(_) => self.failed += 1,
        }
    }
}

fn panic_error(payload: Box<dyn Any + Send>) -> ConsumerError {
    let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    };
    format!("consumer panicked: {}", message).into()
}

async fn invoke(
    subscriber: &dyn MessageSubscriber,
    source: &MessageSource,
    message: &TcpMessage,
) -> Result<(), ConsumerError> {
    AssertUnwindSafe(subscriber.handle(source, message))
        .catch_unwind()
        .await
        .unwrap_or_else(|payload| Err(panic_error(payload)))
}

fn guarded<F: FnOnce() -> Result<(), ConsumerError>>(f: F) -> Result<(), ConsumerError> {
    catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| Err(panic_error(payload)))
}

/// Fans every emitted message out to the configured consumers.
///
/// For each message, in order: the callback, every subscriber, then every
/// observer. Consumers run one after another and each one is isolated: an
/// error or panic is logged (observers also get it through `on_error`) and
/// the next consumer still runs. With no consumers at all the message is
/// logged instead.
pub struct Dispatcher {
    address: String,
    handler: Option<MessageHandler>,
    subscriptions: Vec<Subscription>,
    observers: Vec<Arc<dyn MessageObserver>>,
    completion: ObserverCompletion,
}

/// Consumers are fixed at build time; nothing is registered while running.
pub struct DispatcherBuilder {
    address: String,
    handler: Option<MessageHandler>,
    subscriptions: Vec<Subscription>,
    observers: Vec<Arc<dyn MessageObserver>>,
    completion: ObserverCompletion,
}

impl DispatcherBuilder {
    pub fn handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&MessageSource, &TcpMessage) -> Result<(), ConsumerError> + Send + Sync + 'static,
    {
        self.handler = Some(Arc::new(handler));
        self
    }

    pub fn subscriber(mut self, subscriber: Arc<dyn MessageSubscriber>) -> Self {
        self.subscriptions.push(Subscription::Shared(subscriber));
        self
    }

    /// Registers a factory whose subscriber lives for a single message.
    pub fn scoped_subscriber(mut self, factory: Arc<dyn SubscriberFactory>) -> Self {
        self.subscriptions.push(Subscription::Scoped(factory));
        self
    }

    pub fn observer(mut self, observer: Arc<dyn MessageObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn completion(mut self, completion: ObserverCompletion) -> Self {
        self.completion = completion;
        self
    }

    pub fn build(self) -> Dispatcher {
        Dispatcher {
            address: self.address,
            handler: self.handler,
            subscriptions: self.subscriptions,
            observers: self.observers,
            completion: self.completion,
        }
    }
}

impl Dispatcher {
    /// `address` is reported to consumers as the message source.
    pub fn builder(address: impl Into<String>) -> DispatcherBuilder {
        DispatcherBuilder {
            address: address.into(),
            handler: None,
            subscriptions: Vec::new(),
            observers: Vec::new(),
            completion: ObserverCompletion::default(),
        }
    }

    pub fn has_consumers(&self) -> bool {
        self.handler.is_some() || !self.subscriptions.is_empty() || !self.observers.is_empty()
    }

    pub async fn dispatch(&self, message: &TcpMessage) -> DispatchReport {
        let source = MessageSource {
            address: self.address.clone(),
            session_id: message.session_id(),
        };
        let mut report = DispatchReport::default();

        if let Some(handler) = &self.handler {
            let result = guarded(|| handler(&source, message));
            if let Err(e) = &result {
                error!(session_id = source.session_id, error = %e, "message handler failed");
            }
            report.record(&result);
        }

        for subscription in &self.subscriptions {
            let (name, result) = match subscription {
                Subscription::Shared(subscriber) => (
                    subscriber.name().to_string(),
                    invoke(subscriber.as_ref(), &source, message).await,
                ),
                Subscription::Scoped(factory) => {
                    // dropped at the end of this arm on every path
                    match catch_unwind(AssertUnwindSafe(|| factory.create())) {
                        Ok(scoped) => (
                            scoped.name().to_string(),
                            invoke(scoped.as_ref(), &source, message).await,
                        ),
                        Err(payload) => ("subscriber factory".to_string(), Err(panic_error(payload))),
                    }
                }
            };
            if let Err(e) = &result {
                error!(
                    subscriber = %name,
                    session_id = source.session_id,
                    error = %e,
                    "subscriber failed to handle message"
                );
            }
            report.record(&result);
        }

        for observer in &self.observers {
            let result = guarded(|| observer.on_next(message));
            if let Err(e) = &result {
                error!(session_id = source.session_id, error = %e, "observer failed on next");
                if let Err(inner) = guarded(|| {
                    observer.on_error(e);
                    Ok(())
                }) {
                    error!(error = %inner, "observer failed while handling its own error");
                }
            }
            if self.completion == ObserverCompletion::PerMessage {
                Self::complete(observer.as_ref());
            }
            report.record(&result);
        }

        if !self.has_consumers() {
            info!(session_id = source.session_id, message = %message, "received message");
            report.fallback_logged = true;
        }
        report
    }

    fn complete(observer: &dyn MessageObserver) {
        if let Err(e) = guarded(|| {
            observer.on_completed();
            Ok(())
        }) {
            error!(error = %e, "observer failed on completed");
        }
    }

    /// Sends `on_completed` to every observer.
    pub fn complete_observers(&self) {
        for observer in &self.observers {
            Self::complete(observer.as_ref());
        }
    }

    /// Dispatches until the client disposes its message stream.
    pub async fn run(self, messages: MessageReceiver) {
        let mut dispatched = 0u64;
        while let Ok(message) = messages.recv().await {
            let report = self.dispatch(&message).await;
            dispatched += 1;
            debug!(
                session_id = message.session_id(),
                delivered = report.delivered,
                failed = report.failed,
                "dispatched message"
            );
        }
        if self.completion == ObserverCompletion::OnShutdown {
            self.complete_observers();
        }
        debug!(dispatched, "dispatcher input closed");
    }

    pub fn spawn(self, messages: MessageReceiver) -> JoinHandle<()> {
        tokio::spawn(self.run(messages))
    }
}
