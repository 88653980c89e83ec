//! Fan-out of emitted messages to a callback, subscribers and observers,
//! with failures isolated per consumer.

pub use dispatcher::{DispatchReport, Dispatcher, DispatcherBuilder};
pub use observer::{MessageObserver, ObserverCompletion, ObserverEvent, ObserverStream};
pub use subscriber::{
    MessageHandler, MessageSource, MessageSubscriber, SubscriberFactory, Subscription,
};

mod dispatcher;
mod observer;
mod subscriber;
