pub use notifier::{Notifier, NotifyReceiver};
mod notifier;
