//! Retry-exhaustion event surface for the message bus.
//!
//! When background redelivery runs out of attempts the bus emits a
//! [`RetryFailedEvent`] to every registered listener. This is the only
//! asynchronous notification the bus surfaces outside of direct call
//! returns; `remove_all_listeners` clears the registry on teardown.

use std::sync::{Arc, RwLock};

use tracing::warn;

use super::message::AgentMessage;

/// Emitted after all redelivery attempts for a message are exhausted.
#[derive(Debug, Clone)]
pub struct RetryFailedEvent {
    /// The message that could not be delivered.
    pub message: AgentMessage,
    /// How many redelivery attempts were made.
    pub retry_count: u32,
    /// The error reported by the final attempt.
    pub error: String,
}

type Listener = Box<dyn Fn(&RetryFailedEvent) + Send + Sync>;

/// Registry of retry-failure listeners, shared between the bus and its
/// background retry tasks.
#[derive(Clone, Default)]
pub(crate) struct ListenerRegistry {
    listeners: Arc<RwLock<Vec<Listener>>>,
}

impl ListenerRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Listeners stay registered until
    /// [`ListenerRegistry::clear`].
    pub(crate) fn add(&self, listener: impl Fn(&RetryFailedEvent) + Send + Sync + 'static) {
        self.listeners.write().unwrap().push(Box::new(listener));
    }

    /// Remove every registered listener.
    pub(crate) fn clear(&self) {
        self.listeners.write().unwrap().clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.listeners.read().unwrap().len()
    }

    /// Deliver `event` to every registered listener.
    pub(crate) fn emit(&self, event: &RetryFailedEvent) {
        warn!(
            recipient = %event.message.recipient,
            retry_count = event.retry_count,
            error = %event.error,
            "Message delivery abandoned after retry exhaustion"
        );
        let listeners = self.listeners.read().unwrap();
        for listener in listeners.iter() {
            listener(event);
        }
    }
}
