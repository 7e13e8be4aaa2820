//! Message Bus Module
//!
//! This module provides the core message bus infrastructure for Tradewire.
//! The `MessageBus` owns subscriptions, per-recipient backlog queues,
//! delivery with bounded retry, and conversation history. It is the only
//! component that invokes subscriber callbacks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────┐
//! │    Agent    │────>│  MessageBus  │────>│  Subscriber  │
//! │ (planning)  │     │  (delivery)  │     │  (research)  │
//! └─────────────┘     └──────────────┘     └──────────────┘
//!                            │
//!                            │ on handler failure
//!                            ▼
//!                     ┌──────────────┐     ┌──────────────────────┐
//!                     │ retry task   │────>│ RetryFailedEvent     │
//!                     │ (background) │     │ (after exhaustion)   │
//!                     └──────────────┘     └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use serde_json::json;
//! use tradewire::bus::{AgentMessage, MessageBus, MessageHandler, MessageSubscription};
//! use tradewire::error::Result;
//!
//! struct EchoAgent;
//!
//! #[async_trait]
//! impl MessageHandler for EchoAgent {
//!     async fn handle(&self, msg: AgentMessage) -> Result<()> {
//!         println!("research received: {}", msg.content);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let bus = MessageBus::new();
//!     bus.subscribe(MessageSubscription::new(
//!         "research",
//!         &["request"],
//!         Arc::new(EchoAgent),
//!     ));
//!
//!     let msg = AgentMessage::new("planning", "research", "request", json!({"ticker": "ACME"}));
//!     let receipt = bus.send_message(msg).await.unwrap();
//!     println!("delivered at {}", receipt.delivered_at);
//! }
//! ```

pub mod events;
pub mod message;

pub use events::RetryFailedEvent;
pub use message::{AgentMessage, DeliveryReceipt, MessageMetadata, MessagePriority};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BusConfig;
use crate::error::{Result, WireError};
use crate::roles;
use events::ListenerRegistry;

// ============================================================================
// Traits
// ============================================================================

/// Subscriber callback. Implementations are black boxes that either complete
/// or fail; the bus never inspects what a handler does internally.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, msg: AgentMessage) -> Result<()>;
}

/// The delivery seam between the router and the bus.
///
/// The router depends only on this trait, so tests can substitute a fake
/// sender without constructing a real bus.
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send_message(&self, message: AgentMessage) -> Result<DeliveryReceipt>;
}

// ============================================================================
// Subscriptions
// ============================================================================

/// Registration of an agent's handler for a set of message types.
///
/// Exactly one subscription is active per agent type; a later `subscribe`
/// for the same type replaces the former.
#[derive(Clone)]
pub struct MessageSubscription {
    /// Logical agent type the handler serves.
    pub agent_type: String,
    /// Message type tags this subscription accepts.
    pub message_types: HashSet<String>,
    /// The callback invoked on delivery.
    pub handler: Arc<dyn MessageHandler>,
}

impl MessageSubscription {
    /// Creates a subscription for `agent_type` accepting the given types.
    pub fn new(agent_type: &str, message_types: &[&str], handler: Arc<dyn MessageHandler>) -> Self {
        Self {
            agent_type: agent_type.to_string(),
            message_types: message_types.iter().map(|t| t.to_string()).collect(),
            handler,
        }
    }

    /// Returns `true` if this subscription accepts the given message type.
    pub fn accepts(&self, message_type: &str) -> bool {
        self.message_types.contains(message_type)
    }
}

impl fmt::Debug for MessageSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageSubscription")
            .field("agent_type", &self.agent_type)
            .field("message_types", &self.message_types)
            .finish()
    }
}

// ============================================================================
// Queue status
// ============================================================================

/// Snapshot of backlog and retry bookkeeping, for observability.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStatus {
    /// Total messages across all backlog queues.
    pub total_messages: usize,
    /// Backlog size per recipient agent type.
    pub messages_by_agent: HashMap<String, usize>,
    /// Messages currently in background redelivery.
    pub retry_queue_size: usize,
}

// ============================================================================
// MessageBus
// ============================================================================

/// In-process publish/subscribe bus with bounded retry and backlog queuing.
///
/// Delivery semantics:
/// - a validation failure is returned synchronously and nothing is dispatched;
/// - a send with no matching subscriber lands on the recipient's bounded
///   backlog queue (observability only, never auto-redelivered) and fails;
/// - a handler failure fails the original call, then redelivery continues in
///   the background with fixed-delay spacing up to `max_retries`, after which
///   a [`RetryFailedEvent`] is the only trace;
/// - `broadcast` fans out concurrently to every subscription accepting the
///   message type.
pub struct MessageBus {
    config: BusConfig,
    /// One active subscription per agent type.
    subscriptions: Arc<RwLock<HashMap<String, MessageSubscription>>>,
    /// Per-recipient backlog of undeliverable messages, oldest first.
    queues: Arc<RwLock<HashMap<String, VecDeque<AgentMessage>>>>,
    /// Append-only message log per conversation id.
    history: Arc<RwLock<HashMap<String, Vec<AgentMessage>>>>,
    /// Handles of in-flight background retry tasks, for cleanup.
    retry_tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    /// Count of messages currently in background redelivery.
    retry_pending: Arc<AtomicUsize>,
    listeners: ListenerRegistry,
}

impl MessageBus {
    /// Creates a new `MessageBus` with default configuration.
    pub fn new() -> Self {
        Self::build(BusConfig::default())
    }

    /// Creates a new `MessageBus` with the given configuration.
    ///
    /// # Errors
    /// Returns [`WireError::Config`] if a numeric bound is invalid
    /// (zero retry spacing, timeout, or queue capacity).
    pub fn with_config(config: BusConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: BusConfig) -> Self {
        Self {
            config,
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            queues: Arc::new(RwLock::new(HashMap::new())),
            history: Arc::new(RwLock::new(HashMap::new())),
            retry_tasks: Arc::new(Mutex::new(Vec::new())),
            retry_pending: Arc::new(AtomicUsize::new(0)),
            listeners: ListenerRegistry::new(),
        }
    }

    // ------------------------------------------------------------------
    // Subscription management
    // ------------------------------------------------------------------

    /// Registers the handler for an agent type, replacing any existing
    /// subscription for that type.
    pub fn subscribe(&self, subscription: MessageSubscription) {
        debug!(agent_type = %subscription.agent_type, "Subscription registered");
        self.subscriptions
            .write()
            .unwrap()
            .insert(subscription.agent_type.clone(), subscription);
    }

    /// Removes the handler for an agent type. Subsequent deliveries to that
    /// type fail with "No subscribers found".
    pub fn unsubscribe(&self, agent_type: &str) {
        debug!(agent_type, "Subscription removed");
        self.subscriptions.write().unwrap().remove(agent_type);
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    /// Sends a message to its recipient, or fans out to all matching
    /// subscribers when the recipient is [`roles::BROADCAST`].
    ///
    /// See the type-level docs for the full delivery contract. This call
    /// returns as soon as the initial attempt resolves; background retries
    /// never surface here.
    pub async fn send_message(&self, message: AgentMessage) -> Result<DeliveryReceipt> {
        message.validate()?;

        if message.recipient == roles::BROADCAST {
            return self.broadcast(message).await;
        }

        let subscription = {
            let subs = self.subscriptions.read().unwrap();
            subs.get(&message.recipient)
                .filter(|s| s.accepts(&message.message_type))
                .cloned()
        };

        let Some(subscription) = subscription else {
            let recipient = message.recipient.clone();
            self.enqueue_backlog(message);
            return Err(WireError::NoSubscribers(recipient));
        };

        match self.attempt(&subscription, &message).await {
            Ok(()) => {
                self.record_history(&message);
                Ok(DeliveryReceipt::now())
            }
            Err(err) => {
                warn!(
                    recipient = %message.recipient,
                    error = %err,
                    "Initial delivery failed, scheduling redelivery"
                );
                let detail = format!("handler for {} failed: {}", message.recipient, err);
                self.schedule_retries(message, err.to_string());
                Err(WireError::Delivery(detail))
            }
        }
    }

    /// One delivery attempt, bounded by the configured message timeout.
    async fn attempt(
        &self,
        subscription: &MessageSubscription,
        message: &AgentMessage,
    ) -> Result<()> {
        let bound = Duration::from_millis(self.config.message_timeout_ms);
        match tokio::time::timeout(bound, subscription.handler.handle(message.clone())).await {
            Ok(result) => result,
            Err(_) => Err(WireError::Timeout(self.config.message_timeout_ms)),
        }
    }

    /// Concurrent fan-out to every subscription accepting the message type.
    ///
    /// The call succeeds once dispatch is scheduled to at least one matching
    /// subscriber; individual handler failures are logged, not retried.
    async fn broadcast(&self, message: AgentMessage) -> Result<DeliveryReceipt> {
        let matching: Vec<MessageSubscription> = {
            let subs = self.subscriptions.read().unwrap();
            subs.values()
                .filter(|s| s.accepts(&message.message_type))
                .cloned()
                .collect()
        };

        if matching.is_empty() {
            return Err(WireError::NoSubscribers(roles::BROADCAST.to_string()));
        }

        debug!(
            subscribers = matching.len(),
            message_type = %message.message_type,
            "Broadcast dispatched"
        );

        let timeout_ms = self.config.message_timeout_ms;
        let fanout = message.clone();
        tokio::spawn(async move {
            let attempts = matching.into_iter().map(|sub| {
                // Every matching subscriber receives the identical message.
                let msg = fanout.clone();
                async move {
                    let bound = Duration::from_millis(timeout_ms);
                    match tokio::time::timeout(bound, sub.handler.handle(msg)).await {
                        Ok(Ok(())) => {}
                        Ok(Err(err)) => {
                            warn!(agent_type = %sub.agent_type, error = %err, "Broadcast handler failed");
                        }
                        Err(_) => {
                            warn!(agent_type = %sub.agent_type, timeout_ms, "Broadcast handler timed out");
                        }
                    }
                }
            });
            join_all(attempts).await;
        });

        self.record_history(&message);
        Ok(DeliveryReceipt::now())
    }

    /// Append an undeliverable message to the recipient's bounded backlog,
    /// evicting the oldest entry when full.
    fn enqueue_backlog(&self, message: AgentMessage) {
        let mut queues = self.queues.write().unwrap();
        let queue = queues.entry(message.recipient.clone()).or_default();
        if queue.len() >= self.config.max_queue_size {
            queue.pop_front();
            warn!(
                recipient = %message.recipient,
                capacity = self.config.max_queue_size,
                "Backlog full, evicting oldest message"
            );
        }
        queue.push_back(message);
    }

    fn record_history(&self, message: &AgentMessage) {
        if let Some(id) = &message.metadata.conversation_id {
            self.history
                .write()
                .unwrap()
                .entry(id.clone())
                .or_default()
                .push(message.clone());
        }
    }

    /// Spawn a background task making up to `max_retries` redelivery
    /// attempts with fixed-delay spacing. Each attempt re-resolves the
    /// current subscription, so a replaced handler is picked up. On
    /// exhaustion a [`RetryFailedEvent`] is emitted; nothing propagates to
    /// the original caller.
    fn schedule_retries(&self, message: AgentMessage, first_error: String) {
        if self.config.max_retries == 0 {
            self.listeners.emit(&RetryFailedEvent {
                message,
                retry_count: 0,
                error: first_error,
            });
            return;
        }

        let subscriptions = Arc::clone(&self.subscriptions);
        let history = Arc::clone(&self.history);
        let pending = Arc::clone(&self.retry_pending);
        let listeners = self.listeners.clone();
        let max_retries = self.config.max_retries;
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        let timeout_ms = self.config.message_timeout_ms;

        pending.fetch_add(1, Ordering::SeqCst);
        let handle = tokio::spawn(async move {
            let mut last_error = first_error;
            for attempt in 1..=max_retries {
                tokio::time::sleep(delay).await;

                let subscription = {
                    let subs = subscriptions.read().unwrap();
                    subs.get(&message.recipient)
                        .filter(|s| s.accepts(&message.message_type))
                        .cloned()
                };
                let Some(subscription) = subscription else {
                    last_error = format!("no subscriber registered for {}", message.recipient);
                    continue;
                };

                let bound = Duration::from_millis(timeout_ms);
                match tokio::time::timeout(bound, subscription.handler.handle(message.clone()))
                    .await
                {
                    Ok(Ok(())) => {
                        debug!(recipient = %message.recipient, attempt, "Redelivery succeeded");
                        if let Some(id) = &message.metadata.conversation_id {
                            history
                                .write()
                                .unwrap()
                                .entry(id.clone())
                                .or_default()
                                .push(message.clone());
                        }
                        pending.fetch_sub(1, Ordering::SeqCst);
                        return;
                    }
                    Ok(Err(err)) => {
                        warn!(
                            recipient = %message.recipient,
                            attempt,
                            max_retries,
                            error = %err,
                            "Redelivery attempt failed"
                        );
                        last_error = err.to_string();
                    }
                    Err(_) => {
                        last_error = format!("delivery timed out after {}ms", timeout_ms);
                    }
                }
            }

            pending.fetch_sub(1, Ordering::SeqCst);
            listeners.emit(&RetryFailedEvent {
                message,
                retry_count: max_retries,
                error: last_error,
            });
        });

        let mut tasks = self.retry_tasks.lock().unwrap();
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    // ------------------------------------------------------------------
    // Observability
    // ------------------------------------------------------------------

    /// Snapshot of backlog sizes and in-flight retry count.
    pub fn queue_status(&self) -> QueueStatus {
        let queues = self.queues.read().unwrap();
        let messages_by_agent: HashMap<String, usize> = queues
            .iter()
            .map(|(agent, queue)| (agent.clone(), queue.len()))
            .collect();
        QueueStatus {
            total_messages: messages_by_agent.values().sum(),
            messages_by_agent,
            retry_queue_size: self.retry_pending.load(Ordering::SeqCst),
        }
    }

    /// All successfully delivered messages for a conversation, in send order.
    pub fn conversation_history(&self, conversation_id: &str) -> Vec<AgentMessage> {
        self.history
            .read()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Removes all history for a conversation.
    pub fn clear_conversation(&self, conversation_id: &str) {
        self.history.write().unwrap().remove(conversation_id);
    }

    // ------------------------------------------------------------------
    // Events & teardown
    // ------------------------------------------------------------------

    /// Registers a listener for retry-exhaustion events.
    pub fn on_retry_failed(&self, listener: impl Fn(&RetryFailedEvent) + Send + Sync + 'static) {
        self.listeners.add(listener);
    }

    /// Removes every registered retry-failure listener.
    pub fn remove_all_listeners(&self) {
        self.listeners.clear();
    }

    /// Cancels all outstanding retry tasks. Idempotent; no background work
    /// survives this call.
    pub fn cleanup(&self) {
        let mut tasks = self.retry_tasks.lock().unwrap();
        for task in tasks.drain(..) {
            task.abort();
        }
        self.retry_pending.store(0, Ordering::SeqCst);
    }
}

impl Default for MessageBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MessageBus {
    /// Clones the bus, sharing the same underlying subscriptions, queues,
    /// history, and retry bookkeeping.
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            subscriptions: Arc::clone(&self.subscriptions),
            queues: Arc::clone(&self.queues),
            history: Arc::clone(&self.history),
            retry_tasks: Arc::clone(&self.retry_tasks),
            retry_pending: Arc::clone(&self.retry_pending),
            listeners: self.listeners.clone(),
        }
    }
}

#[async_trait]
impl MessageSender for MessageBus {
    async fn send_message(&self, message: AgentMessage) -> Result<DeliveryReceipt> {
        MessageBus::send_message(self, message).await
    }
}
