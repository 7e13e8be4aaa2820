//! Tradewire - in-process messaging core for multi-agent investment pipelines
//!
//! Two layered components: the [`bus::MessageBus`] owns subscriptions,
//! per-recipient backlog queues, delivery with bounded retry, and
//! conversation history; the [`router::MessageRouter`] sits in front of it
//! and applies routing rules, circuit breaking, and load-balanced dispatch.

pub mod bus;
pub mod config;
pub mod error;
pub mod roles;
pub mod router;

pub use bus::{
    AgentMessage, DeliveryReceipt, MessageBus, MessageHandler, MessageMetadata, MessagePriority,
    MessageSender, MessageSubscription, QueueStatus, RetryFailedEvent,
};
pub use config::{BusConfig, Config, RouterConfig};
pub use error::{Result, WireError};
pub use router::{
    AgentCapabilities, AgentState, AgentStatus, LoadBalancingStrategy, MessageRouter, RoutingRule,
    RoutingStats, RuleAction,
};
