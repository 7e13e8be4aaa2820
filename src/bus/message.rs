//! Message types for the Tradewire bus
//!
//! This module defines the unit of transport between agents, its metadata
//! envelope, and the receipt returned on successful delivery.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{Result, WireError};

/// Delivery priority carried in message metadata.
///
/// `High` priority messages that no routing rule redirects are escalated to
/// the supervisor by the router's built-in default rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagePriority {
    Low,
    #[default]
    Normal,
    High,
}

/// Metadata envelope attached to every [`AgentMessage`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageMetadata {
    /// Delivery priority; drives the router's default escalation rule.
    pub priority: MessagePriority,
    /// When the message was created.
    pub timestamp: DateTime<Utc>,
    /// Logical conversation this message belongs to. Messages sharing a
    /// conversation id are recorded together in the bus history.
    pub conversation_id: Option<String>,
    /// Unique identifier for request/response correlation.
    pub request_id: Option<String>,
    /// Number of passes through the router. Starts at zero; the router
    /// increments it on every hop and rejects messages at the hop ceiling.
    pub routing_hops: u32,
}

impl Default for MessageMetadata {
    fn default() -> Self {
        Self {
            priority: MessagePriority::Normal,
            timestamp: Utc::now(),
            conversation_id: None,
            request_id: Some(Uuid::new_v4().to_string()),
            routing_hops: 0,
        }
    }
}

/// The unit of transport between agents.
///
/// `content` is an opaque JSON payload; the core never inspects its shape
/// except where a routing rule's predicate does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    /// Logical agent type that produced the message.
    pub sender: String,
    /// Logical agent type to deliver to, or [`crate::roles::BROADCAST`].
    pub recipient: String,
    /// Tag used for subscription filtering (`request`, `response`, `update`, ...).
    pub message_type: String,
    /// Opaque payload.
    pub content: Value,
    /// Metadata envelope.
    pub metadata: MessageMetadata,
}

impl AgentMessage {
    /// Creates a new message with default metadata (normal priority, fresh
    /// request id, zero routing hops).
    ///
    /// # Example
    /// ```
    /// use tradewire::bus::AgentMessage;
    /// use serde_json::json;
    ///
    /// let msg = AgentMessage::new("planning", "research", "request",
    ///     json!({"ticker": "ACME"}));
    /// assert_eq!(msg.recipient, "research");
    /// assert_eq!(msg.metadata.routing_hops, 0);
    /// ```
    pub fn new(sender: &str, recipient: &str, message_type: &str, content: Value) -> Self {
        Self {
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            message_type: message_type.to_string(),
            content,
            metadata: MessageMetadata::default(),
        }
    }

    /// Sets the delivery priority (builder pattern).
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.metadata.priority = priority;
        self
    }

    /// Assigns the message to a conversation (builder pattern).
    pub fn with_conversation(mut self, conversation_id: &str) -> Self {
        self.metadata.conversation_id = Some(conversation_id.to_string());
        self
    }

    /// Overrides the generated request id (builder pattern).
    pub fn with_request_id(mut self, request_id: &str) -> Self {
        self.metadata.request_id = Some(request_id.to_string());
        self
    }

    /// Creates a response message addressed back to `msg`'s sender, carried
    /// in the same conversation and under the same request id.
    pub fn in_reply_to(msg: &AgentMessage, sender: &str, content: Value) -> Self {
        let mut reply = Self::new(sender, &msg.sender, "response", content);
        reply.metadata.conversation_id = msg.metadata.conversation_id.clone();
        reply.metadata.request_id = msg.metadata.request_id.clone();
        reply
    }

    /// Validates required fields.
    ///
    /// `sender`, `recipient`, and `message_type` must be non-empty and
    /// `content` must not be JSON null. A violation is returned as
    /// [`WireError::Validation`] naming the offending field; the message must
    /// not be queued or dispatched.
    pub fn validate(&self) -> Result<()> {
        if self.sender.is_empty() {
            return Err(WireError::Validation("sender is required".to_string()));
        }
        if self.recipient.is_empty() {
            return Err(WireError::Validation("recipient is required".to_string()));
        }
        if self.message_type.is_empty() {
            return Err(WireError::Validation(
                "message type is required".to_string(),
            ));
        }
        if self.content.is_null() {
            return Err(WireError::Validation("content is required".to_string()));
        }
        Ok(())
    }
}

/// Returned by the bus on successful delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// When the delivery completed (or, for broadcast, when dispatch was
    /// scheduled).
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub(crate) fn now() -> Self {
        Self {
            delivered_at: Utc::now(),
        }
    }
}
