//! Routing rules for the message router.
//!
//! A rule pairs a predicate over messages with an action: redirect to a
//! different agent type, drop the message, or rewrite it in flight. Rules
//! are evaluated in descending priority order with ties broken by insertion
//! order.

use std::fmt;
use std::sync::Arc;

use crate::bus::AgentMessage;

/// Predicate deciding whether a rule applies to a message.
pub type RuleCondition = Arc<dyn Fn(&AgentMessage) -> bool + Send + Sync>;

/// Rewrites a message in flight; output replaces the working message for all
/// later rules and for delivery.
pub type MessageTransformer = Arc<dyn Fn(AgentMessage) -> AgentMessage + Send + Sync>;

/// What a matching rule does to the working message.
#[derive(Clone)]
pub enum RuleAction {
    /// Rewrite the recipient; later rules may override it again.
    Route { target: String },
    /// Stop evaluation and drop the message.
    Filter,
    /// Replace the working message with the transformer's output and
    /// continue evaluating.
    Transform { transformer: MessageTransformer },
}

impl fmt::Debug for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleAction::Route { target } => f.debug_struct("Route").field("target", target).finish(),
            RuleAction::Filter => write!(f, "Filter"),
            RuleAction::Transform { .. } => write!(f, "Transform"),
        }
    }
}

/// An immutable routing rule owned by the router.
///
/// `id` is unique within a router; adding a rule with an existing id
/// replaces the previous one, mirroring subscription replacement on the bus.
#[derive(Clone)]
pub struct RoutingRule {
    /// Unique identifier, used for removal.
    pub id: String,
    /// Evaluation priority; higher runs first.
    pub priority: i32,
    condition: RuleCondition,
    /// Action applied when the condition matches.
    pub action: RuleAction,
}

impl RoutingRule {
    /// Creates a rule from a raw condition and action.
    pub fn new(
        id: &str,
        priority: i32,
        condition: impl Fn(&AgentMessage) -> bool + Send + Sync + 'static,
        action: RuleAction,
    ) -> Self {
        Self {
            id: id.to_string(),
            priority,
            condition: Arc::new(condition),
            action,
        }
    }

    /// Convenience constructor for a redirect rule.
    pub fn route(
        id: &str,
        priority: i32,
        condition: impl Fn(&AgentMessage) -> bool + Send + Sync + 'static,
        target: &str,
    ) -> Self {
        Self::new(
            id,
            priority,
            condition,
            RuleAction::Route {
                target: target.to_string(),
            },
        )
    }

    /// Convenience constructor for a drop rule.
    pub fn filter(
        id: &str,
        priority: i32,
        condition: impl Fn(&AgentMessage) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self::new(id, priority, condition, RuleAction::Filter)
    }

    /// Convenience constructor for a rewrite rule.
    pub fn transform(
        id: &str,
        priority: i32,
        condition: impl Fn(&AgentMessage) -> bool + Send + Sync + 'static,
        transformer: impl Fn(AgentMessage) -> AgentMessage + Send + Sync + 'static,
    ) -> Self {
        Self::new(
            id,
            priority,
            condition,
            RuleAction::Transform {
                transformer: Arc::new(transformer),
            },
        )
    }

    /// Returns `true` if this rule's condition holds for the message.
    pub fn matches(&self, message: &AgentMessage) -> bool {
        (self.condition)(message)
    }
}

impl fmt::Debug for RoutingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingRule")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("action", &self.action)
            .finish()
    }
}
